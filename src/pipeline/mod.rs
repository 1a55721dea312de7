// =============================================================================
// Scan pipeline — orchestration, reports, snapshots
// =============================================================================

pub mod orchestrator;
pub mod report;
pub mod snapshot;

pub use orchestrator::{ScanMetrics, Scanner};
pub use report::{Candidate, RejectedSymbol, ScanReport};
pub use snapshot::SnapshotStore;
