// =============================================================================
// Admission gates and guards
// =============================================================================
//
// All evaluators here are pure, non-suspending transformations: venue
// snapshots are fetched by the orchestrator before the microstructure gate
// runs, and every verdict is a structured outcome rather than an error.

pub mod entry;
pub mod guards;
pub mod microstructure;

pub use entry::{EntryGateStack, FundingInput, GateInputs, GateSettings, MovementThresholds};
pub use guards::{GuardInputs, GuardSettings, GuardStack};
pub use microstructure::{MicroProof, MicroSettings, VenueCheck, VenueData};
