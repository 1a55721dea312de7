// =============================================================================
// Read-only HTTP surface
// =============================================================================

pub mod rest;
