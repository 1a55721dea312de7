// =============================================================================
// Factor construction and orthogonalization
// =============================================================================

pub mod builder;
pub mod orthogonalizer;
pub mod regression;

pub use builder::FactorBuilder;
pub use orthogonalizer::{OrthoSpec, Orthogonalizer};
