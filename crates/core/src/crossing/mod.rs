pub mod engine;
pub mod resolution;

pub use engine::{CrossingConfig, DeclarationCrossingEngine};
pub use resolution::CrossingResolutionWorkflow;
