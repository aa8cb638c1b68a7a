pub mod estimation;
pub mod input;

pub use estimation::EstimationPipeline;
