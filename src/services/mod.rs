pub mod density; // Food density catalog
pub mod estimator; // Volume estimators (reference + remote model)

pub use density::{DensityCatalog, DensitySource};
pub use estimator::{
    EstimatorKind, ModelArtifacts, ReferenceVolumeEstimator, RemoteVolumeEstimator,
    VolumeEstimator,
};
