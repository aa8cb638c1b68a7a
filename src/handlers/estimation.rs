use std::sync::Arc;

use crate::errors::{EstimationError, PipelineError};
use crate::handlers::input::{decode_image_payload, parse_plate_diameter, resolve_food_type};
use crate::models::{DensityEntry, EstimationRequest, EstimationResult, ImageShape, PredictPayload};
use crate::services::estimator::EstimationParams;
use crate::state::ServiceState;

const ML_PER_CUBIC_METRE: f64 = 1e6;

/// Turns a `/predict` payload into a weight estimate.
#[derive(Clone)]
pub struct EstimationPipeline {
    state: Arc<ServiceState>,
}

impl EstimationPipeline {
    pub fn new(state: Arc<ServiceState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    pub fn ensure_ready(&self) -> Result<(), PipelineError> {
        if self.state.is_ready() {
            Ok(())
        } else {
            Err(PipelineError::ServiceUnavailable)
        }
    }

    /// Validates the payload fields and runs the estimate.
    pub async fn estimate(&self, payload: PredictPayload) -> Result<EstimationResult, PipelineError> {
        self.ensure_ready()?;

        // Decoding a large raster is CPU-bound; keep it off the async workers
        let img = payload.img;
        let image = tokio::task::spawn_blocking(move || decode_image_payload(img.as_ref()))
            .await
            .map_err(|e| PipelineError::EstimationFailed(EstimationError::Worker(e)))??;
        let request = EstimationRequest {
            image,
            food_type: resolve_food_type(payload.food_type.as_deref()),
            plate_diameter: parse_plate_diameter(payload.plate_diameter.as_ref()),
        };

        self.run(request).await
    }

    pub async fn run(&self, request: EstimationRequest) -> Result<EstimationResult, PipelineError> {
        let (estimator, catalog) = self
            .state
            .dependencies()
            .ok_or(PipelineError::ServiceUnavailable)?;

        let shape = request.image.shape();
        log::info!(
            "🍽️ Estimating '{}' on {}x{} image (plate diameter {})",
            request.food_type,
            shape.width,
            shape.height,
            request.plate_diameter
        );

        let params = EstimationParams::with_plate_diameter(request.plate_diameter);
        let volumes_m3 = estimator
            .estimate(&request.image, &params)
            .await
            .map_err(PipelineError::EstimationFailed)?;

        let entry = catalog.query(&request.food_type);
        let result = compose_result(&volumes_m3, entry, shape);

        log::info!(
            "✅ {} → {} g from {} item(s) at {} g/ml",
            result.food_type_match,
            result.weight_grams,
            result.volumes_ml.len(),
            result.density_g_per_ml
        );
        Ok(result)
    }
}

/// Converts volumes to millilitres and weighs them.
///
/// The weight is summed from full-precision volumes and rounded once;
/// the reported volumes are rounded independently.
pub fn compose_result(volumes_m3: &[f64], entry: &DensityEntry, shape: ImageShape) -> EstimationResult {
    let volumes_ml: Vec<f64> = volumes_m3.iter().map(|v| v * ML_PER_CUBIC_METRE).collect();
    let weight: f64 = volumes_ml.iter().map(|v| v * entry.density_g_per_ml).sum();

    EstimationResult {
        food_type_match: entry.canonical_name.clone(),
        weight_grams: round2(weight),
        volumes_ml: volumes_ml.iter().copied().map(round2).collect(),
        density_g_per_ml: entry.density_g_per_ml,
        image_shape: shape,
    }
}

/// Rounds to two decimals from the exact stored value, so `2.675` (stored
/// as `2.67499...`) becomes `2.67`.
fn round2(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}
