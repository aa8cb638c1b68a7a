use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{value::RawValue, Value};
use std::collections::HashMap;

use crate::errors::{ImageError, PipelineError};
use crate::models::{EstimationResult, PredictPayload};
use crate::state::Readiness;

/// Successful `/predict` response body.
#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    pub food_type_match: String,
    pub weight_grams: f64,
    pub volumes_ml: Vec<f64>,
    pub density_g_per_ml: f64,
    pub status: String,
    pub image_shape: [u32; 3],
}

impl From<EstimationResult> for EstimateResponse {
    fn from(result: EstimationResult) -> Self {
        Self {
            food_type_match: result.food_type_match,
            weight_grams: result.weight_grams,
            volumes_ml: result.volumes_ml,
            density_g_per_ml: result.density_g_per_ml,
            status: "success".to_string(),
            image_shape: result.image_shape.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&PipelineError> for ErrorResponse {
    fn from(err: &PipelineError) -> Self {
        Self {
            error: err.to_string(),
            details: err.details(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HealthResponse {
    Healthy {
        message: String,
        loaded_at: DateTime<Utc>,
    },
    Unhealthy {
        reason: String,
    },
}

impl From<Readiness> for HealthResponse {
    fn from(readiness: Readiness) -> Self {
        match readiness {
            Readiness::Healthy { since } => HealthResponse::Healthy {
                message: "Food Weight Estimation API is running".to_string(),
                loaded_at: since,
            },
            Readiness::Unhealthy { reason } => HealthResponse::Unhealthy {
                reason: reason.to_string(),
            },
        }
    }
}

/// Extracts the `/predict` fields from a raw body.
///
/// The body must be a non-empty JSON object. Each field is parsed on its own,
/// so an unusable `plate_diameter` (e.g. `1e400`) is dropped instead of
/// failing the request. Field contents are checked by the pipeline.
pub fn parse_payload(body: &[u8]) -> Result<PredictPayload, PipelineError> {
    let fields: HashMap<String, Box<RawValue>> =
        serde_json::from_slice(body).map_err(|e| PipelineError::MalformedPayload {
            reason: e.to_string(),
        })?;

    if fields.is_empty() {
        return Err(PipelineError::MalformedPayload {
            reason: "expected a non-empty JSON object".to_string(),
        });
    }

    let img = match fields.get("img") {
        Some(raw) => Some(serde_json::from_str::<Value>(raw.get()).map_err(|e| {
            ImageError::ByteArray {
                reason: e.to_string(),
            }
        })?),
        None => None,
    };

    let food_type = match fields.get("food_type") {
        Some(raw) => serde_json::from_str::<Option<String>>(raw.get()).map_err(|e| {
            PipelineError::MalformedPayload {
                reason: format!("food_type: {}", e),
            }
        })?,
        None => None,
    };

    let plate_diameter = fields
        .get("plate_diameter")
        .and_then(|raw| serde_json::from_str::<Value>(raw.get()).ok());

    Ok(PredictPayload {
        img,
        food_type,
        plate_diameter,
    })
}

// Axum integration
#[cfg(feature = "http-server")]
pub mod server {
    use super::*;
    use axum::{
        body::Bytes,
        extract::{DefaultBodyLimit, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tower_http::limit::RequestBodyLimitLayer;

    use crate::errors::{EstimationError, StatusClass};
    use crate::handlers::EstimationPipeline;

    pub struct AppState {
        pub pipeline: EstimationPipeline,
        pub estimation_timeout: Duration,
    }

    pub fn status_code(class: StatusClass) -> StatusCode {
        match class {
            StatusClass::Ok => StatusCode::OK,
            StatusClass::BadRequest => StatusCode::BAD_REQUEST,
            StatusClass::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            StatusClass::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn create_router(
        pipeline: EstimationPipeline,
        estimation_timeout: Duration,
        max_body_bytes: usize,
    ) -> Router {
        let state = Arc::new(AppState {
            pipeline,
            estimation_timeout,
        });

        Router::new()
            .route("/", get(health_check))
            .route("/health", get(health_check))
            .route("/predict", post(predict_handler))
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(max_body_bytes))
            .with_state(state)
    }

    async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
        let readiness = state.pipeline.state().readiness();
        let status = match readiness {
            Readiness::Healthy { .. } => StatusCode::OK,
            Readiness::Unhealthy { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(readiness.into()))
    }

    async fn predict_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
        log::debug!("🔔 Predict request received ({} bytes)", body.len());

        match predict(&state, &body).await {
            Ok(result) => (
                status_code(StatusClass::Ok),
                Json(EstimateResponse::from(result)),
            )
                .into_response(),
            Err(e) => {
                let status = status_code(e.status_class());
                match e.status_class() {
                    StatusClass::InternalError => log::error!(
                        "❌ {} failed: {} ({})",
                        e.stage(),
                        e,
                        e.details().unwrap_or_default()
                    ),
                    _ => log::warn!("⚠️ {} rejected: {} ({:?})", e.stage(), e, e),
                }
                (status, Json(ErrorResponse::from(&e))).into_response()
            }
        }
    }

    async fn predict(state: &AppState, body: &[u8]) -> Result<EstimationResult, PipelineError> {
        state.pipeline.ensure_ready()?;
        let payload = parse_payload(body)?;

        tokio::time::timeout(state.estimation_timeout, state.pipeline.estimate(payload))
            .await
            .map_err(|_| {
                PipelineError::EstimationFailed(EstimationError::Timeout(state.estimation_timeout))
            })?
    }
}
