use anyhow::Result;
use base64::{engine::general_purpose, Engine};
use clap::ValueEnum;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;

use crate::errors::EstimationError;
use crate::models::Image;

/// Camera field of view used when the caller does not supply one.
pub const DEFAULT_FOV_DEGREES: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimationParams {
    pub fov_degrees: f64,
    /// Known plate diameter in metres, if the caller supplied one.
    pub plate_diameter_prior: Option<f64>,
}

impl EstimationParams {
    /// A diameter of zero (or less) means "no prior", not a zero-sized plate.
    pub fn with_plate_diameter(plate_diameter: f64) -> Self {
        Self {
            fov_degrees: DEFAULT_FOV_DEGREES,
            plate_diameter_prior: (plate_diameter > 0.0).then_some(plate_diameter),
        }
    }
}

impl Default for EstimationParams {
    fn default() -> Self {
        Self::with_plate_diameter(0.0)
    }
}

/// Estimates the volume of every food item visible in an image.
///
/// Returned volumes are in cubic metres. Their order carries no identity
/// across calls.
#[async_trait::async_trait]
pub trait VolumeEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn estimate(
        &self,
        image: &Image,
        params: &EstimationParams,
    ) -> Result<Vec<f64>, EstimationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EstimatorKind {
    /// Deterministic stand-in derived from the image size
    Reference,
    /// Depth + segmentation model served by an inference endpoint
    Remote,
}

/// Stand-in estimator for local development and tests.
///
/// For a `W`x`H` image it reports two items of `0.5 * W*H / 1e6` and
/// `0.3 * W*H / 1e6` cubic metres.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceVolumeEstimator;

#[async_trait::async_trait]
impl VolumeEstimator for ReferenceVolumeEstimator {
    fn name(&self) -> &'static str {
        "reference"
    }

    async fn estimate(
        &self,
        image: &Image,
        _params: &EstimationParams,
    ) -> Result<Vec<f64>, EstimationError> {
        let area = image.width() as f64 * image.height() as f64;
        let base_volume = area / 1_000_000.0;
        Ok(vec![base_volume * 0.5, base_volume * 0.3])
    }
}

/// Model artifacts the inference endpoint should run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelArtifacts {
    pub depth_model_architecture: String,
    pub depth_model_weights: String,
    pub segmentation_model_weights: String,
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    img: String,
    fov: f64,
    plate_diameter_prior: Option<f64>,
    models: &'a ModelArtifacts,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    volumes_m3: Vec<f64>,
}

/// Client for a depth + segmentation model running behind an HTTP endpoint.
///
/// The endpoint must answer `GET {url}/health` and `POST {url}/estimate`.
pub struct RemoteVolumeEstimator {
    base_url: String,
    models: ModelArtifacts,
    client: reqwest::Client,
}

impl RemoteVolumeEstimator {
    /// Builds the client and checks the endpoint is reachable.
    pub async fn connect(
        base_url: &str,
        models: ModelArtifacts,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let estimator = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            models,
            client,
        };

        let health_url = estimator.api_url("/health");
        let response = estimator.client.get(&health_url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!(
                "Inference endpoint health check failed: HTTP {}",
                response.status()
            );
        }

        log::info!("✅ Inference endpoint reachable at {}", estimator.base_url);
        Ok(estimator)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait::async_trait]
impl VolumeEstimator for RemoteVolumeEstimator {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn estimate(
        &self,
        image: &Image,
        params: &EstimationParams,
    ) -> Result<Vec<f64>, EstimationError> {
        let mut png = Vec::new();
        image
            .pixels()
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        let request = InferenceRequest {
            img: general_purpose::STANDARD.encode(&png),
            fov: params.fov_degrees,
            plate_diameter_prior: params.plate_diameter_prior,
            models: &self.models,
        };

        log::debug!(
            "📤 Sending {}x{} image to inference endpoint ({} bytes PNG)",
            image.width(),
            image.height(),
            png.len()
        );

        let response = self
            .client
            .post(self.api_url("/estimate"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EstimationError::Endpoint { status, body });
        }

        let parsed: InferenceResponse = response.json().await?;
        for (index, value) in parsed.volumes_m3.iter().enumerate() {
            if !value.is_finite() || *value < 0.0 {
                return Err(EstimationError::InvalidVolume {
                    index,
                    value: *value,
                });
            }
        }

        Ok(parsed.volumes_m3)
    }
}
