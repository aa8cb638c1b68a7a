use clap::Parser;
use std::time::Duration;

use crate::services::estimator::EstimatorKind;

/// Food weight estimation API.
///
/// Every flag can also be set through its environment variable (or a `.env` file).
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Path to depth model architecture (.json)
    #[arg(long, env = "DEPTH_MODEL_ARCHITECTURE", default_value = "models/architecture.json")]
    pub depth_model_architecture: String,

    /// Path to depth model weights (.h5)
    #[arg(long, env = "DEPTH_MODEL_WEIGHTS", default_value = "models/depth_weights.h5")]
    pub depth_model_weights: String,

    /// Path to segmentation model weights (.h5)
    #[arg(
        long,
        env = "SEGMENTATION_MODEL_WEIGHTS",
        default_value = "models/segmentation_weights.h5"
    )]
    pub segmentation_model_weights: String,

    /// Food density database: `builtin`, a .json/.csv file, a CSV URL or a Google Sheets id
    #[arg(long, env = "DENSITY_DB_SOURCE", default_value = "builtin")]
    pub density_db_source: String,

    #[arg(long, env = "ESTIMATOR", value_enum, default_value_t = EstimatorKind::Reference)]
    pub estimator: EstimatorKind,

    /// Base URL of the inference endpoint used by the remote estimator
    #[arg(long, env = "ESTIMATOR_URL")]
    pub estimator_url: Option<String>,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "ESTIMATION_TIMEOUT_SECS", default_value_t = 30)]
    pub estimation_timeout_secs: u64,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = 16 * 1024 * 1024)]
    pub max_body_bytes: usize,
}

impl Config {
    pub fn estimation_timeout(&self) -> Duration {
        Duration::from_secs(self.estimation_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
