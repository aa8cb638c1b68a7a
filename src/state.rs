use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::Config;
use crate::services::{
    DensityCatalog, DensitySource, EstimatorKind, ModelArtifacts, ReferenceVolumeEstimator,
    RemoteVolumeEstimator, VolumeEstimator,
};

/// Dependencies shared by every request, built once before the server accepts traffic.
///
/// A missing estimator or catalog leaves the service degraded until restart.
pub struct ServiceState {
    estimator: Option<Arc<dyn VolumeEstimator>>,
    catalog: Option<Arc<DensityCatalog>>,
    loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Healthy { since: DateTime<Utc> },
    Unhealthy { reason: &'static str },
}

impl ServiceState {
    pub fn new(
        estimator: Option<Arc<dyn VolumeEstimator>>,
        catalog: Option<Arc<DensityCatalog>>,
    ) -> Self {
        Self {
            estimator,
            catalog,
            loaded_at: Utc::now(),
        }
    }

    pub fn degraded() -> Self {
        Self::new(None, None)
    }

    /// Loads the catalog and estimator named by `config`.
    ///
    /// Never fails: anything that cannot be loaded is logged and left absent.
    pub async fn load(config: &Config) -> Self {
        let catalog = match load_catalog(&config.density_db_source).await {
            Ok(catalog) => {
                log::info!(
                    "✅ Density database loaded from {} ({} entries)",
                    catalog.origin(),
                    catalog.len()
                );
                Some(Arc::new(catalog))
            }
            Err(e) => {
                log::error!("❌ Error loading density database: {:#}", e);
                None
            }
        };

        let estimator = match load_estimator(config).await {
            Ok(estimator) => {
                log::info!("✅ Volume estimator loaded ({} mode)", estimator.name());
                Some(estimator)
            }
            Err(e) => {
                log::error!("❌ Error loading volume estimator: {:#}", e);
                None
            }
        };

        Self::new(estimator, catalog)
    }

    pub fn is_ready(&self) -> bool {
        self.estimator.is_some() && self.catalog.is_some()
    }

    pub fn readiness(&self) -> Readiness {
        if self.is_ready() {
            Readiness::Healthy {
                since: self.loaded_at,
            }
        } else {
            Readiness::Unhealthy {
                reason: "models not loaded",
            }
        }
    }

    /// Both dependencies, or `None` while degraded.
    pub fn dependencies(&self) -> Option<(&dyn VolumeEstimator, &DensityCatalog)> {
        match (&self.estimator, &self.catalog) {
            (Some(estimator), Some(catalog)) => Some((estimator.as_ref(), catalog.as_ref())),
            _ => None,
        }
    }
}

async fn load_catalog(source: &str) -> anyhow::Result<DensityCatalog> {
    let source = DensitySource::parse(source)?;
    Ok(DensityCatalog::load(&source).await?)
}

async fn load_estimator(config: &Config) -> anyhow::Result<Arc<dyn VolumeEstimator>> {
    match config.estimator {
        EstimatorKind::Reference => {
            log::info!("ℹ️ Using reference volume estimator, model paths are ignored");
            Ok(Arc::new(ReferenceVolumeEstimator))
        }
        EstimatorKind::Remote => {
            let url = config
                .estimator_url
                .as_deref()
                .ok_or_else(|| {
                    anyhow::anyhow!("ESTIMATOR_URL must be set for the remote estimator")
                })?;
            let models = ModelArtifacts {
                depth_model_architecture: config.depth_model_architecture.clone(),
                depth_model_weights: config.depth_model_weights.clone(),
                segmentation_model_weights: config.segmentation_model_weights.clone(),
            };
            let estimator =
                RemoteVolumeEstimator::connect(url, models, config.estimation_timeout()).await?;
            Ok(Arc::new(estimator))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(args: &[&str]) -> Config {
        let mut argv = vec!["food-weight-estimator"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_degraded_state_is_unhealthy() {
        let state = ServiceState::degraded();
        assert!(!state.is_ready());
        assert!(state.dependencies().is_none());
        assert_eq!(
            state.readiness(),
            Readiness::Unhealthy {
                reason: "models not loaded"
            }
        );
    }

    #[test]
    fn test_partial_load_is_unhealthy() {
        let state = ServiceState::new(None, Some(Arc::new(DensityCatalog::builtin())));
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn test_load_reference_with_builtin_catalog() {
        let state = ServiceState::load(&config(&[
            "--estimator",
            "reference",
            "--density-db-source",
            "builtin",
        ]))
        .await;

        assert!(state.is_ready());
        assert!(matches!(state.readiness(), Readiness::Healthy { .. }));
        let (estimator, catalog) = state.dependencies().unwrap();
        assert_eq!(estimator.name(), "reference");
        assert_eq!(catalog.query("rice").density_g_per_ml, 0.75);
    }

    #[tokio::test]
    async fn test_spreadsheet_source_leaves_service_degraded() {
        let state = ServiceState::load(&config(&[
            "--estimator",
            "reference",
            "--density-db-source",
            "models/density_db.xlsx",
        ]))
        .await;

        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn test_remote_estimator_without_url_is_degraded() {
        let mut cfg = config(&["--estimator", "remote", "--density-db-source", "builtin"]);
        cfg.estimator_url = None;
        let state = ServiceState::load(&cfg).await;

        assert!(!state.is_ready());
    }
}
