use std::path::Path;
use std::sync::Arc;

use crate::error::ScorerError;
use crate::types::{FeatureVector, FEATURE_ORDER};

/// External anomaly model. Higher scores mean "more normal"; isolation
/// forests return negative values for outliers.
pub trait AnomalyScorer: Send + Sync {
    fn score_samples(&self, features: &FeatureVector) -> Result<f64, ScorerError>;
}

impl<F> AnomalyScorer for F
where
    F: Fn(&FeatureVector) -> Result<f64, ScorerError> + Send + Sync,
{
    fn score_samples(&self, features: &FeatureVector) -> Result<f64, ScorerError> {
        self(features)
    }
}

/// Resolve the configured anomaly model. Every failure here is logged and
/// yields `None`: the evaluator then runs on rules alone.
pub fn load_scorer(path: Option<&Path>) -> Option<Arc<dyn AnomalyScorer>> {
    let Some(path) = path else {
        tracing::info!("no anomaly model configured; using rule cascade only");
        return None;
    };
    if !path.exists() {
        tracing::warn!("anomaly model {} not found; using rule cascade only", path.display());
        return None;
    }
    load_backend(path)
}

#[cfg(feature = "torch")]
fn load_backend(path: &Path) -> Option<Arc<dyn AnomalyScorer>> {
    match torch::TorchScorer::load(path) {
        Ok(scorer) => {
            tracing::info!("loaded anomaly model {}", path.display());
            Some(Arc::new(scorer))
        }
        Err(e) => {
            tracing::warn!("failed to load anomaly model {}: {:#}", path.display(), e);
            None
        }
    }
}

#[cfg(not(feature = "torch"))]
fn load_backend(path: &Path) -> Option<Arc<dyn AnomalyScorer>> {
    tracing::warn!(
        "anomaly model {} ignored: built without the `torch` feature",
        path.display()
    );
    None
}

/// (non-zero count, mean, std) of a feature vector, for the `LOG_PRED` dump.
pub fn feature_stats(v: &FeatureVector) -> (usize, f64, f64) {
    let xs = v.as_slice();
    let nz = xs.iter().filter(|x| **x != 0.0).count();
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let std = (xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / xs.len() as f64).sqrt();
    (nz, mean, std)
}

pub fn log_features(v: &FeatureVector) {
    let (nz, mean, std) = feature_stats(v);
    let sample: Vec<String> = FEATURE_ORDER
        .iter()
        .zip(v.as_slice())
        .take(6)
        .map(|(name, x)| format!("{}={:.3}", name, x))
        .collect();
    tracing::info!(
        "features in_dim={} nonzero={} mean={:.3} std={:.3} sample=[{}]",
        FEATURE_ORDER.len(), nz, mean, std, sample.join(", ")
    );
}

#[cfg(feature = "torch")]
pub mod torch {
    use anyhow::{bail, Context, Result};
    use std::path::Path;
    use tch::{kind::Kind, CModule, Device, Tensor};

    use super::AnomalyScorer;
    use crate::error::ScorerError;
    use crate::types::{FeatureVector, FEATURE_ORDER};

    /// Isolation-forest export loaded as a TorchScript module.
    pub struct TorchScorer {
        model: CModule,
        device: Device,
    }

    impl TorchScorer {
        pub fn load(path: &Path) -> Result<Self> {
            let device = Device::Cpu;
            let model = CModule::load_on_device(path, device)
                .with_context(|| format!("failed to load TorchScript {}", path.display()))?;

            // Probe with a dummy row; expect at least one scalar back
            let dummy = Tensor::zeros([1, FEATURE_ORDER.len() as i64], (Kind::Float, device));
            let t = model.forward_ts(&[dummy])?;
            if t.numel() == 0 {
                bail!("anomaly model returned an empty tensor: {:?}", t.size());
            }
            Ok(Self { model, device })
        }
    }

    impl AnomalyScorer for TorchScorer {
        fn score_samples(&self, features: &FeatureVector) -> Result<f64, ScorerError> {
            let input = Tensor::from_slice(&features.to_f32())
                .reshape([1, FEATURE_ORDER.len() as i64])
                .to_device(self.device);
            let out = self
                .model
                .forward_ts(&[input])
                .map_err(|e| ScorerError::Inference(e.to_string()))?;
            let flat = out.flatten(0, -1);
            if flat.numel() == 0 {
                return Err(ScorerError::Malformed(format!("empty output {:?}", out.size())));
            }
            flat.f_double_value(&[0])
                .map_err(|e| ScorerError::Malformed(e.to_string()))
        }
    }
}
