use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::LinkResult;
use crate::types::{Corrections, ObstacleReport, SensorReadings};

/// Obstacles closer than this (m) add a fixed yaw avoidance term.
pub const AVOIDANCE_RANGE_M: f64 = 10.0;
pub const AVOIDANCE_YAW: f64 = 0.5;

/// Steering correction source.
pub trait NavigationInference: Send + Sync {
    fn infer(
        &self,
        sensors: &SensorReadings,
        obstacle: Option<&ObstacleReport>,
    ) -> LinkResult<Corrections>;
}

/// Frame-based obstacle detection. Input is the base64 frame exactly as
/// received on the wire.
pub trait ObstacleDetector: Send + Sync {
    fn infer(&self, frame_b64: &str) -> LinkResult<ObstacleReport>;
}

/// Gyro-damping fallback used when no navigation model is loaded.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicNavigator;

impl NavigationInference for HeuristicNavigator {
    fn infer(
        &self,
        sensors: &SensorReadings,
        obstacle: Option<&ObstacleReport>,
    ) -> LinkResult<Corrections> {
        let gyro = sensors.gyro;
        let mut c = Corrections {
            roll: -0.1 * gyro[0],
            pitch: -0.1 * gyro[1],
            yaw: -0.05 * gyro[2],
        };
        if obstacle.is_some_and(|o| o.distance_m < AVOIDANCE_RANGE_M) {
            c.yaw += AVOIDANCE_YAW;
        }
        Ok(c)
    }
}

/// Placeholder detector: always reports debris at 20 m dead ahead. The
/// frame is only inspected for logging; an undecodable frame never fails
/// the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubObstacleDetector;

impl ObstacleDetector for StubObstacleDetector {
    fn infer(&self, frame_b64: &str) -> LinkResult<ObstacleReport> {
        match STANDARD.decode(frame_b64) {
            Ok(bytes) => tracing::debug!(bytes = bytes.len(), "frame received"),
            Err(e) => tracing::debug!("frame is not valid base64: {}", e),
        }
        Ok(ObstacleReport {
            object: "debris".to_string(),
            distance_m: 20.0,
            angle_deg: 0.0,
        })
    }
}

#[cfg(feature = "torch")]
pub mod torch {
    use anyhow::{bail, Context, Result};
    use serde::Deserialize;
    use std::{fs, path::Path};
    use tch::{kind::Kind, CModule, Device, Tensor};

    use super::NavigationInference;
    use crate::error::{LinkError, LinkResult};
    use crate::types::{Corrections, ObstacleReport, SensorReadings};

    const IN_DIM: usize = 14;
    const DEFAULT_SEQ_LEN: usize = 10;

    #[derive(Deserialize)]
    struct NormMeta {
        mean: Vec<f32>,
        std: Vec<f32>,
        seq_len: Option<usize>,
    }

    /// Sequence model over `[acc, gyro, mag, sun, temp, press]`, fed the
    /// current sample tiled across the whole window.
    pub struct TorchNavigator {
        model: CModule,
        device: Device,
        mean: Vec<f32>,
        std: Vec<f32>,
        seq_len: usize,
    }

    impl TorchNavigator {
        pub fn load(model_path: &Path, meta_path: Option<&Path>) -> Result<Self> {
            let device = Device::Cpu;
            let model = CModule::load_on_device(model_path, device)
                .with_context(|| format!("failed to load TorchScript {}", model_path.display()))?;

            let (mean, std, seq_len) = match meta_path.filter(|p| p.exists()) {
                Some(p) => {
                    let txt = fs::read_to_string(p)
                        .with_context(|| format!("failed to read meta at {}", p.display()))?;
                    let meta: NormMeta =
                        serde_json::from_str(&txt).with_context(|| "failed to parse nav meta")?;
                    if meta.mean.len() != IN_DIM || meta.std.len() != IN_DIM {
                        bail!(
                            "nav meta expects {} features, got mean={} std={}",
                            IN_DIM,
                            meta.mean.len(),
                            meta.std.len()
                        );
                    }
                    (meta.mean, meta.std, meta.seq_len.unwrap_or(DEFAULT_SEQ_LEN))
                }
                None => (vec![0.0; IN_DIM], vec![1.0; IN_DIM], DEFAULT_SEQ_LEN),
            };

            Ok(Self { model, device, mean, std, seq_len })
        }

        fn window(&self, s: &SensorReadings) -> Vec<f32> {
            let mut x = Vec::with_capacity(IN_DIM);
            for v in [s.acc, s.gyro, s.mag, s.sun] {
                x.extend(v.iter().map(|f| *f as f32));
            }
            x.push(s.temp.unwrap_or(0.0) as f32);
            x.push(s.press.unwrap_or(0.0) as f32);

            let mut out = Vec::with_capacity(self.seq_len * IN_DIM);
            for _ in 0..self.seq_len {
                for (i, v) in x.iter().enumerate() {
                    out.push((v - self.mean[i]) / (self.std[i] + 1e-9));
                }
            }
            out
        }
    }

    impl NavigationInference for TorchNavigator {
        fn infer(
            &self,
            sensors: &SensorReadings,
            _obstacle: Option<&ObstacleReport>,
        ) -> LinkResult<Corrections> {
            let input = Tensor::from_slice(&self.window(sensors))
                .reshape([1, self.seq_len as i64, IN_DIM as i64])
                .to_kind(Kind::Float)
                .to_device(self.device);
            let out = self
                .model
                .forward_ts(&[input])
                .map_err(|e| LinkError::Collaborator(e.to_string()))?
                .flatten(0, -1);
            if out.numel() < 3 {
                return Err(LinkError::Collaborator(format!(
                    "navigation model returned {} values, expected 3",
                    out.numel()
                )));
            }
            let at = |i: i64| {
                out.f_double_value(&[i])
                    .map_err(|e| LinkError::Collaborator(e.to_string()))
            };
            Ok(Corrections { roll: at(0)?, pitch: at(1)?, yaw: at(2)? })
        }
    }
}
