use std::sync::Arc;

use crate::error::ScorerError;
use crate::history::TelemetryHistory;
use crate::model::{self, AnomalyScorer};
use crate::types::{FaultLabel, FeatureVector, RecommendedAction, SensorSnapshot, Verdict};

// Rule thresholds
const SOC_FLOOR_PCT: f64 = 25.0;
const BATTERY_V_FLOOR: f64 = 6.8;
const THERMAL_RISE_C: f64 = 50.0;
const HYBRID_CURRENT_A: f64 = 0.6;
const HYBRID_TEMP_C: f64 = 45.0;
const SURGE_DV: f64 = -0.15;
const SURGE_DBUS: f64 = 0.2;
const OCCLUSION_MPPT_W: f64 = 1.5;
const OCCLUSION_PANEL_V: f64 = 6.5;

const MODEL_FLAG_SEVERITY: f64 = 0.6;
const BASE_CONFIDENCE: f64 = 0.5;

/// Fuses the optional anomaly scorer with the deterministic rule cascade.
///
/// Severity is a high-water mark: each stage may only raise it. Labels and
/// actions follow the fixed cascade order below, in which the hybrid,
/// bus-surge and occlusion rules overwrite whatever an earlier rule chose.
pub struct HybridFailureEvaluator {
    history: Arc<TelemetryHistory>,
    scorer: Option<Arc<dyn AnomalyScorer>>,
    log_features: bool,
}

/// Running state of one pass through the cascade.
#[derive(Debug, Clone, Copy)]
struct Assessment {
    severity: f64,
    confidence: f64,
    label: FaultLabel,
    action: RecommendedAction,
}

impl Assessment {
    fn raise(&mut self, floor: f64) {
        self.severity = self.severity.max(floor);
    }
}

impl HybridFailureEvaluator {
    pub fn new(history: Arc<TelemetryHistory>, scorer: Option<Arc<dyn AnomalyScorer>>) -> Self {
        Self {
            history,
            scorer,
            log_features: std::env::var("LOG_PRED").ok().as_deref() == Some("1"),
        }
    }

    pub fn history(&self) -> &Arc<TelemetryHistory> {
        &self.history
    }

    pub fn has_scorer(&self) -> bool {
        self.scorer.is_some()
    }

    pub fn evaluate(&self, snapshot: SensorSnapshot) -> Verdict {
        // Append first, and take the delta pair from that same append.
        let (latest, previous) = self.history.append_and_window(snapshot);

        let features = FeatureVector::from_snapshot(&snapshot);
        if self.log_features {
            model::log_features(&features);
        }

        let mut a = Assessment {
            severity: 0.0,
            confidence: BASE_CONFIDENCE,
            label: FaultLabel::Nominal,
            action: RecommendedAction::None,
        };

        if let Some(scorer) = &self.scorer {
            match score(scorer.as_ref(), &features) {
                Ok(raw) => {
                    a.severity = severity_from_score(raw);
                    a.confidence = 0.6 + 0.4 * a.severity;
                    if a.severity > MODEL_FLAG_SEVERITY {
                        a.label = FaultLabel::ModelFlagged;
                    }
                }
                Err(e) => {
                    tracing::warn!("anomaly scorer failed, using rules only: {}", e);
                    a.severity = 0.0;
                }
            }
        }

        apply_rules(&mut a, &latest, &previous);

        let confidence = (a.confidence.max(0.55 + a.severity / 3.0)).min(1.0);
        Verdict {
            score: round3(a.severity.clamp(0.0, 1.0)),
            label: a.label,
            confidence: round3(confidence.clamp(0.0, 1.0)),
            recommended_action: a.action,
        }
    }
}

fn score(scorer: &dyn AnomalyScorer, features: &FeatureVector) -> Result<f64, ScorerError> {
    let raw = scorer.score_samples(features)?;
    if !raw.is_finite() {
        return Err(ScorerError::Malformed(format!("non-finite score {raw}")));
    }
    Ok(raw)
}

/// Map an isolation-forest score (higher = more normal) into [0, 1].
pub fn severity_from_score(raw: f64) -> f64 {
    (1.0 - (raw + 0.5)).clamp(0.0, 1.0)
}

fn apply_rules(a: &mut Assessment, latest: &SensorSnapshot, previous: &SensorSnapshot) {
    let dv = latest.battery_voltage - previous.battery_voltage;
    let dbus = latest.bus_current - previous.bus_current;

    if latest.battery_soc < SOC_FLOOR_PCT || latest.battery_voltage < BATTERY_V_FLOOR {
        a.raise(0.75);
        a.label = FaultLabel::DeepDischarge;
        a.action = RecommendedAction::ShedNoncritical;
    }
    if latest.board_temp > THERMAL_RISE_C {
        a.raise(0.7);
        a.label = FaultLabel::ThermalRise;
        if a.action == RecommendedAction::None {
            a.action = RecommendedAction::BalanceThermal;
        }
    }
    // thermal + power runaway
    if latest.battery_current > HYBRID_CURRENT_A && latest.board_temp > HYBRID_TEMP_C {
        a.raise(0.85);
        a.label = FaultLabel::ThermalPowerHybrid;
        a.action = RecommendedAction::SafeModeAttitude;
    }
    if dv < SURGE_DV && dbus > SURGE_DBUS {
        a.raise(0.8);
        a.label = FaultLabel::PowerBusSurge;
        a.action = RecommendedAction::ShedNoncritical;
    }
    if latest.mppt_power < OCCLUSION_MPPT_W && latest.panel_voltage < OCCLUSION_PANEL_V {
        a.raise(0.65);
        a.label = FaultLabel::SolarOcclusion;
        a.action = RecommendedAction::BoostMppt;
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
