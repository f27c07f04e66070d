use serde::{Deserialize, Serialize};
use std::fmt;

/// Scorer input schema. The isolation forest was trained on exactly this
/// order; changing it requires retraining the model.
pub const FEATURE_ORDER: [&str; 9] = [
    "panel_voltage",
    "battery_voltage",
    "panel_current",
    "battery_current",
    "mppt_power",
    "battery_soc",
    "bus_current",
    "board_temp",
    "mppt_duty",
];

// ---------- Wire-level telemetry ----------

/// Telemetry block as sent by the flight board. Every field is optional;
/// missing scalars read as 0.0 and missing vectors as `[0, 0, 0]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorReadings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel_voltage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_voltage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel_current: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_current: Option<f64>, // negative = charging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mppt_power: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_soc: Option<f64>, // percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_current: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mppt_duty: Option<f64>,

    // navigation-only pass-through
    pub acc: [f64; 3],
    pub gyro: [f64; 3],
    pub mag: [f64; 3],
    pub sun: [f64; 3],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>, // ambient, also the board_temp fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub press: Option<f64>,
}

/// One timestamped power/thermal sample as retained by the history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub timestamp: f64, // seconds since UNIX epoch
    pub panel_voltage: f64,
    pub battery_voltage: f64,
    pub panel_current: f64,
    pub battery_current: f64,
    pub mppt_power: f64,
    pub battery_soc: f64,
    pub bus_current: f64,
    pub board_temp: f64,
    pub mppt_duty: f64,
    /// `board_temp` was absent and filled from the ambient `temp`. The rules
    /// use the filled value; the scorer still sees 0.0 for that slot.
    #[serde(default)]
    pub board_temp_from_ambient: bool,
}

impl SensorSnapshot {
    pub fn from_readings(r: &SensorReadings, timestamp: f64) -> Self {
        Self {
            timestamp,
            panel_voltage: r.panel_voltage.unwrap_or(0.0),
            battery_voltage: r.battery_voltage.unwrap_or(0.0),
            panel_current: r.panel_current.unwrap_or(0.0),
            battery_current: r.battery_current.unwrap_or(0.0),
            mppt_power: r.mppt_power.unwrap_or(0.0),
            battery_soc: r.battery_soc.unwrap_or(0.0),
            bus_current: r.bus_current.unwrap_or(0.0),
            board_temp: r.board_temp.or(r.temp).unwrap_or(0.0),
            mppt_duty: r.mppt_duty.unwrap_or(0.0),
            board_temp_from_ambient: r.board_temp.is_none() && r.temp.is_some(),
        }
    }
}

/// Fixed-order scorer input, see [`FEATURE_ORDER`]. Values are taken as
/// reported: no ambient fallback for `board_temp`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; 9]);

impl FeatureVector {
    pub fn from_snapshot(s: &SensorSnapshot) -> Self {
        Self([
            s.panel_voltage,
            s.battery_voltage,
            s.panel_current,
            s.battery_current,
            s.mppt_power,
            s.battery_soc,
            s.bus_current,
            if s.board_temp_from_ambient { 0.0 } else { s.board_temp },
            s.mppt_duty,
        ])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.0.iter().map(|x| *x as f32).collect()
    }
}

// ---------- Verdict ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultLabel {
    #[default]
    Nominal,
    ModelFlagged,
    DeepDischarge,
    ThermalRise,
    ThermalPowerHybrid,
    PowerBusSurge,
    SolarOcclusion,
}

impl FaultLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultLabel::Nominal => "nominal",
            FaultLabel::ModelFlagged => "model_flagged",
            FaultLabel::DeepDischarge => "deep_discharge",
            FaultLabel::ThermalRise => "thermal_rise",
            FaultLabel::ThermalPowerHybrid => "thermal_power_hybrid",
            FaultLabel::PowerBusSurge => "power_bus_surge",
            FaultLabel::SolarOcclusion => "solar_occlusion",
        }
    }
}

impl fmt::Display for FaultLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    #[default]
    None,
    ShedNoncritical,
    BalanceThermal,
    SafeModeAttitude,
    BoostMppt,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::None => "none",
            RecommendedAction::ShedNoncritical => "shed_noncritical",
            RecommendedAction::BalanceThermal => "balance_thermal",
            RecommendedAction::SafeModeAttitude => "safe_mode_attitude",
            RecommendedAction::BoostMppt => "boost_mppt",
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one hybrid evaluation. `score` is the fused severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub score: f64,
    pub label: FaultLabel,
    pub confidence: f64,
    pub recommended_action: RecommendedAction,
}

// ---------- Collaborator outputs ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleReport {
    pub object: String,
    pub distance_m: f64,
    pub angle_deg: f64,
}

/// Attitude corrections in the body frame (rad).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Corrections {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

// ---------- Request/Response ----------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensors: Option<SensorReadings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>, // base64 image bytes
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obstacle: Option<ObstacleReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrections: Option<Corrections>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<RecommendedAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_zero() {
        let r: SensorReadings = serde_json::from_str(r#"{"battery_soc": 55.0}"#).unwrap();
        let s = SensorSnapshot::from_readings(&r, 1.0);
        assert_eq!(s.battery_soc, 55.0);
        assert_eq!(s.battery_voltage, 0.0);
        assert_eq!(s.mppt_duty, 0.0);
        assert_eq!(r.gyro, [0.0; 3]);
    }

    #[test]
    fn ambient_fallback_reaches_rules_but_not_features() {
        let r: SensorReadings = serde_json::from_str(r#"{"temp": 31.5}"#).unwrap();
        let s = SensorSnapshot::from_readings(&r, 0.0);
        assert_eq!(s.board_temp, 31.5);
        assert_eq!(FeatureVector::from_snapshot(&s).as_slice()[7], 0.0);

        let r: SensorReadings =
            serde_json::from_str(r#"{"temp": 31.5, "board_temp": 40.0}"#).unwrap();
        let s = SensorSnapshot::from_readings(&r, 0.0);
        assert_eq!(s.board_temp, 40.0);
        assert_eq!(FeatureVector::from_snapshot(&s).as_slice()[7], 40.0);

        let s = SensorSnapshot::from_readings(&SensorReadings::default(), 0.0);
        assert_eq!(s.board_temp, 0.0);
        assert!(!s.board_temp_from_ambient);
    }

    #[test]
    fn short_vector_is_rejected() {
        let err = serde_json::from_str::<SensorReadings>(r#"{"gyro": [0.1, 0.2]}"#);
        assert!(err.is_err());
    }

    #[test]
    fn feature_vector_follows_schema_order() {
        let s = SensorSnapshot {
            timestamp: 0.0,
            panel_voltage: 1.0,
            battery_voltage: 2.0,
            panel_current: 3.0,
            battery_current: 4.0,
            mppt_power: 5.0,
            battery_soc: 6.0,
            bus_current: 7.0,
            board_temp: 8.0,
            mppt_duty: 9.0,
            board_temp_from_ambient: false,
        };
        let v = FeatureVector::from_snapshot(&s);
        assert_eq!(v.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(FEATURE_ORDER[7], "board_temp");
    }

    #[test]
    fn labels_serialize_snake_case() {
        let v = Verdict {
            score: 0.85,
            label: FaultLabel::ThermalPowerHybrid,
            confidence: 0.9,
            recommended_action: RecommendedAction::SafeModeAttitude,
        };
        let json = serde_json::to_value(v).unwrap();
        assert_eq!(json["label"], "thermal_power_hybrid");
        assert_eq!(json["recommended_action"], "safe_mode_attitude");
        assert_eq!(FaultLabel::PowerBusSurge.to_string(), "power_bus_surge");
    }

    #[test]
    fn empty_response_serializes_to_empty_object() {
        let body = serde_json::to_string(&LinkResponse::default()).unwrap();
        assert_eq!(body, "{}");
    }
}
