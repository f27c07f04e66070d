//! CubeSat AI ground link: receives board telemetry over TCP and answers
//! each request with a fault verdict, one recommended action, and attitude
//! corrections.

pub mod client;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod history;
pub mod model;
pub mod navigation;
pub mod server;
pub mod session;
pub mod stub;
pub mod types;

pub use config::ServerConfig;
pub use error::{LinkError, LinkResult, ScorerError};
pub use evaluator::HybridFailureEvaluator;
pub use history::TelemetryHistory;
pub use model::AnomalyScorer;
pub use server::ConnectionAcceptor;
pub use session::LinkContext;
pub use types::{FaultLabel, FeatureVector, RecommendedAction, SensorSnapshot, Verdict};
