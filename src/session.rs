use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::ServerConfig;
use crate::error::LinkResult;
use crate::evaluator::HybridFailureEvaluator;
use crate::history::TelemetryHistory;
use crate::model;
use crate::navigation::{HeuristicNavigator, NavigationInference, ObstacleDetector, StubObstacleDetector};
use crate::types::{ErrorReply, LinkRequest, LinkResponse, SensorSnapshot};

/// Everything a session needs, shared read-only across connections. The
/// telemetry history inside the evaluator is the only mutable piece.
pub struct LinkContext {
    pub evaluator: HybridFailureEvaluator,
    pub navigator: Box<dyn NavigationInference>,
    pub detector: Box<dyn ObstacleDetector>,
    pub buffer_size: usize,
}

impl LinkContext {
    pub fn from_config(cfg: &ServerConfig) -> Self {
        let history = Arc::new(TelemetryHistory::new(cfg.history_capacity));
        let scorer = model::load_scorer(cfg.anomaly_model_path.as_deref());
        Self {
            evaluator: HybridFailureEvaluator::new(history, scorer),
            navigator: load_navigator(cfg),
            detector: Box::new(StubObstacleDetector),
            buffer_size: cfg.buffer_size,
        }
    }
}

#[cfg(feature = "torch")]
fn load_navigator(cfg: &ServerConfig) -> Box<dyn NavigationInference> {
    use crate::navigation::torch::TorchNavigator;

    let Some(path) = cfg.navigation_model_path.as_deref().filter(|p| p.exists()) else {
        return Box::new(HeuristicNavigator);
    };
    match TorchNavigator::load(path, cfg.navigation_meta_path.as_deref()) {
        Ok(nav) => {
            tracing::info!("loaded navigation model {}", path.display());
            Box::new(nav)
        }
        Err(e) => {
            tracing::warn!("navigation model unusable, falling back to gyro damping: {:#}", e);
            Box::new(HeuristicNavigator)
        }
    }
}

#[cfg(not(feature = "torch"))]
fn load_navigator(cfg: &ServerConfig) -> Box<dyn NavigationInference> {
    if let Some(path) = &cfg.navigation_model_path {
        tracing::warn!(
            "navigation model {} ignored: built without the `torch` feature",
            path.display()
        );
    }
    Box::new(HeuristicNavigator)
}

/// Drive one connection: a single read, one reply, then close.
///
/// Requests longer than `buffer_size` are not reassembled; only the first
/// read is parsed. Errors become `{"error": ...}` replies and a failed reply
/// write is only logged.
pub async fn handle_session<S>(mut stream: S, peer: SocketAddr, ctx: &LinkContext)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; ctx.buffer_size];
    let reply = match stream.read(&mut buf).await {
        Ok(0) => {
            tracing::debug!(%peer, "peer closed without a request");
            let _ = stream.shutdown().await;
            return;
        }
        Ok(n) => {
            tracing::debug!(%peer, bytes = n, "request received");
            match dispatch(&buf[..n], ctx) {
                Ok(resp) => encode(&resp),
                Err(e) => {
                    tracing::debug!(%peer, "request rejected: {}", e);
                    encode(&ErrorReply { error: e.to_string() })
                }
            }
        }
        Err(e) => {
            tracing::warn!(%peer, "read failed: {}", e);
            encode(&ErrorReply { error: e.to_string() })
        }
    };

    if let Err(e) = stream.write_all(&reply).await {
        tracing::warn!(%peer, "reply dropped: {}", e);
    }
    let _ = stream.shutdown().await;
}

/// Parse one request and run the collaborators it asks for.
pub fn dispatch(payload: &[u8], ctx: &LinkContext) -> LinkResult<LinkResponse> {
    let req: LinkRequest = serde_json::from_slice(payload)?;
    let mut resp = LinkResponse::default();

    if let Some(frame) = &req.frame {
        resp.obstacle = Some(ctx.detector.infer(frame)?);
    }

    if let Some(sensors) = &req.sensors {
        let snapshot = SensorSnapshot::from_readings(sensors, unix_seconds());
        let anomaly = ctx.evaluator.evaluate(snapshot);
        let corrections = ctx.navigator.infer(sensors, resp.obstacle.as_ref())?;
        tracing::debug!(
            label = %anomaly.label,
            action = %anomaly.recommended_action,
            score = anomaly.score,
            "telemetry evaluated"
        );
        resp.corrections = Some(corrections);
        resp.action = Some(anomaly.recommended_action);
        resp.anomaly = Some(anomaly);
        resp.timestamp = Some(unix_seconds());
    }

    Ok(resp)
}

fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value)
        .unwrap_or_else(|e| format!(r#"{{"error":"failed to encode reply: {e}"}}"#).into_bytes())
}

pub fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
