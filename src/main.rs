use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cubesat_ai_server::{
    client, stub, types::LinkRequest, ConnectionAcceptor, LinkContext, ServerConfig,
};

#[derive(Parser)]
#[command(name = "cubesat_ai_server")]
#[command(about = "CubeSat telemetry link: fault verdicts and attitude corrections over TCP")]
#[command(version)]
struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, env = "CUBESAT_AI_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long, env = "CUBESAT_AI_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the link server
    Serve {
        /// JSON config file; flags below override it
        #[arg(short, long, env = "CUBESAT_AI_CONFIG")]
        config: Option<String>,
        #[arg(long, env = "CUBESAT_AI_HOST")]
        host: Option<String>,
        #[arg(long, env = "CUBESAT_AI_PORT")]
        port: Option<u16>,
        /// Single-read request limit (bytes)
        #[arg(long, env = "CUBESAT_AI_BUFFER")]
        buffer_size: Option<usize>,
        /// Telemetry history depth
        #[arg(long, env = "CUBESAT_AI_HISTORY")]
        history: Option<usize>,
        /// TorchScript isolation-forest export
        #[arg(long, env = "CUBESAT_AI_ANOMALY_MODEL")]
        anomaly_model: Option<PathBuf>,
        /// TorchScript navigation model
        #[arg(long, env = "CUBESAT_AI_NAV_MODEL")]
        nav_model: Option<PathBuf>,
        /// Navigation normalisation meta (mean/std/seq_len)
        #[arg(long, env = "CUBESAT_AI_NAV_META")]
        nav_meta: Option<PathBuf>,
    },
    /// Stream stub telemetry to a running server
    Client {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 5050)]
        port: u16,
        /// Seconds between requests
        #[arg(long, default_value_t = 0.2)]
        interval: f64,
        /// Stop after this many requests (runs forever if absent)
        #[arg(long)]
        count: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());
    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    match cli.command {
        Command::Serve {
            config,
            host,
            port,
            buffer_size,
            history,
            anomaly_model,
            nav_model,
            nav_meta,
        } => {
            let mut cfg = match config.as_deref() {
                Some(path) => ServerConfig::load(path)?,
                None => ServerConfig::default(),
            };
            if let Some(h) = host {
                cfg.host = h;
            }
            if let Some(p) = port {
                cfg.port = p;
            }
            if let Some(b) = buffer_size {
                cfg.buffer_size = b;
            }
            if let Some(n) = history {
                cfg.history_capacity = n;
            }
            cfg.anomaly_model_path = anomaly_model.or(cfg.anomaly_model_path);
            cfg.navigation_model_path = nav_model.or(cfg.navigation_model_path);
            cfg.navigation_meta_path = nav_meta.or(cfg.navigation_meta_path);
            serve(cfg).await
        }
        Command::Client { host, port, interval, count } => {
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .with_context(|| format!("invalid server address {}:{}", host, port))?;
            run_client(addr, Duration::from_secs_f64(interval.max(0.0)), count).await
        }
    }
}

async fn serve(cfg: ServerConfig) -> anyhow::Result<()> {
    cfg.validate()?;
    let ctx = Arc::new(LinkContext::from_config(&cfg));
    let acceptor = ConnectionAcceptor::bind(&cfg, ctx).await?;
    tracing::info!(
        "AI server listening on {} (history={}, buffer={}B, scorer={})",
        acceptor.local_addr()?,
        cfg.history_capacity,
        cfg.buffer_size,
        acceptor.context().evaluator.has_scorer()
    );

    tokio::select! {
        _ = acceptor.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down server");
        }
    }
    Ok(())
}

async fn run_client(addr: SocketAddr, interval: Duration, count: Option<u64>) -> anyhow::Result<()> {
    let mut sent = 0u64;
    loop {
        if count.is_some_and(|c| sent >= c) {
            return Ok(());
        }
        let req = LinkRequest {
            sensors: Some(stub::read_all_sensors(&mut rand::thread_rng())),
            // no camera on the bench; an empty frame still exercises detection
            frame: Some(STANDARD.encode(b"")),
        };
        match client::send_and_receive(addr, &req, client::DEFAULT_TIMEOUT).await {
            Ok(reply) => tracing::info!("server response: {}", reply),
            Err(e) => tracing::warn!("comm error: {:#}", e),
        }
        sent += 1;
        tokio::time::sleep(interval).await;
    }
}
