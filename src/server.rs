use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::LinkResult;
use crate::session::{handle_session, LinkContext};

/// Accepts ground-link connections and runs one task per connection.
///
/// There is no connection cap or admission queue: each accepted socket is
/// spawned immediately. Acceptable for a single trusted flight board; put a
/// bounded pool in front before exposing this to an untrusted network.
pub struct ConnectionAcceptor {
    listener: TcpListener,
    ctx: Arc<LinkContext>,
}

impl ConnectionAcceptor {
    pub async fn bind(cfg: &ServerConfig, ctx: Arc<LinkContext>) -> LinkResult<Self> {
        cfg.validate()?;
        let listener = TcpListener::bind(cfg.listen_addr()?).await?;
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> LinkResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> &Arc<LinkContext> {
        &self.ctx
    }

    /// Accept forever. Per-connection failures never end the loop.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        handle_session(stream, peer, &ctx).await;
                    });
                }
                Err(e) => {
                    tracing::error!("accept error: {}", e);
                    // small delay to avoid tight loop in case of persistent errors
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            }
        }
    }
}
