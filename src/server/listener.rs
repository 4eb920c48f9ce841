use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{Instrument, info};

use crate::config::Config;
use crate::http::connection::Connection;
use crate::server::registry::{ConnectionRegistry, spawn_sweeper};

/// Binds to the configured address and serves until the task is dropped.
pub async fn run(cfg: Arc<Config>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(cfg.bind_addr()).await?;
    info!("Listening on {}", listener.local_addr()?);

    serve(listener, cfg, Arc::new(ConnectionRegistry::new())).await
}

/// Accepts connections on an already bound listener.
///
/// The idle sweeper runs for as long as this future does.
pub async fn serve(
    listener: TcpListener,
    cfg: Arc<Config>,
    registry: Arc<ConnectionRegistry>,
) -> anyhow::Result<()> {
    let sweeper = spawn_sweeper(Arc::clone(&registry));
    let _sweeper = AbortOnDrop(sweeper);

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!("Failed to accept connection: {}", e);
                continue;
            }
        };
        info!("Accepted connection from {}", peer);

        let registration = registry.register(Instant::now());
        let conn = Connection::new(socket, registration, Arc::clone(&cfg));
        let span = tracing::info_span!("conn", %peer);

        tokio::spawn(
            async move {
                if let Err(e) = conn.run().await {
                    tracing::debug!("Connection error: {}", e);
                }
            }
            .instrument(span),
        );
    }
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
