//! # Ingest Server
//!
//! Accepts sensor connections and runs one handler task per client.
//!
//! ```text
//!   TcpListener ──accept──▶ spawn handle_connection ──▶ JoinSet
//!        ▲                                                 │
//!        └──────────── reap finished handlers ◀────────────┘
//! ```
//!
//! Handlers share an [`IngestContext`] behind an `Arc`. The supervisor owns
//! every handler task: on shutdown it stops accepting, aborts the live
//! connections and waits for them before returning, so nothing outlives
//! [`IngestServer::run_until`].

pub mod connection;
pub mod context;

pub use connection::{
    handle_connection, process_frame, AcceptedReading, ConnectionState, ConnectionSummary,
};
pub use context::IngestContext;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};

use crate::config::Config;

pub struct IngestServer {
    listener: TcpListener,
    ctx: Arc<IngestContext>,
    connections: JoinSet<ConnectionSummary>,
}

impl IngestServer {
    /// Bind the listener. Failing to bind is fatal for the caller.
    pub async fn bind(addr: &str, ctx: IngestContext) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        Ok(Self {
            listener,
            ctx: Arc::new(ctx),
            connections: JoinSet::new(),
        })
    }

    /// Build the context from `config` and bind to `bind_override` or the
    /// configured address.
    pub async fn from_config(config: &Config, bind_override: Option<&str>) -> Result<Self> {
        let ctx = IngestContext::from_config(config)?;
        let addr = bind_override
            .map(str::to_string)
            .unwrap_or_else(|| config.server.bind_addr());
        Self::bind(&addr, ctx).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> Arc<IngestContext> {
        Arc::clone(&self.ctx)
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal");
        })
        .await
    }

    /// Serve until `shutdown` completes.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local = self.local_addr()?;
        info!("Server listening on {}", local);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("Connected by {}", peer);
                        self.ctx.metrics().inc_connections_opened();
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("set_nodelay failed for {}: {}", peer, e);
                        }
                        let ctx = Arc::clone(&self.ctx);
                        self.connections.spawn(handle_connection(stream, peer, ctx));
                    }
                    // Per-accept failures (e.g. EMFILE) do not stop the server.
                    Err(e) => warn!("Accept failed: {}", e),
                },

                Some(joined) = self.connections.join_next() => self.reap(joined),
            }
        }

        let live = self.connections.len();
        if live > 0 {
            info!("Closing {} active connection(s)", live);
        }
        self.connections.abort_all();
        while let Some(joined) = self.connections.join_next().await {
            self.reap(joined);
        }

        info!("Server stopped: {}", self.ctx.metrics().snapshot());
        Ok(())
    }

    fn reap(&self, joined: Result<ConnectionSummary, JoinError>) {
        match joined {
            Ok(summary) => debug!(
                "Handler for {} finished ({} accepted, {} rejected)",
                summary.peer, summary.accepted, summary.rejected
            ),
            // Aborted handlers never reach their own close bookkeeping.
            Err(e) if e.is_cancelled() => self.ctx.metrics().inc_connections_closed(),
            Err(e) => {
                self.ctx.metrics().inc_connections_closed();
                error!("Connection handler panicked: {}", e);
            }
        }
    }
}
