//! TCP listener and accept loop.
//!
//! # Responsibilities
//! - Bind to the configured address with the configured backlog
//! - Accept incoming TCP connections and spawn a handler task for each
//! - Keep accepting through per-connection and transient accept errors
//! - Close the listening socket when the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::ListenerConfig;
use crate::error::ProxyError;
use crate::net::connection::ConnectionTracker;
use crate::net::handler::{ConnectionHandler, ProxyContext};
use crate::observability::metrics;

/// Pause after a failed accept (e.g. out of file descriptors) before retrying.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// A bound listening socket.
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to the configured address. Must be called inside a Tokio runtime.
    pub fn bind(config: &ListenerConfig) -> Result<Self, ProxyError> {
        let bind_error = |source: std::io::Error| ProxyError::Bind {
            address: config.bind_address.clone(),
            source,
        };

        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| bind_error(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let inner = socket.listen(config.backlog).map_err(bind_error)?;
        let local_addr = inner.local_addr().map_err(bind_error)?;

        tracing::info!(
            address = %local_addr,
            backlog = config.backlog,
            "Listener bound"
        );

        Ok(Self { inner, local_addr })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` fires, spawning one task per
    /// connection. In-flight connections are left to finish on their own.
    pub async fn serve(
        self,
        ctx: Arc<ProxyContext>,
        tracker: ConnectionTracker,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(address = %self.local_addr, "Proxy accepting connections");

        loop {
            tokio::select! {
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let guard = tracker.track();
                        metrics::record_connection_accepted();
                        tracing::trace!(connection_id = %guard.id(), peer = %peer, "Connection accepted");

                        let span = tracing::debug_span!("connection", id = %guard.id(), peer = %peer);
                        let handler = ConnectionHandler::new(stream, peer, guard.id(), Arc::clone(&ctx));
                        tokio::spawn(
                            async move {
                                let _guard = guard;
                                handler.run().await;
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Listener received shutdown signal, exiting accept loop");
                    break;
                }
            }
        }

        tracing::info!(
            address = %self.local_addr,
            in_flight = tracker.active_count(),
            "Listener closed"
        );
    }
}
