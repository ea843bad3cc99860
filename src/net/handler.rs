//! Per-connection handling: parse, gate, connect, relay, close.
//!
//! # Responsibilities
//! - Read the opening chunk and parse its request line
//! - Charge the request to its domain and refuse exhausted domains with a 413
//! - Open the upstream socket and answer CONNECT with 200
//! - Rewrite plain HTTP requests to origin form and forward them
//! - Relay until either side closes or goes idle, then close both sockets

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::config::{ProxyConfig, TimeoutConfig};
use crate::error::ProxyError;
use crate::http::response::{CONNECTION_ESTABLISHED, USAGE_OVER_LIMIT};
use crate::http::PendingRequest;
use crate::net::connection::{ConnectionId, ConnectionState};
use crate::net::relay::{relay, RelayConfig};
use crate::observability::metrics;
use crate::quota::{Admission, DomainKey, QuotaLedger};

/// Shared, read-only inputs every handler needs.
#[derive(Debug, Clone)]
pub struct ProxyContext {
    pub ledger: Arc<QuotaLedger>,
    pub timeouts: TimeoutConfig,
    pub buffer_size: usize,
}

impl ProxyContext {
    pub fn new(ledger: Arc<QuotaLedger>, config: &ProxyConfig) -> Self {
        Self {
            ledger,
            timeouts: config.timeouts.clone(),
            buffer_size: config.listener.buffer_size,
        }
    }

    fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            idle_timeout: self.timeouts.idle(),
            buffer_size: self.buffer_size,
        }
    }
}

/// The client socket and, once connected, its upstream. Closed together.
struct Connection {
    client: TcpStream,
    upstream: Option<TcpStream>,
}

impl Connection {
    async fn close(mut self) {
        let _ = self.client.shutdown().await;
        if let Some(mut upstream) = self.upstream.take() {
            let _ = upstream.shutdown().await;
        }
    }
}

/// Owns one client connection from accept to close.
pub struct ConnectionHandler {
    id: ConnectionId,
    peer: SocketAddr,
    conn: Connection,
    ctx: Arc<ProxyContext>,
    state: ConnectionState,
}

impl ConnectionHandler {
    pub fn new(client: TcpStream, peer: SocketAddr, id: ConnectionId, ctx: Arc<ProxyContext>) -> Self {
        Self {
            id,
            peer,
            conn: Connection { client, upstream: None },
            ctx,
            state: ConnectionState::Accepted,
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(connection_id = %self.id, from = ?self.state, to = ?next, "State transition");
        self.state = next;
    }

    /// Drive the connection to completion. Returns the last state reached
    /// before closing.
    pub async fn run(mut self) -> ConnectionState {
        let result = self.serve().await;
        let last = self.state;

        if let Err(e) = result {
            match &e {
                ProxyError::MalformedRequest(_) => {
                    tracing::debug!(connection_id = %self.id, peer = %self.peer, error = %e, "Dropping malformed request");
                }
                ProxyError::QuotaExceeded(domain) => {
                    tracing::info!(connection_id = %self.id, domain = %domain, "Request refused, usage over limit");
                }
                ProxyError::UpstreamUnreachable { .. } => {
                    metrics::record_upstream_failure();
                    tracing::warn!(connection_id = %self.id, error = %e, "Upstream connect failed");
                }
                ProxyError::Io(_) => {
                    tracing::debug!(connection_id = %self.id, error = %e, "Connection I/O error");
                }
                _ => {
                    tracing::error!(connection_id = %self.id, error = %e, kind = e.kind(), "Connection failed");
                }
            }
        }

        self.transition(ConnectionState::Closed);
        self.conn.close().await;
        tracing::debug!(connection_id = %self.id, last_state = ?last, "Connection closed");
        last
    }

    async fn serve(&mut self) -> Result<(), ProxyError> {
        let mut buf = vec![0u8; self.ctx.buffer_size];
        let read = time::timeout(self.ctx.timeouts.first_read(), self.conn.client.read(&mut buf)).await;
        let n = match read {
            Ok(n) => n?,
            Err(_) => {
                tracing::debug!(connection_id = %self.id, "No request before first-read timeout");
                return Ok(());
            }
        };
        buf.truncate(n);

        let Some(request) = PendingRequest::parse(&buf)? else {
            tracing::trace!(connection_id = %self.id, "Empty request, dropping");
            return Ok(());
        };
        self.transition(ConnectionState::Parsed);

        let key = DomainKey::of(&request.host);
        self.transition(ConnectionState::Resolving);
        tracing::debug!(
            connection_id = %self.id,
            method = %request.method,
            target = %request.raw_target,
            domain = %key,
            "Connection requested"
        );

        if self.ctx.ledger.check_and_charge(&key, buf.len() as f64 / 1024.0) == Admission::Rejected {
            self.transition(ConnectionState::Unauthorized);
            metrics::record_quota_rejection(&key);
            self.conn.client.write_all(USAGE_OVER_LIMIT).await?;
            return Err(ProxyError::QuotaExceeded(key));
        }

        let upstream = match self.connect_upstream(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.transition(ConnectionState::Failed);
                return Err(e);
            }
        };

        if request.is_tunnel {
            self.transition(ConnectionState::Tunneling);
            self.conn.client.write_all(CONNECTION_ESTABLISHED).await?;
        } else {
            self.transition(ConnectionState::Forwarding);
        }

        let upstream = self.conn.upstream.insert(upstream);
        if !request.is_tunnel {
            upstream.write_all(&request.origin_form(&buf)).await?;
        }

        let (outcome, stats) = relay(
            &mut self.conn.client,
            upstream,
            &self.ctx.ledger,
            &key,
            self.ctx.relay_config(),
        )
        .await?;

        tracing::debug!(
            connection_id = %self.id,
            domain = %key,
            outcome = ?outcome,
            sent = stats.sent,
            received = stats.received,
            "Relay finished"
        );
        Ok(())
    }

    async fn connect_upstream(&self, request: &PendingRequest) -> Result<TcpStream, ProxyError> {
        let target = request.authority();
        match time::timeout(self.ctx.timeouts.connect(), TcpStream::connect(&target)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(ProxyError::UpstreamUnreachable { target, source }),
            Err(_) => Err(ProxyError::UpstreamUnreachable {
                target,
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
            }),
        }
    }
}
