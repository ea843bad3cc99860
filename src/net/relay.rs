//! Bidirectional byte relay between client and upstream.
//!
//! Both directions are polled together with `tokio::select!`, so a quiet side
//! never blocks the other. The relay ends when either side reaches EOF or
//! nothing arrives on either side within the idle timeout. Every chunk is
//! charged to the connection's domain; limits are not re-checked here.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time;

use crate::observability::metrics;
use crate::quota::{DomainKey, QuotaLedger};

/// Why a relay finished. Both are normal terminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    PeerClosed,
    IdleTimeout,
}

/// Bytes moved in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Client → upstream.
    pub sent: u64,
    /// Upstream → client.
    pub received: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    pub idle_timeout: Duration,
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Upstream,
    Downstream,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
        }
    }
}

/// Pump bytes between `client` and `upstream` until one closes or both go idle.
pub async fn relay<C, U>(
    client: &mut C,
    upstream: &mut U,
    ledger: &QuotaLedger,
    key: &DomainKey,
    config: RelayConfig,
) -> std::io::Result<(RelayOutcome, RelayStats)>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut upstream_rd, mut upstream_wr) = tokio::io::split(upstream);
    let mut from_client = vec![0u8; config.buffer_size];
    let mut from_upstream = vec![0u8; config.buffer_size];
    let mut stats = RelayStats::default();

    loop {
        let ready = time::timeout(config.idle_timeout, async {
            tokio::select! {
                res = client_rd.read(&mut from_client) => (Direction::Upstream, res),
                res = upstream_rd.read(&mut from_upstream) => (Direction::Downstream, res),
            }
        })
        .await;

        let (direction, n) = match ready {
            Err(_) => return Ok((RelayOutcome::IdleTimeout, stats)),
            Ok((_, Ok(0))) => return Ok((RelayOutcome::PeerClosed, stats)),
            Ok((direction, Ok(n))) => (direction, n),
            Ok((_, Err(e))) => return Err(e),
        };

        match direction {
            Direction::Upstream => {
                upstream_wr.write_all(&from_client[..n]).await?;
                stats.sent += n as u64;
            }
            Direction::Downstream => {
                client_wr.write_all(&from_upstream[..n]).await?;
                stats.received += n as u64;
            }
        }

        ledger.charge(key, n as f64 / 1024.0);
        metrics::record_bytes_relayed(key, direction.label(), n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn config(idle_ms: u64) -> RelayConfig {
        RelayConfig {
            idle_timeout: Duration::from_millis(idle_ms),
            buffer_size: 16,
        }
    }

    #[tokio::test]
    async fn copies_both_ways_and_charges_every_byte() {
        let (mut client, mut client_peer) = duplex(64);
        let (mut upstream, mut upstream_peer) = duplex(64);
        let ledger = QuotaLedger::new();
        let key = DomainKey::of("example.com");

        let relay_task = relay(&mut client_peer, &mut upstream_peer, &ledger, &key, config(1000));
        let drive = async move {
            client.write_all(b"ping from client, longer than one chunk").await.unwrap();
            let mut buf = vec![0u8; 39];
            upstream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping from client, longer than one chunk");

            upstream.write_all(b"pong").await.unwrap();
            let mut buf = [0u8; 4];
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"pong");

            drop(client);
        };

        let (result, ()) = tokio::join!(relay_task, drive);
        let (outcome, stats) = result.unwrap();
        assert_eq!(outcome, RelayOutcome::PeerClosed);
        assert_eq!(stats, RelayStats { sent: 39, received: 4 });
        assert_eq!(ledger.ensure(&key).used_kib, 43.0 / 1024.0);
    }

    #[tokio::test]
    async fn relay_is_not_limited_mid_stream() {
        let (mut client, mut client_peer) = duplex(64);
        let (mut upstream, mut upstream_peer) = duplex(64);
        let ledger = QuotaLedger::new();
        let key = DomainKey::of("example.com");
        ledger.set_limit(&key, 0.001);

        let relay_task = relay(&mut client_peer, &mut upstream_peer, &ledger, &key, config(1000));
        let drive = async move {
            for _ in 0..4 {
                client.write_all(b"0123456789").await.unwrap();
                let mut buf = [0u8; 10];
                upstream.read_exact(&mut buf).await.unwrap();
            }
            drop(upstream);
        };

        let (result, ()) = tokio::join!(relay_task, drive);
        let (outcome, stats) = result.unwrap();
        assert_eq!(outcome, RelayOutcome::PeerClosed);
        assert_eq!(stats.sent, 40);
        let entry = ledger.ensure(&key);
        assert!(entry.is_exhausted());
        assert_eq!(entry.used_kib, 40.0 / 1024.0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_times_out() {
        let (_client, mut client_peer) = duplex(64);
        let (_upstream, mut upstream_peer) = duplex(64);
        let ledger = QuotaLedger::new();
        let key = DomainKey::of("example.com");

        let (outcome, stats) = relay(&mut client_peer, &mut upstream_peer, &ledger, &key, config(15_000))
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::IdleTimeout);
        assert_eq!(stats, RelayStats::default());
    }
}
