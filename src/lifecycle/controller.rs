//! The proxy's control surface: start, stop, add, usage.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionTracker, Listener, ProxyContext};
use crate::quota::{DailyReset, DomainKey, QuotaLedger, UsageRecord};

const KIB_PER_MB: f64 = 1024.0;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("proxy is already running on {0}")]
    AlreadyRunning(SocketAddr),

    #[error("proxy is not running")]
    NotRunning,

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Everything owned by one listener run.
struct RunningProxy {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    accept_loop: JoinHandle<()>,
    reset: DailyReset,
}

/// Owns the quota ledger and at most one running listener.
pub struct ProxyController {
    config: ProxyConfig,
    ledger: Arc<QuotaLedger>,
    tracker: ConnectionTracker,
    running: Option<RunningProxy>,
}

impl ProxyController {
    /// Create a stopped controller, installing any limits from the config.
    pub fn new(config: ProxyConfig, ledger: Arc<QuotaLedger>) -> Self {
        for (domain, limit_mb) in &config.quotas.limits_mb {
            ledger.set_limit(&DomainKey::of(domain), *limit_mb as f64 * KIB_PER_MB);
        }
        Self {
            config,
            ledger,
            tracker: ConnectionTracker::new(),
            running: None,
        }
    }

    pub fn ledger(&self) -> &Arc<QuotaLedger> {
        &self.ledger
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Bind the listener and start accepting; also schedules the daily reset.
    pub fn start(&mut self) -> Result<SocketAddr, ControlError> {
        if let Some(running) = &self.running {
            return Err(ControlError::AlreadyRunning(running.local_addr));
        }

        let listener = Listener::bind(&self.config.listener)?;
        let local_addr = listener.local_addr();
        let shutdown = Shutdown::new();
        let ctx = Arc::new(ProxyContext::new(Arc::clone(&self.ledger), &self.config));

        let accept_loop = tokio::spawn(listener.serve(ctx, self.tracker.clone(), shutdown.subscribe()));
        let reset = DailyReset::spawn(Arc::clone(&self.ledger), shutdown.subscribe());

        tracing::info!(address = %local_addr, "Proxy started");
        self.running = Some(RunningProxy {
            local_addr,
            shutdown,
            accept_loop,
            reset,
        });
        Ok(local_addr)
    }

    /// Close the listener and cancel the reset timer. Open connections are
    /// not interrupted.
    pub async fn stop(&mut self) -> Result<(), ControlError> {
        let running = self.running.take().ok_or(ControlError::NotRunning)?;
        running.shutdown.trigger();

        if let Err(e) = running.accept_loop.await {
            tracing::error!(error = %e, "Accept loop task failed");
        }
        running.reset.join().await;

        tracing::info!(
            address = %running.local_addr,
            in_flight = self.tracker.active_count(),
            "Proxy stopped"
        );
        Ok(())
    }

    /// Set a daily limit in MB for the domain's key. Works while stopped.
    pub fn add(&self, domain: &str, limit_mb: u64) -> DomainKey {
        let key = DomainKey::of(domain);
        self.ledger.set_limit(&key, limit_mb as f64 * KIB_PER_MB);
        key
    }

    /// Usage per domain, highest first.
    pub fn usage(&self) -> Vec<UsageRecord> {
        self.ledger.snapshot()
    }
}

impl Drop for ProxyController {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.shutdown.trigger();
            running.reset.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config
    }

    #[tokio::test]
    async fn start_stop_cycle() {
        let mut controller = ProxyController::new(loopback_config(), Arc::new(QuotaLedger::new()));
        assert!(matches!(controller.stop().await, Err(ControlError::NotRunning)));

        let addr = controller.start().unwrap();
        assert_eq!(controller.local_addr(), Some(addr));
        assert!(matches!(controller.start(), Err(ControlError::AlreadyRunning(a)) if a == addr));

        controller.stop().await.unwrap();
        assert!(!controller.is_running());
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());

        controller.start().unwrap();
        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_reports_bind_failure() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = ProxyConfig::default();
        config.listener.bind_address = taken.local_addr().unwrap().to_string();

        let mut controller = ProxyController::new(config, Arc::new(QuotaLedger::new()));
        assert!(matches!(
            controller.start(),
            Err(ControlError::Proxy(ProxyError::Bind { .. }))
        ));
    }

    #[test]
    fn add_converts_megabytes_and_keys_by_domain() {
        let controller = ProxyController::new(ProxyConfig::default(), Arc::new(QuotaLedger::new()));
        let key = controller.add("www.Facebook.com", 3);
        assert_eq!(key.as_str(), "facebook.com");
        assert_eq!(controller.ledger().ensure(&key).limit_kib, Some(3072.0));
    }

    #[test]
    fn config_limits_seed_the_ledger() {
        let mut config = ProxyConfig::default();
        config.quotas.limits_mb.insert("youtube.com".into(), 2);
        let controller = ProxyController::new(config, Arc::new(QuotaLedger::new()));

        let usage = controller.usage();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].domain.as_str(), "youtube.com");
        assert_eq!(usage[0].limit_kib, Some(2048.0));
        assert_eq!(usage[0].used_kib, 0.0);
    }
}
