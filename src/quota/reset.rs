//! Scheduled daily quota reset.
//!
//! The first reset fires at the next local midnight, later ones every 24 hours.
//! The task is owned by whoever spawned it and ends on the shutdown broadcast.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::quota::QuotaLedger;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Time from `now` until the following midnight. Exactly at midnight this is
/// a full day, never zero.
pub fn duration_until_midnight(now: NaiveDateTime) -> Duration {
    now.date()
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        .and_then(|next_midnight| (next_midnight - now).to_std().ok())
        .unwrap_or(DAY)
}

/// Handle to the running reset task.
pub struct DailyReset {
    handle: JoinHandle<()>,
}

impl DailyReset {
    /// Spawn the reset task aligned to local midnight.
    pub fn spawn(ledger: Arc<QuotaLedger>, shutdown: broadcast::Receiver<()>) -> Self {
        let first = duration_until_midnight(Local::now().naive_local());
        tracing::info!(first_reset_in_secs = first.as_secs(), "Daily quota reset scheduled");
        Self::spawn_with_schedule(ledger, first, DAY, shutdown)
    }

    /// Spawn the reset task with an explicit first delay and period.
    pub fn spawn_with_schedule(
        ledger: Arc<QuotaLedger>,
        first: Duration,
        period: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + first, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => ledger.reset_all(),
                    _ = shutdown.recv() => {
                        tracing::debug!("Daily reset received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        });
        Self { handle }
    }

    /// Abort the task outright, for owners that have no shutdown broadcast to send.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Wait for the task to exit.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::DomainKey;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn midnight_countdown() {
        assert_eq!(duration_until_midnight(at(23, 59, 30)), Duration::from_secs(30));
        assert_eq!(duration_until_midnight(at(12, 0, 0)), Duration::from_secs(12 * 3600));
        assert_eq!(duration_until_midnight(at(0, 0, 0)), DAY);
    }

    #[tokio::test(start_paused = true)]
    async fn resets_at_first_deadline_and_every_period() {
        let ledger = Arc::new(QuotaLedger::new());
        let key = DomainKey::of("example.com");
        let (tx, rx) = broadcast::channel(1);

        let reset = DailyReset::spawn_with_schedule(
            Arc::clone(&ledger),
            Duration::from_secs(60),
            DAY,
            rx,
        );

        ledger.check_and_charge(&key, 10.0);
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ledger.ensure(&key).used_kib, 10.0);

        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(ledger.ensure(&key).used_kib, 0.0);

        ledger.check_and_charge(&key, 5.0);
        time::sleep(DAY).await;
        assert_eq!(ledger.ensure(&key).used_kib, 0.0);

        tx.send(()).unwrap();
        reset.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_task_before_it_fires() {
        let ledger = Arc::new(QuotaLedger::new());
        let key = DomainKey::of("example.com");
        let (tx, rx) = broadcast::channel(1);

        let reset = DailyReset::spawn_with_schedule(Arc::clone(&ledger), DAY, DAY, rx);
        ledger.check_and_charge(&key, 10.0);

        tx.send(()).unwrap();
        reset.join().await;

        time::sleep(DAY * 2).await;
        assert_eq!(ledger.ensure(&key).used_kib, 10.0);
    }
}
