//! Background scheduler for housekeeping work.
//!
//! One recurring job: sweep expired verification codes out of the store.
//! The sweep is idempotent and independent of request traffic; expired codes
//! are already unusable for login, the sweep only reclaims the rows.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tokio::time::{Duration, interval};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::db::Store;
use crate::domain::events::NotificationEvent;

pub struct Scheduler {
    store: Store,
    config: SchedulerConfig,
    event_bus: broadcast::Sender<NotificationEvent>,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    pub fn new(
        store: Store,
        config: SchedulerConfig,
        event_bus: broadcast::Sender<NotificationEvent>,
    ) -> Self {
        Self {
            store,
            config,
            event_bus,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        info!("Starting background scheduler");

        if let Some(cron_expr) = &self.config.cron_expression {
            self.run_with_cron(cron_expr).await
        } else {
            self.run_with_interval().await
        }
    }

    async fn run_with_cron(&self, cron_expr: &str) -> Result<()> {
        let mut sched = JobScheduler::new().await?;

        let store = self.store.clone();
        let event_bus = self.event_bus.clone();
        let running = Arc::clone(&self.running);

        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let store = store.clone();
            let event_bus = event_bus.clone();
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                sweep_expired_codes(&store, &event_bus).await;
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        info!("Scheduler running with cron: {}", cron_expr);

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }

    async fn run_with_interval(&self) -> Result<()> {
        let interval_mins = self.config.sweep_interval_minutes.max(1);
        info!("Scheduler running: sweep every {}m", interval_mins);

        let mut sweep_interval = interval(Duration::from_secs(u64::from(interval_mins) * 60));
        // The first tick fires immediately; skip it so startup is quiet.
        sweep_interval.tick().await;

        loop {
            sweep_interval.tick().await;

            if !*self.running.read().await {
                break;
            }

            sweep_expired_codes(&self.store, &self.event_bus).await;
        }

        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping scheduler...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Runs the sweep immediately, outside the schedule.
    pub async fn run_once(&self) -> Result<u64> {
        let now = chrono::Utc::now().to_rfc3339();
        let removed = self.store.delete_expired_codes(&now).await?;
        info!(removed, "Manual sweep finished");
        Ok(removed)
    }
}

async fn sweep_expired_codes(store: &Store, event_bus: &broadcast::Sender<NotificationEvent>) {
    let start = std::time::Instant::now();
    info!(event = "job_started", job_name = "sweep_codes", "Starting verification code sweep");

    let now = chrono::Utc::now().to_rfc3339();
    match store.delete_expired_codes(&now).await {
        Ok(removed) => {
            let _ = event_bus.send(NotificationEvent::SweepFinished { removed });
            info!(
                event = "job_finished",
                job_name = "sweep_codes",
                removed,
                duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Verification code sweep finished"
            );
        }
        Err(e) => {
            error!(event = "job_failed", job_name = "sweep_codes", error = %e, "Verification code sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_once_removes_only_expired_codes() {
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .unwrap();

        let past = (chrono::Utc::now() - chrono::Duration::minutes(5)).to_rfc3339();
        let future = (chrono::Utc::now() + chrono::Duration::minutes(5)).to_rfc3339();
        store
            .store_verification_code("+15550009999", "111111", "login", &past)
            .await
            .unwrap();
        store
            .store_verification_code("+15550009999", "222222", "login", &future)
            .await
            .unwrap();

        let (event_bus, _) = broadcast::channel(4);
        let scheduler = Scheduler::new(store.clone(), SchedulerConfig::default(), event_bus);

        assert_eq!(scheduler.run_once().await.unwrap(), 1);

        // The live code still verifies.
        let now = chrono::Utc::now().to_rfc3339();
        assert!(
            store
                .consume_verification_code("+15550009999", "222222", &now)
                .await
                .unwrap()
        );
    }
}
