use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::alert::{AlertDispatcher, LogAlerter, WebhookAlerter};
use crate::config::WorkerConfig;
use crate::evaluator::{alert_warranted, derive_state};
use crate::logs::LogStore;
use crate::models::{Check, LogEntry, Outcome, Status, Verdict};
use crate::probe::Prober;
use crate::rotator::{self, RotationReport};
use crate::store::{self, FileStore, RecordStore, CHECKS};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GatherReport {
    pub total: usize,
    pub up: usize,
    pub down: usize,
    pub alerts: usize,
    /// Checks that could not be read, were invalid or failed to persist.
    pub skipped: usize,
}

impl GatherReport {
    fn record(&mut self, verdict: Option<Verdict>) {
        match verdict {
            Some(v) => {
                match v.state {
                    Status::Up => self.up += 1,
                    Status::Down => self.down += 1,
                }
                if v.alert {
                    self.alerts += 1;
                }
            }
            None => self.skipped += 1,
        }
    }
}

pub struct Worker {
    pub config: WorkerConfig,
    store: Arc<dyn RecordStore>,
    logs: LogStore,
    prober: Prober,
    alerter: Arc<dyn AlertDispatcher>,
    concurrency_limiter: Option<Arc<Semaphore>>,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn RecordStore>,
        alerter: Arc<dyn AlertDispatcher>,
    ) -> reqwest::Result<Self> {
        let logs = LogStore::new(config.logs_dir.clone());
        let concurrency_limiter = config
            .max_concurrency
            .map(|permits| Arc::new(Semaphore::new(permits)));
        Ok(Self {
            config,
            store,
            logs,
            prober: Prober::new()?,
            alerter,
            concurrency_limiter,
        })
    }

    /// File-backed store, and webhook alerts when a webhook is configured.
    pub fn from_config(config: WorkerConfig) -> reqwest::Result<Self> {
        let store: Arc<dyn RecordStore> = Arc::new(FileStore::new(config.data_dir.clone()));
        let alerter: Arc<dyn AlertDispatcher> = match &config.webhook_url {
            Some(url) => {
                info!(webhook = %url, "Alerts will be posted to webhook");
                Arc::new(WebhookAlerter::new(url.clone())?)
            }
            None => Arc::new(LogAlerter),
        };
        Self::new(config, store, alerter)
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.store)
    }

    pub fn logs(&self) -> &LogStore {
        &self.logs
    }

    /// Starts the gather and rotation loops. Each runs once right away.
    pub fn run(self: Arc<Self>) -> WorkerHandle {
        let (shutdown, rx) = watch::channel(false);
        info!(
            gather_secs = self.config.gather_interval_secs,
            rotation_secs = self.config.rotation_interval_secs,
            max_concurrency = ?self.config.max_concurrency,
            "Check worker started"
        );

        let gather = tokio::spawn(Arc::clone(&self).gather_loop(rx.clone()));
        let rotation = tokio::spawn(self.rotation_loop(rx));
        WorkerHandle { shutdown, gather, rotation }
    }

    async fn gather_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.gather_interval();
        while !stopped(&shutdown) {
            let start_time = Utc::now();
            let report = self.gather_all_checks().await;
            let duration = Utc::now() - start_time;
            info!(
                total = report.total,
                up = report.up,
                down = report.down,
                alerts = report.alerts,
                skipped = report.skipped,
                "Gather cycle completed in {:.2}s",
                duration.num_milliseconds() as f64 / 1000.0
            );
            if wait_or_shutdown(period, &mut shutdown).await {
                break;
            }
        }
        info!("Gather loop stopped");
    }

    async fn rotation_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.rotation_interval();
        while !stopped(&shutdown) {
            self.rotate_logs().await;
            if wait_or_shutdown(period, &mut shutdown).await {
                break;
            }
        }
        info!("Rotation loop stopped");
    }

    pub async fn rotate_logs(&self) -> RotationReport {
        rotator::rotate_logs(&self.logs).await
    }

    /// Probes every stored check concurrently and waits for all of them.
    pub async fn gather_all_checks(self: &Arc<Self>) -> GatherReport {
        let mut report = GatherReport::default();
        let ids = match self.store.list(CHECKS).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Error getting checks");
                return report;
            }
        };

        let mut tasks = FuturesUnordered::new();
        for id in ids {
            let worker = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                let _permit = match &worker.concurrency_limiter {
                    Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
                    None => None,
                };
                worker.check_one(&id).await
            }));
        }

        report.total = tasks.len();
        while let Some(joined) = tasks.next().await {
            match joined {
                Ok(verdict) => report.record(verdict),
                Err(e) => {
                    error!(error = %e, "Check task failed");
                    report.skipped += 1;
                }
            }
        }
        report
    }

    /// Reads, validates and probes one check. `None` if the check was skipped.
    pub async fn check_one(&self, id: &str) -> Option<Verdict> {
        let check: Check = match store::read_as(self.store.as_ref(), CHECKS, id).await {
            Ok(check) => check,
            Err(e) => {
                error!(check_id = %id, error = %e, "Could not get check");
                return None;
            }
        };
        if let Err(e) = check.validate() {
            warn!(check_id = %id, error = %e, "Skipping invalid check");
            return None;
        }
        let outcome = self.prober.probe(&check).await;
        self.process_outcome(check, outcome).await
    }

    /// Applies one outcome: persist the new state, then log it and alert.
    /// Nothing is logged or alerted when persisting fails.
    pub async fn process_outcome(&self, mut check: Check, outcome: Outcome) -> Option<Verdict> {
        let state = derive_state(&check, &outcome);
        let alert = alert_warranted(&check, state);
        let now = Utc::now().timestamp_millis();

        check.state = state;
        check.last_checked = Some(now);
        if let Err(e) = store::update_from(self.store.as_ref(), CHECKS, &check.id, &check).await {
            error!(check_id = %check.id, error = %e, "Error updating check");
            return None;
        }

        let entry = LogEntry {
            check: check.clone(),
            outcome,
            state,
            alert,
            time: now,
        };
        match entry.to_line() {
            Ok(line) => {
                if let Err(e) = self.logs.append(&check.id, &line).await {
                    error!(check_id = %check.id, error = %e, "Could not append check log");
                }
            }
            Err(e) => error!(check_id = %check.id, error = %e, "Could not serialize log entry"),
        }

        if alert {
            // Dispatch runs detached so a slow notifier cannot hold up the cycle.
            let alerter = Arc::clone(&self.alerter);
            let changed = check.clone();
            tokio::spawn(async move {
                if let Err(e) = alerter.dispatch(&changed).await {
                    error!(check_id = %changed.id, error = %e, "Alert dispatch failed");
                }
            });
        } else {
            info!(check_id = %check.id, "Check {} {} did not change", check.method, check.url);
        }

        Some(Verdict { state, alert })
    }
}

/// Returns `true` when shutdown was requested before `period` elapsed.
async fn wait_or_shutdown(period: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(period) => {}
        changed = shutdown.changed() => {
            if changed.is_err() {
                return true;
            }
        }
    }
    stopped(shutdown)
}

fn stopped(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    gather: JoinHandle<()>,
    rotation: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stops both loops after their current cycle and waits for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.gather.await {
            error!(error = %e, "Gather loop ended abnormally");
        }
        if let Err(e) = self.rotation.await {
            error!(error = %e, "Rotation loop ended abnormally");
        }
    }
}
