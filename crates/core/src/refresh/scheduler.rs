use crate::config::Settings;
use crate::domain::DashboardSnapshot;
use crate::ingest::{HttpSheetSource, IngestError, SheetSource};
use crate::refresh::{run_pipeline, PipelineOptions};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Published { snapshot_id: Uuid },
    Failed(IngestError),
    /// Another pass was in flight; nothing was queued.
    Skipped,
    /// The scheduler was stopped before the pass could publish.
    Discarded,
}

struct Shared {
    source: Arc<dyn SheetSource>,
    options: PipelineOptions,
    snapshot: watch::Sender<DashboardSnapshot>,
    in_flight: AtomicBool,
    torn_down: AtomicBool,
}

/// Owns the dashboard snapshot and keeps it fresh.
///
/// One pass at a time: a trigger that arrives while a pass is running is dropped. Timer
/// passes run as their own tasks, so [`RefreshScheduler::stop`] never cancels a pass
/// mid-flight; it only prevents that pass from publishing.
pub struct RefreshScheduler {
    shared: Arc<Shared>,
    interval: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(source: Arc<dyn SheetSource>, options: PipelineOptions, interval: Duration) -> Self {
        let (snapshot, _) = watch::channel(DashboardSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                source,
                options,
                snapshot,
                in_flight: AtomicBool::new(false),
                torn_down: AtomicBool::new(false),
            }),
            interval: interval.max(Duration::from_millis(1)),
            timer: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let source = HttpSheetSource::from_settings(settings)?;
        let options = settings.pipeline_options()?;
        let interval = settings.refresh_interval()?;

        tracing::info!(
            url = %source.url(),
            interval_secs = interval.as_secs(),
            envelope = options.envelope.as_str(),
            rate_sign = options.normalize.rate_sign.as_str(),
            "configured dashboard refresh"
        );
        Ok(Self::new(Arc::new(source), options, interval))
    }

    /// Starts the refresh timer. The first tick fires immediately.
    pub fn start(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shared.torn_down.load(Ordering::Acquire) {
            tracing::warn!("refresh scheduler already stopped; start ignored");
            return;
        }
        if timer.is_some() {
            tracing::warn!("refresh scheduler already running; start ignored");
            return;
        }

        let shared = self.shared.clone();
        let period = self.interval;
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                spawn_pass(shared.clone(), "timer");
            }
        }));
    }

    /// Cancels the timer and stops all further publishing. Terminal.
    pub fn stop(&self) {
        self.shared.tear_down();
        let handle = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::info!("refresh scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.shared.is_torn_down()
            && self
                .timer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
    }

    /// Manual trigger. A no-op returning [`RefreshOutcome::Skipped`] while a pass is running.
    ///
    /// The pass runs on its own task: dropping the returned future does not cancel it.
    pub async fn refresh_now(&self) -> RefreshOutcome {
        match spawn_pass(self.shared.clone(), "manual").await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = %err, "manual dashboard refresh task failed");
                RefreshOutcome::Discarded
            }
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.shared.snapshot.subscribe()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_pass(shared: Arc<Shared>, trigger: &'static str) -> JoinHandle<RefreshOutcome> {
    tokio::spawn(async move { shared.run_pass(trigger).await })
}

/// Clears the in-flight flag however the pass ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Sets the torn-down flag under the channel's write lock, so it cannot interleave
    /// with [`Shared::publish`].
    fn tear_down(&self) {
        self.snapshot.send_if_modified(|_| {
            self.torn_down.store(true, Ordering::Release);
            false
        });
    }

    /// Applies `update` unless the scheduler was stopped. Returns whether it was applied.
    fn publish(&self, update: impl FnOnce(&mut DashboardSnapshot)) -> bool {
        self.snapshot.send_if_modified(|current| {
            if self.is_torn_down() {
                return false;
            }
            update(current);
            true
        })
    }

    async fn run_pass(&self, trigger: &'static str) -> RefreshOutcome {
        if self.is_torn_down() {
            return RefreshOutcome::Discarded;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(trigger, "dashboard refresh already in flight; trigger ignored");
            return RefreshOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.in_flight);

        let started = Utc::now();
        if !self.publish(|current| *current = current.fetching(started)) {
            return RefreshOutcome::Discarded;
        }

        let result = run_pipeline(self.source.as_ref(), &self.options).await;

        match result {
            Ok(dataset) => {
                let snapshot_id = Uuid::new_v4();
                let revenue_points = dataset.revenue_trend.len();
                let activity_points = dataset.activity.len();
                let sources = dataset.source_breakdown.len();
                let next = DashboardSnapshot::published(dataset, snapshot_id, Utc::now());

                if !self.publish(|current| *current = next) {
                    tracing::debug!(trigger, "scheduler stopped during refresh; result discarded");
                    return RefreshOutcome::Discarded;
                }
                tracing::info!(
                    trigger,
                    source = self.source.source_name(),
                    %snapshot_id,
                    revenue_points,
                    activity_points,
                    sources,
                    elapsed_ms = (Utc::now() - started).num_milliseconds(),
                    "published dashboard snapshot"
                );
                RefreshOutcome::Published { snapshot_id }
            }
            Err(err) => {
                let message = err.to_string();
                if !self.publish(|current| *current = current.failed(message)) {
                    tracing::debug!(trigger, "scheduler stopped during refresh; result discarded");
                    return RefreshOutcome::Discarded;
                }
                tracing::warn!(
                    trigger,
                    source = self.source.source_name(),
                    error_kind = err.kind(),
                    error = %err,
                    "dashboard refresh failed; keeping last good data"
                );
                RefreshOutcome::Failed(err)
            }
        }
    }
}
