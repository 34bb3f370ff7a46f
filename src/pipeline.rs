//! Top-level orchestration: owns the scheduler's tick loop, the worker
//! pool, the notification dispatcher, and the heartbeat supervisor, and
//! wires them to a shared `Store`. Grounded on `checker::run_checker`'s
//! role as the single coroutine `main.rs` spawns and manages, split here
//! into the cooperating pieces spec.md §2 names.

use crate::auth::tokens_match;
use crate::config::Config;
use crate::heartbeat;
use crate::incidents;
use crate::metrics::Metrics;
use crate::models::{EventType, MonitorStatus};
use crate::notifications::{Dispatcher, NotificationPayload};
use crate::probes::ProbeContext;
use crate::queue::DispatchQueue;
use crate::scheduler::Scheduler;
use crate::store::{Store, StoreError};
use crate::workers::WorkerPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Handles for everything `start()` spawned; torn down by `stop()`.
struct Running {
    scheduler_task: JoinHandle<()>,
    resend_task: JoinHandle<()>,
    workers: WorkerPool,
    heartbeat: heartbeat::Supervisor,
}

pub struct Pipeline {
    store: Arc<dyn Store>,
    scheduler: Arc<Scheduler>,
    queue: DispatchQueue,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
    config: Config,
    /// Holds the dispatch queue's receiver between `new()` and `start()` —
    /// `WorkerPool::spawn` needs it behind a shared lock, which keeps `new`
    /// itself synchronous and infallible.
    receiver_slot: std::sync::Mutex<Option<crate::queue::DispatchReceiver>>,
    running: Mutex<Option<Running>>,
}

impl Pipeline {
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        let (queue, receiver) = DispatchQueue::bounded(config.queue_capacity());
        let scheduler = Arc::new(Scheduler::new(config.clone()));
        let metrics = Arc::new(Metrics::new());
        let http = reqwest::Client::builder().build().expect("failed to build reqwest client");
        let dispatcher = Arc::new(Dispatcher::spawn(store.clone(), metrics.clone(), http, config.dispatch_channel_capacity()));

        Pipeline {
            store,
            scheduler,
            queue,
            dispatcher,
            metrics,
            config,
            receiver_slot: std::sync::Mutex::new(Some(receiver)),
            running: Mutex::new(None),
        }
    }

    /// Loads monitors from the store and starts the scheduler tick loop,
    /// worker pool, and heartbeat supervisor. Idempotent: calling `start`
    /// while already running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        if let Err(e) = self.reload_monitors().await {
            eprintln!("❌ Pipeline: failed to load monitors at startup: {e}");
        }

        let receiver = self.receiver_slot.lock().unwrap().take().expect("Pipeline::start called twice without stash");
        let receiver = Arc::new(Mutex::new(receiver));
        let probe_ctx = Arc::new(ProbeContext::new(&self.config));

        let workers = WorkerPool::spawn(
            self.config.workers,
            receiver,
            self.store.clone(),
            self.scheduler.clone(),
            self.dispatcher.clone(),
            self.metrics.clone(),
            probe_ctx,
        );

        let heartbeat = heartbeat::Supervisor::spawn(
            self.config.heartbeat_check_interval_seconds,
            self.store.clone(),
            self.scheduler.clone(),
            self.dispatcher.clone(),
            self.metrics.clone(),
        );

        let scheduler = self.scheduler.clone();
        let queue = self.queue.clone();
        let metrics = self.metrics.clone();
        let scheduler_task = tokio::spawn(async move {
            loop {
                let dropped = scheduler.tick(chrono::Utc::now(), &queue);
                for _ in 0..dropped {
                    metrics.record_dropped_job();
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        });

        let store = self.store.clone();
        let scheduler = self.scheduler.clone();
        let dispatcher = self.dispatcher.clone();
        let metrics = self.metrics.clone();
        let resend_task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(30)).await;
                resend_sweep(&store, &scheduler, &dispatcher, &metrics).await;
            }
        });

        println!("🚀 Pipeline: started with {} workers", self.config.workers);
        *running = Some(Running { scheduler_task, resend_task, workers, heartbeat });
    }

    /// Aborts the scheduler tick loop, resend sweep, and heartbeat
    /// supervisor, drains and joins the worker pool. Safe to call when not
    /// running.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(running) = running.take() else { return };
        running.scheduler_task.abort();
        running.resend_task.abort();
        running.heartbeat.stop();
        running.workers.join().await;
        println!("🛑 Pipeline: stopped");
    }

    /// Re-reads every enabled monitor from the store and applies it to the
    /// scheduler. Safe to call at any time, running or not — used by the
    /// admin surface after a monitor is created, edited, or deleted.
    pub async fn reload_monitors(&self) -> Result<(), crate::store::StoreError> {
        let monitors = self.store.list_enabled_monitors().await?;
        self.scheduler.reload_monitors(monitors);
        Ok(())
    }

    /// Looks up the heartbeat monitor carrying `token` and, if found,
    /// records the ping and runs it through the shared check-result
    /// pipeline. `list_heartbeat_monitors` is the only store read this can
    /// use — there's no dedicated lookup-by-token operation — so this is a
    /// linear scan over passive monitors, which is fine at the scale a
    /// single node's heartbeat count ever reaches.
    pub async fn process_heartbeat_recovery(&self, token: &str) -> Result<MonitorStatus, &'static str> {
        let monitors = self.store.list_heartbeat_monitors().await.map_err(|_| "store error")?;
        let Some((monitor, hb)) = monitors.into_iter().find(|(_, hb)| tokens_match(token, &hb.token)) else {
            return Err("unknown token");
        };
        heartbeat::process_ping(&self.store, &self.scheduler, &self.dispatcher, &self.metrics, &monitor, &hb, token).await
    }

    pub fn dropped_jobs(&self) -> u64 {
        self.metrics.dropped_jobs()
    }

    pub fn dropped_notifications(&self) -> u64 {
        self.metrics.dropped_notifications()
    }
}

/// Re-emits `incident.created` for monitors that are still down and past
/// their `resend_interval` (§4.5). The fixed `Store` contract has no
/// "list open incidents" operation, so this walks the scheduler's own
/// `down_monitor_ids` and looks the incident up with
/// `open_incident_if_none` as a get — the same idiom `workers.rs` uses for
/// resolving. `last_resend_nth` on the scheduler entry makes each resend
/// idempotent across sweep ticks.
async fn resend_sweep(store: &Arc<dyn Store>, scheduler: &Arc<Scheduler>, dispatcher: &Arc<Dispatcher>, metrics: &Arc<Metrics>) {
    let now = chrono::Utc::now();
    for monitor_id in scheduler.down_monitor_ids() {
        let incident = match store.open_incident_if_none(&monitor_id, "").await {
            Ok((incident, _)) => incident,
            Err(StoreError::NotFound) => continue,
            Err(e) => {
                eprintln!("❌ Resend sweep: failed to look up incident for {monitor_id}: {e}");
                continue;
            }
        };
        let monitor = match store.get_monitor(&monitor_id).await {
            Ok(monitor) => monitor,
            Err(StoreError::NotFound) => continue,
            Err(e) => {
                eprintln!("❌ Resend sweep: failed to load monitor {monitor_id}: {e}");
                continue;
            }
        };

        let Ok(started_at) = chrono::NaiveDateTime::parse_from_str(&incident.started_at, "%Y-%m-%dT%H:%M:%SZ") else { continue };
        let started_at = chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(started_at, chrono::Utc);
        let elapsed_seconds = (now - started_at).num_seconds().max(0) as u64;

        let Some(nth) = incidents::due_resend_nth(monitor.resend_interval, elapsed_seconds) else { continue };
        if scheduler.last_resend_nth(&monitor_id) >= Some(nth) {
            continue;
        }

        dispatcher.submit(
            metrics,
            NotificationPayload { event_type: EventType::IncidentCreated, monitor, incident: Some(incident), content_change: None },
        );
        scheduler.set_last_resend_nth(&monitor_id, nth);
    }
}
