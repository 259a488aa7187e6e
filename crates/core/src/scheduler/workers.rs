use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::acquisition::{AcquisitionPipeline, AttemptOutcome};
use crate::config::Config;
use crate::metrics;

/// Tuning for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent worker tasks.
    pub max_workers: u32,
    /// Attempts one worker makes per cycle before pausing.
    pub attempts_per_cycle: u32,
    /// Pause between cycles.
    pub cycle_pause: Duration,
    /// Longer pause after a cycle that found nothing to do.
    pub idle_backoff: Duration,
}

impl WorkerPoolConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.scheduler.max_workers,
            attempts_per_cycle: config.scheduler.attempts_per_cycle,
            cycle_pause: Duration::from_secs(1),
            idle_backoff: Duration::from_secs(30),
        }
    }
}

/// Current scheduler state, for logging and health endpoints.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub running: bool,
    pub busy_workers: usize,
    pub attempts_completed: u64,
}

/// Runs the bounded pool of acquisition workers.
///
/// Worker count never exceeds the configured maximum: each worker is one
/// long-lived task that alternates between an attempt cycle and a pause.
/// Piece-level and counterparty-level limits live in the pipeline's lock
/// services, not here.
pub struct Scheduler {
    pipeline: Arc<AcquisitionPipeline>,
    config: WorkerPoolConfig,
    running: Arc<AtomicBool>,
    busy: Arc<AtomicUsize>,
    attempts: Arc<AtomicU64>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<AcquisitionPipeline>, config: WorkerPoolConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            pipeline,
            config,
            running: Arc::new(AtomicBool::new(false)),
            busy: Arc::new(AtomicUsize::new(0)),
            attempts: Arc::new(AtomicU64::new(0)),
            shutdown_tx,
        }
    }

    /// Start the worker pool (spawns background tasks).
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        info!("Starting scheduler with {} workers", self.config.max_workers);
        for worker_id in 0..self.config.max_workers {
            self.spawn_worker(worker_id);
        }
    }

    /// Stop the worker pool gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Scheduler not running");
            return;
        }

        info!("Stopping scheduler");
        let _ = self.shutdown_tx.send(());

        // Give workers a moment to notice
        tokio::time::sleep(Duration::from_millis(200)).await;
        info!("Scheduler stopped");
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.running.load(Ordering::Relaxed),
            busy_workers: self.busy.load(Ordering::Relaxed),
            attempts_completed: self.attempts.load(Ordering::Relaxed),
        }
    }

    fn spawn_worker(&self, worker_id: u32) {
        let pipeline = Arc::clone(&self.pipeline);
        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let busy = Arc::clone(&self.busy);
        let attempts = Arc::clone(&self.attempts);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Worker {worker_id} started");
            let mut pause = config.cycle_pause;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Worker {worker_id} received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(pause) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        let idle = Self::run_cycle(
                            worker_id, &pipeline, &config, &busy, &attempts,
                        )
                        .await;
                        pause = if idle { config.idle_backoff } else { config.cycle_pause };
                    }
                }
            }
            info!("Worker {worker_id} stopped");
        });
    }

    /// One attempt cycle. Returns whether the cycle found nothing to do.
    async fn run_cycle(
        worker_id: u32,
        pipeline: &AcquisitionPipeline,
        config: &WorkerPoolConfig,
        busy: &AtomicUsize,
        attempts: &AtomicU64,
    ) -> bool {
        busy.fetch_add(1, Ordering::SeqCst);
        metrics::WORKERS_BUSY.inc();

        let mut idle = false;
        for _ in 0..config.attempts_per_cycle {
            let started = Instant::now();
            match pipeline.run_attempt().await {
                Ok(outcome) => {
                    metrics::ACQUISITION_DURATION
                        .with_label_values(&[outcome.label()])
                        .observe(started.elapsed().as_secs_f64());
                    attempts.fetch_add(1, Ordering::Relaxed);
                    if outcome == AttemptOutcome::Idle {
                        idle = true;
                        break;
                    }
                }
                Err(e) => {
                    warn!("Worker {worker_id} attempt failed: {e}");
                    metrics::ACQUISITION_ATTEMPTS
                        .with_label_values(&["error"])
                        .inc();
                    attempts.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }
        }

        busy.fetch_sub(1, Ordering::SeqCst);
        metrics::WORKERS_BUSY.dec();
        idle
    }
}
