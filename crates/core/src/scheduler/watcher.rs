use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::acquisition::AcquisitionPipeline;
use crate::archive::ArchiveStore;
use crate::candidates::CandidateCache;
use crate::config::Config;

/// Periodically offers pre-staged archives as deals.
///
/// Operators can drop archives straight into long-term storage; the
/// watcher cross-references them against the open-deal list and pushes
/// matches through the staged acquisition path, skipping retrieval.
pub struct DirectoryWatcher {
    pipeline: Arc<AcquisitionPipeline>,
    archive: Arc<dyn ArchiveStore>,
    cache: Arc<CandidateCache>,
    watch_interval: Duration,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DirectoryWatcher {
    pub fn new(
        pipeline: Arc<AcquisitionPipeline>,
        archive: Arc<dyn ArchiveStore>,
        cache: Arc<CandidateCache>,
        config: &Config,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            pipeline,
            archive,
            cache,
            watch_interval: Duration::from_secs(config.scheduler.watch_interval_secs),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the watch loop (spawns a background task).
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Directory watcher already running");
            return;
        }

        info!(
            "Starting directory watcher (every {:?})",
            self.watch_interval
        );

        let pipeline = Arc::clone(&self.pipeline);
        let archive = Arc::clone(&self.archive);
        let cache = Arc::clone(&self.cache);
        let interval = self.watch_interval;
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                Self::sweep(&pipeline, &archive, &cache).await;
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Directory watcher received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                }
            }
            info!("Directory watcher stopped");
        });
    }

    /// Stop the watch loop.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Directory watcher not running");
            return;
        }
        let _ = self.shutdown_tx.send(());
    }

    async fn sweep(
        pipeline: &AcquisitionPipeline,
        archive: &Arc<dyn ArchiveStore>,
        cache: &CandidateCache,
    ) {
        let staged = match archive.staged_pieces().await {
            Ok(staged) => staged,
            Err(e) => {
                warn!("listing staged archives failed: {e}");
                return;
            }
        };
        if staged.is_empty() {
            return;
        }

        let candidates = cache.get_candidates().await;
        let open: HashSet<&str> = candidates.iter().map(|c| c.piece_cid.as_str()).collect();

        debug!("{} staged archives on disk", staged.len());
        for piece_cid in staged {
            if !open.contains(piece_cid.as_str()) {
                continue;
            }
            info!("staged archive {piece_cid} matches an open deal");
            match pipeline.acquire_staged(&piece_cid).await {
                Ok(outcome) => debug!("staged attempt for {piece_cid}: {outcome:?}"),
                Err(e) => warn!("staged attempt for {piece_cid} failed: {e}"),
            }
        }
    }
}
