//! Scheduler lifecycle integration tests.
//!
//! These tests drive the full acquisition path through the background
//! scheduler and the directory watcher, with every collaborator mocked:
//! candidate list -> sourcing -> proposal -> confirmation -> commit.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use uuid::Uuid;

use dealbot_core::testing::{fixtures, MockDealExecution, MockMarketplace, MockNodeClient};
use dealbot_core::{
    archive::FsArchiveStore,
    marketplace::PendingProposal,
    node::RetrievalStatus,
    AcquisitionConfig, AcquisitionPipeline, CandidateCache, Config, DirectoryWatcher, PieceLocks,
    ProviderAdmission, RetrievalMonitor, RetrievalMonitorConfig, Scheduler, WorkerPoolConfig,
};

const DEAL_UUID: &str = "b3a47c91-6a5e-4c86-9a2f-7d1f5e0c2b40";

/// Test helper wiring the pipeline and all mocked collaborators.
struct TestHarness {
    marketplace: Arc<MockMarketplace>,
    node: Arc<MockNodeClient>,
    execution: Arc<MockDealExecution>,
    archive: Arc<FsArchiveStore>,
    cache: Arc<CandidateCache>,
    pipeline: Arc<AcquisitionPipeline>,
    longterm_dir: TempDir,
    _download_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let marketplace = Arc::new(MockMarketplace::new());
        let node = Arc::new(MockNodeClient::new());
        let execution = Arc::new(MockDealExecution::new());

        let longterm_dir = TempDir::new().expect("Failed to create temp dir");
        let download_dir = TempDir::new().expect("Failed to create temp dir");
        let archive = Arc::new(FsArchiveStore::new(
            longterm_dir.path().to_path_buf(),
            download_dir.path().to_path_buf(),
        ));

        let monitor = Arc::new(RetrievalMonitor::new(
            Arc::clone(&node) as _,
            RetrievalMonitorConfig {
                max_price_attofil: 0,
                inactivity_timeout: Duration::from_millis(500),
                poll_tick: Duration::from_millis(20),
                cancel_grace: Duration::from_millis(1),
                cancel_sweep_timeout: Duration::from_millis(50),
            },
        ));
        let cache = Arc::new(CandidateCache::new(
            Arc::clone(&marketplace) as _,
            Duration::from_secs(60),
        ));

        let pipeline = Arc::new(AcquisitionPipeline::new(
            "f09999".to_string(),
            Arc::clone(&marketplace) as _,
            Arc::clone(&execution) as _,
            Arc::clone(&archive) as _,
            monitor,
            Arc::clone(&cache),
            Arc::new(PieceLocks::new()),
            Arc::new(ProviderAdmission::new(2)),
            AcquisitionConfig {
                min_piece_size: 1024,
                poll_interval: Duration::from_millis(1),
                poll_max_retries: 3,
            },
        ));

        Self {
            marketplace,
            node,
            execution,
            archive,
            cache,
            pipeline,
            longterm_dir,
            _download_dir: download_dir,
        }
    }

    fn create_scheduler(&self, max_workers: u32) -> Scheduler {
        Scheduler::new(
            Arc::clone(&self.pipeline),
            WorkerPoolConfig {
                max_workers,
                attempts_per_cycle: 1,
                cycle_pause: Duration::from_millis(10),
                idle_backoff: Duration::from_millis(50),
            },
        )
    }

    fn create_watcher(&self) -> DirectoryWatcher {
        // Default watch interval is long; each test relies on the sweep
        // that runs at startup.
        DirectoryWatcher::new(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.archive) as _,
            Arc::clone(&self.cache),
            &Config::default(),
        )
    }

    fn stage_archive(&self, piece_cid: &str) {
        std::fs::write(
            self.longterm_dir.path().join(format!("{piece_cid}.car")),
            b"car-bytes",
        )
        .expect("Failed to stage archive");
    }

    async fn set_confirmed_proposal(&self, piece_cid: &str) {
        self.marketplace
            .set_pending_proposals(vec![PendingProposal {
                piece_cid: piece_cid.to_string(),
                deal_proposal_cid: "bafyproposal".to_string(),
                deal_proposal_id: DEAL_UUID.to_string(),
                piece_size: 2048,
                hours_remaining: 70,
            }])
            .await;
    }
}

/// Poll `cond` until it holds or the timeout expires.
async fn wait_until<F, Fut>(what: &str, mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Duration::from_secs(5);
    let result = tokio::time::timeout(deadline, async {
        loop {
            if cond().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}

#[tokio::test]
async fn test_scheduler_start_stop() {
    let harness = TestHarness::new();
    let scheduler = harness.create_scheduler(2);

    assert!(!scheduler.status().running);

    scheduler.start();
    assert!(scheduler.status().running);

    // Double start is a no-op
    scheduler.start();

    scheduler.stop().await;
    assert!(!scheduler.status().running);
}

#[tokio::test]
async fn test_worker_acquires_staged_candidate() {
    let harness = TestHarness::new();
    harness
        .marketplace
        .set_open_deals(vec![fixtures::candidate("baga6ea4seaqaaa", "f01000")])
        .await;
    harness.stage_archive("baga6ea4seaqaaa");
    harness.set_confirmed_proposal("baga6ea4seaqaaa").await;

    let scheduler = harness.create_scheduler(1);
    scheduler.start();

    wait_until("a commit", || async {
        !harness.execution.committed().await.is_empty()
    })
    .await;
    scheduler.stop().await;

    let commits = harness.execution.committed().await;
    assert_eq!(commits[0].0, Uuid::parse_str(DEAL_UUID).unwrap());
    assert!(commits[0].1.ends_with("baga6ea4seaqaaa.car"));
    // Staged content never hits the network
    assert!(harness.node.started_retrievals().await.is_empty());
}

#[tokio::test]
async fn test_worker_retrieves_then_commits() {
    let harness = TestHarness::new();
    harness
        .marketplace
        .set_open_deals(vec![fixtures::candidate("baga6ea4seaqbbb", "f01000")])
        .await;
    harness
        .node
        .script_retrieval_events(vec![
            (RetrievalStatus::Accepted, ""),
            (RetrievalStatus::Ongoing, ""),
            (RetrievalStatus::Completed, ""),
        ])
        .await;
    harness.set_confirmed_proposal("baga6ea4seaqbbb").await;

    let scheduler = harness.create_scheduler(1);
    scheduler.start();

    wait_until("a commit", || async {
        !harness.execution.committed().await.is_empty()
    })
    .await;
    scheduler.stop().await;

    let started = harness.node.started_retrievals().await;
    assert_eq!(started[0].provider, "f01000");
    assert_eq!(started[0].payload_cid, "bafypayload");

    let exports = harness.node.exported().await;
    assert!(exports[0].1.ends_with("baga6ea4seaqbbb.car"));

    let commits = harness.execution.committed().await;
    assert!(commits[0].1.ends_with("baga6ea4seaqbbb.car"));
}

#[tokio::test]
async fn test_idle_scheduler_makes_no_requests() {
    let harness = TestHarness::new();
    // Empty candidate list: workers should go idle without side effects

    let scheduler = harness.create_scheduler(2);
    scheduler.start();
    tokio::time::sleep(Duration::from_millis(150)).await;
    scheduler.stop().await;

    assert!(harness.marketplace.deal_requests().await.is_empty());
    assert!(harness.node.started_retrievals().await.is_empty());
    assert!(harness.execution.committed().await.is_empty());
}

#[tokio::test]
async fn test_watcher_offers_matching_staged_archive() {
    let harness = TestHarness::new();
    harness
        .marketplace
        .set_open_deals(vec![fixtures::candidate("baga6ea4seaqccc", "f01000")])
        .await;
    // One staged archive matches an open deal, the other does not
    harness.stage_archive("baga6ea4seaqccc");
    harness.stage_archive("baga6ea4seaqzzz");
    harness.set_confirmed_proposal("baga6ea4seaqccc").await;

    let watcher = harness.create_watcher();
    watcher.start();

    wait_until("a commit", || async {
        !harness.execution.committed().await.is_empty()
    })
    .await;
    watcher.stop().await;

    let requests = harness.marketplace.deal_requests().await;
    assert!(requests.iter().all(|(_, piece)| piece == "baga6ea4seaqccc"));
    assert!(harness.node.started_retrievals().await.is_empty());
}
