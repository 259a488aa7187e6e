use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archive::ArchiveStore;
use crate::candidates::CandidateCache;
use crate::config::Config;
use crate::execution::DealExecution;
use crate::locks::{PieceGuard, PieceLocks, ProviderAdmission};
use crate::marketplace::{DealCandidate, Marketplace, PendingProposal};
use crate::metrics;
use crate::retrieval::RetrievalMonitor;

use super::AcquisitionError;

/// Tuning for the acquisition pipeline.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Candidates below this padded size are never attempted.
    pub min_piece_size: u64,
    /// Delay between pending-proposal polls.
    pub poll_interval: Duration,
    /// Polls before a confirmation is given up on.
    pub poll_max_retries: u32,
}

impl AcquisitionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_piece_size: config.scheduler.min_piece_size,
            poll_interval: Duration::from_secs(config.scheduler.poll_interval_secs),
            poll_max_retries: config.scheduler.poll_max_retries,
        }
    }
}

/// How one acquisition attempt ended.
///
/// These are the expected per-candidate endings; infrastructure failures
/// surface as [`AcquisitionError`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Nothing eligible to work on right now.
    Idle,
    /// The archive was handed to deal execution.
    Acquired { piece_cid: String },
    /// The coordinator declined the deal request, usually because another
    /// provider took the piece first.
    Declined { piece_cid: String },
    /// No source yielded the content.
    SourcingFailed { piece_cid: String },
}

impl AttemptOutcome {
    /// Label for the attempt counter.
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Idle => "idle",
            AttemptOutcome::Acquired { .. } => "acquired",
            AttemptOutcome::Declined { .. } => "declined",
            AttemptOutcome::SourcingFailed { .. } => "sourcing_failed",
        }
    }
}

/// Drives one candidate from selection to deal-execution hand-off.
///
/// The pipeline is shared by all worker tasks and the directory watcher;
/// the piece-lock and admission services keep their attempts from
/// colliding.
pub struct AcquisitionPipeline {
    provider: String,
    marketplace: Arc<dyn Marketplace>,
    execution: Arc<dyn DealExecution>,
    archive: Arc<dyn ArchiveStore>,
    monitor: Arc<RetrievalMonitor>,
    cache: Arc<CandidateCache>,
    piece_locks: Arc<PieceLocks>,
    admission: Arc<ProviderAdmission>,
    config: AcquisitionConfig,
}

impl AcquisitionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: String,
        marketplace: Arc<dyn Marketplace>,
        execution: Arc<dyn DealExecution>,
        archive: Arc<dyn ArchiveStore>,
        monitor: Arc<RetrievalMonitor>,
        cache: Arc<CandidateCache>,
        piece_locks: Arc<PieceLocks>,
        admission: Arc<ProviderAdmission>,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            provider,
            marketplace,
            execution,
            archive,
            monitor,
            cache,
            piece_locks,
            admission,
            config,
        }
    }

    /// Run one acquisition attempt end to end.
    ///
    /// Picks an eligible candidate at random, sources its archive, then
    /// proposes, confirms and commits the deal. The piece lock is held for
    /// the whole attempt and released on every exit path.
    pub async fn run_attempt(&self) -> Result<AttemptOutcome, AcquisitionError> {
        let candidates = self.cache.get_candidates().await;

        let Some((candidate, _guard)) = self.select(&candidates) else {
            return Ok(AttemptOutcome::Idle);
        };
        let piece_cid = candidate.piece_cid.clone();
        info!(
            "attempting {piece_cid} ({} bytes, {} sources)",
            candidate.padded_piece_size,
            candidate.sources.len()
        );

        let Some(archive_path) = self.source_archive(&candidate).await? else {
            warn!("no source yielded {piece_cid}");
            metrics::ACQUISITION_ATTEMPTS
                .with_label_values(&["sourcing_failed"])
                .inc();
            return Ok(AttemptOutcome::SourcingFailed { piece_cid });
        };

        let outcome = self.propose_and_commit(&piece_cid, &archive_path).await?;
        metrics::ACQUISITION_ATTEMPTS
            .with_label_values(&[outcome.label()])
            .inc();
        Ok(outcome)
    }

    /// Propose and commit a piece whose archive is already staged locally.
    ///
    /// Used by the directory watcher. Skips sourcing entirely; a piece
    /// already being attempted elsewhere is left alone.
    pub async fn acquire_staged(&self, piece_cid: &str) -> Result<AttemptOutcome, AcquisitionError> {
        let Some(_guard) = self.piece_locks.try_acquire(piece_cid) else {
            debug!("{piece_cid} already in progress, skipping staged attempt");
            return Ok(AttemptOutcome::Idle);
        };
        let Some(archive_path) = self.archive.local_archive(piece_cid).await else {
            debug!("staged archive for {piece_cid} disappeared before the attempt");
            return Ok(AttemptOutcome::Idle);
        };

        let outcome = self.propose_and_commit(piece_cid, &archive_path).await?;
        metrics::ACQUISITION_ATTEMPTS
            .with_label_values(&[outcome.label()])
            .inc();
        Ok(outcome)
    }

    /// Pick one eligible candidate at random and lock its piece.
    ///
    /// Eligibility: at or above the minimum padded size, at least one
    /// source, and not already in progress. Random order spreads
    /// concurrent workers across the list.
    fn select(&self, candidates: &[DealCandidate]) -> Option<(DealCandidate, PieceGuard)> {
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.shuffle(&mut rand::thread_rng());

        for idx in order {
            let candidate = &candidates[idx];
            if candidate.padded_piece_size < self.config.min_piece_size
                || candidate.sources.is_empty()
            {
                continue;
            }
            if let Some(guard) = self.piece_locks.try_acquire(&candidate.piece_cid) {
                return Some((candidate.clone(), guard));
            }
        }
        None
    }

    /// Produce an archive for the candidate, preferring a local copy.
    ///
    /// Sources are tried in order; each failed retrieval is cancelled
    /// best-effort before moving on. Returns `None` when every source is
    /// exhausted or over its admission ceiling.
    async fn source_archive(
        &self,
        candidate: &DealCandidate,
    ) -> Result<Option<PathBuf>, AcquisitionError> {
        let piece_cid = &candidate.piece_cid;
        if let Some(path) = self.archive.local_archive(piece_cid).await {
            info!("{piece_cid} already staged at {}", path.display());
            return Ok(Some(path));
        }

        let dest = self.archive.download_path(piece_cid);
        for source in &candidate.sources {
            let Some(_permit) = self.admission.try_acquire(&source.provider_id) else {
                debug!(
                    "{} at its concurrent retrieval ceiling, skipping source",
                    source.provider_id
                );
                continue;
            };

            metrics::RETRIEVALS_STARTED.inc();
            match self
                .monitor
                .retrieve(&source.provider_id, &source.original_payload_cid, &dest)
                .await
            {
                Ok(()) => {
                    metrics::RETRIEVALS_FINISHED
                        .with_label_values(&["completed"])
                        .inc();
                    info!("retrieved {piece_cid} from {}", source.provider_id);
                    return Ok(Some(dest));
                }
                Err(e) => {
                    metrics::RETRIEVALS_FINISHED
                        .with_label_values(&["failed"])
                        .inc();
                    warn!(
                        "retrieving {piece_cid} from {} failed: {e}",
                        source.provider_id
                    );
                    if let Err(cancel_err) = self
                        .monitor
                        .cancel_retrieval(&source.original_payload_cid)
                        .await
                    {
                        debug!("nothing to cancel for {piece_cid}: {cancel_err}");
                    }
                }
            }
        }
        Ok(None)
    }

    async fn propose_and_commit(
        &self,
        piece_cid: &str,
        archive_path: &Path,
    ) -> Result<AttemptOutcome, AcquisitionError> {
        let request = self
            .marketplace
            .request_deal(&self.provider, piece_cid)
            .await?;
        for line in &request.info_lines {
            debug!("coordinator: {line}");
        }
        if !request.accepted {
            debug!(
                "deal request for {piece_cid} declined (code {})",
                request.response_code
            );
            metrics::DEAL_REQUESTS.with_label_values(&["declined"]).inc();
            return Ok(AttemptOutcome::Declined {
                piece_cid: piece_cid.to_string(),
            });
        }
        metrics::DEAL_REQUESTS.with_label_values(&["accepted"]).inc();

        let proposal = self.await_confirmation(piece_cid).await?;
        self.commit(&proposal, archive_path).await?;
        metrics::DEALS_COMMITTED.inc();

        info!("{piece_cid} handed to deal execution");
        Ok(AttemptOutcome::Acquired {
            piece_cid: piece_cid.to_string(),
        })
    }

    /// Poll pending proposals until one for `piece_cid` shows up.
    ///
    /// The coordinator produces the signed proposal asynchronously after
    /// accepting a request; a poll failure counts as a retry rather than
    /// aborting the attempt.
    async fn await_confirmation(
        &self,
        piece_cid: &str,
    ) -> Result<PendingProposal, AcquisitionError> {
        for attempt in 0..self.config.poll_max_retries {
            match self.marketplace.pending_proposals(&self.provider).await {
                Ok(proposals) => {
                    if let Some(proposal) =
                        proposals.into_iter().find(|p| p.piece_cid == piece_cid)
                    {
                        debug!(
                            "proposal for {piece_cid} confirmed after {} polls",
                            attempt + 1
                        );
                        return Ok(proposal);
                    }
                }
                Err(e) => warn!("pending-proposal poll failed: {e}"),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
        Err(AcquisitionError::ConfirmTimeout {
            piece_cid: piece_cid.to_string(),
            retries: self.config.poll_max_retries,
        })
    }

    /// Hand the archive to deal execution.
    ///
    /// A proposal carrying a parseable deal uuid goes straight to the
    /// offline-deal path. Otherwise the uuid is looked up by proposal cid,
    /// and a deal with no record at all falls back to the legacy import.
    async fn commit(
        &self,
        proposal: &PendingProposal,
        archive_path: &Path,
    ) -> Result<(), AcquisitionError> {
        if let Ok(deal_uuid) = Uuid::parse_str(&proposal.deal_proposal_id) {
            return self
                .commit_offline(deal_uuid, &proposal.piece_cid, archive_path)
                .await;
        }

        match self
            .execution
            .lookup_deal_by_proposal(&proposal.deal_proposal_cid)
            .await?
        {
            Some(record) => {
                self.commit_offline(record.deal_uuid, &proposal.piece_cid, archive_path)
                    .await
            }
            None => {
                debug!(
                    "no deal record for {}, using legacy import",
                    proposal.deal_proposal_cid
                );
                self.execution
                    .import_legacy_deal(&proposal.deal_proposal_cid, archive_path)
                    .await?;
                Ok(())
            }
        }
    }

    async fn commit_offline(
        &self,
        deal_uuid: Uuid,
        piece_cid: &str,
        archive_path: &Path,
    ) -> Result<(), AcquisitionError> {
        let outcome = self
            .execution
            .commit_offline_deal(deal_uuid, archive_path)
            .await?;
        if outcome.rejected {
            return Err(AcquisitionError::DealRejected {
                piece_cid: piece_cid.to_string(),
                reason: outcome.reason,
            });
        }
        Ok(())
    }
}
