//! The deal acquisition pipeline.
//!
//! One [`AcquisitionPipeline::run_attempt`] call takes a candidate from
//! selection through sourcing, proposal, confirmation and hand-off to deal
//! execution. Worker tasks call it in a loop; the directory watcher uses
//! the shorter [`AcquisitionPipeline::acquire_staged`] path for archives
//! that are already on disk.

mod pipeline;

pub use pipeline::{AcquisitionConfig, AcquisitionPipeline, AttemptOutcome};

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::execution::ExecutionError;
use crate::marketplace::MarketplaceError;

/// Errors that abort an acquisition attempt.
///
/// Expected per-candidate outcomes (declines, failed sourcing) are
/// reported through [`AttemptOutcome`] instead; these are infrastructure
/// failures the caller may want to back off on.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Proposal for {piece_cid} never confirmed after {retries} polls")]
    ConfirmTimeout { piece_cid: String, retries: u32 },

    #[error("Deal execution rejected {piece_cid}: {reason}")]
    DealRejected { piece_cid: String, reason: String },

    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}
