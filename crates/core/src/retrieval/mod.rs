//! Network retrieval supervision.
//!
//! [`RetrievalMonitor`] drives a single retrieval deal to completion under
//! an inactivity timeout, and applies the best-effort, time-boxed
//! cancellation policy when an attempt abandons a transfer. The
//! [`reconcile`] helpers clear in-flight state left over from a crash.

mod monitor;
mod reconcile;

pub use monitor::{RetrievalMonitor, RetrievalMonitorConfig};
pub use reconcile::reconcile_on_startup;

use thiserror::Error;

use crate::node::NodeError;

/// Errors that can end a supervised retrieval.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Offer from {provider} unusable: {message}")]
    BadOffer { provider: String, message: String },

    #[error("Offer price {price} attoFIL exceeds maximum {max}")]
    PriceTooHigh { price: u128, max: u128 },

    #[error("Retrieval timed out after {0:?} without progress")]
    InactivityTimeout(std::time::Duration),

    #[error("Retrieval proposal rejected: {0}")]
    Rejected(String),

    #[error("Retrieval cancelled: {0}")]
    Cancelled(String),

    #[error("Retrieval failed: {0}")]
    Failed(String),

    #[error("Retrieval event stream closed")]
    EventStreamClosed,

    #[error("No retrieval deal matches the payload")]
    NoMatchingRetrieval,

    #[error(transparent)]
    Node(#[from] NodeError),
}
