//! Concurrency guards shared across acquisition attempts.
//!
//! Two independent services: a per-piece mutual-exclusion set and a
//! per-counterparty admission counter. Both hand out RAII guards, so a
//! release happens exactly once on every exit path, including panics and
//! early returns.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Per-piece mutual exclusion.
///
/// At most one live [`PieceGuard`] exists per piece id process-wide.
/// Entries are created lazily and never removed; the id space touched is
/// bounded by the candidate list.
#[derive(Debug, Default)]
pub struct PieceLocks {
    in_progress: Arc<Mutex<HashSet<String>>>,
}

/// Holds a piece in-progress until dropped.
#[derive(Debug)]
pub struct PieceGuard {
    piece_cid: String,
    in_progress: Arc<Mutex<HashSet<String>>>,
}

impl PieceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `piece_cid` in progress, or return `None` if another attempt
    /// already holds it.
    pub fn try_acquire(&self, piece_cid: &str) -> Option<PieceGuard> {
        let mut set = self.in_progress.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(piece_cid.to_string()) {
            return None;
        }
        Some(PieceGuard {
            piece_cid: piece_cid.to_string(),
            in_progress: Arc::clone(&self.in_progress),
        })
    }

    /// Whether `piece_cid` is currently held.
    pub fn is_held(&self, piece_cid: &str) -> bool {
        self.in_progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(piece_cid)
    }
}

impl PieceGuard {
    /// Piece this guard covers.
    pub fn piece_cid(&self) -> &str {
        &self.piece_cid
    }
}

impl Drop for PieceGuard {
    fn drop(&mut self) {
        self.in_progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.piece_cid);
    }
}

/// Per-counterparty admission counter with a shared ceiling.
///
/// The check-then-increment is atomic under one mutex, so concurrent
/// callers can never drive a counterparty past the ceiling.
#[derive(Debug)]
pub struct ProviderAdmission {
    max_per_provider: u32,
    in_flight: Arc<Mutex<HashMap<String, u32>>>,
}

/// One admitted retrieval slot; returned on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    provider: String,
    in_flight: Arc<Mutex<HashMap<String, u32>>>,
}

impl ProviderAdmission {
    pub fn new(max_per_provider: u32) -> Self {
        Self {
            max_per_provider,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Claim a slot against `provider`, or return `None` at the ceiling.
    pub fn try_acquire(&self, provider: &str) -> Option<AdmissionPermit> {
        let mut counts = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let count = counts.entry(provider.to_string()).or_insert(0);
        if *count >= self.max_per_provider {
            return None;
        }
        *count += 1;
        Some(AdmissionPermit {
            provider: provider.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Current in-flight count for `provider`.
    pub fn in_flight(&self, provider: &str) -> u32 {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(provider)
            .copied()
            .unwrap_or(0)
    }
}

impl AdmissionPermit {
    /// Counterparty this permit counts against.
    pub fn provider(&self) -> &str {
        &self.provider
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        let mut counts = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = counts.get_mut(&self.provider) {
            *count = count.saturating_sub(1);
        }
    }
}
