//! TTL-bounded cache of the open-deal list.

mod cache;

pub use cache::CandidateCache;
