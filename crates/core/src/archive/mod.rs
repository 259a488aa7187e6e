//! Local archive storage.
//!
//! Archives are `.car` container files named after the piece they hold:
//! `<dir>/<piece_cid>.car`. Presence of a correctly named file is the only
//! check performed here; content mismatches surface at the commit step.

mod store;

pub use store::{ArchiveStore, FsArchiveStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed reading archive directory {dir}: {source}")]
    DirUnreadable {
        dir: String,
        #[source]
        source: std::io::Error,
    },
}
