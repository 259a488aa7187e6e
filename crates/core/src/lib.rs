//! Core library for the dealbot daemon.
//!
//! Everything the daemon does lives here: the collaborator clients
//! (marketplace coordinator, chain node, deal execution), the candidate
//! cache and lock services, the acquisition pipeline and the background
//! scheduler. The binary crate only wires these together.

pub mod acquisition;
pub mod archive;
pub mod candidates;
pub mod config;
pub mod execution;
pub mod locks;
pub mod marketplace;
pub mod metrics;
pub mod node;
pub mod retrieval;
pub mod scheduler;
pub mod testing;

pub use acquisition::{AcquisitionConfig, AcquisitionError, AcquisitionPipeline, AttemptOutcome};
pub use candidates::CandidateCache;
pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use locks::{PieceLocks, ProviderAdmission};
pub use retrieval::{reconcile_on_startup, RetrievalMonitor, RetrievalMonitorConfig};
pub use scheduler::{DirectoryWatcher, Scheduler, SchedulerStatus, WorkerPoolConfig};
