//! Deal-execution service abstraction.
//!
//! The execution service (the provider's deal engine) takes a confirmed
//! proposal plus a local archive and schedules the deal for sealing.

mod rpc;
mod types;

pub use rpc::RpcDealExecution;
pub use types::*;
