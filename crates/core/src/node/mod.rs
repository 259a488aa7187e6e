//! Chain node abstraction.
//!
//! Everything the scheduler needs from the provider's chain node: retrieval
//! offers and transfers, local import lookup, content export, and the
//! signing helpers behind marketplace authentication.

mod rpc;
mod types;

pub use rpc::RpcNodeClient;
pub use types::*;
