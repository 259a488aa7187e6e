//! Marketplace coordinator abstraction.
//!
//! The coordinator publishes the open-deal list, accepts deal requests and
//! reports pending proposals. Every call is authenticated with a freshly
//! computed, time-boxed signed token (see [`auth`]).

mod auth;
mod http;
mod types;

pub use auth::{AuthTokenProvider, SpidAuthProvider};
pub use http::HttpMarketplace;
pub use types::*;
