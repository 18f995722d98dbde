//! Spotify session: token lifecycle and authenticated resource calls
//!
//! [`TokenManager`] decides when a credential needs refreshing and makes sure
//! only one refresh runs at a time. [`AuthenticatedClient`] wraps resource
//! calls with a fresh bearer token and a single forced-refresh retry on 401.

pub mod client;
pub mod error;
pub mod manager;

#[cfg(test)]
mod testing;

pub use client::{AuthenticatedClient, MAX_ATTEMPTS, OutboundCall, Payload, UpstreamResponse};
pub use error::{CallError, Result};
pub use manager::{MAX_PENDING_STATES, STATE_TTL, TokenManager};
