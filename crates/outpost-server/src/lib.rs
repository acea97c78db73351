//! Authoritative world server for networked runtimes.
//!
//! - [`connections`]: connection ids and the broadcast registry
//! - [`server`]: accept loop and per-connection message pumps

pub mod connections;
pub mod server;

pub use connections::{ConnectionId, ConnectionMap, IdGenerator};
pub use server::{DEFAULT_MAX_CONNECTIONS, ServerError, ServerSettings, WorldServer};
