//! Networked world runtime.
//!
//! [`NetworkedRuntime`] satisfies the same [`WorldRuntimeClient`] contract as
//! the local runtime but forwards every command to a remote peer over TCP
//! (length-prefixed JSON envelopes) and publishes whatever the peer sends.
//! Lost connections are retried after a fixed delay until disposal, and each
//! new connection starts with a replay of the known joins and inputs.
//!
//! [`WorldRuntimeClient`]: outpost_runtime::WorldRuntimeClient

pub mod connection;
pub mod reconnect;
pub mod runtime;
pub mod session;

pub use connection::{ConnectionState, ConnectionStateWatch};
pub use reconnect::{DEFAULT_RECONNECT_DELAY, FixedDelay};
pub use runtime::{NetSettings, NetworkedRuntime};
pub use session::SessionReplay;
