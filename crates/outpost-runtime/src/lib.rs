//! World runtime core: the client contract, subscriber fan-out, the action
//! resolver and the in-process [`LocalRuntime`].
//!
//! Game code talks to a `dyn` [`WorldRuntimeClient`]; the local runtime here
//! and the networked one in `outpost-net` both satisfy it and publish through
//! a [`SubscriberHub`].

pub mod catalog;
pub mod client;
pub mod directives;
pub mod events;
pub mod hub;
pub mod local;
pub mod resolver;

pub use client::WorldRuntimeClient;
pub use directives::{Directive, DirectiveBook, SpawnHintAction};
pub use events::{WorldEventKind, WorldEventLog};
pub use hub::{Listener, SubscriberHub, Subscription, listener, should_accept_snapshot};
pub use local::LocalRuntime;
pub use resolver::{ActionResolver, Outbox};
