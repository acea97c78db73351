//! Wire contract shared by the local and networked runtimes.
//!
//! - [`types`]: payload records (snapshots, catalogs, action requests/results)
//! - [`envelope`]: `{type, payload}` messages and their validating decoder
//! - [`framing`]: length-prefixed frames for stream transports

pub mod envelope;
pub mod framing;
pub mod types;

pub use envelope::{
    ClientMessage, DecodeError, HotbarSelectPayload, InputPayload, LeavePayload, PlayerAction,
    ServerMessage,
};
pub use framing::{
    DEFAULT_MAX_FRAME_BYTES, FrameError, FrameLimits, read_envelope, read_frame, write_frame,
};
pub use types::*;

/// Container every player may use.
pub const WORLD_SHARED_CONTAINER_ID: &str = "world:camp-shared";

/// Prefix marking world-shared containers.
pub const WORLD_CONTAINER_PREFIX: &str = "world:";

/// Id of the stash only `player_id` may access.
pub fn private_container_id(player_id: &str) -> String {
    format!("player:{player_id}:stash")
}

/// Whether `player_id` may deposit into or withdraw from `container_id`.
pub fn can_access_container(player_id: &str, container_id: &str) -> bool {
    container_id.starts_with(WORLD_CONTAINER_PREFIX) || container_id == private_container_id(player_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_access_rules() {
        assert!(can_access_container("p1", WORLD_SHARED_CONTAINER_ID));
        assert!(can_access_container("p1", "world:anything"));
        assert!(can_access_container("p1", "player:p1:stash"));
        assert!(!can_access_container("p1", "player:p2:stash"));
        assert!(!can_access_container("p1", "camp-shared"));
    }
}
