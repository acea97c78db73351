//! `{type, payload}` envelopes for both directions of the channel.
//!
//! Decoding is strict: the JSON must be an object with a known `type`, the
//! payload must match that type's shape, and a handful of cross-field
//! invariants are checked afterwards. Callers at the transport boundary drop
//! anything that fails with a [`DecodeError`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::*;

/// An action payload tagged with the acting player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAction<T> {
    pub player_id: String,
    #[serde(flatten)]
    pub action: T,
}

impl<T> PlayerAction<T> {
    pub fn new(player_id: impl Into<String>, action: T) -> Self {
        Self {
            player_id: player_id.into(),
            action,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeavePayload {
    pub player_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputPayload {
    pub player_id: String,
    pub input: InputState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HotbarSelectPayload {
    pub player_id: String,
    pub slot_index: i64,
}

/// Client to world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    Join(JoinRequest),
    Leave(LeavePayload),
    Input(InputPayload),
    BlockAction(PlayerAction<BlockActionRequest>),
    HotbarSelect(HotbarSelectPayload),
    CraftRequest(PlayerAction<CraftRequest>),
    ContainerAction(PlayerAction<ContainerActionRequest>),
    CombatAction(PlayerAction<CombatActionRequest>),
    InteractAction(PlayerAction<InteractRequest>),
}

/// World to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    Snapshot(WorldSnapshot),
    BlockDelta(BlockDelta),
    HotbarState(HotbarState),
    InventoryState(InventoryState),
    HealthState(HealthState),
    CraftResult(CraftResult),
    ContainerState(ContainerState),
    ContainerResult(ContainerActionResult),
    CombatResult(CombatResult),
    InteractResult(InteractResult),
    WorldFlagState(WorldFlagState),
    WorldDirectiveState(DirectiveState),
    WorldEvent(WorldEvent),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("envelope is not a JSON object")]
    NotAnObject,

    #[error("envelope has no string `type` field")]
    MissingType,

    #[error("unknown message type '{0}'")]
    UnknownType(String),

    #[error("invalid payload for '{kind}': {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("payload for '{kind}' violates invariant: {detail}")]
    Invariant { kind: &'static str, detail: String },
}

impl ClientMessage {
    pub const KINDS: [&'static str; 9] = [
        "join",
        "leave",
        "input",
        "block_action",
        "hotbar_select",
        "craft_request",
        "container_action",
        "combat_action",
        "interact_action",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::Leave(_) => "leave",
            Self::Input(_) => "input",
            Self::BlockAction(_) => "block_action",
            Self::HotbarSelect(_) => "hotbar_select",
            Self::CraftRequest(_) => "craft_request",
            Self::ContainerAction(_) => "container_action",
            Self::CombatAction(_) => "combat_action",
            Self::InteractAction(_) => "interact_action",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        decode_envelope(text, &Self::KINDS)
    }
}

impl ServerMessage {
    pub const KINDS: [&'static str; 13] = [
        "snapshot",
        "block_delta",
        "hotbar_state",
        "inventory_state",
        "health_state",
        "craft_result",
        "container_state",
        "container_result",
        "combat_result",
        "interact_result",
        "world_flag_state",
        "world_directive_state",
        "world_event",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::BlockDelta(_) => "block_delta",
            Self::HotbarState(_) => "hotbar_state",
            Self::InventoryState(_) => "inventory_state",
            Self::HealthState(_) => "health_state",
            Self::CraftResult(_) => "craft_result",
            Self::ContainerState(_) => "container_state",
            Self::ContainerResult(_) => "container_result",
            Self::CombatResult(_) => "combat_result",
            Self::InteractResult(_) => "interact_result",
            Self::WorldFlagState(_) => "world_flag_state",
            Self::WorldDirectiveState(_) => "world_directive_state",
            Self::WorldEvent(_) => "world_event",
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let message: Self = decode_envelope(text, &Self::KINDS)?;
        message.check_invariants()?;
        Ok(message)
    }

    fn check_invariants(&self) -> Result<(), DecodeError> {
        let kind = self.kind();
        let violation = |detail: String| Err(DecodeError::Invariant { kind, detail });
        match self {
            Self::HotbarState(state) => {
                if state.stack_counts.len() != state.slot_ids.len() {
                    return violation(format!(
                        "{} stack counts for {} slots",
                        state.stack_counts.len(),
                        state.slot_ids.len()
                    ));
                }
                if !state.slot_ids.is_empty() && state.selected_index >= state.slot_ids.len() {
                    return violation(format!("selected index {} out of range", state.selected_index));
                }
            }
            Self::HealthState(state) => {
                if state.max == 0 || state.current > state.max {
                    return violation(format!("health {}/{}", state.current, state.max));
                }
            }
            Self::Snapshot(snapshot) => {
                if let Some((key, player)) = snapshot
                    .players
                    .iter()
                    .find(|(key, player)| **key != player.player_id)
                {
                    return violation(format!("entry '{key}' holds player '{}'", player.player_id));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn decode_envelope<T: DeserializeOwned>(text: &str, known: &[&str]) -> Result<T, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(DecodeError::InvalidJson)?;
    let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?;
    if !known.contains(&kind) {
        return Err(DecodeError::UnknownType(kind.to_string()));
    }
    let kind = kind.to_string();
    serde_json::from_value(value).map_err(|source| DecodeError::InvalidPayload { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_envelope_shape() {
        let message = ClientMessage::Join(JoinRequest {
            world_seed: "seed".to_string(),
            player_id: "p1".to_string(),
            start_x: 1.5,
            start_z: -2.0,
        });
        let value: Value = serde_json::from_str(&message.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "join");
        assert_eq!(value["payload"]["worldSeed"], "seed");
        assert_eq!(value["payload"]["startZ"], -2.0);
    }

    #[test]
    fn test_action_payload_carries_player_id_inline() {
        let message = ClientMessage::CraftRequest(PlayerAction::new(
            "p1",
            CraftRequest {
                action_id: "a1".to_string(),
                recipe_id: "craft-bandage".to_string(),
                count: 1,
            },
        ));
        let value: Value = serde_json::from_str(&message.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "craft_request");
        assert_eq!(value["payload"]["playerId"], "p1");
        assert_eq!(value["payload"]["recipeId"], "craft-bandage");
    }

    #[test]
    fn test_block_action_decodes_from_foreign_json() {
        let text = r#"{"type":"block_action","payload":{"playerId":"p1","action":"place",
            "chunkX":0,"chunkZ":1,"x":2,"y":3,"z":4,"blockType":"stone"}}"#;
        let Ok(ClientMessage::BlockAction(action)) = ClientMessage::decode(text) else {
            panic!("expected block action");
        };
        assert_eq!(action.player_id, "p1");
        assert_eq!(action.action.position.y, 3);
        assert_eq!(action.action.block_type.as_deref(), Some("stone"));
    }

    #[test]
    fn test_rejects_non_object_and_missing_type() {
        assert!(matches!(ServerMessage::decode("[1,2]"), Err(DecodeError::NotAnObject)));
        assert!(matches!(
            ServerMessage::decode(r#"{"payload":{}}"#),
            Err(DecodeError::MissingType)
        ));
        assert!(matches!(ServerMessage::decode("not json"), Err(DecodeError::InvalidJson(_))));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = ServerMessage::decode(r#"{"type":"weather","payload":{}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownType(kind) if kind == "weather"));
        // Client kinds are not valid in the server direction.
        assert!(matches!(
            ServerMessage::decode(r#"{"type":"join","payload":{}}"#),
            Err(DecodeError::UnknownType(_))
        ));
    }

    #[test]
    fn test_wrong_field_type_rejected() {
        let text = r#"{"type":"snapshot","payload":{"worldSeed":"s","tick":"four","players":{}}}"#;
        assert!(matches!(
            ServerMessage::decode(text),
            Err(DecodeError::InvalidPayload { kind, .. }) if kind == "snapshot"
        ));
    }

    #[test]
    fn test_hotbar_length_mismatch_rejected() {
        let text = r#"{"type":"hotbar_state","payload":{"playerId":"p1",
            "slotIds":["a","b"],"stackCounts":[1],"selectedIndex":0,"tick":3}}"#;
        assert!(matches!(
            ServerMessage::decode(text),
            Err(DecodeError::Invariant { kind: "hotbar_state", .. })
        ));
    }

    #[test]
    fn test_health_over_max_rejected() {
        let text = r#"{"type":"health_state","payload":{"playerId":"p1","current":11,"max":10,"tick":0}}"#;
        assert!(ServerMessage::decode(text).is_err());
    }

    #[test]
    fn test_snapshot_decodes() {
        let text = r#"{"type":"snapshot","payload":{"worldSeed":"s","tick":4,
            "players":{"p1":{"playerId":"p1","x":1.0,"z":2.0,"speed":6.0}}}}"#;
        let Ok(ServerMessage::Snapshot(snapshot)) = ServerMessage::decode(text) else {
            panic!("expected snapshot");
        };
        assert_eq!(snapshot.tick, 4);
        assert_eq!(snapshot.players["p1"].speed, 6.0);
    }

    #[test]
    fn test_rejection_reason_survives_encoding() {
        let message = ServerMessage::ContainerResult(ContainerActionResult {
            action_id: "a".to_string(),
            player_id: "p1".to_string(),
            container_id: "player:p2:stash".to_string(),
            operation: ContainerOperation::Withdraw,
            resource_id: "wood".to_string(),
            amount: 1,
            accepted: false,
            reason: Some(RejectReason::ContainerForbidden),
            tick: 9,
        });
        let decoded = ServerMessage::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
    }
}
