//! Payload types shared by every transport.
//!
//! Field names serialize as camelCase to match the JSON wire contract.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Session / kinematics
// ---------------------------------------------------------------------------

/// Request to add a player to the world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Seed of the world the player expects to join.
    pub world_seed: String,
    /// Stable player identifier.
    pub player_id: String,
    /// Spawn X coordinate.
    pub start_x: f64,
    /// Spawn Z coordinate.
    pub start_z: f64,
}

/// Per-player movement intent. `move_x`/`move_z` are normalized by the
/// simulator before integration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct InputState {
    pub move_x: f64,
    pub move_z: f64,
    pub running: bool,
    pub jump: bool,
}

impl InputState {
    /// Replace non-finite axis values with zero.
    pub fn sanitized(self) -> Self {
        Self {
            move_x: finite_or_zero(self.move_x),
            move_z: finite_or_zero(self.move_z),
            ..self
        }
    }

    /// Whether the input requests any movement.
    pub fn is_moving(&self) -> bool {
        self.move_x != 0.0 || self.move_z != 0.0
    }
}

/// Map NaN and infinities to zero.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// One player's entry in a [`WorldSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub player_id: String,
    pub x: f64,
    pub z: f64,
    /// Current scalar speed (zero while idle).
    #[serde(default)]
    pub speed: f64,
}

/// Complete kinematic summary emitted once per tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorldSnapshot {
    pub world_seed: String,
    pub tick: u64,
    pub players: BTreeMap<String, PlayerSnapshot>,
}

impl WorldSnapshot {
    /// Empty snapshot at tick zero.
    pub fn empty(world_seed: impl Into<String>) -> Self {
        Self {
            world_seed: world_seed.into(),
            tick: 0,
            players: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// Break or place.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BlockAction {
    Break,
    Place,
}

/// Chunk-local block coordinates supplied by the terrain layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct BlockPosition {
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Client request to break or place a block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockActionRequest {
    pub action: BlockAction,
    #[serde(flatten)]
    pub position: BlockPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<String>,
}

/// Confirmed block change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockDelta {
    pub action: BlockAction,
    #[serde(flatten)]
    pub position: BlockPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Per-player catalogs
// ---------------------------------------------------------------------------

/// Positionally addressed equippable slots with per-slot stacks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HotbarState {
    pub player_id: String,
    pub slot_ids: Vec<String>,
    pub stack_counts: Vec<u32>,
    pub selected_index: usize,
    pub tick: u64,
}

impl HotbarState {
    /// Index of `slot_id`, if equipped.
    pub fn slot_index(&self, slot_id: &str) -> Option<usize> {
        self.slot_ids.iter().position(|id| id == slot_id)
    }
}

/// Resource id to count.
pub type ResourceCounts = BTreeMap<String, u32>;

/// A player's resource inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryState {
    pub player_id: String,
    pub resources: ResourceCounts,
    pub tick: u64,
}

/// A player's hit points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthState {
    pub player_id: String,
    pub current: u32,
    pub max: u32,
    pub tick: u64,
}

/// Hit points of an NPC or wild creature, keyed by structured target id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntityHealthState {
    pub target_id: String,
    pub entity_type: String,
    pub current: u32,
    pub max: u32,
    /// Tick at which a defeated entity becomes available again; zero when alive.
    pub defeated_until_tick: u64,
    pub tick: u64,
}

/// A resource store addressable by a stable id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerState {
    pub container_id: String,
    pub resources: ResourceCounts,
    pub tick: u64,
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Machine-readable rejection codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidPayload,
    PlayerNotFound,
    SlotNotEquipped,
    InvalidSlotKind,
    InsufficientItem,
    TargetDefeated,
    MissingTarget,
    UnknownTarget,
    CooldownActive,
    TargetOutOfRange,
    InvalidRecipe,
    InsufficientResources,
    CraftTargetSlotMissing,
    ContainerForbidden,
    ContainerInsufficientResources,
    /// A code this build does not know about (remote peers may send newer ones).
    #[serde(other)]
    Unrecognized,
}

impl RejectReason {
    /// Wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPayload => "invalid_payload",
            Self::PlayerNotFound => "player_not_found",
            Self::SlotNotEquipped => "slot_not_equipped",
            Self::InvalidSlotKind => "invalid_slot_kind",
            Self::InsufficientItem => "insufficient_item",
            Self::TargetDefeated => "target_defeated",
            Self::MissingTarget => "missing_target",
            Self::UnknownTarget => "unknown_target",
            Self::CooldownActive => "cooldown_active",
            Self::TargetOutOfRange => "target_out_of_range",
            Self::InvalidRecipe => "invalid_recipe",
            Self::InsufficientResources => "insufficient_resources",
            Self::CraftTargetSlotMissing => "craft_target_slot_missing",
            Self::ContainerForbidden => "container_forbidden",
            Self::ContainerInsufficientResources => "container_insufficient_resources",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CombatActionKind {
    Melee,
    Spell,
    Item,
}

/// Use the item or ability in a hotbar slot, optionally against a target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CombatActionRequest {
    pub action_id: String,
    pub slot_id: String,
    pub kind: CombatActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_world_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_world_z: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CombatResult {
    pub action_id: String,
    pub player_id: String,
    pub slot_id: String,
    pub kind: CombatActionKind,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_world_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_world_z: Option<f64>,
    /// Set on `cooldown_active` rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_ms: Option<u64>,
    pub tick: u64,
}

/// Interact with a target (talk, use, inspect).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InteractRequest {
    pub action_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_world_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_world_z: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InteractResult {
    pub action_id: String,
    pub player_id: String,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_world_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_world_z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub tick: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CraftRequest {
    pub action_id: String,
    pub recipe_id: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CraftResult {
    pub action_id: String,
    pub player_id: String,
    pub recipe_id: String,
    pub count: i64,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    pub tick: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContainerOperation {
    Deposit,
    Withdraw,
}

/// Move resources between the caller's inventory and a container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerActionRequest {
    pub action_id: String,
    pub container_id: String,
    pub operation: ContainerOperation,
    pub resource_id: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerActionResult {
    pub action_id: String,
    pub player_id: String,
    pub container_id: String,
    pub operation: ContainerOperation,
    pub resource_id: String,
    pub amount: i64,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    pub tick: u64,
}

// ---------------------------------------------------------------------------
// Externally authored world state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorldFlagState {
    pub flags: BTreeMap<String, String>,
    pub tick: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpawnHint {
    pub hint_id: String,
    pub label: String,
    pub chunk_x: i32,
    pub chunk_z: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveState {
    pub story_beats: Vec<String>,
    pub spawn_hints: Vec<SpawnHint>,
    pub tick: u64,
}

/// Entry in the world event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorldEvent {
    pub seq: u64,
    pub tick: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Map<String, serde_json::Value>>,
}
