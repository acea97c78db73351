//! Bounded, sequenced log of resolver events.

use std::collections::VecDeque;

use outpost_protocol::WorldEvent;
use serde_json::{Map, Value};

/// Oldest entries are discarded beyond this many.
pub const MAX_WORLD_EVENTS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldEventKind {
    PlayerJoined,
    PlayerLeft,
    BlockBroken,
    BlockPlaced,
    CombatConfirmed,
    CombatRejected,
    PlayerHealed,
    PlayerDamaged,
    EntityDamaged,
    EntityDefeated,
    CraftCompleted,
    CraftRejected,
    ContainerActionApplied,
    ContainerActionRejected,
    Interaction,
    DirectiveApplied,
}

impl WorldEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlayerJoined => "player_joined",
            Self::PlayerLeft => "player_left",
            Self::BlockBroken => "block_broken",
            Self::BlockPlaced => "block_placed",
            Self::CombatConfirmed => "combat_confirmed",
            Self::CombatRejected => "combat_rejected",
            Self::PlayerHealed => "player_healed",
            Self::PlayerDamaged => "player_damaged",
            Self::EntityDamaged => "entity_damaged",
            Self::EntityDefeated => "entity_defeated",
            Self::CraftCompleted => "craft_completed",
            Self::CraftRejected => "craft_rejected",
            Self::ContainerActionApplied => "container_action_applied",
            Self::ContainerActionRejected => "container_action_rejected",
            Self::Interaction => "interaction",
            Self::DirectiveApplied => "directive_applied",
        }
    }
}

#[derive(Debug, Default)]
pub struct WorldEventLog {
    last_seq: u64,
    entries: VecDeque<WorldEvent>,
}

impl WorldEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return it. `payload` is kept only if it is a JSON
    /// object.
    pub fn record(
        &mut self,
        tick: u64,
        kind: WorldEventKind,
        player_id: Option<&str>,
        payload: Value,
    ) -> WorldEvent {
        self.last_seq += 1;
        let payload: Option<Map<String, Value>> = match payload {
            Value::Object(map) => Some(map),
            _ => None,
        };
        let event = WorldEvent {
            seq: self.last_seq,
            tick,
            kind: kind.as_str().to_string(),
            player_id: player_id.map(str::to_string),
            payload,
        };
        self.entries.push_back(event.clone());
        while self.entries.len() > MAX_WORLD_EVENTS {
            self.entries.pop_front();
        }
        event
    }

    /// Retained events with `seq` strictly greater than `seq`.
    pub fn events_since(&self, seq: u64) -> Vec<WorldEvent> {
        self.entries
            .iter()
            .filter(|event| event.seq > seq)
            .cloned()
            .collect()
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
