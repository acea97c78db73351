//! Externally authored world flags, story beats and spawn hints.

use std::collections::{BTreeMap, VecDeque};

use outpost_protocol::{DirectiveState, SpawnHint, WorldFlagState};
use serde::{Deserialize, Serialize};

pub const MAX_STORY_BEATS: usize = 32;
pub const DEFAULT_SPAWN_HINT_TTL_TICKS: u64 = 600;
pub const MAX_SPAWN_HINT_TTL_TICKS: u64 = 4_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnHintAction {
    #[default]
    Upsert,
    Remove,
}

/// A directive from the narrative side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    SetWorldFlag {
        key: String,
        value: String,
    },
    EmitStoryBeat {
        beat: String,
    },
    #[serde(rename_all = "camelCase")]
    SpawnHint {
        hint_id: String,
        #[serde(default)]
        action: SpawnHintAction,
        #[serde(default)]
        label: String,
        #[serde(default)]
        chunk_x: Option<i32>,
        #[serde(default)]
        chunk_z: Option<i32>,
        #[serde(default)]
        ttl_ticks: Option<u64>,
    },
}

impl Directive {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetWorldFlag { .. } => "set_world_flag",
            Self::EmitStoryBeat { .. } => "emit_story_beat",
            Self::SpawnHint { .. } => "spawn_hint",
        }
    }
}

/// Which published states a directive changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectiveChange {
    pub flags: bool,
    pub directives: bool,
}

#[derive(Debug, Clone)]
struct HintEntry {
    hint: SpawnHint,
    expire_tick: u64,
}

#[derive(Debug, Default)]
pub struct DirectiveBook {
    flags: BTreeMap<String, String>,
    flags_tick: u64,
    story_beats: VecDeque<String>,
    hints: BTreeMap<String, HintEntry>,
    directives_tick: u64,
}

impl DirectiveBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, directive: &Directive, tick: u64) -> DirectiveChange {
        let mut change = DirectiveChange::default();
        match directive {
            Directive::SetWorldFlag { key, value } => {
                let key = key.trim();
                if !key.is_empty() && self.flags.get(key) != Some(value) {
                    self.flags.insert(key.to_string(), value.clone());
                    change.flags = true;
                }
            }
            Directive::EmitStoryBeat { beat } => {
                let beat = beat.trim();
                if !beat.is_empty() {
                    self.story_beats.push_back(beat.to_string());
                    while self.story_beats.len() > MAX_STORY_BEATS {
                        self.story_beats.pop_front();
                    }
                    change.directives = true;
                }
            }
            Directive::SpawnHint {
                hint_id,
                action,
                label,
                chunk_x,
                chunk_z,
                ttl_ticks,
            } => {
                let hint_id = hint_id.trim();
                if hint_id.is_empty() {
                    return change;
                }
                match (action, chunk_x, chunk_z) {
                    (SpawnHintAction::Remove, _, _) => {
                        change.directives = self.hints.remove(hint_id).is_some();
                    }
                    (SpawnHintAction::Upsert, Some(chunk_x), Some(chunk_z)) => {
                        let label = match label.trim() {
                            "" => "spawn_hint",
                            trimmed => trimmed,
                        };
                        let ttl = ttl_ticks
                            .filter(|ttl| *ttl > 0)
                            .unwrap_or(DEFAULT_SPAWN_HINT_TTL_TICKS)
                            .min(MAX_SPAWN_HINT_TTL_TICKS);
                        let entry = HintEntry {
                            hint: SpawnHint {
                                hint_id: hint_id.to_string(),
                                label: label.to_string(),
                                chunk_x: *chunk_x,
                                chunk_z: *chunk_z,
                            },
                            expire_tick: tick + ttl,
                        };
                        let unchanged = self.hints.get(hint_id).is_some_and(|current| {
                            current.hint == entry.hint && current.expire_tick == entry.expire_tick
                        });
                        self.hints.insert(hint_id.to_string(), entry);
                        change.directives = !unchanged;
                    }
                    // An upsert without coordinates is ignored.
                    (SpawnHintAction::Upsert, _, _) => {}
                }
            }
        }
        if change.flags {
            self.flags_tick = tick;
        }
        if change.directives {
            self.directives_tick = tick;
        }
        change
    }

    /// Drop hints whose lifetime has ended. Returns `true` if any were removed.
    pub fn prune_expired(&mut self, tick: u64) -> bool {
        let before = self.hints.len();
        self.hints.retain(|_, entry| tick < entry.expire_tick);
        let pruned = self.hints.len() != before;
        if pruned {
            self.directives_tick = tick;
        }
        pruned
    }

    pub fn flag_state(&self) -> WorldFlagState {
        WorldFlagState {
            flags: self.flags.clone(),
            tick: self.flags_tick,
        }
    }

    /// Beats oldest first; hints sorted by id.
    pub fn directive_state(&self) -> DirectiveState {
        DirectiveState {
            story_beats: self.story_beats.iter().cloned().collect(),
            spawn_hints: self.hints.values().map(|entry| entry.hint.clone()).collect(),
            tick: self.directives_tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(id: &str, ttl: Option<u64>) -> Directive {
        Directive::SpawnHint {
            hint_id: id.to_string(),
            action: SpawnHintAction::Upsert,
            label: String::new(),
            chunk_x: Some(1),
            chunk_z: Some(-1),
            ttl_ticks: ttl,
        }
    }

    #[test]
    fn test_flags_change_only_on_new_value() {
        let mut book = DirectiveBook::new();
        let set = Directive::SetWorldFlag {
            key: "gate".to_string(),
            value: "open".to_string(),
        };
        assert!(book.apply(&set, 3).flags);
        assert!(!book.apply(&set, 4).flags);
        assert_eq!(book.flag_state().flags["gate"], "open");
        assert_eq!(book.flag_state().tick, 3);
    }

    #[test]
    fn test_story_beats_keep_most_recent() {
        let mut book = DirectiveBook::new();
        for i in 0..40 {
            book.apply(&Directive::EmitStoryBeat { beat: format!("beat {i}") }, i);
        }
        assert!(!book.apply(&Directive::EmitStoryBeat { beat: "  ".to_string() }, 41).directives);
        let state = book.directive_state();
        assert_eq!(state.story_beats.len(), MAX_STORY_BEATS);
        assert_eq!(state.story_beats[0], "beat 8");
        assert_eq!(state.story_beats[31], "beat 39");
    }

    #[test]
    fn test_spawn_hint_expiry_and_removal() {
        let mut book = DirectiveBook::new();
        book.apply(&hint("b", None), 10);
        book.apply(&hint("a", Some(5)), 10);
        let state = book.directive_state();
        assert_eq!(state.spawn_hints[0].hint_id, "a");
        assert_eq!(state.spawn_hints[1].label, "spawn_hint");

        assert!(!book.prune_expired(14));
        assert!(book.prune_expired(15));
        assert_eq!(book.directive_state().spawn_hints.len(), 1);
        assert!(book.prune_expired(610));
        assert!(book.directive_state().spawn_hints.is_empty());

        book.apply(&hint("c", Some(1_000_000)), 0);
        assert!(!book.prune_expired(3_999));
        assert!(book.prune_expired(4_000));

        book.apply(&hint("d", None), 0);
        let remove = Directive::SpawnHint {
            hint_id: "d".to_string(),
            action: SpawnHintAction::Remove,
            label: String::new(),
            chunk_x: None,
            chunk_z: None,
            ttl_ticks: None,
        };
        assert!(book.apply(&remove, 1).directives);
        assert!(!book.apply(&remove, 2).directives);
    }

    #[test]
    fn test_directive_json_shape() {
        let directive: Directive = serde_json::from_str(
            r#"{"type":"spawn_hint","hintId":"h1","label":"Ruins","chunkX":2,"chunkZ":3,"ttlTicks":40}"#,
        )
        .unwrap();
        assert_eq!(directive.kind(), "spawn_hint");
        let remove: Directive =
            serde_json::from_str(r#"{"type":"spawn_hint","hintId":"h1","action":"remove"}"#).unwrap();
        assert!(matches!(
            remove,
            Directive::SpawnHint {
                action: SpawnHintAction::Remove,
                ..
            }
        ));
    }
}
