//! Animation event reducer.
//!
//! A small pure state machine: presentation code feeds it locomotion and
//! action events stamped with a millisecond clock and reads back which
//! animation should be playing. Transient actions hold a priority lock for a
//! fixed duration; `death` holds it forever until an explicit reset.

use serde::{Deserialize, Serialize};

/// Lock value meaning "never expires".
pub const TERMINAL_LOCK_MS: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationAction {
    Idle,
    Walk,
    Run,
    AttackLight,
    AttackHeavy,
    Cast,
    HitReact,
    Interact,
    Death,
}

impl AnimationAction {
    pub fn priority(self) -> u8 {
        match self {
            Self::Death => 100,
            Self::HitReact => 90,
            Self::AttackHeavy => 80,
            Self::AttackLight => 70,
            Self::Cast => 65,
            Self::Interact => 60,
            Self::Run => 20,
            Self::Walk => 10,
            Self::Idle => 0,
        }
    }

    /// Lock duration in milliseconds; `None` for terminal actions.
    pub fn lock_duration_ms(self) -> Option<u64> {
        match self {
            Self::Idle | Self::Walk | Self::Run => Some(0),
            Self::AttackLight => Some(360),
            Self::AttackHeavy => Some(520),
            Self::Cast => Some(560),
            Self::HitReact => Some(280),
            Self::Interact => Some(320),
            Self::Death => None,
        }
    }

    pub fn is_locomotion(self) -> bool {
        matches!(self, Self::Idle | Self::Walk | Self::Run)
    }

    /// Sprite frames per second.
    pub fn frame_rate(self) -> u32 {
        match self {
            Self::Idle | Self::Death => 0,
            Self::Walk => 6,
            Self::Run => 10,
            Self::AttackLight => 12,
            Self::AttackHeavy => 10,
            Self::Cast | Self::HitReact | Self::Interact => 8,
        }
    }

    pub fn frame_count(self) -> u32 {
        match self {
            Self::Idle | Self::Death => 1,
            _ => 2,
        }
    }
}

/// Locomotion action for a movement sample.
pub fn locomotion_action(moving: bool, running: bool) -> AnimationAction {
    match (moving, running) {
        (false, _) => AnimationAction::Idle,
        (true, false) => AnimationAction::Walk,
        (true, true) => AnimationAction::Run,
    }
}

/// Sprite frame to show `elapsed_ms` after `action` started.
pub fn frame_index(action: AnimationAction, elapsed_ms: u64) -> u32 {
    let count = action.frame_count();
    let fps = action.frame_rate();
    if count <= 1 || fps == 0 {
        return 0;
    }
    let frame = elapsed_ms.saturating_mul(fps as u64) / 1000;
    (frame % count as u64) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationEvent {
    /// Movement sample from the kinematic state.
    Locomotion {
        moving: bool,
        running: bool,
        at_ms: u64,
    },
    /// Transient action such as an attack. Locomotion actions passed here
    /// behave like any other action with their (zero) lock.
    Action { action: AnimationAction, at_ms: u64 },
    /// Return to idle, clearing any lock including death.
    Reset { at_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationState {
    pub action: AnimationAction,
    /// Latest locomotion sample, tracked even while an action holds the lock.
    pub locomotion: AnimationAction,
    pub action_started_at_ms: u64,
    pub locked_until_ms: u64,
    /// Incremented whenever `action` changes.
    pub sequence: u64,
}

impl AnimationState {
    pub fn new(at_ms: u64) -> Self {
        Self {
            action: AnimationAction::Idle,
            locomotion: AnimationAction::Idle,
            action_started_at_ms: at_ms,
            locked_until_ms: at_ms,
            sequence: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.action == AnimationAction::Death
    }

    fn is_locked_at(&self, at_ms: u64) -> bool {
        self.locked_until_ms > at_ms
    }

    /// Frame of the current action at `now_ms`.
    pub fn frame_at(&self, now_ms: u64) -> u32 {
        frame_index(self.action, now_ms.saturating_sub(self.action_started_at_ms))
    }

    /// Apply one event and return the next state.
    pub fn reduce(self, event: AnimationEvent) -> Self {
        match event {
            AnimationEvent::Reset { at_ms } => Self::new(at_ms),
            _ if self.is_terminal() => self,
            AnimationEvent::Locomotion {
                moving,
                running,
                at_ms,
            } => {
                let locomotion = locomotion_action(moving, running);
                let next = Self { locomotion, ..self };
                if self.is_locked_at(at_ms) || self.action == locomotion {
                    return next;
                }
                Self {
                    action: locomotion,
                    action_started_at_ms: at_ms,
                    locked_until_ms: at_ms,
                    sequence: self.sequence + 1,
                    ..next
                }
            }
            AnimationEvent::Action { action, at_ms } => {
                if self.is_locked_at(at_ms) && action.priority() <= self.action.priority() {
                    return self;
                }
                let locked_until_ms = match action.lock_duration_ms() {
                    Some(duration) => at_ms.saturating_add(duration),
                    None => TERMINAL_LOCK_MS,
                };
                Self {
                    action,
                    action_started_at_ms: at_ms,
                    locked_until_ms,
                    sequence: self.sequence + 1,
                    ..self
                }
            }
        }
    }
}

impl Default for AnimationState {
    fn default() -> Self {
        Self::new(0)
    }
}
