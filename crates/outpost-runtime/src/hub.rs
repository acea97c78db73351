//! Per-kind subscriber fan-out with last-known-state replay.
//!
//! Both runtimes publish every world-to-client message through a
//! [`SubscriberHub`]. The hub keeps the latest snapshot, per-player hotbar,
//! inventory and health, per-id container, world-flag and directive state, and
//! replays it to a listener as soon as it subscribes. Snapshots that would move a
//! subscriber backwards in time are dropped here.
//!
//! Listeners are always invoked with the hub lock released, so a listener may
//! subscribe or unsubscribe from inside a callback.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use outpost_protocol::{
    BlockDelta, CombatResult, ContainerActionResult, ContainerState, CraftResult, DirectiveState,
    HealthState, HotbarState, InteractResult, InventoryState, ServerMessage, WorldEvent,
    WorldFlagState, WorldSnapshot,
};

/// Callback for one message kind.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<T>(f: impl Fn(&T) + Send + Sync + 'static) -> Listener<T> {
    Arc::new(f)
}

type ErasedListener = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

/// A snapshot is accepted when it belongs to the same world and does not go
/// back in time.
pub fn should_accept_snapshot(current: &WorldSnapshot, next: &WorldSnapshot) -> bool {
    next.world_seed == current.world_seed && next.tick >= current.tick
}

#[derive(Default)]
struct Retained {
    snapshot: Option<WorldSnapshot>,
    hotbars: BTreeMap<String, HotbarState>,
    inventories: BTreeMap<String, InventoryState>,
    health: BTreeMap<String, HealthState>,
    containers: BTreeMap<String, ContainerState>,
    flags: Option<WorldFlagState>,
    directives: Option<DirectiveState>,
}

impl Retained {
    /// Store `message` if it is retained state. Returns `false` for a
    /// snapshot that must not be delivered.
    fn record(&mut self, message: &ServerMessage) -> bool {
        match message {
            ServerMessage::Snapshot(next) => {
                if let Some(current) = &self.snapshot
                    && !should_accept_snapshot(current, next)
                {
                    return false;
                }
                self.snapshot = Some(next.clone());
            }
            ServerMessage::HotbarState(state) => {
                self.hotbars.insert(state.player_id.clone(), state.clone());
            }
            ServerMessage::InventoryState(state) => {
                self.inventories.insert(state.player_id.clone(), state.clone());
            }
            ServerMessage::HealthState(state) => {
                self.health.insert(state.player_id.clone(), state.clone());
            }
            ServerMessage::ContainerState(state) => {
                self.containers.insert(state.container_id.clone(), state.clone());
            }
            ServerMessage::WorldFlagState(state) => self.flags = Some(state.clone()),
            ServerMessage::WorldDirectiveState(state) => self.directives = Some(state.clone()),
            _ => {}
        }
        true
    }

    fn replay(&self, kind: &str) -> Vec<ServerMessage> {
        match kind {
            "snapshot" => self.snapshot.iter().cloned().map(ServerMessage::Snapshot).collect(),
            "hotbar_state" => self
                .hotbars
                .values()
                .cloned()
                .map(ServerMessage::HotbarState)
                .collect(),
            "inventory_state" => self
                .inventories
                .values()
                .cloned()
                .map(ServerMessage::InventoryState)
                .collect(),
            "health_state" => self
                .health
                .values()
                .cloned()
                .map(ServerMessage::HealthState)
                .collect(),
            "container_state" => self
                .containers
                .values()
                .cloned()
                .map(ServerMessage::ContainerState)
                .collect(),
            "world_flag_state" => self
                .flags
                .iter()
                .cloned()
                .map(ServerMessage::WorldFlagState)
                .collect(),
            "world_directive_state" => self
                .directives
                .iter()
                .cloned()
                .map(ServerMessage::WorldDirectiveState)
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    listeners: HashMap<&'static str, Vec<(u64, ErasedListener)>>,
    retained: Retained,
}

/// Shared handle; clones refer to the same listener sets.
#[derive(Clone, Default)]
pub struct SubscriberHub {
    state: Arc<Mutex<HubState>>,
}

/// Handle returned by every subscribe call.
pub struct Subscription {
    hub: Weak<Mutex<HubState>>,
    kind: &'static str,
    id: u64,
}

impl Subscription {
    /// Stop delivering to this listener. Has no effect once the hub is gone.
    pub fn unsubscribe(self) {
        if let Some(state) = self.hub.upgrade() {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(listeners) = state.listeners.get_mut(self.kind) {
                listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `message` as last-known state without notifying anyone.
    pub fn retain(&self, message: &ServerMessage) {
        self.lock().retained.record(message);
    }

    /// Record and deliver `message`. Returns `false` if it was dropped.
    pub fn publish(&self, message: &ServerMessage) -> bool {
        let listeners: Vec<ErasedListener> = {
            let mut state = self.lock();
            if !state.retained.record(message) {
                return false;
            }
            state
                .listeners
                .get(message.kind())
                .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default()
        };
        for listener in listeners {
            listener(message);
        }
        true
    }

    /// Latest accepted snapshot.
    pub fn latest_snapshot(&self) -> Option<WorldSnapshot> {
        self.lock().retained.snapshot.clone()
    }

    /// Drop retained hotbar, inventory and health state for a player that left.
    pub fn forget_player(&self, player_id: &str) {
        let mut state = self.lock();
        state.retained.hotbars.remove(player_id);
        state.retained.inventories.remove(player_id);
        state.retained.health.remove(player_id);
    }

    /// Remove every listener. Retained state is kept.
    pub fn clear(&self) {
        self.lock().listeners.clear();
    }

    pub fn listener_count(&self, kind: &str) -> usize {
        self.lock().listeners.get(kind).map_or(0, Vec::len)
    }

    fn subscribe_erased(&self, kind: &'static str, listener: ErasedListener) -> Subscription {
        let (id, replay) = {
            let mut state = self.lock();
            state.next_id += 1;
            let id = state.next_id;
            state
                .listeners
                .entry(kind)
                .or_default()
                .push((id, Arc::clone(&listener)));
            (id, state.retained.replay(kind))
        };
        for message in &replay {
            listener(message);
        }
        Subscription {
            hub: Arc::downgrade(&self.state),
            kind,
            id,
        }
    }

    fn subscribe_to<T: 'static>(
        &self,
        kind: &'static str,
        listener: Listener<T>,
        extract: fn(&ServerMessage) -> Option<&T>,
    ) -> Subscription {
        self.subscribe_erased(
            kind,
            Arc::new(move |message: &ServerMessage| {
                if let Some(payload) = extract(message) {
                    listener(payload);
                }
            }),
        )
    }

    pub fn subscribe_snapshots(&self, listener: Listener<WorldSnapshot>) -> Subscription {
        self.subscribe_to("snapshot", listener, |m| match m {
            ServerMessage::Snapshot(p) => Some(p),
            _ => None,
        })
    }

    pub fn subscribe_block_deltas(&self, listener: Listener<BlockDelta>) -> Subscription {
        self.subscribe_to("block_delta", listener, |m| match m {
            ServerMessage::BlockDelta(p) => Some(p),
            _ => None,
        })
    }

    pub fn subscribe_hotbar_states(&self, listener: Listener<HotbarState>) -> Subscription {
        self.subscribe_to("hotbar_state", listener, |m| match m {
            ServerMessage::HotbarState(p) => Some(p),
            _ => None,
        })
    }

    pub fn subscribe_inventory_states(&self, listener: Listener<InventoryState>) -> Subscription {
        self.subscribe_to("inventory_state", listener, |m| match m {
            ServerMessage::InventoryState(p) => Some(p),
            _ => None,
        })
    }

    pub fn subscribe_health_states(&self, listener: Listener<HealthState>) -> Subscription {
        self.subscribe_to("health_state", listener, |m| match m {
            ServerMessage::HealthState(p) => Some(p),
            _ => None,
        })
    }

    pub fn subscribe_craft_results(&self, listener: Listener<CraftResult>) -> Subscription {
        self.subscribe_to("craft_result", listener, |m| match m {
            ServerMessage::CraftResult(p) => Some(p),
            _ => None,
        })
    }

    pub fn subscribe_container_states(&self, listener: Listener<ContainerState>) -> Subscription {
        self.subscribe_to("container_state", listener, |m| match m {
            ServerMessage::ContainerState(p) => Some(p),
            _ => None,
        })
    }

    pub fn subscribe_container_results(
        &self,
        listener: Listener<ContainerActionResult>,
    ) -> Subscription {
        self.subscribe_to("container_result", listener, |m| match m {
            ServerMessage::ContainerResult(p) => Some(p),
            _ => None,
        })
    }

    pub fn subscribe_combat_results(&self, listener: Listener<CombatResult>) -> Subscription {
        self.subscribe_to("combat_result", listener, |m| match m {
            ServerMessage::CombatResult(p) => Some(p),
            _ => None,
        })
    }

    pub fn subscribe_interact_results(&self, listener: Listener<InteractResult>) -> Subscription {
        self.subscribe_to("interact_result", listener, |m| match m {
            ServerMessage::InteractResult(p) => Some(p),
            _ => None,
        })
    }

    pub fn subscribe_world_flag_states(&self, listener: Listener<WorldFlagState>) -> Subscription {
        self.subscribe_to("world_flag_state", listener, |m| match m {
            ServerMessage::WorldFlagState(p) => Some(p),
            _ => None,
        })
    }

    pub fn subscribe_world_directive_states(
        &self,
        listener: Listener<DirectiveState>,
    ) -> Subscription {
        self.subscribe_to("world_directive_state", listener, |m| match m {
            ServerMessage::WorldDirectiveState(p) => Some(p),
            _ => None,
        })
    }

    pub fn subscribe_world_events(&self, listener: Listener<WorldEvent>) -> Subscription {
        self.subscribe_to("world_event", listener, |m| match m {
            ServerMessage::WorldEvent(p) => Some(p),
            _ => None,
        })
    }

    /// Receive every message kind, untyped. Retained state is replayed per
    /// kind as with the typed subscriptions.
    pub fn subscribe_all(&self, listener: Listener<ServerMessage>) -> Vec<Subscription> {
        ServerMessage::KINDS
            .iter()
            .map(|kind| self.subscribe_erased(*kind, Arc::clone(&listener)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(seed: &str, tick: u64) -> ServerMessage {
        ServerMessage::Snapshot(WorldSnapshot {
            world_seed: seed.to_string(),
            tick,
            players: BTreeMap::new(),
        })
    }

    fn collect_ticks(hub: &SubscriberHub) -> (Arc<Mutex<Vec<u64>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = hub.subscribe_snapshots(listener(move |s: &WorldSnapshot| {
            sink.lock().unwrap().push(s.tick)
        }));
        (seen, sub)
    }

    #[test]
    fn test_snapshot_acceptance_rules() {
        let current = WorldSnapshot::empty("a");
        let mut next = WorldSnapshot::empty("a");
        assert!(should_accept_snapshot(&current, &next));
        next.tick = 3;
        assert!(should_accept_snapshot(&current, &next));
        assert!(!should_accept_snapshot(&next, &current));
        let mut foreign = WorldSnapshot::empty("b");
        foreign.tick = 99;
        assert!(!should_accept_snapshot(&current, &foreign));
    }

    #[test]
    fn test_stale_and_foreign_snapshots_dropped() {
        let hub = SubscriberHub::new();
        let (seen, _sub) = collect_ticks(&hub);

        assert!(hub.publish(&snapshot("a", 4)));
        assert!(!hub.publish(&snapshot("a", 2)));
        assert!(!hub.publish(&snapshot("b", 10)));
        assert!(hub.publish(&snapshot("a", 4)));
        assert!(hub.publish(&snapshot("a", 5)));

        assert_eq!(*seen.lock().unwrap(), vec![4, 4, 5]);
    }

    #[test]
    fn test_new_subscriber_receives_retained_state() {
        let hub = SubscriberHub::new();
        hub.retain(&snapshot("a", 7));
        hub.publish(&ServerMessage::WorldFlagState(WorldFlagState::default()));

        let (seen, _sub) = collect_ticks(&hub);
        assert_eq!(*seen.lock().unwrap(), vec![7]);

        let flags = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&flags);
        let _flag_sub = hub.subscribe_world_flag_states(listener(move |_: &WorldFlagState| {
            *sink.lock().unwrap() += 1
        }));
        assert_eq!(*flags.lock().unwrap(), 1);
    }

    #[test]
    fn test_results_are_not_replayed() {
        let hub = SubscriberHub::new();
        hub.publish(&ServerMessage::CraftResult(CraftResult {
            action_id: "a".to_string(),
            player_id: "p".to_string(),
            recipe_id: "craft-bomb".to_string(),
            count: 1,
            accepted: true,
            reason: None,
            tick: 0,
        }));
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let _sub = hub.subscribe_craft_results(listener(move |_: &CraftResult| {
            *sink.lock().unwrap() += 1
        }));
        assert_eq!(*count.lock().unwrap(), 0);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let hub = SubscriberHub::new();
        let (seen, sub) = collect_ticks(&hub);
        hub.publish(&snapshot("a", 1));
        assert_eq!(hub.listener_count("snapshot"), 1);
        sub.unsubscribe();
        hub.publish(&snapshot("a", 2));
        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert_eq!(hub.listener_count("snapshot"), 0);
    }

    #[test]
    fn test_listener_may_reenter_hub() {
        let hub = SubscriberHub::new();
        let inner = hub.clone();
        let _sub = hub.subscribe_snapshots(listener(move |s: &WorldSnapshot| {
            // Publishing from inside a listener must not deadlock.
            if s.tick == 1 {
                inner.publish(&snapshot("a", 2));
            }
        }));
        hub.publish(&snapshot("a", 1));
        assert_eq!(hub.latest_snapshot().unwrap().tick, 2);
    }

    #[test]
    fn test_forget_player_drops_retained_catalogs() {
        let hub = SubscriberHub::new();
        hub.publish(&ServerMessage::InventoryState(InventoryState {
            player_id: "p".to_string(),
            resources: Default::default(),
            tick: 0,
        }));
        hub.forget_player("p");
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let _sub = hub.subscribe_inventory_states(listener(move |_: &InventoryState| {
            *sink.lock().unwrap() += 1
        }));
        assert_eq!(*count.lock().unwrap(), 0);
    }

    #[test]
    fn test_late_subscriber_receives_latest_health() {
        let hub = SubscriberHub::new();
        let health = |player_id: &str, current: u32| {
            ServerMessage::HealthState(HealthState {
                player_id: player_id.to_string(),
                current,
                max: 10,
                tick: 0,
            })
        };
        hub.publish(&health("p1", 10));
        hub.publish(&health("p1", 7));
        hub.publish(&health("p2", 4));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = hub.subscribe_health_states(listener(move |state: &HealthState| {
            sink.lock().unwrap().push((state.player_id.clone(), state.current))
        }));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("p1".to_string(), 7), ("p2".to_string(), 4)]
        );

        hub.forget_player("p1");
        seen.lock().unwrap().clear();
        let sink = Arc::clone(&seen);
        let _again = hub.subscribe_health_states(listener(move |state: &HealthState| {
            sink.lock().unwrap().push((state.player_id.clone(), state.current))
        }));
        assert_eq!(*seen.lock().unwrap(), vec![("p2".to_string(), 4)]);
    }

    #[test]
    fn test_subscribe_all_sees_every_kind() {
        let hub = SubscriberHub::new();
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&kinds);
        let subs = hub.subscribe_all(listener(move |m: &ServerMessage| {
            sink.lock().unwrap().push(m.kind())
        }));
        assert_eq!(subs.len(), ServerMessage::KINDS.len());
        hub.publish(&snapshot("a", 1));
        hub.publish(&ServerMessage::WorldFlagState(WorldFlagState::default()));
        assert_eq!(*kinds.lock().unwrap(), vec!["snapshot", "world_flag_state"]);
        for sub in subs {
            sub.unsubscribe();
        }
        assert_eq!(hub.listener_count("snapshot"), 0);
    }
}
