//! In-process runtime: one [`ActionResolver`] behind a mutex, a hub for
//! fan-out, and a tokio task that advances ticks at the configured rate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use outpost_config::RuntimeMode;
use outpost_protocol::{
    BlockActionRequest, CombatActionRequest, ContainerActionRequest, CraftRequest, InputState,
    InteractRequest, JoinRequest, WorldEvent,
};
use outpost_sim::{SimConfig, tick_interval};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::WorldRuntimeClient;
use crate::directives::Directive;
use crate::hub::SubscriberHub;
use crate::resolver::{ActionResolver, Outbox};

pub struct LocalRuntime {
    resolver: Mutex<ActionResolver>,
    /// Held from the end of a resolver operation until its output is
    /// published, so subscribers see outboxes in the order state changed.
    publishing: Mutex<()>,
    hub: SubscriberHub,
    interval: Duration,
    disposed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl LocalRuntime {
    /// Create a runtime whose hub already holds the initial snapshot,
    /// containers, flags and directives. Ticks do not advance until
    /// [`start_tick_driver`](Self::start_tick_driver) is called.
    pub fn new(world_seed: impl Into<String>, config: SimConfig) -> Self {
        let interval = tick_interval(&config);
        let resolver = ActionResolver::new(world_seed, config);
        let hub = SubscriberHub::new();
        for message in resolver.baseline() {
            hub.retain(&message);
        }
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            resolver: Mutex::new(resolver),
            publishing: Mutex::new(()),
            hub,
            interval,
            disposed: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ActionResolver> {
        self.resolver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Run `op` against the resolver and publish its output.
    ///
    /// The publish guard is taken before the resolver guard is released.
    /// Listeners therefore run outside the resolver lock but still in
    /// mutation order. A listener must not call back into this runtime.
    fn dispatch(&self, op: impl FnOnce(&mut ActionResolver) -> Outbox) {
        if self.is_disposed() {
            return;
        }
        let (out, _publishing) = {
            let mut resolver = self.lock();
            let out = op(&mut *resolver);
            (out, self.publishing.lock().unwrap_or_else(PoisonError::into_inner))
        };
        for message in &out {
            self.hub.publish(message);
        }
    }

    /// Advance one tick and publish the snapshot.
    pub fn advance_tick(&self) {
        self.dispatch(ActionResolver::advance_tick);
    }

    pub fn apply_directive(&self, directive: &Directive) {
        self.dispatch(|resolver| resolver.apply_directive(directive));
    }

    pub fn events_since(&self, seq: u64) -> Vec<WorldEvent> {
        self.lock().events_since(seq)
    }

    pub fn tick(&self) -> u64 {
        self.lock().tick()
    }

    /// Read-only access to the resolver state.
    pub fn with_resolver<R>(&self, f: impl FnOnce(&ActionResolver) -> R) -> R {
        f(&*self.lock())
    }

    /// Spawn the periodic tick driver on the current tokio runtime.
    ///
    /// The task holds only a weak reference and stops when the runtime is
    /// disposed or dropped.
    pub fn start_tick_driver(self: &Arc<Self>) -> JoinHandle<()> {
        let runtime: Weak<Self> = Arc::downgrade(self);
        let period = self.interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tracing::info!(period_ms = period.as_millis() as u64, "tick driver started");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(runtime) = runtime.upgrade() else { break };
                        if runtime.is_disposed() {
                            break;
                        }
                        runtime.advance_tick();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("tick driver stopped");
        })
    }
}

impl WorldRuntimeClient for LocalRuntime {
    fn mode(&self) -> RuntimeMode {
        RuntimeMode::Local
    }

    fn hub(&self) -> &SubscriberHub {
        &self.hub
    }

    fn join(&self, request: JoinRequest) {
        self.dispatch(|resolver| resolver.join(&request));
    }

    fn leave(&self, player_id: &str) {
        if self.is_disposed() {
            return;
        }
        let (out, _publishing) = {
            let mut resolver = self.lock();
            let out = resolver.leave(player_id);
            (out, self.publishing.lock().unwrap_or_else(PoisonError::into_inner))
        };
        self.hub.forget_player(player_id);
        for message in &out {
            self.hub.publish(message);
        }
    }

    fn set_input(&self, player_id: &str, input: InputState) {
        if !self.is_disposed() {
            self.lock().set_input(player_id, input);
        }
    }

    fn submit_block_action(&self, player_id: &str, request: BlockActionRequest) {
        self.dispatch(|resolver| resolver.block_action(player_id, &request));
    }

    fn select_hotbar_slot(&self, player_id: &str, slot_index: i64) {
        self.dispatch(|resolver| resolver.select_hotbar_slot(player_id, slot_index));
    }

    fn submit_craft_request(&self, player_id: &str, request: CraftRequest) {
        self.dispatch(|resolver| resolver.craft_request(player_id, &request));
    }

    fn submit_container_action(&self, player_id: &str, request: ContainerActionRequest) {
        self.dispatch(|resolver| resolver.container_action(player_id, &request));
    }

    fn submit_combat_action(&self, player_id: &str, request: CombatActionRequest) {
        self.dispatch(|resolver| resolver.combat_action(player_id, &request));
    }

    fn submit_interact_action(&self, player_id: &str, request: InteractRequest) {
        self.dispatch(|resolver| resolver.interact_action(player_id, &request));
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        self.hub.clear();
        tracing::info!("local runtime disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::listener;
    use outpost_protocol::{
        BlockAction, BlockPosition, ContainerOperation, ContainerState, CraftResult, HotbarState,
        RejectReason, WORLD_SHARED_CONTAINER_ID, WorldSnapshot,
    };

    fn join_request(player_id: &str) -> JoinRequest {
        JoinRequest {
            world_seed: "seed".to_string(),
            player_id: player_id.to_string(),
            start_x: 0.0,
            start_z: 0.0,
        }
    }

    fn collect<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, crate::hub::Listener<T>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, listener(move |value: &T| sink.lock().unwrap().push(value.clone())))
    }

    #[test]
    fn test_subscriber_sees_initial_snapshot() {
        let runtime = LocalRuntime::new("seed", SimConfig::default());
        let (seen, sink) = collect::<WorldSnapshot>();
        let _sub = runtime.subscribe_snapshots(sink);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].tick, 0);
        assert_eq!(seen[0].world_seed, "seed");
    }

    #[test]
    fn test_movement_shows_in_snapshots() {
        let runtime = LocalRuntime::new("seed", SimConfig::default());
        runtime.join(join_request("p1"));
        runtime.set_input(
            "p1",
            InputState {
                move_x: 1.0,
                ..Default::default()
            },
        );
        for _ in 0..20 {
            runtime.advance_tick();
        }
        let snapshot = runtime.latest_snapshot().unwrap();
        assert_eq!(snapshot.tick, 20);
        assert!((snapshot.players["p1"].x - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejection_is_delivered_as_result() {
        let runtime = LocalRuntime::new("seed", SimConfig::default());
        runtime.join(join_request("p1"));
        let (seen, sink) = collect::<CraftResult>();
        let _sub = runtime.subscribe_craft_results(sink);
        runtime.submit_craft_request(
            "p1",
            CraftRequest {
                action_id: "c1".to_string(),
                recipe_id: "craft-bandage".to_string(),
                count: 1,
            },
        );
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].reason, Some(RejectReason::InsufficientResources));
    }

    #[test]
    fn test_leave_forgets_retained_player_state() {
        let runtime = LocalRuntime::new("seed", SimConfig::default());
        runtime.join(join_request("p1"));
        runtime.leave("p1");
        let (seen, sink) = collect::<HotbarState>();
        let _sub = runtime.subscribe_hotbar_states(sink);
        assert!(seen.lock().unwrap().is_empty());
        assert!(runtime.latest_snapshot().unwrap().players.is_empty());
    }

    #[test]
    fn test_dispose_stops_delivery() {
        let runtime = LocalRuntime::new("seed", SimConfig::default());
        let (seen, sink) = collect::<WorldSnapshot>();
        let _sub = runtime.subscribe_snapshots(sink);
        runtime.dispose();
        runtime.dispose();
        runtime.advance_tick();
        assert_eq!(runtime.tick(), 0);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_directive_and_events() {
        let runtime = LocalRuntime::new("seed", SimConfig::default());
        runtime.apply_directive(&Directive::EmitStoryBeat {
            beat: "The bridge creaks.".to_string(),
        });
        let events = runtime.events_since(0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "directive_applied");
        assert_eq!(
            runtime.with_resolver(|r| r.directive_state().story_beats.len()),
            1
        );
    }

    #[test]
    fn test_concurrent_deposits_publish_in_mutation_order() {
        const THREADS: usize = 4;
        const DEPOSITS: usize = 100;

        let runtime = LocalRuntime::new("seed", SimConfig::default());
        for worker in 0..THREADS {
            runtime.join(join_request(&format!("p{worker}")));
        }
        let (seen, sink) = collect::<ContainerState>();
        let _sub = runtime.subscribe_container_states(sink);

        std::thread::scope(|scope| {
            for worker in 0..THREADS {
                let runtime = &runtime;
                scope.spawn(move || {
                    let player_id = format!("p{worker}");
                    for i in 0..DEPOSITS {
                        runtime.submit_block_action(
                            &player_id,
                            BlockActionRequest {
                                action: BlockAction::Break,
                                position: BlockPosition {
                                    chunk_x: worker as i32,
                                    chunk_z: 0,
                                    x: (i % 64) as i32,
                                    y: 1,
                                    z: 2,
                                },
                                block_type: None,
                            },
                        );
                        runtime.submit_container_action(
                            &player_id,
                            ContainerActionRequest {
                                action_id: format!("{player_id}-{i}"),
                                container_id: WORLD_SHARED_CONTAINER_ID.to_string(),
                                operation: ContainerOperation::Deposit,
                                resource_id: "salvage".to_string(),
                                amount: 1,
                            },
                        );
                    }
                });
            }
        });

        let salvage: Vec<u32> = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|state| state.container_id == WORLD_SHARED_CONTAINER_ID)
            .map(|state| state.resources["salvage"])
            .collect();
        assert!(salvage.windows(2).all(|pair| pair[0] < pair[1]), "{salvage:?}");
        assert_eq!(salvage.last().copied(), Some((THREADS * DEPOSITS) as u32));

        let truth = runtime
            .with_resolver(|r| r.container(WORLD_SHARED_CONTAINER_ID).cloned())
            .unwrap();
        let (late, sink) = collect::<ContainerState>();
        let _late = runtime.subscribe_container_states(sink);
        let retained = late
            .lock()
            .unwrap()
            .iter()
            .find(|state| state.container_id == WORLD_SHARED_CONTAINER_ID)
            .cloned();
        assert_eq!(retained, Some(truth));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_driver_advances_until_disposed() {
        let runtime = Arc::new(LocalRuntime::new("seed", SimConfig::default()));
        let handle = runtime.start_tick_driver();
        tokio::time::sleep(Duration::from_millis(510)).await;
        let ticks = runtime.tick();
        assert!((9..=11).contains(&ticks), "ticks = {ticks}");

        runtime.dispose();
        handle.await.unwrap();
        let stopped_at = runtime.tick();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runtime.tick(), stopped_at);
    }
}
