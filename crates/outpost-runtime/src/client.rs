//! The caller-facing contract shared by the local and networked runtimes.

use outpost_config::RuntimeMode;
use outpost_protocol::{
    BlockActionRequest, BlockDelta, CombatActionRequest, CombatResult, ContainerActionRequest,
    ContainerActionResult, ContainerState, CraftRequest, CraftResult, DirectiveState, HealthState,
    HotbarState, InputState, InteractRequest, InteractResult, InventoryState, JoinRequest,
    WorldEvent, WorldFlagState, WorldSnapshot,
};

use crate::hub::{Listener, SubscriberHub, Subscription};

/// World runtime as seen by game code.
///
/// Commands are fire-and-forget: outcomes arrive through the subscribe
/// methods, which forward to the runtime's [`SubscriberHub`]. Subscribing to a
/// retained kind immediately replays the last known state.
pub trait WorldRuntimeClient: Send + Sync {
    fn mode(&self) -> RuntimeMode;

    fn hub(&self) -> &SubscriberHub;

    fn join(&self, request: JoinRequest);

    fn leave(&self, player_id: &str);

    fn set_input(&self, player_id: &str, input: InputState);

    fn submit_block_action(&self, player_id: &str, request: BlockActionRequest);

    /// Out-of-range indices are clamped to the hotbar.
    fn select_hotbar_slot(&self, player_id: &str, slot_index: i64);

    fn submit_craft_request(&self, player_id: &str, request: CraftRequest);

    fn submit_container_action(&self, player_id: &str, request: ContainerActionRequest);

    fn submit_combat_action(&self, player_id: &str, request: CombatActionRequest);

    fn submit_interact_action(&self, player_id: &str, request: InteractRequest);

    /// Stop background work and drop every listener. Idempotent.
    fn dispose(&self);

    fn latest_snapshot(&self) -> Option<WorldSnapshot> {
        self.hub().latest_snapshot()
    }

    fn subscribe_snapshots(&self, listener: Listener<WorldSnapshot>) -> Subscription {
        self.hub().subscribe_snapshots(listener)
    }

    fn subscribe_block_deltas(&self, listener: Listener<BlockDelta>) -> Subscription {
        self.hub().subscribe_block_deltas(listener)
    }

    fn subscribe_hotbar_states(&self, listener: Listener<HotbarState>) -> Subscription {
        self.hub().subscribe_hotbar_states(listener)
    }

    fn subscribe_inventory_states(&self, listener: Listener<InventoryState>) -> Subscription {
        self.hub().subscribe_inventory_states(listener)
    }

    fn subscribe_health_states(&self, listener: Listener<HealthState>) -> Subscription {
        self.hub().subscribe_health_states(listener)
    }

    fn subscribe_craft_results(&self, listener: Listener<CraftResult>) -> Subscription {
        self.hub().subscribe_craft_results(listener)
    }

    fn subscribe_container_states(&self, listener: Listener<ContainerState>) -> Subscription {
        self.hub().subscribe_container_states(listener)
    }

    fn subscribe_container_results(
        &self,
        listener: Listener<ContainerActionResult>,
    ) -> Subscription {
        self.hub().subscribe_container_results(listener)
    }

    fn subscribe_combat_results(&self, listener: Listener<CombatResult>) -> Subscription {
        self.hub().subscribe_combat_results(listener)
    }

    fn subscribe_interact_results(&self, listener: Listener<InteractResult>) -> Subscription {
        self.hub().subscribe_interact_results(listener)
    }

    fn subscribe_world_flag_states(&self, listener: Listener<WorldFlagState>) -> Subscription {
        self.hub().subscribe_world_flag_states(listener)
    }

    fn subscribe_world_directive_states(
        &self,
        listener: Listener<DirectiveState>,
    ) -> Subscription {
        self.hub().subscribe_world_directive_states(listener)
    }

    fn subscribe_world_events(&self, listener: Listener<WorldEvent>) -> Subscription {
        self.hub().subscribe_world_events(listener)
    }
}
