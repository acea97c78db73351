//! Validated action resolution on top of the tick simulator.
//!
//! [`ActionResolver`] owns the simulator plus every stateful store (hotbars,
//! inventories, health, entity health, containers, the event log and
//! directive state). Each operation validates its request, mutates state only
//! on acceptance, and returns the world-to-client messages that describe what
//! happened, in delivery order. Rejections are ordinary results carrying a
//! [`RejectReason`], never errors.

use std::collections::HashMap;

use outpost_protocol::{
    BlockAction, BlockActionRequest, BlockDelta, CombatActionKind, CombatActionRequest,
    CombatResult, ContainerActionRequest, ContainerActionResult, ContainerOperation,
    ContainerState, CraftRequest, CraftResult, DirectiveState, EntityHealthState, HealthState,
    HotbarState, InputState, InteractRequest, InteractResult, InventoryState, JoinRequest,
    RejectReason, ResourceCounts, ServerMessage, WORLD_SHARED_CONTAINER_ID, WorldEvent,
    WorldFlagState, WorldSnapshot, can_access_container, finite_or_zero, private_container_id,
};
use outpost_sim::{SimConfig, WorldSim, effective_tick_rate};
use serde_json::{Value, json};

use crate::catalog::{
    self, CombatEffect, CraftOutput, DEFAULT_HOTBAR_SLOT_IDS, ENTITY_RESPAWN_TICKS, EntityTarget,
    PLAYER_MAX_HEALTH,
};
use crate::directives::{Directive, DirectiveBook};
use crate::events::{WorldEventKind, WorldEventLog};

/// Maximum distance for an accepted interaction.
pub const INTERACT_RANGE: f64 = 3.4;

/// Block type used when a place request names none.
pub const DEFAULT_PLACE_BLOCK: &str = "dirt";

/// Messages produced by one operation, in delivery order.
pub type Outbox = Vec<ServerMessage>;

pub struct ActionResolver {
    sim: WorldSim,
    hotbars: HashMap<String, HotbarState>,
    inventories: HashMap<String, InventoryState>,
    health: HashMap<String, HealthState>,
    entities: HashMap<String, EntityHealthState>,
    containers: HashMap<String, ContainerState>,
    /// Player id to slot id to the first tick the slot may be used again.
    cooldowns: HashMap<String, HashMap<String, u64>>,
    events: WorldEventLog,
    directives: DirectiveBook,
}

impl ActionResolver {
    pub fn new(world_seed: impl Into<String>, config: SimConfig) -> Self {
        let mut resolver = Self {
            sim: WorldSim::new(world_seed, config),
            hotbars: HashMap::new(),
            inventories: HashMap::new(),
            health: HashMap::new(),
            entities: HashMap::new(),
            containers: HashMap::new(),
            cooldowns: HashMap::new(),
            events: WorldEventLog::new(),
            directives: DirectiveBook::new(),
        };
        resolver.ensure_container(WORLD_SHARED_CONTAINER_ID);
        resolver
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn tick(&self) -> u64 {
        self.sim.tick()
    }

    pub fn sim(&self) -> &WorldSim {
        &self.sim
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.sim.snapshot()
    }

    pub fn hotbar(&self, player_id: &str) -> Option<&HotbarState> {
        self.hotbars.get(player_id)
    }

    pub fn inventory(&self, player_id: &str) -> Option<&InventoryState> {
        self.inventories.get(player_id)
    }

    pub fn health(&self, player_id: &str) -> Option<&HealthState> {
        self.health.get(player_id)
    }

    pub fn entity_health(&self, target_id: &str) -> Option<&EntityHealthState> {
        self.entities.get(target_id)
    }

    pub fn container(&self, container_id: &str) -> Option<&ContainerState> {
        self.containers.get(container_id)
    }

    pub fn flag_state(&self) -> WorldFlagState {
        self.directives.flag_state()
    }

    pub fn directive_state(&self) -> DirectiveState {
        self.directives.directive_state()
    }

    pub fn events_since(&self, seq: u64) -> Vec<WorldEvent> {
        self.events.events_since(seq)
    }

    /// Everything a fresh subscriber should be able to see before the first
    /// action: snapshot, containers, flags and directives.
    pub fn baseline(&self) -> Outbox {
        let mut out = vec![ServerMessage::Snapshot(self.snapshot())];
        out.extend(self.container_messages());
        out.push(ServerMessage::WorldFlagState(self.flag_state()));
        out.push(ServerMessage::WorldDirectiveState(self.directive_state()));
        out
    }

    fn container_messages(&self) -> impl Iterator<Item = ServerMessage> + '_ {
        let mut ids: Vec<&String> = self.containers.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| self.containers.get(id).cloned())
            .map(ServerMessage::ContainerState)
    }

    // -----------------------------------------------------------------------
    // Store initialisation
    // -----------------------------------------------------------------------

    fn ensure_container(&mut self, container_id: &str) -> &mut ContainerState {
        let tick = self.sim.tick();
        let state = self
            .containers
            .entry(container_id.to_string())
            .or_insert_with(|| ContainerState {
                container_id: container_id.to_string(),
                resources: catalog::empty_resources(),
                tick,
            });
        catalog::normalize_resources(&mut state.resources);
        state
    }

    /// Create per-player records that do not exist yet and repair any whose
    /// shape is stale.
    fn init_player_records(&mut self, player_id: &str) {
        let tick = self.sim.tick();
        let hotbar = self
            .hotbars
            .entry(player_id.to_string())
            .or_insert_with(|| default_hotbar(player_id, tick));
        if hotbar.stack_counts.len() != hotbar.slot_ids.len() {
            hotbar.stack_counts = hotbar
                .slot_ids
                .iter()
                .map(|id| catalog::default_stack_count(id))
                .collect();
        }
        hotbar.selected_index = clamp_slot_index(hotbar.selected_index as i64, hotbar.slot_ids.len());

        let inventory = self
            .inventories
            .entry(player_id.to_string())
            .or_insert_with(|| InventoryState {
                player_id: player_id.to_string(),
                resources: catalog::empty_resources(),
                tick,
            });
        catalog::normalize_resources(&mut inventory.resources);

        let health = self
            .health
            .entry(player_id.to_string())
            .or_insert_with(|| HealthState {
                player_id: player_id.to_string(),
                current: PLAYER_MAX_HEALTH,
                max: PLAYER_MAX_HEALTH,
                tick,
            });
        if health.max == 0 {
            health.max = PLAYER_MAX_HEALTH;
        }
        health.current = health.current.min(health.max);

        self.ensure_container(&private_container_id(player_id));
    }

    fn record_event(
        &mut self,
        out: &mut Outbox,
        kind: WorldEventKind,
        player_id: Option<&str>,
        payload: Value,
    ) {
        let event = self.events.record(self.sim.tick(), kind, player_id, payload);
        out.push(ServerMessage::WorldEvent(event));
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    pub fn join(&mut self, request: &JoinRequest) -> Outbox {
        let mut out = Outbox::new();
        if request.player_id.trim().is_empty() {
            tracing::debug!("join without player id ignored");
            return out;
        }
        if request.world_seed != self.sim.world_seed() {
            tracing::warn!(
                player = %request.player_id,
                requested = %request.world_seed,
                world = %self.sim.world_seed(),
                "join names a different world seed"
            );
        }
        let newly_joined = self.sim.join_player(request);
        self.init_player_records(&request.player_id);

        out.push(ServerMessage::Snapshot(self.sim.snapshot()));
        if let Some(hotbar) = self.hotbars.get(&request.player_id) {
            out.push(ServerMessage::HotbarState(hotbar.clone()));
        }
        if let Some(inventory) = self.inventories.get(&request.player_id) {
            out.push(ServerMessage::InventoryState(inventory.clone()));
        }
        if let Some(health) = self.health.get(&request.player_id) {
            out.push(ServerMessage::HealthState(health.clone()));
        }
        out.extend(self.container_messages());
        self.record_event(
            &mut out,
            WorldEventKind::PlayerJoined,
            Some(request.player_id.as_str()),
            json!({ "rejoin": !newly_joined }),
        );
        tracing::info!(player = %request.player_id, rejoin = !newly_joined, "player joined");
        out
    }

    /// Remove a player's kinematic state and per-player catalogs. Entity,
    /// container, flag and directive state is untouched.
    pub fn leave(&mut self, player_id: &str) -> Outbox {
        let mut out = Outbox::new();
        if !self.sim.leave_player(player_id) {
            return out;
        }
        self.hotbars.remove(player_id);
        self.inventories.remove(player_id);
        self.health.remove(player_id);
        self.cooldowns.remove(player_id);
        out.push(ServerMessage::Snapshot(self.sim.snapshot()));
        self.record_event(&mut out, WorldEventKind::PlayerLeft, Some(player_id), json!({}));
        tracing::info!(player = %player_id, "player left");
        out
    }

    pub fn set_input(&mut self, player_id: &str, input: InputState) {
        self.sim.set_input(player_id, input);
    }

    /// Advance one tick, expire spawn hints, and emit the new snapshot.
    pub fn advance_tick(&mut self) -> Outbox {
        let snapshot = self.sim.advance_one_tick();
        let mut out = vec![ServerMessage::Snapshot(snapshot)];
        if self.directives.prune_expired(self.sim.tick()) {
            out.push(ServerMessage::WorldDirectiveState(self.directives.directive_state()));
        }
        out
    }

    pub fn apply_directive(&mut self, directive: &Directive) -> Outbox {
        let mut out = Outbox::new();
        let change = self.directives.apply(directive, self.sim.tick());
        if change.flags {
            out.push(ServerMessage::WorldFlagState(self.directives.flag_state()));
        }
        if change.directives {
            out.push(ServerMessage::WorldDirectiveState(self.directives.directive_state()));
        }
        self.record_event(
            &mut out,
            WorldEventKind::DirectiveApplied,
            None,
            json!({ "type": directive.kind() }),
        );
        out
    }

    // -----------------------------------------------------------------------
    // Blocks / hotbar
    // -----------------------------------------------------------------------

    pub fn block_action(&mut self, player_id: &str, request: &BlockActionRequest) -> Outbox {
        let mut out = Outbox::new();
        if !catalog::block_in_bounds(&request.position) {
            tracing::debug!(player = %player_id, position = ?request.position, "block action out of bounds dropped");
            return out;
        }
        let block_type = match request.action {
            BlockAction::Place => Some(
                request
                    .block_type
                    .clone()
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_PLACE_BLOCK.to_string()),
            ),
            BlockAction::Break => request.block_type.clone(),
        };
        out.push(ServerMessage::BlockDelta(BlockDelta {
            action: request.action,
            position: request.position,
            block_type: block_type.clone(),
        }));

        let position = request.position;
        let mut payload = json!({
            "chunkX": position.chunk_x,
            "chunkZ": position.chunk_z,
            "x": position.x,
            "y": position.y,
            "z": position.z,
        });
        let kind = match request.action {
            BlockAction::Break => {
                let grants = catalog::break_grants(&position);
                if let Some(inventory) = self.grant_resources(player_id, &grants) {
                    out.push(ServerMessage::InventoryState(inventory));
                }
                payload["grants"] = json!(grants);
                WorldEventKind::BlockBroken
            }
            BlockAction::Place => {
                payload["blockType"] = json!(block_type);
                WorldEventKind::BlockPlaced
            }
        };
        self.record_event(&mut out, kind, Some(player_id), payload);
        out
    }

    /// Add `grants` to a joined player's inventory and return the new state.
    fn grant_resources(&mut self, player_id: &str, grants: &ResourceCounts) -> Option<InventoryState> {
        let tick = self.sim.tick();
        let inventory = self.inventories.get_mut(player_id)?;
        for (resource_id, amount) in grants {
            let count = inventory.resources.entry(resource_id.clone()).or_insert(0);
            *count = count.saturating_add(*amount);
        }
        inventory.tick = tick;
        Some(inventory.clone())
    }

    pub fn select_hotbar_slot(&mut self, player_id: &str, slot_index: i64) -> Outbox {
        let tick = self.sim.tick();
        let Some(hotbar) = self.hotbars.get_mut(player_id) else {
            return Outbox::new();
        };
        if hotbar.slot_ids.is_empty() {
            return Outbox::new();
        }
        hotbar.selected_index = clamp_slot_index(slot_index, hotbar.slot_ids.len());
        hotbar.tick = tick;
        vec![ServerMessage::HotbarState(hotbar.clone())]
    }

    // -----------------------------------------------------------------------
    // Combat
    // -----------------------------------------------------------------------

    pub fn combat_action(&mut self, player_id: &str, request: &CombatActionRequest) -> Outbox {
        let mut out = Outbox::new();
        let mut result = CombatResult {
            action_id: request.action_id.clone(),
            player_id: player_id.to_string(),
            slot_id: request.slot_id.clone(),
            kind: request.kind,
            accepted: false,
            reason: None,
            target_id: trimmed(&request.target_id),
            target_label: trimmed(&request.target_label),
            target_world_x: request.target_world_x.map(finite_or_zero),
            target_world_z: request.target_world_z.map(finite_or_zero),
            cooldown_remaining_ms: None,
            tick: self.sim.tick(),
        };

        match self.validate_combat(player_id, request, &mut result) {
            Err(reason) => result.reason = Some(reason),
            Ok((slot_index, effect)) => {
                result.accepted = true;
                if effect.kind == CombatActionKind::Item
                    && let Some(hotbar) = self.hotbars.get_mut(player_id)
                {
                    hotbar.stack_counts[slot_index] -= 1;
                    hotbar.tick = result.tick;
                    out.push(ServerMessage::HotbarState(hotbar.clone()));
                }
                self.cooldowns
                    .entry(player_id.to_string())
                    .or_default()
                    .insert(request.slot_id.clone(), result.tick + effect.cooldown_ticks);
                self.apply_combat_effect(&mut out, &result, effect);
            }
        }

        let kind = if result.accepted {
            WorldEventKind::CombatConfirmed
        } else {
            tracing::debug!(player = %player_id, reason = ?result.reason, "combat rejected");
            WorldEventKind::CombatRejected
        };
        let payload = json!({
            "actionId": result.action_id,
            "slotId": result.slot_id,
            "kind": result.kind,
            "reason": result.reason,
            "targetId": result.target_id,
        });
        out.push(ServerMessage::CombatResult(result));
        self.record_event(&mut out, kind, Some(player_id), payload);
        out
    }

    /// Returns the hotbar index and catalog entry of the acting slot. Target
    /// coordinates resolved on the way are written into `result`.
    fn validate_combat(
        &mut self,
        player_id: &str,
        request: &CombatActionRequest,
        result: &mut CombatResult,
    ) -> Result<(usize, CombatEffect), RejectReason> {
        if request.action_id.trim().is_empty() || request.slot_id.trim().is_empty() {
            return Err(RejectReason::InvalidPayload);
        }
        let actor = self.sim.player(player_id).ok_or(RejectReason::PlayerNotFound)?;
        let (actor_x, actor_z) = (actor.x, actor.z);
        let hotbar = self.hotbars.get(player_id).ok_or(RejectReason::PlayerNotFound)?;
        let effect = catalog::combat_effect(&request.slot_id);
        if let Some(effect) = effect
            && effect.kind != request.kind
        {
            return Err(RejectReason::InvalidSlotKind);
        }
        let slot_index = hotbar
            .slot_index(&request.slot_id)
            .ok_or(RejectReason::SlotNotEquipped)?;
        let effect = effect.ok_or(RejectReason::SlotNotEquipped)?;
        if effect.kind == CombatActionKind::Item && hotbar.stack_counts[slot_index] == 0 {
            return Err(RejectReason::InsufficientItem);
        }

        if effect.requires_target {
            let (x, z) = self.resolve_combat_target(player_id, result)?;
            let distance = (x - actor_x).hypot(z - actor_z);
            if effect.max_range > 0.0 && distance > effect.max_range {
                return Err(RejectReason::TargetOutOfRange);
            }
            if let Some(target_id) = result.target_id.as_deref()
                && !self.sim.contains(target_id)
                && !self.entity_available(target_id)
            {
                return Err(RejectReason::TargetDefeated);
            }
        }

        let tick = self.sim.tick();
        if let Some(ready_at) = self
            .cooldowns
            .get(player_id)
            .and_then(|slots| slots.get(&request.slot_id))
            .copied()
            && tick < ready_at
        {
            let tick_rate = u64::from(effective_tick_rate(self.sim.config()));
            result.cooldown_remaining_ms = Some((ready_at - tick) * 1000 / tick_rate);
            return Err(RejectReason::CooldownActive);
        }
        Ok((slot_index, effect))
    }

    /// A target naming another joined player resolves to that player's
    /// position; anything else needs client-supplied coordinates.
    fn resolve_combat_target(
        &self,
        player_id: &str,
        result: &mut CombatResult,
    ) -> Result<(f64, f64), RejectReason> {
        if let Some(target_id) = result.target_id.as_deref()
            && target_id != player_id
            && let Some(target) = self.sim.player(target_id)
        {
            result.target_world_x = Some(target.x);
            result.target_world_z = Some(target.z);
            if result.target_label.is_none() {
                result.target_label = Some(target_id.to_string());
            }
        }
        match (result.target_world_x, result.target_world_z, &result.target_id) {
            (Some(x), Some(z), _) => Ok((x, z)),
            (_, _, Some(_)) => Err(RejectReason::UnknownTarget),
            _ => Err(RejectReason::MissingTarget),
        }
    }

    fn apply_combat_effect(
        &mut self,
        out: &mut Outbox,
        result: &CombatResult,
        effect: CombatEffect,
    ) {
        let tick = result.tick;
        let actor = result.player_id.as_str();

        if effect.heal > 0
            && let Some(health) = self.health.get_mut(actor)
        {
            let next = health.current.saturating_add(effect.heal).min(health.max);
            if next != health.current {
                health.current = next;
                health.tick = tick;
                let snapshot = health.clone();
                out.push(ServerMessage::HealthState(snapshot.clone()));
                self.record_event(
                    out,
                    WorldEventKind::PlayerHealed,
                    Some(actor),
                    json!({ "delta": effect.heal, "current": snapshot.current, "max": snapshot.max }),
                );
            }
        }

        let Some(target_id) = result.target_id.as_deref() else {
            return;
        };
        if effect.damage == 0 {
            return;
        }

        if self.sim.contains(target_id) {
            let Some(health) = self.health.get_mut(target_id) else {
                return;
            };
            let next = health.current.saturating_sub(effect.damage);
            if next != health.current {
                health.current = next;
                health.tick = tick;
                let snapshot = health.clone();
                out.push(ServerMessage::HealthState(snapshot.clone()));
                self.record_event(
                    out,
                    WorldEventKind::PlayerDamaged,
                    Some(target_id),
                    json!({
                        "delta": -(effect.damage as i64),
                        "current": snapshot.current,
                        "max": snapshot.max,
                        "source": actor,
                        "slotId": result.slot_id,
                    }),
                );
            }
            return;
        }

        let Some((entity, defeated_now)) = self.damage_entity(target_id, effect.damage) else {
            return;
        };
        self.record_event(
            out,
            WorldEventKind::EntityDamaged,
            Some(actor),
            json!({
                "targetId": entity.target_id,
                "entityType": entity.entity_type,
                "current": entity.current,
                "max": entity.max,
                "slotId": result.slot_id,
                "respawnTick": entity.defeated_until_tick,
            }),
        );
        if defeated_now {
            let Some(target) = EntityTarget::parse(target_id) else {
                return;
            };
            let loot = catalog::entity_loot(target_id, target.kind, tick);
            if let Some(inventory) = self.grant_resources(actor, &loot) {
                out.push(ServerMessage::InventoryState(inventory));
            }
            tracing::debug!(player = %actor, target = %target_id, "entity defeated");
            self.record_event(
                out,
                WorldEventKind::EntityDefeated,
                Some(actor),
                json!({
                    "targetId": entity.target_id,
                    "entityType": entity.entity_type,
                    "respawnTick": entity.defeated_until_tick,
                    "loot": loot,
                }),
            );
        }
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    /// Health record for an entity target, created at full health on first
    /// access and restored once its respawn window has elapsed. `None` for
    /// ids that do not name an entity.
    fn ensure_entity(&mut self, target_id: &str) -> Option<&mut EntityHealthState> {
        let target = EntityTarget::parse(target_id)?;
        let tick = self.sim.tick();
        let max = target.kind.max_health();
        let state = self
            .entities
            .entry(target_id.to_string())
            .or_insert_with(|| EntityHealthState {
                target_id: target_id.to_string(),
                entity_type: target.kind.as_str().to_string(),
                current: max,
                max,
                defeated_until_tick: 0,
                tick,
            });
        if state.max == 0 {
            state.max = max;
        }
        if state.defeated_until_tick > 0 && tick >= state.defeated_until_tick {
            state.current = state.max;
            state.defeated_until_tick = 0;
        }
        state.current = state.current.min(state.max);
        state.tick = tick;
        Some(state)
    }

    /// Whether a target may be fought. Ids that are not entities are always
    /// available.
    fn entity_available(&mut self, target_id: &str) -> bool {
        let tick = self.sim.tick();
        match self.ensure_entity(target_id) {
            Some(state) => !(state.defeated_until_tick > tick && state.current == 0),
            None => true,
        }
    }

    /// Returns the updated record and whether this hit defeated it.
    fn damage_entity(&mut self, target_id: &str, damage: u32) -> Option<(EntityHealthState, bool)> {
        let tick = self.sim.tick();
        let state = self.ensure_entity(target_id)?;
        if state.defeated_until_tick > tick && state.current == 0 {
            return Some((state.clone(), false));
        }
        let next = state.current.saturating_sub(damage);
        let defeated_now = state.current > 0 && next == 0;
        state.current = next;
        if defeated_now {
            state.defeated_until_tick = tick + ENTITY_RESPAWN_TICKS;
        }
        Some((state.clone(), defeated_now))
    }

    // -----------------------------------------------------------------------
    // Interact
    // -----------------------------------------------------------------------

    pub fn interact_action(&mut self, player_id: &str, request: &InteractRequest) -> Outbox {
        let mut out = Outbox::new();
        let mut result = InteractResult {
            action_id: request.action_id.clone(),
            player_id: player_id.to_string(),
            accepted: false,
            reason: None,
            target_id: trimmed(&request.target_id),
            target_label: trimmed(&request.target_label),
            target_world_x: request.target_world_x.map(finite_or_zero),
            target_world_z: request.target_world_z.map(finite_or_zero),
            message: None,
            tick: self.sim.tick(),
        };

        match self.resolve_interaction(player_id, &mut result) {
            Err(reason) => {
                tracing::debug!(player = %player_id, %reason, "interaction rejected");
                result.reason = Some(reason);
            }
            Ok(distance) => {
                result.accepted = true;
                result.message = Some(match &result.target_label {
                    Some(label) => format!("{label} acknowledges you."),
                    None => "Interaction accepted.".to_string(),
                });
                let payload = json!({
                    "targetId": result.target_id,
                    "targetLabel": result.target_label,
                    "distance": distance,
                });
                self.record_event(&mut out, WorldEventKind::Interaction, Some(player_id), payload);
            }
        }
        out.insert(0, ServerMessage::InteractResult(result));
        out
    }

    /// Fill in target coordinates and return the distance to the target.
    fn resolve_interaction(&self, player_id: &str, result: &mut InteractResult) -> Result<f64, RejectReason> {
        if result.action_id.trim().is_empty() || player_id.trim().is_empty() {
            return Err(RejectReason::InvalidPayload);
        }
        let actor = self.sim.player(player_id).ok_or(RejectReason::PlayerNotFound)?;

        if let Some(target_id) = result.target_id.as_deref()
            && target_id != player_id
            && let Some(target) = self.sim.player(target_id)
        {
            result.target_world_x = Some(target.x);
            result.target_world_z = Some(target.z);
            if result.target_label.is_none() {
                result.target_label = Some(target_id.to_string());
            }
        }

        let (Some(x), Some(z)) = (result.target_world_x, result.target_world_z) else {
            return Err(RejectReason::MissingTarget);
        };
        let distance = (x - actor.x).hypot(z - actor.z);
        if distance > INTERACT_RANGE {
            return Err(RejectReason::TargetOutOfRange);
        }
        Ok(distance)
    }

    // -----------------------------------------------------------------------
    // Craft
    // -----------------------------------------------------------------------

    pub fn craft_request(&mut self, player_id: &str, request: &CraftRequest) -> Outbox {
        let mut out = Outbox::new();
        let mut result = CraftResult {
            action_id: request.action_id.clone(),
            player_id: player_id.to_string(),
            recipe_id: request.recipe_id.clone(),
            count: request.count,
            accepted: false,
            reason: None,
            tick: self.sim.tick(),
        };

        match self.apply_craft(player_id, request) {
            Ok(updates) => {
                result.accepted = true;
                out.extend(updates);
            }
            Err(reason) => {
                tracing::debug!(player = %player_id, recipe = %request.recipe_id, %reason, "craft rejected");
                result.reason = Some(reason);
            }
        }

        let kind = if result.accepted {
            WorldEventKind::CraftCompleted
        } else {
            WorldEventKind::CraftRejected
        };
        let payload = json!({
            "actionId": result.action_id,
            "recipeId": result.recipe_id,
            "count": result.count,
            "reason": result.reason,
        });
        out.push(ServerMessage::CraftResult(result));
        self.record_event(&mut out, kind, Some(player_id), payload);
        out
    }

    /// Check every precondition, then commit. Nothing is mutated on `Err`.
    fn apply_craft(&mut self, player_id: &str, request: &CraftRequest) -> Result<Outbox, RejectReason> {
        let count = u32::try_from(request.count)
            .ok()
            .filter(|count| *count > 0)
            .ok_or(RejectReason::InvalidPayload)?;
        if !self.sim.contains(player_id) {
            return Err(RejectReason::PlayerNotFound);
        }
        let recipe = catalog::find_recipe(&request.recipe_id).ok_or(RejectReason::InvalidRecipe)?;
        let inventory = self.inventories.get(player_id).ok_or(RejectReason::PlayerNotFound)?;

        let mut costs = Vec::with_capacity(recipe.ingredients.len());
        for ingredient in recipe.ingredients {
            let required = ingredient
                .amount
                .checked_mul(count)
                .ok_or(RejectReason::InsufficientResources)?;
            let available = inventory.resources.get(ingredient.resource_id).copied().unwrap_or(0);
            if available < required {
                return Err(RejectReason::InsufficientResources);
            }
            costs.push((ingredient.resource_id, required));
        }

        let slot_target = match recipe.output {
            CraftOutput::HotbarSlot { slot_id, amount } => {
                let index = self
                    .hotbars
                    .get(player_id)
                    .and_then(|hotbar| hotbar.slot_index(slot_id))
                    .ok_or(RejectReason::CraftTargetSlotMissing)?;
                Some((index, amount.saturating_mul(count)))
            }
            CraftOutput::Resource { .. } => None,
        };

        let tick = self.sim.tick();
        let mut out = Outbox::new();
        if let Some((index, produced)) = slot_target
            && let Some(hotbar) = self.hotbars.get_mut(player_id)
        {
            hotbar.stack_counts[index] = hotbar.stack_counts[index].saturating_add(produced);
            hotbar.tick = tick;
            out.push(ServerMessage::HotbarState(hotbar.clone()));
        }
        if let Some(inventory) = self.inventories.get_mut(player_id) {
            for (resource_id, required) in costs {
                if let Some(current) = inventory.resources.get_mut(resource_id) {
                    *current -= required;
                }
            }
            if let CraftOutput::Resource { resource_id, amount } = recipe.output {
                let current = inventory.resources.entry(resource_id.to_string()).or_insert(0);
                *current = current.saturating_add(amount.saturating_mul(count));
            }
            catalog::normalize_resources(&mut inventory.resources);
            inventory.tick = tick;
            out.push(ServerMessage::InventoryState(inventory.clone()));
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Containers
    // -----------------------------------------------------------------------

    pub fn container_action(&mut self, player_id: &str, request: &ContainerActionRequest) -> Outbox {
        let mut out = Outbox::new();
        let mut result = ContainerActionResult {
            action_id: request.action_id.clone(),
            player_id: player_id.to_string(),
            container_id: request.container_id.clone(),
            operation: request.operation,
            resource_id: request.resource_id.clone(),
            amount: request.amount,
            accepted: false,
            reason: None,
            tick: self.sim.tick(),
        };

        match self.apply_transfer(player_id, request) {
            Ok(updates) => {
                result.accepted = true;
                out.extend(updates);
            }
            Err(reason) => {
                tracing::debug!(player = %player_id, container = %request.container_id, %reason, "container action rejected");
                result.reason = Some(reason);
            }
        }

        let kind = if result.accepted {
            WorldEventKind::ContainerActionApplied
        } else {
            WorldEventKind::ContainerActionRejected
        };
        let payload = json!({
            "actionId": result.action_id,
            "containerId": result.container_id,
            "operation": result.operation,
            "resourceId": result.resource_id,
            "amount": result.amount,
            "reason": result.reason,
        });
        out.push(ServerMessage::ContainerResult(result));
        self.record_event(&mut out, kind, Some(player_id), payload);
        out
    }

    /// Move resources between inventory and container. Both sides change
    /// together or not at all.
    fn apply_transfer(
        &mut self,
        player_id: &str,
        request: &ContainerActionRequest,
    ) -> Result<Outbox, RejectReason> {
        let amount = u32::try_from(request.amount)
            .ok()
            .filter(|amount| *amount > 0)
            .ok_or(RejectReason::InvalidPayload)?;
        let resource_id = request.resource_id.trim();
        if resource_id.is_empty() || request.container_id.trim().is_empty() {
            return Err(RejectReason::InvalidPayload);
        }
        if !self.sim.contains(player_id) || !self.inventories.contains_key(player_id) {
            return Err(RejectReason::PlayerNotFound);
        }
        if !can_access_container(player_id, &request.container_id) {
            return Err(RejectReason::ContainerForbidden);
        }

        let held = self.inventories.get(player_id).and_then(|inv| inv.resources.get(resource_id).copied()).unwrap_or(0);
        let stored = self
            .containers
            .get(&request.container_id)
            .and_then(|c| c.resources.get(resource_id).copied())
            .unwrap_or(0);
        let (held, stored) = match request.operation {
            ContainerOperation::Deposit if held < amount => {
                return Err(RejectReason::InsufficientResources);
            }
            ContainerOperation::Withdraw if stored < amount => {
                return Err(RejectReason::ContainerInsufficientResources);
            }
            ContainerOperation::Deposit => (held - amount, stored.saturating_add(amount)),
            ContainerOperation::Withdraw => (held.saturating_add(amount), stored - amount),
        };

        let tick = self.sim.tick();
        let mut out = Outbox::new();
        if let Some(inventory) = self.inventories.get_mut(player_id) {
            inventory.resources.insert(resource_id.to_string(), held);
            inventory.tick = tick;
            out.push(ServerMessage::InventoryState(inventory.clone()));
        }
        let container = self.ensure_container(&request.container_id);
        container.resources.insert(resource_id.to_string(), stored);
        container.tick = tick;
        out.push(ServerMessage::ContainerState(container.clone()));
        Ok(out)
    }
}

fn default_hotbar(player_id: &str, tick: u64) -> HotbarState {
    HotbarState {
        player_id: player_id.to_string(),
        slot_ids: DEFAULT_HOTBAR_SLOT_IDS.iter().map(|id| id.to_string()).collect(),
        stack_counts: DEFAULT_HOTBAR_SLOT_IDS
            .iter()
            .map(|id| catalog::default_stack_count(id))
            .collect(),
        selected_index: 0,
        tick,
    }
}

fn clamp_slot_index(index: i64, slot_count: usize) -> usize {
    if slot_count == 0 {
        return 0;
    }
    index.clamp(0, slot_count as i64 - 1) as usize
}

/// Trimmed copy, `None` when blank.
fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
