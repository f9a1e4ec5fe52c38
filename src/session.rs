use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::codec::{SaveCodec, TaggedTextCodec};
use crate::encounter::EncounterStateMachine;
use crate::gates::{GateDependencyManager, GateUpdate};
use crate::rng::Rng;
use crate::types::{
    DataKey, EncounterId, EncounterState, EncounterView, EntityId, GateView, InstanceEvent, RoleId,
    Team, TypeId,
};
use crate::world::{ActorCommand, PrivilegeQuery, World};
use crate::zones::{ScriptContext, ZoneDefinition, ZoneScript};

/// Property protocol every actor controller talks to. Keys are the closed
/// per-zone enumeration declared next to each zone script.
pub trait InstanceData {
    fn get_data(&self, key: DataKey) -> i64;

    fn set_data(&mut self, world: &mut World, key: DataKey, value: i64);

    fn get_guid(&self, role: RoleId) -> Option<EntityId>;

    fn boss_state(&self, encounter: EncounterId) -> EncounterState;

    fn set_boss_state(&mut self, world: &mut World, encounter: EncounterId, state: EncounterState) -> bool;

    fn check_required_bosses(
        &self,
        encounter: EncounterId,
        requestor: Option<EntityId>,
        privilege: &dyn PrivilegeQuery,
    ) -> bool;

    /// Remediation for an engage attempt whose prerequisites are unmet.
    fn refuse_engage(&mut self, world: &mut World, encounter: EncounterId, requestor: Option<EntityId>);

    fn record_event(&mut self, event: InstanceEvent);
}

/// Generic per-instance state: encounter records, gates, role bindings and
/// scalar properties. Zone scripts receive it mutably through
/// [`ScriptContext`].
pub struct SessionCore {
    definition: &'static ZoneDefinition,
    encounters: EncounterStateMachine,
    gates: GateDependencyManager,
    roles: BTreeMap<RoleId, EntityId>,
    data: BTreeMap<DataKey, i64>,
    team: Option<Team>,
    events: Vec<InstanceEvent>,
    rng: Rng,
}

impl SessionCore {
    pub fn new(definition: &'static ZoneDefinition, seed: u64) -> Self {
        let mut encounters = EncounterStateMachine::new(definition.encounters);
        let mut data = BTreeMap::new();
        for (key, value) in definition.data_defaults {
            match definition.record_for_key(*key) {
                Some(encounter) => {
                    encounters.set_aux(encounter, *key, *value);
                }
                None => {
                    data.insert(*key, *value);
                }
            }
        }
        Self {
            definition,
            encounters,
            gates: GateDependencyManager::new(definition.doors),
            roles: BTreeMap::new(),
            data,
            team: None,
            events: Vec::new(),
            rng: Rng::new(seed),
        }
    }

    pub fn definition(&self) -> &'static ZoneDefinition {
        self.definition
    }

    pub fn encounters(&self) -> &EncounterStateMachine {
        &self.encounters
    }

    pub fn gates(&self) -> &GateDependencyManager {
        &self.gates
    }

    pub fn rng_mut(&mut self) -> &mut Rng {
        &mut self.rng
    }

    pub fn encounter_state(&self, encounter: EncounterId) -> EncounterState {
        self.encounters.state(encounter)
    }

    pub fn team(&self) -> Option<Team> {
        self.team
    }

    /// First claim wins; later claims return false and change nothing.
    pub fn claim_team(&mut self, team: Team) -> bool {
        if self.team.is_some() {
            return false;
        }
        self.team = Some(team);
        info!(zone = self.definition.name, team = ?team, "team_claimed");
        self.events.push(InstanceEvent::TeamClaimed { team });
        true
    }

    pub fn bind_role(&mut self, role: RoleId, handle: EntityId) {
        self.roles.insert(role, handle);
    }

    /// Binds `handle` to the role declared for `type_id`, if any.
    pub fn bind_by_type(&mut self, handle: EntityId, type_id: TypeId) -> Option<RoleId> {
        let role = self.definition.role_for_type(type_id)?;
        self.bind_role(role, handle);
        Some(role)
    }

    /// Last handle bound to `role`. The entity may be gone already.
    pub fn role_handle(&self, role: RoleId) -> Option<EntityId> {
        self.roles.get(&role).copied()
    }

    /// Bound handle for `role`, only if the entity still exists.
    pub fn resolve(&self, role: RoleId, world: &World) -> Option<EntityId> {
        self.role_handle(role)
            .filter(|handle| world.exists(*handle) || world.object(*handle).is_some())
    }

    pub fn data(&self, key: DataKey) -> i64 {
        if self.definition.team_key == Some(key) {
            return self.team.map(Team::as_data).unwrap_or(0);
        }
        if let Some(encounter) = self.definition.record_for_key(key) {
            return self.encounters.aux(encounter, key);
        }
        self.data
            .get(&key)
            .copied()
            .unwrap_or_else(|| self.definition.data_default(key))
    }

    pub fn store_data(&mut self, key: DataKey, value: i64) {
        if self.definition.team_key == Some(key) {
            return;
        }
        match self.definition.record_for_key(key) {
            Some(encounter) => {
                self.encounters.set_aux(encounter, key, value);
            }
            None => {
                self.data.insert(key, value);
            }
        }
    }

    pub fn push_event(&mut self, event: InstanceEvent) {
        self.events.push(event);
    }

    pub fn drain_events(&mut self) -> Vec<InstanceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn requirements_met(&self, encounter: EncounterId) -> bool {
        self.encounters
            .all_done(self.definition.requirements_of(encounter))
    }

    pub fn check_required_bosses(
        &self,
        encounter: EncounterId,
        requestor: Option<EntityId>,
        privilege: &dyn PrivilegeQuery,
    ) -> bool {
        if let Some(requestor) = requestor {
            if privilege.is_privileged(requestor) {
                return true;
            }
        }
        self.requirements_met(encounter)
    }

    /// Applies a transition and every synchronous consequence: gate
    /// re-evaluation and guarded-trigger re-arming. Unknown ids return false
    /// without side effects.
    pub fn set_encounter_state(
        &mut self,
        world: &mut World,
        encounter: EncounterId,
        state: EncounterState,
    ) -> bool {
        let Some(previous) = self.encounters.set_state(encounter, state) else {
            return false;
        };
        if previous != state {
            self.events.push(InstanceEvent::EncounterStateChanged {
                encounter,
                from: previous,
                to: state,
            });
        }
        let updates = self.gates.on_encounter_changed(encounter, &self.encounters);
        self.apply_gate_updates(world, &updates);
        self.rearm_guarded_triggers(world, encounter);
        true
    }

    pub fn on_gate_created(&mut self, world: &mut World, handle: EntityId, type_id: TypeId) -> bool {
        let Some(update) = self.gates.on_gate_created(handle, type_id, &self.encounters) else {
            return false;
        };
        self.apply_gate_updates(world, &[update]);
        true
    }

    pub fn on_entity_removed(&mut self, handle: EntityId) {
        self.gates.on_gate_removed(handle);
    }

    fn apply_gate_updates(&mut self, world: &mut World, updates: &[GateUpdate]) {
        for update in updates {
            world.set_object_open(update.handle, update.open);
            if update.changed {
                self.events.push(InstanceEvent::GateToggled {
                    type_id: update.type_id,
                    handle: update.handle,
                    open: update.open,
                });
            }
        }
    }

    fn rearm_guarded_triggers(&mut self, world: &mut World, changed: EncounterId) {
        let definition = self.definition;
        for trigger in definition.guarded_triggers {
            let depends = trigger.encounter == changed
                || definition
                    .requirements_of(trigger.encounter)
                    .contains(&changed);
            if depends {
                self.arm_trigger(world, trigger.role);
            }
        }
    }

    /// Casts the trigger spell when its encounter is unlocked and idle, and
    /// hides the trigger once the encounter is finished.
    pub fn arm_trigger(&mut self, world: &mut World, role: RoleId) {
        let definition = self.definition;
        let Some(trigger) = definition
            .guarded_triggers
            .iter()
            .find(|trigger| trigger.role == role)
        else {
            return;
        };
        let Some(handle) = self.resolve(role, world) else {
            return;
        };
        let state = self.encounters.state(trigger.encounter);
        if trigger.hide_when_done && state == EncounterState::Done {
            world.set_visible(handle, false);
            return;
        }
        if self.requirements_met(trigger.encounter) && trigger.rearm_states.contains(&state) {
            if world.cast(handle, handle, trigger.spell) {
                debug!(encounter = trigger.encounter, trigger = handle.0, "trigger_armed");
                self.events.push(InstanceEvent::TriggerArmed {
                    encounter: trigger.encounter,
                    trigger: handle,
                });
            }
        }
    }

    pub fn refuse_engage(&mut self, world: &mut World, encounter: EncounterId, requestor: Option<EntityId>) {
        info!(
            zone = self.definition.name,
            encounter,
            requestor = requestor.map(|id| id.0),
            "engage_refused"
        );
        world.issue(ActorCommand::EjectParticipants { encounter });
        self.events.push(InstanceEvent::EngageRefused {
            encounter,
            requestor,
        });
    }

    pub fn encounter_views(&self) -> Vec<EncounterView> {
        self.encounters
            .records()
            .iter()
            .map(|record| EncounterView {
                id: record.id,
                name: record.name.to_string(),
                state: record.state,
            })
            .collect()
    }

    pub fn gate_views(&self) -> Vec<GateView> {
        self.gates.views()
    }
}

/// Session State Store for one zone instance: generic core plus the zone's
/// script hooks and the save codec.
pub struct InstanceSession {
    core: SessionCore,
    script: Box<dyn ZoneScript>,
    codec: Box<dyn SaveCodec>,
}

impl InstanceSession {
    pub fn new(script: Box<dyn ZoneScript>, seed: u64) -> Self {
        Self::with_codec(script, Box::new(TaggedTextCodec), seed)
    }

    pub fn with_codec(script: Box<dyn ZoneScript>, codec: Box<dyn SaveCodec>, seed: u64) -> Self {
        let core = SessionCore::new(script.definition(), seed);
        Self {
            core,
            script,
            codec,
        }
    }

    pub fn core(&self) -> &SessionCore {
        &self.core
    }

    pub fn definition(&self) -> &'static ZoneDefinition {
        self.core.definition
    }

    pub fn script(&self) -> &dyn ZoneScript {
        self.script.as_ref()
    }

    pub fn team(&self) -> Option<Team> {
        self.core.team
    }

    pub fn encounter_state(&self, encounter: EncounterId) -> EncounterState {
        self.core.encounter_state(encounter)
    }

    pub fn bind_role(&mut self, role: RoleId, handle: EntityId) {
        self.core.bind_role(role, handle);
    }

    pub fn resolve_role(&self, role: RoleId) -> Option<EntityId> {
        self.core.role_handle(role)
    }

    pub fn on_player_enter(&mut self, world: &World, player: EntityId) {
        if let Some(team) = world.player(player).map(|player| player.team) {
            self.core.claim_team(team);
        }
    }

    pub fn on_creature_create(&mut self, world: &mut World, actor: EntityId, type_id: TypeId) {
        if self.core.team.is_none() {
            if let Some(team) = world.first_player().map(|player| player.team) {
                self.core.claim_team(team);
            }
        }
        if let Some(role) = self.core.bind_by_type(actor, type_id) {
            self.core.arm_trigger(world, role);
        }
        let mut ctx = ScriptContext {
            core: &mut self.core,
            world,
        };
        self.script.on_creature_create(&mut ctx, actor, type_id);
    }

    pub fn on_object_create(&mut self, world: &mut World, object: EntityId, type_id: TypeId) {
        self.core.on_gate_created(world, object, type_id);
        self.core.bind_by_type(object, type_id);
        let mut ctx = ScriptContext {
            core: &mut self.core,
            world,
        };
        self.script.on_object_create(&mut ctx, object, type_id);
    }

    pub fn on_entity_removed(&mut self, handle: EntityId) {
        self.core.on_entity_removed(handle);
    }

    pub fn update(&mut self, world: &mut World, dt_ms: i64) {
        let mut ctx = ScriptContext {
            core: &mut self.core,
            world,
        };
        self.script.update(&mut ctx, dt_ms);
    }

    pub fn drain_events(&mut self) -> Vec<InstanceEvent> {
        self.core.drain_events()
    }

    pub fn save(&self) -> String {
        let definition = self.core.definition;
        let extras: Vec<i64> = definition
            .persisted_keys
            .iter()
            .map(|key| self.core.data(*key))
            .collect();
        self.codec
            .encode(&definition.save_layout(), &self.core.encounters.states(), &extras)
    }

    /// Restores a blob written by [`InstanceSession::save`]. Malformed input
    /// never fails: bad records fall back to their defaults with a warning,
    /// and a missing or foreign blob leaves the session untouched.
    pub fn load(&mut self, world: &mut World, raw: Option<&str>) {
        let definition = self.core.definition;
        let layout = definition.save_layout();
        let decoded = match self.codec.decode(&layout, raw) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(
                    zone = definition.name,
                    codec_version = self.codec.version(),
                    error = %err,
                    "save_load_fallback"
                );
                return;
            }
        };
        for issue in &decoded.issues {
            warn!(zone = definition.name, issue = ?issue, "save_record_coerced");
        }
        for (index, state) in decoded.states.iter().enumerate() {
            self.set_boss_state(world, index as EncounterId, *state);
        }
        for (key, value) in definition.persisted_keys.iter().zip(&decoded.extras) {
            let value = value.unwrap_or_else(|| definition.data_default(*key));
            self.core.store_data(*key, value);
        }
        debug!(zone = definition.name, "save_loaded");
    }
}

impl InstanceData for InstanceSession {
    fn get_data(&self, key: DataKey) -> i64 {
        self.core.data(key)
    }

    fn set_data(&mut self, world: &mut World, key: DataKey, value: i64) {
        self.core.store_data(key, value);
        let mut ctx = ScriptContext {
            core: &mut self.core,
            world,
        };
        self.script.on_set_data(&mut ctx, key, value);
    }

    fn get_guid(&self, role: RoleId) -> Option<EntityId> {
        self.core.role_handle(role)
    }

    fn boss_state(&self, encounter: EncounterId) -> EncounterState {
        self.core.encounter_state(encounter)
    }

    fn set_boss_state(&mut self, world: &mut World, encounter: EncounterId, state: EncounterState) -> bool {
        if !self.core.set_encounter_state(world, encounter, state) {
            return false;
        }
        let mut ctx = ScriptContext {
            core: &mut self.core,
            world,
        };
        self.script.on_state_changed(&mut ctx, encounter, state);
        true
    }

    fn check_required_bosses(
        &self,
        encounter: EncounterId,
        requestor: Option<EntityId>,
        privilege: &dyn PrivilegeQuery,
    ) -> bool {
        self.core
            .check_required_bosses(encounter, requestor, privilege)
    }

    fn refuse_engage(&mut self, world: &mut World, encounter: EncounterId, requestor: Option<EntityId>) {
        self.core.refuse_engage(world, encounter, requestor);
    }

    fn record_event(&mut self, event: InstanceEvent) {
        self.core.push_event(event);
    }
}
