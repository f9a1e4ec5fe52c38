use std::collections::BTreeMap;

use crate::codec::SaveLayout;
use crate::gates::DoorData;
use crate::session::{InstanceData, SessionCore};
use crate::types::{
    DataKey, EncounterId, EncounterState, EntityId, GroupView, RoleId, SpellId, TypeId,
};
use crate::world::World;

pub mod black_temple;
pub mod blackwing_descent;
pub mod razorfen_downs;
pub mod shadowfang_keep;

/// Creatures of `type_id` fill `role` when they enter the world.
#[derive(Clone, Copy, Debug)]
pub struct RoleBinding {
    pub type_id: TypeId,
    pub role: RoleId,
}

/// `encounter` may only be engaged once every id in `requires` is done.
#[derive(Clone, Copy, Debug)]
pub struct Requirement {
    pub encounter: EncounterId,
    pub requires: &'static [EncounterId],
}

/// A trigger creature that is re-armed by casting `spell` on itself whenever
/// the prerequisites of `encounter` hold and the encounter sits in one of
/// `rearm_states`.
#[derive(Clone, Copy, Debug)]
pub struct GuardedTrigger {
    pub role: RoleId,
    pub encounter: EncounterId,
    pub spell: SpellId,
    pub rearm_states: &'static [EncounterState],
    pub hide_when_done: bool,
}

/// Static table describing one zone type.
#[derive(Debug)]
pub struct ZoneDefinition {
    pub name: &'static str,
    pub map_id: u32,
    pub save_tag: &'static str,
    pub encounters: &'static [&'static str],
    pub doors: &'static [DoorData],
    pub requirements: &'static [Requirement],
    pub roles: &'static [RoleBinding],
    pub guarded_triggers: &'static [GuardedTrigger],
    /// Session scalars appended to the save blob, in blob order.
    pub persisted_keys: &'static [DataKey],
    pub data_defaults: &'static [(DataKey, i64)],
    /// Keys whose value lives in the counter bag of an encounter record
    /// rather than in the session scalars.
    pub record_keys: &'static [(DataKey, EncounterId)],
    pub team_key: Option<DataKey>,
}

impl ZoneDefinition {
    pub fn save_layout(&self) -> SaveLayout {
        SaveLayout {
            tag: self.save_tag,
            encounter_count: self.encounters.len(),
            extra_fields: self.persisted_keys.len(),
        }
    }

    pub fn requirements_of(&self, encounter: EncounterId) -> &'static [EncounterId] {
        self.requirements
            .iter()
            .find(|requirement| requirement.encounter == encounter)
            .map(|requirement| requirement.requires)
            .unwrap_or(&[])
    }

    pub fn role_for_type(&self, type_id: TypeId) -> Option<RoleId> {
        self.roles
            .iter()
            .find(|binding| binding.type_id == type_id)
            .map(|binding| binding.role)
    }

    pub fn record_for_key(&self, key: DataKey) -> Option<EncounterId> {
        self.record_keys
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, encounter)| *encounter)
    }

    pub fn data_default(&self, key: DataKey) -> i64 {
        self.data_defaults
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, value)| *value)
            .unwrap_or(0)
    }
}

pub struct ScriptContext<'a> {
    pub core: &'a mut SessionCore,
    pub world: &'a mut World,
}

/// Zone-specific hooks layered over the generic session behaviour. Every
/// hook runs after the generic handling of the same event.
pub trait ZoneScript: Send {
    fn definition(&self) -> &'static ZoneDefinition;

    fn on_creature_create(&mut self, _ctx: &mut ScriptContext<'_>, _actor: EntityId, _type_id: TypeId) {}

    fn on_object_create(&mut self, _ctx: &mut ScriptContext<'_>, _object: EntityId, _type_id: TypeId) {}

    /// Runs after `key` has been stored.
    fn on_set_data(&mut self, _ctx: &mut ScriptContext<'_>, _key: DataKey, _value: i64) {}

    fn on_state_changed(
        &mut self,
        _ctx: &mut ScriptContext<'_>,
        _encounter: EncounterId,
        _state: EncounterState,
    ) {
    }

    fn update(&mut self, _ctx: &mut ScriptContext<'_>, _dt_ms: i64) {}

    fn controllers(&self, _seed: u64) -> Vec<Box<dyn EncounterController>> {
        Vec::new()
    }
}

/// Encounter-level logic that spans several actors. The engine offers every
/// actor event to each controller; a controller that returns `true` has
/// fully handled it.
pub trait EncounterController: Send {
    fn encounter(&self) -> EncounterId;

    fn on_actor_bound(&mut self, _session: &mut dyn InstanceData, _world: &mut World) {}

    fn on_engage(
        &mut self,
        _session: &mut dyn InstanceData,
        _world: &mut World,
        _actor: EntityId,
        _attacker: EntityId,
    ) -> bool {
        false
    }

    /// Returns the damage actually dealt to `target` when intercepted.
    fn intercept_damage(
        &mut self,
        _session: &mut dyn InstanceData,
        _world: &mut World,
        _target: EntityId,
        _attacker: EntityId,
        _amount: i64,
    ) -> Option<i64> {
        None
    }

    fn on_evade(&mut self, _session: &mut dyn InstanceData, _world: &mut World, _actor: EntityId) -> bool {
        false
    }

    fn on_died(&mut self, _session: &mut dyn InstanceData, _world: &mut World, _actor: EntityId) {}

    fn update(&mut self, session: &mut dyn InstanceData, world: &mut World, dt_ms: i64);

    fn view(&self, _world: &World) -> Option<GroupView> {
        None
    }
}

pub type ZoneFactory = fn() -> Box<dyn ZoneScript>;

#[derive(Clone, Copy)]
struct ZoneEntry {
    map_id: u32,
    factory: ZoneFactory,
}

/// Explicitly constructed table of zone scripts, owned by whoever creates
/// instances.
#[derive(Clone, Default)]
pub struct ZoneRegistry {
    zones: BTreeMap<&'static str, ZoneEntry>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_zones() -> Self {
        let mut registry = Self::new();
        registry.register(&shadowfang_keep::DEFINITION, shadowfang_keep::create);
        registry.register(&blackwing_descent::DEFINITION, blackwing_descent::create);
        registry.register(&razorfen_downs::DEFINITION, razorfen_downs::create);
        registry.register(&black_temple::DEFINITION, black_temple::create);
        registry
    }

    pub fn register(&mut self, definition: &'static ZoneDefinition, factory: ZoneFactory) {
        self.zones.insert(
            definition.name,
            ZoneEntry {
                map_id: definition.map_id,
                factory,
            },
        );
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn ZoneScript>> {
        let normalized = name.trim().to_ascii_lowercase();
        self.zones
            .get(normalized.as_str())
            .map(|entry| (entry.factory)())
    }

    pub fn create_by_map(&self, map_id: u32) -> Option<Box<dyn ZoneScript>> {
        self.zones
            .values()
            .find(|entry| entry.map_id == map_id)
            .map(|entry| (entry.factory)())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.zones.keys().copied().collect()
    }
}
