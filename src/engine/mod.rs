use thiserror::Error;
use tracing::{debug, info};

use crate::session::{InstanceData, InstanceSession};
use crate::types::{
    DataKey, EncounterId, EncounterState, EntityId, InstanceEvent, InstanceSnapshot, Team, TypeId,
};
use crate::world::{ActorCommand, World};
use crate::zones::{EncounterController, ZoneDefinition, ZoneRegistry, ZoneScript};

mod combat;
mod spawn_system;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown zone `{0}`")]
    UnknownZone(String),
    #[error("no zone registered for map {0}")]
    UnknownMap(u32),
}

/// One live copy of a zone: the entity arena, the session state and every
/// encounter controller the zone hosts.
pub struct InstanceEngine {
    pub instance_id: u64,

    world: World,
    session: InstanceSession,
    controllers: Vec<Box<dyn EncounterController>>,
    events: Vec<InstanceEvent>,
    save_requested: bool,

    elapsed_ms: u64,
    tick_counter: u64,
}

impl InstanceEngine {
    pub fn new(instance_id: u64, script: Box<dyn ZoneScript>, seed: u64) -> Self {
        let controllers = script.controllers(seed);
        let session = InstanceSession::new(script, seed);
        info!(
            instance_id,
            zone = session.definition().name,
            controllers = controllers.len(),
            "instance_created"
        );
        Self {
            instance_id,
            world: World::new(),
            session,
            controllers,
            events: Vec::new(),
            save_requested: false,
            elapsed_ms: 0,
            tick_counter: 0,
        }
    }

    pub fn from_registry(
        registry: &ZoneRegistry,
        zone: &str,
        instance_id: u64,
        seed: u64,
    ) -> Result<Self, EngineError> {
        let script = registry
            .create(zone)
            .ok_or_else(|| EngineError::UnknownZone(zone.to_string()))?;
        Ok(Self::new(instance_id, script, seed))
    }

    pub fn from_map(
        registry: &ZoneRegistry,
        map_id: u32,
        instance_id: u64,
        seed: u64,
    ) -> Result<Self, EngineError> {
        let script = registry
            .create_by_map(map_id)
            .ok_or(EngineError::UnknownMap(map_id))?;
        Ok(Self::new(instance_id, script, seed))
    }

    pub fn definition(&self) -> &'static ZoneDefinition {
        self.session.definition()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn session(&self) -> &InstanceSession {
        &self.session
    }

    pub fn team(&self) -> Option<Team> {
        self.session.team()
    }

    pub fn tick(&self) -> u64 {
        self.tick_counter
    }

    pub fn step(&mut self, dt_ms: u64) {
        self.tick_counter += 1;
        self.elapsed_ms = self.elapsed_ms.saturating_add(dt_ms);
        let dt = dt_ms as i64;

        self.session.update(&mut self.world, dt);
        for controller in &mut self.controllers {
            controller.update(&mut self.session, &mut self.world, dt);
        }
        self.collect_events();
    }

    pub fn build_snapshot(&mut self, include_events: bool) -> InstanceSnapshot {
        self.collect_events();
        let core = self.session.core();
        let snapshot = InstanceSnapshot {
            instance_id: self.instance_id,
            zone: self.definition().name.to_string(),
            tick: self.tick_counter,
            elapsed_ms: self.elapsed_ms,
            team: core.team(),
            encounters: core.encounter_views(),
            gates: core.gate_views(),
            groups: self
                .controllers
                .iter()
                .filter_map(|controller| controller.view(&self.world))
                .collect(),
            events: if include_events {
                self.events.clone()
            } else {
                Vec::new()
            },
        };
        if include_events {
            self.events.clear();
        }
        snapshot
    }

    pub fn save(&self) -> String {
        self.session.save()
    }

    pub fn load(&mut self, raw: Option<&str>) {
        self.session.load(&mut self.world, raw);
        for controller in &mut self.controllers {
            controller.on_actor_bound(&mut self.session, &mut self.world);
        }
        self.collect_events();
        // Restoring state is not a reason to write it straight back.
        self.save_requested = false;
    }

    pub fn encounter_state(&self, encounter: EncounterId) -> EncounterState {
        self.session.encounter_state(encounter)
    }

    pub fn set_boss_state(&mut self, encounter: EncounterId, state: EncounterState) -> bool {
        let changed = self.session.set_boss_state(&mut self.world, encounter, state);
        self.collect_events();
        changed
    }

    pub fn get_data(&self, key: DataKey) -> i64 {
        self.session.get_data(key)
    }

    pub fn set_data(&mut self, key: DataKey, value: i64) {
        self.session.set_data(&mut self.world, key, value);
        self.collect_events();
    }

    pub fn check_required_bosses(&self, encounter: EncounterId, requestor: Option<EntityId>) -> bool {
        self.session
            .check_required_bosses(encounter, requestor, &self.world)
    }

    /// Returns whether a zone asked to be persisted since the last call.
    pub fn take_save_request(&mut self) -> bool {
        std::mem::take(&mut self.save_requested)
    }

    pub fn drain_events(&mut self) -> Vec<InstanceEvent> {
        self.collect_events();
        std::mem::take(&mut self.events)
    }

    pub fn drain_commands(&mut self) -> Vec<ActorCommand> {
        self.world.drain_commands()
    }

    fn collect_events(&mut self) {
        for event in self.session.drain_events() {
            if matches!(event, InstanceEvent::SaveRequested) {
                debug!(instance_id = self.instance_id, "save_requested");
                self.save_requested = true;
            }
            self.events.push(event);
        }
    }
}
