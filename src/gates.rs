use std::collections::BTreeMap;

use tracing::debug;

use crate::encounter::EncounterStateMachine;
use crate::types::{BoundaryPolicy, EncounterId, EntityId, GateView, TypeId};

/// One row of a zone's door table: `gate_type` is controlled by `encounter`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DoorData {
    pub gate_type: TypeId,
    pub encounter: EncounterId,
    pub boundary: BoundaryPolicy,
}

#[derive(Clone, Debug)]
pub struct GateRecord {
    pub type_id: TypeId,
    pub handle: Option<EntityId>,
    pub open: bool,
    controllers: BTreeMap<EncounterId, BoundaryPolicy>,
}

impl GateRecord {
    pub fn controllers(&self) -> impl Iterator<Item = &EncounterId> {
        self.controllers.keys()
    }

    pub fn boundary_for(&self, encounter: EncounterId) -> Option<BoundaryPolicy> {
        self.controllers.get(&encounter).copied()
    }

    fn compute_open(&self, encounters: &EncounterStateMachine) -> bool {
        encounters.all_done(self.controllers.keys())
    }
}

/// World-state change the caller must push into the world for one gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GateUpdate {
    pub type_id: TypeId,
    pub handle: EntityId,
    pub open: bool,
    pub changed: bool,
}

#[derive(Clone, Debug, Default)]
pub struct GateDependencyManager {
    gates: BTreeMap<TypeId, GateRecord>,
    by_encounter: BTreeMap<EncounterId, Vec<TypeId>>,
}

impl GateDependencyManager {
    pub fn new(doors: &[DoorData]) -> Self {
        let mut manager = Self::default();
        for door in doors {
            let record = manager
                .gates
                .entry(door.gate_type)
                .or_insert_with(|| GateRecord {
                    type_id: door.gate_type,
                    handle: None,
                    open: false,
                    controllers: BTreeMap::new(),
                });
            record.controllers.insert(door.encounter, door.boundary);

            let gate_types = manager.by_encounter.entry(door.encounter).or_default();
            if !gate_types.contains(&door.gate_type) {
                gate_types.push(door.gate_type);
            }
        }
        manager
    }

    pub fn is_gate_type(&self, type_id: TypeId) -> bool {
        self.gates.contains_key(&type_id)
    }

    pub fn gate(&self, type_id: TypeId) -> Option<&GateRecord> {
        self.gates.get(&type_id)
    }

    /// Binds a freshly created gate object and returns the state it must
    /// take right away; `None` if the type is not in the door table.
    pub fn on_gate_created(
        &mut self,
        handle: EntityId,
        type_id: TypeId,
        encounters: &EncounterStateMachine,
    ) -> Option<GateUpdate> {
        let record = self.gates.get_mut(&type_id)?;
        record.handle = Some(handle);
        let open = record.compute_open(encounters);
        let changed = record.open != open;
        record.open = open;
        debug!(gate_type = type_id, handle = handle.0, open, "gate_bound");
        Some(GateUpdate {
            type_id,
            handle,
            open,
            changed,
        })
    }

    pub fn on_gate_removed(&mut self, handle: EntityId) {
        for record in self.gates.values_mut() {
            if record.handle == Some(handle) {
                record.handle = None;
            }
        }
    }

    /// Recomputes every gate controlled by `encounter`. Gates whose object
    /// has not been created yet are skipped; they settle on creation.
    pub fn on_encounter_changed(
        &mut self,
        encounter: EncounterId,
        encounters: &EncounterStateMachine,
    ) -> Vec<GateUpdate> {
        let Some(gate_types) = self.by_encounter.get(&encounter) else {
            return Vec::new();
        };
        let mut updates = Vec::new();
        for type_id in gate_types {
            let Some(record) = self.gates.get_mut(type_id) else {
                continue;
            };
            let open = record.compute_open(encounters);
            let changed = record.open != open;
            record.open = open;
            let Some(handle) = record.handle else {
                continue;
            };
            if changed {
                debug!(gate_type = *type_id, handle = handle.0, open, "gate_toggled");
            }
            updates.push(GateUpdate {
                type_id: *type_id,
                handle,
                open,
                changed,
            });
        }
        updates
    }

    pub fn views(&self) -> Vec<GateView> {
        self.gates
            .values()
            .map(|record| GateView {
                type_id: record.type_id,
                handle: record.handle,
                open: record.open,
                controllers: record.controllers.keys().copied().collect(),
            })
            .collect()
    }
}
