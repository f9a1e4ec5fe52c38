use std::collections::BTreeMap;

use tracing::debug;

use crate::types::{EncounterId, EncounterState};

#[derive(Clone, Debug)]
pub struct EncounterRecord {
    pub id: EncounterId,
    pub name: &'static str,
    pub state: EncounterState,
    aux: BTreeMap<u32, i64>,
}

impl EncounterRecord {
    pub fn aux(&self, key: u32) -> i64 {
        self.aux.get(&key).copied().unwrap_or(0)
    }
}

/// Lifecycle state of every encounter in one session. Any state may be
/// forced from any other; only unknown ids are refused.
#[derive(Clone, Debug)]
pub struct EncounterStateMachine {
    records: Vec<EncounterRecord>,
}

impl EncounterStateMachine {
    pub fn new(names: &[&'static str]) -> Self {
        let records = names
            .iter()
            .enumerate()
            .map(|(index, name)| EncounterRecord {
                id: index as EncounterId,
                name: *name,
                state: EncounterState::NotStarted,
                aux: BTreeMap::new(),
            })
            .collect();
        Self { records }
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn state(&self, id: EncounterId) -> EncounterState {
        self.record(id)
            .map(|record| record.state)
            .unwrap_or_default()
    }

    pub fn record(&self, id: EncounterId) -> Option<&EncounterRecord> {
        self.records.get(id as usize)
    }

    pub fn records(&self) -> &[EncounterRecord] {
        &self.records
    }

    pub fn states(&self) -> Vec<EncounterState> {
        self.records.iter().map(|record| record.state).collect()
    }

    /// Returns the previous state, or `None` when `id` is not declared.
    pub fn set_state(&mut self, id: EncounterId, state: EncounterState) -> Option<EncounterState> {
        let record = self.records.get_mut(id as usize)?;
        let previous = record.state;
        record.state = state;
        if previous != state {
            debug!(
                encounter = id,
                name = record.name,
                from = ?previous,
                to = ?state,
                "encounter_state_changed"
            );
        }
        Some(previous)
    }

    pub fn is_done(&self, id: EncounterId) -> bool {
        self.state(id) == EncounterState::Done
    }

    pub fn all_done<'a>(&self, ids: impl IntoIterator<Item = &'a EncounterId>) -> bool {
        ids.into_iter().all(|id| self.is_done(*id))
    }

    pub fn aux(&self, id: EncounterId, key: u32) -> i64 {
        self.record(id).map(|record| record.aux(key)).unwrap_or(0)
    }

    pub fn set_aux(&mut self, id: EncounterId, key: u32, value: i64) -> bool {
        let Some(record) = self.records.get_mut(id as usize) else {
            return false;
        };
        record.aux.insert(key, value);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> EncounterStateMachine {
        EncounterStateMachine::new(&["first", "second", "third"])
    }

    #[test]
    fn unknown_ids_read_as_not_started_and_refuse_writes() {
        let mut machine = machine();
        assert_eq!(machine.state(42), EncounterState::NotStarted);
        assert_eq!(machine.set_state(42, EncounterState::Done), None);
        assert_eq!(machine.states().len(), 3);
    }

    #[test]
    fn any_transition_is_allowed() {
        let mut machine = machine();
        assert_eq!(
            machine.set_state(1, EncounterState::Done),
            Some(EncounterState::NotStarted)
        );
        assert_eq!(
            machine.set_state(1, EncounterState::InProgress),
            Some(EncounterState::Done)
        );
        assert_eq!(
            machine.set_state(1, EncounterState::ToBeDecided),
            Some(EncounterState::InProgress)
        );
    }

    #[test]
    fn all_done_checks_every_listed_id() {
        let mut machine = machine();
        machine.set_state(0, EncounterState::Done);
        assert!(machine.all_done(&[0]));
        assert!(!machine.all_done(&[0, 2]));
        machine.set_state(2, EncounterState::Done);
        assert!(machine.all_done(&[0, 2]));
    }

    #[test]
    fn aux_properties_default_to_zero() {
        let mut machine = machine();
        assert_eq!(machine.aux(0, 7), 0);
        assert!(machine.set_aux(0, 7, 12));
        assert_eq!(machine.aux(0, 7), 12);
        assert!(!machine.set_aux(9, 7, 1));
        assert_eq!(machine.aux(9, 7), 0);
    }
}
