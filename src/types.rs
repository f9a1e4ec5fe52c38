use serde::{Deserialize, Serialize};

use crate::constants::{ALLIANCE_TEAM_ID, HORDE_TEAM_ID};

/// Stable arena id of a world entity. Holding one never implies the entity
/// is still alive; every lookup goes through the world and may miss.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct EntityId(pub u64);

pub type EncounterId = u32;
pub type RoleId = u32;
pub type DataKey = u32;
pub type SpellId = u32;
pub type TypeId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EncounterState {
    #[default]
    NotStarted,
    InProgress,
    Fail,
    Done,
    Special,
    ToBeDecided,
}

impl EncounterState {
    pub fn as_raw(self) -> u32 {
        match self {
            Self::NotStarted => 0,
            Self::InProgress => 1,
            Self::Fail => 2,
            Self::Done => 3,
            Self::Special => 4,
            Self::ToBeDecided => 5,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::NotStarted),
            1 => Some(Self::InProgress),
            2 => Some(Self::Fail),
            3 => Some(Self::Done),
            4 => Some(Self::Special),
            5 => Some(Self::ToBeDecided),
            _ => None,
        }
    }

    /// States that may be written to a save blob and read back unchanged.
    pub fn is_persistable(self) -> bool {
        !matches!(self, Self::InProgress | Self::ToBeDecided)
    }
}

/// Opaque boundary tag consumed by world geometry; never interpreted here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    None,
    Room,
    Passage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Alliance,
    Horde,
}

impl Team {
    pub fn as_data(self) -> i64 {
        match self {
            Self::Alliance => ALLIANCE_TEAM_ID,
            Self::Horde => HORDE_TEAM_ID,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "alliance" => Some(Self::Alliance),
            "horde" => Some(Self::Horde),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupPhase {
    Idle,
    Armed,
    Engaged,
    Cascading,
}

#[derive(Clone, Debug, Serialize)]
pub struct EncounterView {
    pub id: EncounterId,
    pub name: String,
    pub state: EncounterState,
}

#[derive(Clone, Debug, Serialize)]
pub struct GateView {
    #[serde(rename = "typeId")]
    pub type_id: TypeId,
    pub handle: Option<EntityId>,
    pub open: bool,
    pub controllers: Vec<EncounterId>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GroupView {
    pub encounter: EncounterId,
    pub phase: GroupPhase,
    #[serde(rename = "sharedHealthFraction")]
    pub shared_health_fraction: f32,
    #[serde(rename = "deathSequenceIndex")]
    pub death_sequence_index: usize,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstanceEvent {
    EncounterStateChanged {
        encounter: EncounterId,
        from: EncounterState,
        to: EncounterState,
    },
    GateToggled {
        #[serde(rename = "typeId")]
        type_id: TypeId,
        handle: EntityId,
        open: bool,
    },
    TeamClaimed {
        team: Team,
    },
    EngageRefused {
        encounter: EncounterId,
        requestor: Option<EntityId>,
    },
    TriggerArmed {
        encounter: EncounterId,
        trigger: EntityId,
    },
    GroupPhaseChanged {
        encounter: EncounterId,
        phase: GroupPhase,
    },
    MemberDefeated {
        encounter: EncounterId,
        member: EntityId,
    },
    SaveRequested,
}

#[derive(Clone, Debug, Serialize)]
pub struct InstanceSnapshot {
    #[serde(rename = "instanceId")]
    pub instance_id: u64,
    pub zone: String,
    pub tick: u64,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    pub team: Option<Team>,
    pub encounters: Vec<EncounterView>,
    pub gates: Vec<GateView>,
    pub groups: Vec<GroupView>,
    pub events: Vec<InstanceEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_match_wire_numbering() {
        for raw in 0..=5 {
            let state = EncounterState::from_raw(raw).expect("in range");
            assert_eq!(state.as_raw(), raw);
        }
        assert_eq!(EncounterState::from_raw(6), None);
        assert_eq!(EncounterState::Done.as_raw(), 3);
    }

    #[test]
    fn team_parse_is_case_insensitive() {
        assert_eq!(Team::parse(" Horde "), Some(Team::Horde));
        assert_eq!(Team::parse("ALLIANCE"), Some(Team::Alliance));
        assert_eq!(Team::parse("scourge"), None);
    }
}
