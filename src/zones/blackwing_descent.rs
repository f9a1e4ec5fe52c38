use crate::gates::DoorData;
use crate::types::{
    BoundaryPolicy, DataKey, EncounterId, EncounterState, EntityId, RoleId, SpellId, TypeId,
};
use crate::zones::{
    GuardedTrigger, Requirement, RoleBinding, ScriptContext, ZoneDefinition, ZoneScript,
};

pub const DATA_MAGMAW: EncounterId = 0;
pub const DATA_OMNOTRON: EncounterId = 1;
pub const DATA_MALORIAK: EncounterId = 2;
pub const DATA_CHIMAERON: EncounterId = 3;
pub const DATA_ATRAMEDES: EncounterId = 4;
pub const DATA_NEFARIAN: EncounterId = 5;

pub const DATA_HEALTH_OMNOTRON_SHARED: DataKey = 20;
pub const DATA_MALORIAK_ABERRATIONS: DataKey = 21;
pub const DATA_BILE_O_TRON_800: DataKey = 22;
pub const DATA_TEAM: DataKey = 23;

pub const ROLE_MAGMAW: RoleId = 0;
pub const ROLE_OMNOTRON: RoleId = 1;
pub const ROLE_MALORIAK: RoleId = 2;
pub const ROLE_CHIMAERON: RoleId = 3;
pub const ROLE_ATRAMEDES: RoleId = 4;
pub const ROLE_NEFARIAN: RoleId = 5;
pub const ROLE_MAGMAW_HEAD: RoleId = 6;
pub const ROLE_ARCANOTRON: RoleId = 7;
pub const ROLE_ELECTRON: RoleId = 8;
pub const ROLE_MAGMATRON: RoleId = 9;
pub const ROLE_TOXITRON: RoleId = 10;
pub const ROLE_BILE_O_TRON_800: RoleId = 11;
pub const ROLE_LORD_VICTOR_NEFARIAN: RoleId = 12;
pub const ROLE_ONYXIA: RoleId = 13;
pub const ROLE_ORB_STALKER: RoleId = 14;
pub const ROLE_NEFARIAN_FLOOR: RoleId = 15;
pub const ROLE_ORB_OF_CULMINATION: RoleId = 16;

pub const NPC_MAGMAW: TypeId = 41570;
pub const NPC_MAGMAW_HEAD: TypeId = 42347;
pub const NPC_OMNOTRON: TypeId = 42186;
pub const NPC_ARCANOTRON: TypeId = 42166;
pub const NPC_ELECTRON: TypeId = 42179;
pub const NPC_MAGMATRON: TypeId = 42178;
pub const NPC_TOXITRON: TypeId = 42180;
pub const NPC_MALORIAK: TypeId = 41378;
pub const NPC_CHIMAERON: TypeId = 43296;
pub const NPC_BILE_O_TRON_800: TypeId = 44418;
pub const NPC_ATRAMEDES: TypeId = 41442;
pub const NPC_LORD_VICTOR_NEFARIAN: TypeId = 41379;
pub const NPC_NEFARIAN: TypeId = 41376;
pub const NPC_ONYXIA: TypeId = 41270;
pub const NPC_ORB_OF_CULMINATION_STALKER: TypeId = 49222;

pub const GO_INNER_CHAMBER_DOOR: TypeId = 205830;
pub const GO_NEFARIAN_FLOOR: TypeId = 207834;
pub const GO_ORB_OF_CULMINATION: TypeId = 203254;

pub const SPELL_DRAGON_ORB: SpellId = 78173;

const DEFAULT_ABERRATIONS: i64 = 18;

pub static DEFINITION: ZoneDefinition = ZoneDefinition {
    name: "blackwing_descent",
    map_id: 669,
    save_tag: "BD",
    encounters: &[
        "Magmaw",
        "Omnotron Defense System",
        "Maloriak",
        "Chimaeron",
        "Atramedes",
        "Nefarian's End",
    ],
    doors: &[
        DoorData {
            gate_type: GO_INNER_CHAMBER_DOOR,
            encounter: DATA_MAGMAW,
            boundary: BoundaryPolicy::Passage,
        },
        DoorData {
            gate_type: GO_INNER_CHAMBER_DOOR,
            encounter: DATA_OMNOTRON,
            boundary: BoundaryPolicy::Passage,
        },
    ],
    requirements: &[
        Requirement {
            encounter: DATA_MALORIAK,
            requires: &[DATA_MAGMAW, DATA_OMNOTRON],
        },
        Requirement {
            encounter: DATA_CHIMAERON,
            requires: &[DATA_MAGMAW, DATA_OMNOTRON],
        },
        Requirement {
            encounter: DATA_ATRAMEDES,
            requires: &[DATA_MAGMAW, DATA_OMNOTRON],
        },
        Requirement {
            encounter: DATA_NEFARIAN,
            requires: &[
                DATA_MAGMAW,
                DATA_OMNOTRON,
                DATA_MALORIAK,
                DATA_CHIMAERON,
                DATA_ATRAMEDES,
            ],
        },
    ],
    roles: &[
        RoleBinding {
            type_id: NPC_MAGMAW,
            role: ROLE_MAGMAW,
        },
        RoleBinding {
            type_id: NPC_OMNOTRON,
            role: ROLE_OMNOTRON,
        },
        RoleBinding {
            type_id: NPC_MALORIAK,
            role: ROLE_MALORIAK,
        },
        RoleBinding {
            type_id: NPC_CHIMAERON,
            role: ROLE_CHIMAERON,
        },
        RoleBinding {
            type_id: NPC_ATRAMEDES,
            role: ROLE_ATRAMEDES,
        },
        RoleBinding {
            type_id: NPC_NEFARIAN,
            role: ROLE_NEFARIAN,
        },
        RoleBinding {
            type_id: NPC_MAGMAW_HEAD,
            role: ROLE_MAGMAW_HEAD,
        },
        RoleBinding {
            type_id: NPC_ARCANOTRON,
            role: ROLE_ARCANOTRON,
        },
        RoleBinding {
            type_id: NPC_ELECTRON,
            role: ROLE_ELECTRON,
        },
        RoleBinding {
            type_id: NPC_MAGMATRON,
            role: ROLE_MAGMATRON,
        },
        RoleBinding {
            type_id: NPC_TOXITRON,
            role: ROLE_TOXITRON,
        },
        RoleBinding {
            type_id: NPC_BILE_O_TRON_800,
            role: ROLE_BILE_O_TRON_800,
        },
        RoleBinding {
            type_id: NPC_LORD_VICTOR_NEFARIAN,
            role: ROLE_LORD_VICTOR_NEFARIAN,
        },
        RoleBinding {
            type_id: NPC_ONYXIA,
            role: ROLE_ONYXIA,
        },
        RoleBinding {
            type_id: NPC_ORB_OF_CULMINATION_STALKER,
            role: ROLE_ORB_STALKER,
        },
        RoleBinding {
            type_id: GO_NEFARIAN_FLOOR,
            role: ROLE_NEFARIAN_FLOOR,
        },
        RoleBinding {
            type_id: GO_ORB_OF_CULMINATION,
            role: ROLE_ORB_OF_CULMINATION,
        },
    ],
    guarded_triggers: &[GuardedTrigger {
        role: ROLE_ORB_STALKER,
        encounter: DATA_NEFARIAN,
        spell: SPELL_DRAGON_ORB,
        rearm_states: &[
            EncounterState::NotStarted,
            EncounterState::Fail,
            EncounterState::ToBeDecided,
        ],
        hide_when_done: true,
    }],
    persisted_keys: &[],
    data_defaults: &[(DATA_MALORIAK_ABERRATIONS, DEFAULT_ABERRATIONS)],
    record_keys: &[
        (DATA_HEALTH_OMNOTRON_SHARED, DATA_OMNOTRON),
        (DATA_MALORIAK_ABERRATIONS, DATA_MALORIAK),
    ],
    team_key: Some(DATA_TEAM),
};

pub struct BlackwingDescent;

impl ZoneScript for BlackwingDescent {
    fn definition(&self) -> &'static ZoneDefinition {
        &DEFINITION
    }

    fn on_object_create(&mut self, ctx: &mut ScriptContext<'_>, object: EntityId, type_id: TypeId) {
        let nefarian_done = ctx.core.encounter_state(DATA_NEFARIAN) == EncounterState::Done;
        match type_id {
            GO_NEFARIAN_FLOOR if nefarian_done => {
                ctx.world.set_object_open(object, true);
            }
            GO_ORB_OF_CULMINATION if nefarian_done => {
                ctx.world.set_selectable(object, false);
            }
            _ => {}
        }
    }
}

pub fn create() -> Box<dyn ZoneScript> {
    Box::new(BlackwingDescent)
}
