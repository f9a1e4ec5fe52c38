use crate::gates::DoorData;
use crate::types::{BoundaryPolicy, EncounterId, RoleId, TypeId};
use crate::zones::{EncounterController, Requirement, RoleBinding, ZoneDefinition, ZoneScript};

pub mod council;

pub const NAJENTUS: EncounterId = 0;
pub const SUPREMUS: EncounterId = 1;
pub const SHADE_OF_AKAMA: EncounterId = 2;
pub const TERON_GOREFIEND: EncounterId = 3;
pub const GURTOGG_BLOODBOIL: EncounterId = 4;
pub const RELIQUARY_OF_SOULS: EncounterId = 5;
pub const MOTHER_SHAHRAZ: EncounterId = 6;
pub const ILLIDARI_COUNCIL: EncounterId = 7;
pub const ILLIDAN: EncounterId = 8;

pub const ROLE_GATHIOS: RoleId = 1;
pub const ROLE_ZEREVOR: RoleId = 2;
pub const ROLE_MALANDE: RoleId = 3;
pub const ROLE_VERAS: RoleId = 4;
pub const ROLE_COUNCIL: RoleId = 5;
pub const ROLE_COUNCIL_VOICE: RoleId = 6;

pub const NPC_GATHIOS: TypeId = 22949;
pub const NPC_ZEREVOR: TypeId = 22950;
pub const NPC_MALANDE: TypeId = 22951;
pub const NPC_VERAS: TypeId = 22952;
pub const NPC_ILLIDARI_COUNCIL: TypeId = 23426;
pub const NPC_COUNCIL_VOICE: TypeId = 23499;

pub const GO_NAJENTUS_GATE: TypeId = 185483;
pub const GO_SUPREMUS_DOORS: TypeId = 185882;
pub const GO_COUNCIL_DOOR: TypeId = 185481;
pub const GO_ILLIDAN_GATE: TypeId = 185905;

pub static DEFINITION: ZoneDefinition = ZoneDefinition {
    name: "black_temple",
    map_id: 564,
    save_tag: "BT",
    encounters: &[
        "High Warlord Naj'entus",
        "Supremus",
        "Shade of Akama",
        "Teron Gorefiend",
        "Gurtogg Bloodboil",
        "Reliquary of Souls",
        "Mother Shahraz",
        "Illidari Council",
        "Illidan Stormrage",
    ],
    doors: &[
        DoorData {
            gate_type: GO_NAJENTUS_GATE,
            encounter: NAJENTUS,
            boundary: BoundaryPolicy::Passage,
        },
        DoorData {
            gate_type: GO_SUPREMUS_DOORS,
            encounter: SUPREMUS,
            boundary: BoundaryPolicy::Passage,
        },
        DoorData {
            gate_type: GO_COUNCIL_DOOR,
            encounter: MOTHER_SHAHRAZ,
            boundary: BoundaryPolicy::Passage,
        },
        DoorData {
            gate_type: GO_ILLIDAN_GATE,
            encounter: ILLIDARI_COUNCIL,
            boundary: BoundaryPolicy::Passage,
        },
    ],
    requirements: &[
        Requirement {
            encounter: ILLIDARI_COUNCIL,
            requires: &[
                NAJENTUS,
                SUPREMUS,
                SHADE_OF_AKAMA,
                TERON_GOREFIEND,
                GURTOGG_BLOODBOIL,
                RELIQUARY_OF_SOULS,
                MOTHER_SHAHRAZ,
            ],
        },
        Requirement {
            encounter: ILLIDAN,
            requires: &[
                NAJENTUS,
                SUPREMUS,
                SHADE_OF_AKAMA,
                TERON_GOREFIEND,
                GURTOGG_BLOODBOIL,
                RELIQUARY_OF_SOULS,
                MOTHER_SHAHRAZ,
                ILLIDARI_COUNCIL,
            ],
        },
    ],
    roles: &[
        RoleBinding {
            type_id: NPC_GATHIOS,
            role: ROLE_GATHIOS,
        },
        RoleBinding {
            type_id: NPC_ZEREVOR,
            role: ROLE_ZEREVOR,
        },
        RoleBinding {
            type_id: NPC_MALANDE,
            role: ROLE_MALANDE,
        },
        RoleBinding {
            type_id: NPC_VERAS,
            role: ROLE_VERAS,
        },
        RoleBinding {
            type_id: NPC_ILLIDARI_COUNCIL,
            role: ROLE_COUNCIL,
        },
        RoleBinding {
            type_id: NPC_COUNCIL_VOICE,
            role: ROLE_COUNCIL_VOICE,
        },
    ],
    guarded_triggers: &[],
    persisted_keys: &[],
    data_defaults: &[],
    record_keys: &[],
    team_key: None,
};

pub struct BlackTemple;

impl ZoneScript for BlackTemple {
    fn definition(&self) -> &'static ZoneDefinition {
        &DEFINITION
    }

    fn controllers(&self, seed: u64) -> Vec<Box<dyn EncounterController>> {
        vec![Box::new(council::coordinator(seed))]
    }
}

pub fn create() -> Box<dyn ZoneScript> {
    Box::new(BlackTemple)
}
