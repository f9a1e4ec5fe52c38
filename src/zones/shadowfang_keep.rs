use crate::constants::{crazed_first_spawn_range_ms, crazed_repeat_spawn_range_ms};
use crate::gates::DoorData;
use crate::scheduler::Countdown;
use crate::types::{BoundaryPolicy, DataKey, EncounterState, EntityId, RoleId, Team, TypeId};
use crate::world::ActorCommand;
use crate::zones::{RoleBinding, ScriptContext, ZoneDefinition, ZoneScript};

pub const DATA_ASHBURY: DataKey = 0;
pub const DATA_SILVERLAINE: DataKey = 1;
pub const DATA_SPRINGVALE: DataKey = 2;
pub const DATA_VALDEN: DataKey = 3;
pub const DATA_GODFREY: DataKey = 4;
pub const DATA_TEAM: DataKey = 5;
pub const DATA_CROWN: DataKey = 6;

pub const ROLE_ASHBURY: RoleId = 0;
pub const ROLE_SILVERLAINE: RoleId = 1;
pub const ROLE_SPRINGVALE: RoleId = 2;
pub const ROLE_VALDEN: RoleId = 3;
pub const ROLE_GODFREY: RoleId = 4;
pub const ROLE_FRYE: RoleId = 5;
pub const ROLE_HUMMEL: RoleId = 6;
pub const ROLE_BAXTER: RoleId = 7;
pub const ROLE_FOLLOWER: RoleId = 8;

pub const NPC_ASHBURY: TypeId = 46962;
pub const NPC_SILVERLAINE: TypeId = 3887;
pub const NPC_SPRINGVALE: TypeId = 4278;
pub const NPC_VALDEN: TypeId = 46963;
pub const NPC_GODFREY: TypeId = 46964;
pub const NPC_APOTHECARY_FRYE: TypeId = 36272;
pub const NPC_APOTHECARY_HUMMEL: TypeId = 36296;
pub const NPC_APOTHECARY_BAXTER: TypeId = 36565;
pub const NPC_BELMONT: TypeId = 47293;
pub const NPC_IVAR: TypeId = 47006;
pub const NPC_GUARD_HORDE1: TypeId = 47030;
pub const NPC_GUARD_HORDE2: TypeId = 47031;
pub const NPC_GUARD_ALLY: TypeId = 47027;
pub const NPC_CROMUSH: TypeId = 47294;

pub const GO_COURTYARD_DOOR: TypeId = 18895;
pub const GO_SORCERER_DOOR: TypeId = 18972;
pub const GO_ARUGAL_DOOR: TypeId = 18971;

pub const ACTION_SPAWN_CRAZED: i32 = 3;

/// Height band of the courtyard where the intro escort waits.
const INTRO_MIN_Z: f32 = 79.23;
const INTRO_MAX_Z: f32 = 82.47;
/// Escorts parked above this height follow the group to Godfrey.
const FOLLOWER_MIN_Z: f32 = 150.0;
/// Escorts this close to a defeated boss move up to it.
const PHASE_RADIUS: f32 = 28.0;

pub static DEFINITION: ZoneDefinition = ZoneDefinition {
    name: "shadowfang_keep",
    map_id: 33,
    save_tag: "SK",
    encounters: &[
        "Baron Ashbury",
        "Baron Silverlaine",
        "Commander Springvale",
        "Lord Walden",
        "Lord Godfrey",
    ],
    doors: &[
        DoorData {
            gate_type: GO_COURTYARD_DOOR,
            encounter: DATA_ASHBURY,
            boundary: BoundaryPolicy::Passage,
        },
        DoorData {
            gate_type: GO_SORCERER_DOOR,
            encounter: DATA_VALDEN,
            boundary: BoundaryPolicy::Passage,
        },
        DoorData {
            gate_type: GO_ARUGAL_DOOR,
            encounter: DATA_VALDEN,
            boundary: BoundaryPolicy::Passage,
        },
        DoorData {
            gate_type: GO_ARUGAL_DOOR,
            encounter: DATA_GODFREY,
            boundary: BoundaryPolicy::Room,
        },
    ],
    requirements: &[],
    roles: &[
        RoleBinding {
            type_id: NPC_ASHBURY,
            role: ROLE_ASHBURY,
        },
        RoleBinding {
            type_id: NPC_SILVERLAINE,
            role: ROLE_SILVERLAINE,
        },
        RoleBinding {
            type_id: NPC_SPRINGVALE,
            role: ROLE_SPRINGVALE,
        },
        RoleBinding {
            type_id: NPC_VALDEN,
            role: ROLE_VALDEN,
        },
        RoleBinding {
            type_id: NPC_GODFREY,
            role: ROLE_GODFREY,
        },
        RoleBinding {
            type_id: NPC_APOTHECARY_FRYE,
            role: ROLE_FRYE,
        },
        RoleBinding {
            type_id: NPC_APOTHECARY_HUMMEL,
            role: ROLE_HUMMEL,
        },
        RoleBinding {
            type_id: NPC_APOTHECARY_BAXTER,
            role: ROLE_BAXTER,
        },
    ],
    guarded_triggers: &[],
    persisted_keys: &[],
    data_defaults: &[],
    record_keys: &[],
    team_key: Some(DATA_TEAM),
};

fn boss_role(key: DataKey) -> Option<RoleId> {
    match key {
        DATA_ASHBURY => Some(ROLE_ASHBURY),
        DATA_SILVERLAINE => Some(ROLE_SILVERLAINE),
        DATA_SPRINGVALE => Some(ROLE_SPRINGVALE),
        DATA_VALDEN => Some(ROLE_VALDEN),
        DATA_GODFREY => Some(ROLE_GODFREY),
        _ => None,
    }
}

fn is_escort(type_id: TypeId) -> bool {
    matches!(
        type_id,
        NPC_BELMONT | NPC_IVAR | NPC_GUARD_HORDE1 | NPC_GUARD_HORDE2 | NPC_GUARD_ALLY
    )
}

pub struct ShadowfangKeep {
    phasing: Vec<EntityId>,
    intro: Vec<EntityId>,
    spawn_crazed: Countdown,
}

impl ShadowfangKeep {
    pub fn new() -> Self {
        Self {
            phasing: Vec::new(),
            intro: Vec::new(),
            spawn_crazed: Countdown::new(0),
        }
    }

    /// Sorts an escort into the intro group or the hidden phasing group.
    fn park_escort(&mut self, ctx: &mut ScriptContext<'_>, actor: EntityId) {
        let Some((z, type_id)) = ctx
            .world
            .actor(actor)
            .map(|actor| (actor.position_z, actor.type_id))
        else {
            return;
        };
        if (INTRO_MIN_Z..=INTRO_MAX_Z).contains(&z) {
            self.intro.push(actor);
            return;
        }
        // Only Belmont (or Ivar for alliance groups) follows the party.
        if z > FOLLOWER_MIN_Z && matches!(type_id, NPC_BELMONT | NPC_IVAR) {
            ctx.core.bind_role(ROLE_FOLLOWER, actor);
        }
        self.phasing.push(actor);
        ctx.world.set_visible(actor, false);
    }

    fn advance_phase(&mut self, ctx: &mut ScriptContext<'_>, boss: DataKey) {
        for escort in &self.phasing {
            ctx.world.set_visible(*escort, false);
        }

        let boss_actor = boss_role(boss)
            .and_then(|role| ctx.core.resolve(role, &*ctx.world))
            .and_then(|id| ctx.world.actor(id))
            .map(|actor| (actor.type_id, actor.position_z));
        if let Some((boss_type, boss_z)) = boss_actor {
            let nearby: Vec<(EntityId, TypeId)> = self
                .phasing
                .iter()
                .chain(self.intro.iter())
                .filter_map(|id| ctx.world.actor(*id))
                .filter(|actor| is_escort(actor.type_id))
                .filter(|actor| (actor.position_z - boss_z).abs() <= PHASE_RADIUS)
                .map(|actor| (actor.id, actor.type_id))
                .collect();
            for (escort, type_id) in nearby {
                if matches!(type_id, NPC_BELMONT | NPC_IVAR) {
                    ctx.world.issue(ActorCommand::DoAction {
                        actor: escort,
                        action: boss_type as i32,
                    });
                }
                ctx.world.set_visible(escort, true);
            }
        }

        if boss == DATA_ASHBURY {
            for guard in &self.intro {
                ctx.world.set_visible(*guard, false);
            }
        }
    }
}

impl Default for ShadowfangKeep {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneScript for ShadowfangKeep {
    fn definition(&self) -> &'static ZoneDefinition {
        &DEFINITION
    }

    fn on_creature_create(&mut self, ctx: &mut ScriptContext<'_>, actor: EntityId, type_id: TypeId) {
        let alliance = ctx.core.team() == Some(Team::Alliance);
        match type_id {
            NPC_BELMONT => {
                if alliance {
                    ctx.world.update_entry(actor, NPC_IVAR);
                }
                self.park_escort(ctx, actor);
            }
            NPC_GUARD_HORDE1 | NPC_GUARD_HORDE2 => {
                if alliance {
                    ctx.world.update_entry(actor, NPC_GUARD_ALLY);
                }
                self.park_escort(ctx, actor);
            }
            NPC_CROMUSH => {
                ctx.world.set_visible(actor, false);
            }
            _ => {}
        }
    }

    fn on_set_data(&mut self, ctx: &mut ScriptContext<'_>, key: DataKey, value: i64) {
        match key {
            DATA_CROWN => {
                if value == EncounterState::NotStarted.as_raw() as i64 {
                    let (min, max) = crazed_first_spawn_range_ms();
                    let delay = ctx.core.rng_mut().int(min, max);
                    self.spawn_crazed.set(delay);
                }
            }
            DATA_ASHBURY | DATA_SILVERLAINE | DATA_SPRINGVALE | DATA_VALDEN | DATA_GODFREY => {
                if value == EncounterState::Done.as_raw() as i64 {
                    self.advance_phase(ctx, key);
                }
            }
            _ => {}
        }
    }

    fn update(&mut self, ctx: &mut ScriptContext<'_>, dt_ms: i64) {
        if ctx.core.data(DATA_CROWN) != EncounterState::InProgress.as_raw() as i64 {
            return;
        }
        if !self.spawn_crazed.tick(dt_ms) {
            return;
        }
        if let Some(hummel) = ctx.core.resolve(ROLE_HUMMEL, &*ctx.world) {
            ctx.world.issue(ActorCommand::DoAction {
                actor: hummel,
                action: ACTION_SPAWN_CRAZED,
            });
        }
        let (min, max) = crazed_repeat_spawn_range_ms();
        let delay = ctx.core.rng_mut().int(min, max);
        self.spawn_crazed.rearm(delay);
    }
}

pub fn create() -> Box<dyn ZoneScript> {
    Box::new(ShadowfangKeep::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InstanceData, InstanceSession};
    use crate::world::World;

    fn setup(team: Team) -> (World, InstanceSession) {
        let mut world = World::new();
        let mut session = InstanceSession::new(create(), 9);
        let player = world.add_player(team, false);
        session.on_player_enter(&world, player);
        (world, session)
    }

    fn spawn(world: &mut World, session: &mut InstanceSession, type_id: TypeId, z: f32) -> EntityId {
        let id = world.spawn_actor_at(type_id, 100, z);
        session.on_creature_create(world, id, type_id);
        id
    }

    fn crazed_spawns(world: &World) -> usize {
        world
            .commands()
            .iter()
            .filter(|command| {
                matches!(
                    command,
                    ActorCommand::DoAction {
                        action: ACTION_SPAWN_CRAZED,
                        ..
                    }
                )
            })
            .count()
    }

    #[test]
    fn alliance_groups_get_alliance_escorts() {
        let (mut world, mut session) = setup(Team::Alliance);
        let belmont = spawn(&mut world, &mut session, NPC_BELMONT, 80.0);
        let guard = spawn(&mut world, &mut session, NPC_GUARD_HORDE2, 80.0);
        assert_eq!(world.actor(belmont).expect("belmont").type_id, NPC_IVAR);
        assert_eq!(world.actor(guard).expect("guard").type_id, NPC_GUARD_ALLY);
        assert_eq!(session.get_data(DATA_TEAM), Team::Alliance.as_data());
    }

    #[test]
    fn horde_groups_keep_horde_escorts() {
        let (mut world, mut session) = setup(Team::Horde);
        let belmont = spawn(&mut world, &mut session, NPC_BELMONT, 80.0);
        assert_eq!(world.actor(belmont).expect("belmont").type_id, NPC_BELMONT);
    }

    #[test]
    fn escorts_outside_the_courtyard_start_hidden() {
        let (mut world, mut session) = setup(Team::Horde);
        let parked = spawn(&mut world, &mut session, NPC_GUARD_HORDE1, 100.0);
        let follower = spawn(&mut world, &mut session, NPC_BELMONT, 160.0);
        let cromush = spawn(&mut world, &mut session, NPC_CROMUSH, 80.0);
        assert!(!world.actor(parked).expect("guard").visible);
        assert!(!world.actor(cromush).expect("cromush").visible);
        assert_eq!(session.get_guid(ROLE_FOLLOWER), Some(follower));
    }

    #[test]
    fn guards_past_the_gate_never_become_the_follower() {
        let (mut world, mut session) = setup(Team::Alliance);
        let guard = spawn(&mut world, &mut session, NPC_GUARD_HORDE1, 170.0);
        assert_eq!(session.get_guid(ROLE_FOLLOWER), None);
        assert!(!world.actor(guard).expect("guard").visible);

        let ivar = spawn(&mut world, &mut session, NPC_BELMONT, 170.0);
        spawn(&mut world, &mut session, NPC_GUARD_HORDE2, 175.0);
        assert_eq!(session.get_guid(ROLE_FOLLOWER), Some(ivar));
    }

    #[test]
    fn ashbury_defeat_moves_escorts_up_and_clears_intro() {
        let (mut world, mut session) = setup(Team::Horde);
        let intro_guard = spawn(&mut world, &mut session, NPC_GUARD_HORDE1, 80.0);
        let belmont = spawn(&mut world, &mut session, NPC_BELMONT, 100.0);
        let far_guard = spawn(&mut world, &mut session, NPC_GUARD_HORDE2, 140.0);
        spawn(&mut world, &mut session, NPC_ASHBURY, 95.0);

        session.set_data(&mut world, DATA_ASHBURY, EncounterState::Done.as_raw() as i64);
        assert!(world.actor(belmont).expect("belmont").visible);
        assert!(!world.actor(far_guard).expect("guard").visible);
        assert!(!world.actor(intro_guard).expect("guard").visible);
        assert!(world.commands().contains(&ActorCommand::DoAction {
            actor: belmont,
            action: NPC_ASHBURY as i32,
        }));
    }

    #[test]
    fn crown_event_spawns_crazed_while_in_progress() {
        let (mut world, mut session) = setup(Team::Horde);
        spawn(&mut world, &mut session, NPC_APOTHECARY_HUMMEL, 0.0);
        session.set_data(&mut world, DATA_CROWN, EncounterState::NotStarted.as_raw() as i64);

        session.update(&mut world, 20_000);
        assert_eq!(crazed_spawns(&world), 0);

        session.set_data(&mut world, DATA_CROWN, EncounterState::InProgress.as_raw() as i64);
        session.update(&mut world, 6_999);
        assert_eq!(crazed_spawns(&world), 0);
        session.update(&mut world, 7_001);
        assert_eq!(crazed_spawns(&world), 1);

        for _ in 0..600 {
            session.update(&mut world, 100);
        }
        let spawns = crazed_spawns(&world);
        assert!((13..=31).contains(&spawns), "{spawns}");

        session.set_data(&mut world, DATA_CROWN, EncounterState::Done.as_raw() as i64);
        session.update(&mut world, 60_000);
        assert_eq!(crazed_spawns(&world), spawns);
    }

    #[test]
    fn arugal_door_needs_walden_and_godfrey() {
        let (mut world, mut session) = setup(Team::Horde);
        let door = world.spawn_object(GO_ARUGAL_DOOR);
        session.on_object_create(&mut world, door, GO_ARUGAL_DOOR);
        session.set_boss_state(&mut world, DATA_VALDEN, EncounterState::Done);
        assert!(!world.object(door).expect("door").open);
        session.set_boss_state(&mut world, DATA_GODFREY, EncounterState::Done);
        assert!(world.object(door).expect("door").open);
        assert_eq!(session.save(), "S K 0 0 0 3 3");
    }
}
