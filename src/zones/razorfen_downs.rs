use crate::types::{DataKey, EncounterId, EncounterState, EntityId, InstanceEvent, RoleId, TypeId};
use crate::world::ActorCommand;
use crate::zones::{RoleBinding, ScriptContext, ZoneDefinition, ZoneScript};

pub const BOSS_TUTEN_KASH: EncounterId = 0;
pub const DATA_GONG_WAVES: DataKey = 1;

pub const ROLE_TUTEN_KASH: RoleId = 0;
pub const ROLE_GONG: RoleId = 1;

pub const NPC_TOMB_FIEND: TypeId = 7349;
pub const NPC_TOMB_REAVER: TypeId = 7351;
pub const NPC_TUTEN_KASH: TypeId = 7355;
pub const GO_GONG: TypeId = 148917;

/// Height of the gong room floor where waves appear.
const SUMMON_Z: f32 = 46.896;

pub static DEFINITION: ZoneDefinition = ZoneDefinition {
    name: "razorfen_downs",
    map_id: 129,
    save_tag: "TC",
    encounters: &["Tuten'kash"],
    doors: &[],
    requirements: &[],
    roles: &[
        RoleBinding {
            type_id: NPC_TUTEN_KASH,
            role: ROLE_TUTEN_KASH,
        },
        RoleBinding {
            type_id: GO_GONG,
            role: ROLE_GONG,
        },
    ],
    guarded_triggers: &[],
    persisted_keys: &[DATA_GONG_WAVES],
    data_defaults: &[],
    record_keys: &[(DATA_GONG_WAVES, BOSS_TUTEN_KASH)],
    team_key: None,
};

/// Creature, extra copies and health for the gong waves that summon.
fn wave(waves: i64) -> Option<(TypeId, usize, i64)> {
    match waves {
        1 => Some((NPC_TOMB_FIEND, 7, 1_200)),
        10 => Some((NPC_TOMB_REAVER, 3, 1_500)),
        16 => Some((NPC_TUTEN_KASH, 0, 4_000)),
        _ => None,
    }
}

pub struct RazorfenDowns;

impl RazorfenDowns {
    fn ring_gong(&mut self, ctx: &mut ScriptContext<'_>, waves: i64) {
        match waves {
            9 | 14 => {
                if let Some(gong) = ctx.core.resolve(ROLE_GONG, &*ctx.world) {
                    ctx.world.set_selectable(gong, true);
                }
            }
            _ => {
                let Some((type_id, extra, health)) = wave(waves) else {
                    return;
                };
                let Some(gong) = ctx.core.resolve(ROLE_GONG, &*ctx.world) else {
                    return;
                };
                ctx.world.set_selectable(gong, false);
                for _ in 0..=extra {
                    let summoned = ctx.world.spawn_actor_at(type_id, health, SUMMON_Z);
                    ctx.world.issue(ActorCommand::Summon {
                        source: gong,
                        summoned,
                        type_id,
                    });
                    ctx.core.bind_by_type(summoned, type_id);
                }
            }
        }
    }
}

impl ZoneScript for RazorfenDowns {
    fn definition(&self) -> &'static ZoneDefinition {
        &DEFINITION
    }

    fn on_object_create(&mut self, ctx: &mut ScriptContext<'_>, object: EntityId, type_id: TypeId) {
        if type_id == GO_GONG && ctx.core.encounter_state(BOSS_TUTEN_KASH) == EncounterState::Done {
            ctx.world.set_selectable(object, false);
        }
    }

    fn on_set_data(&mut self, ctx: &mut ScriptContext<'_>, key: DataKey, value: i64) {
        match key {
            DATA_GONG_WAVES => self.ring_gong(ctx, value),
            BOSS_TUTEN_KASH => {
                let Some(state) = u32::try_from(value).ok().and_then(EncounterState::from_raw) else {
                    return;
                };
                ctx.core.set_encounter_state(ctx.world, BOSS_TUTEN_KASH, state);
                if state == EncounterState::Done {
                    ctx.core.push_event(InstanceEvent::SaveRequested);
                }
            }
            _ => {}
        }
    }

    fn on_state_changed(
        &mut self,
        ctx: &mut ScriptContext<'_>,
        encounter: EncounterId,
        state: EncounterState,
    ) {
        if encounter == BOSS_TUTEN_KASH && state == EncounterState::Done {
            ctx.core.push_event(InstanceEvent::SaveRequested);
        }
    }
}

pub fn create() -> Box<dyn ZoneScript> {
    Box::new(RazorfenDowns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InstanceData, InstanceSession};
    use crate::world::World;

    fn with_gong() -> (World, InstanceSession, EntityId) {
        let mut world = World::new();
        let mut session = InstanceSession::new(create(), 4);
        let gong = world.spawn_object(GO_GONG);
        session.on_object_create(&mut world, gong, GO_GONG);
        (world, session, gong)
    }

    fn summoned(world: &World, type_id: TypeId) -> usize {
        world
            .actors()
            .filter(|actor| actor.type_id == type_id)
            .count()
    }

    #[test]
    fn first_wave_summons_eight_fiends_and_locks_the_gong() {
        let (mut world, mut session, gong) = with_gong();
        session.set_data(&mut world, DATA_GONG_WAVES, 1);
        assert_eq!(summoned(&world, NPC_TOMB_FIEND), 8);
        assert!(!world.object(gong).expect("gong").selectable);

        session.set_data(&mut world, DATA_GONG_WAVES, 9);
        assert!(world.object(gong).expect("gong").selectable);

        session.set_data(&mut world, DATA_GONG_WAVES, 10);
        assert_eq!(summoned(&world, NPC_TOMB_REAVER), 4);
    }

    #[test]
    fn last_wave_brings_tuten_kash() {
        let (mut world, mut session, _) = with_gong();
        session.set_data(&mut world, DATA_GONG_WAVES, 16);
        let boss = session.get_guid(ROLE_TUTEN_KASH).expect("boss bound");
        assert_eq!(world.actor(boss).expect("boss").type_id, NPC_TUTEN_KASH);
    }

    #[test]
    fn waves_without_a_gong_do_nothing() {
        let mut world = World::new();
        let mut session = InstanceSession::new(create(), 4);
        session.set_data(&mut world, DATA_GONG_WAVES, 1);
        assert_eq!(world.actors().count(), 0);
        assert_eq!(session.get_data(DATA_GONG_WAVES), 1);
    }

    #[test]
    fn defeat_requests_an_immediate_save_with_wave_count() {
        let (mut world, mut session, _) = with_gong();
        session.set_data(&mut world, DATA_GONG_WAVES, 16);
        session.set_boss_state(&mut world, BOSS_TUTEN_KASH, EncounterState::Done);
        assert!(session
            .drain_events()
            .iter()
            .any(|event| matches!(event, InstanceEvent::SaveRequested)));
        assert_eq!(session.save(), "T C 3 16");
    }

    #[test]
    fn wave_counter_lives_on_the_encounter_record() {
        let (mut world, mut session, _) = with_gong();
        session.set_data(&mut world, DATA_GONG_WAVES, 14);
        assert_eq!(
            session.core().encounters().aux(BOSS_TUTEN_KASH, DATA_GONG_WAVES),
            14
        );
        let blob = session.save();
        assert_eq!(blob, "T C 0 14");

        let mut restored = InstanceSession::new(create(), 5);
        restored.load(&mut world, Some(&blob));
        let record = restored
            .core()
            .encounters()
            .record(BOSS_TUTEN_KASH)
            .expect("record");
        assert_eq!(record.aux(DATA_GONG_WAVES), 14);
        assert_eq!(restored.get_data(DATA_GONG_WAVES), 14);
    }

    #[test]
    fn boss_data_key_drives_the_encounter() {
        let (mut world, mut session, _) = with_gong();
        session.set_data(&mut world, BOSS_TUTEN_KASH, i64::from(EncounterState::Done.as_raw()));
        assert_eq!(session.boss_state(BOSS_TUTEN_KASH), EncounterState::Done);
        assert!(session
            .drain_events()
            .iter()
            .any(|event| matches!(event, InstanceEvent::SaveRequested)));
    }

    #[test]
    fn gong_created_after_defeat_is_locked() {
        let mut world = World::new();
        let mut session = InstanceSession::new(create(), 4);
        session.load(&mut world, Some("T C 3 16"));
        assert_eq!(session.get_data(DATA_GONG_WAVES), 16);
        let gong = world.spawn_object(GO_GONG);
        session.on_object_create(&mut world, gong, GO_GONG);
        assert!(!world.object(gong).expect("gong").selectable);
    }
}
