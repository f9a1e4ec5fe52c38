use thiserror::Error;
use tracing::{debug, info};

use crate::constants::{CASCADE_FIRST_STEP_MS, CASCADE_STEP_MS, GROUP_EVADE_CHECK_MS};
use crate::rng::Rng;
use crate::scheduler::TaskScheduler;
use crate::session::InstanceData;
use crate::types::{
    EncounterId, EncounterState, EntityId, GroupPhase, GroupView, InstanceEvent, RoleId, SpellId,
};
use crate::world::World;
use crate::zones::EncounterController;

/// What a member behaviour may see and touch during one call.
pub struct MemberContext<'a> {
    pub me: EntityId,
    pub roles: &'a [RoleId],
    pub members: &'a [Option<EntityId>],
    pub world: &'a mut World,
    pub rng: &'a mut Rng,
}

impl MemberContext<'_> {
    pub fn victim(&self) -> Option<EntityId> {
        self.world.victim_of(self.me)
    }

    /// Live handle of the member seated in `role`.
    pub fn peer(&self, role: RoleId) -> Option<EntityId> {
        let index = self.roles.iter().position(|candidate| *candidate == role)?;
        live_member(self.world, self.members, index)
    }

    pub fn live_members(&self) -> Vec<EntityId> {
        (0..self.members.len())
            .filter_map(|index| live_member(self.world, self.members, index))
            .collect()
    }

    /// Random player in the instance, falling back to the current victim.
    pub fn random_target(&mut self) -> Option<EntityId> {
        let players = self.world.player_ids();
        if players.is_empty() {
            return self.victim();
        }
        let index = self.rng.pick_index(players.len());
        players.get(index).copied()
    }

    pub fn cast_on_self(&mut self, spell: SpellId) -> bool {
        self.world.cast(self.me, self.me, spell)
    }

    pub fn cast_on_victim(&mut self, spell: SpellId) -> bool {
        match self.victim() {
            Some(victim) => self.world.cast(self.me, victim, spell),
            None => false,
        }
    }

    pub fn cast_on(&mut self, target: Option<EntityId>, spell: SpellId) -> bool {
        match target {
            Some(target) => self.world.cast(self.me, target, spell),
            None => false,
        }
    }

    pub fn broadcast_aura(&mut self, spell: SpellId) -> usize {
        self.world.cast(self.me, self.me, spell);
        apply_to_live_members(self.world, self.members, spell)
    }

    pub fn talk(&mut self, line: u8) {
        self.world.talk(self.me, line);
    }
}

/// Behaviour of one seat in a group encounter. The coordinator owns health
/// sharing, evade and death sequencing; members only run their abilities.
pub trait GroupMember: Send {
    fn role(&self) -> RoleId;

    /// Restores the initial ability schedule.
    fn reset(&mut self, rng: &mut Rng);

    fn on_engaged(&mut self, _ctx: &mut MemberContext<'_>) {}

    /// Called each tick while the group is engaged and this member has a victim.
    fn update(&mut self, ctx: &mut MemberContext<'_>, dt_ms: i64);

    fn on_died(&mut self, _ctx: &mut MemberContext<'_>) {}
}

/// Auxiliary "voice" actor that narrates the fight. `ctx.me` is the voice.
pub trait GroupNarrator: Send {
    fn reset(&mut self);

    fn on_event_start(&mut self);

    fn update(&mut self, ctx: &mut MemberContext<'_>, dt_ms: i64);
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StartRefusal {
    #[error("group is {phase:?}, not armed")]
    NotArmed { phase: GroupPhase },
    #[error("initiator is gone")]
    InitiatorGone,
    #[error("prerequisites of encounter {encounter} are not done")]
    PrerequisitesUnmet { encounter: EncounterId },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GroupTask {
    EvadeCheck,
    CascadeStep,
}

enum Engagement {
    MemberDead,
    AllIdle,
    Busy,
}

pub struct GroupCoordinator {
    encounter: EncounterId,
    roles: Vec<RoleId>,
    voice_role: Option<RoleId>,
    controller_role: Option<RoleId>,
    behaviours: Vec<Box<dyn GroupMember>>,
    narrator: Option<Box<dyn GroupNarrator>>,
    members: Vec<Option<EntityId>>,
    phase: GroupPhase,
    death_sequence_index: usize,
    tasks: TaskScheduler<GroupTask, GroupPhase>,
    rng: Rng,
}

impl GroupCoordinator {
    /// `behaviours` fixes both the member count and the cascade order.
    pub fn new(
        encounter: EncounterId,
        behaviours: Vec<Box<dyn GroupMember>>,
        narrator: Option<Box<dyn GroupNarrator>>,
        voice_role: Option<RoleId>,
        seed: u64,
    ) -> Self {
        let roles: Vec<RoleId> = behaviours.iter().map(|behaviour| behaviour.role()).collect();
        let mut coordinator = Self {
            encounter,
            members: vec![None; roles.len()],
            roles,
            voice_role,
            controller_role: None,
            behaviours,
            narrator,
            phase: GroupPhase::Idle,
            death_sequence_index: 0,
            tasks: TaskScheduler::new(),
            rng: Rng::new(seed),
        };
        for behaviour in &mut coordinator.behaviours {
            behaviour.reset(&mut coordinator.rng);
        }
        if let Some(narrator) = coordinator.narrator.as_mut() {
            narrator.reset();
        }
        coordinator
    }

    /// Actor that owns the event. The group only arms while it exists, and
    /// it is defeated last when the cascade completes.
    pub fn with_controller(mut self, role: RoleId) -> Self {
        self.controller_role = Some(role);
        self
    }

    pub fn phase(&self) -> GroupPhase {
        self.phase
    }

    pub fn members(&self) -> &[Option<EntityId>] {
        &self.members
    }

    pub fn death_sequence_index(&self) -> usize {
        self.death_sequence_index
    }

    pub fn is_member(&self, actor: EntityId) -> bool {
        self.index_of(actor).is_some()
    }

    fn index_of(&self, actor: EntityId) -> Option<usize> {
        self.members.iter().position(|member| *member == Some(actor))
    }

    fn resolve_members(&mut self, session: &dyn InstanceData) {
        self.members = self.roles.iter().map(|role| session.get_guid(*role)).collect();
    }

    fn set_phase(&mut self, session: &mut dyn InstanceData, phase: GroupPhase) {
        if self.phase == phase {
            return;
        }
        info!(encounter = self.encounter, from = ?self.phase, to = ?phase, "group_phase_changed");
        self.phase = phase;
        session.record_event(InstanceEvent::GroupPhaseChanged {
            encounter: self.encounter,
            phase,
        });
    }

    /// Idle to Armed once every seat is bound to an existing actor.
    pub fn try_arm(&mut self, session: &mut dyn InstanceData, world: &World) -> bool {
        if self.phase != GroupPhase::Idle || session.boss_state(self.encounter) == EncounterState::Done {
            return false;
        }
        self.resolve_members(session);
        let all_bound = self
            .members
            .iter()
            .all(|member| member.map(|id| world.exists(id)).unwrap_or(false));
        let controller_present = self
            .controller_role
            .map_or(true, |role| session.get_guid(role).is_some_and(|id| world.exists(id)));
        if !all_bound || !controller_present {
            return false;
        }
        self.set_phase(session, GroupPhase::Armed);
        true
    }

    /// Starts the fight against `initiator`. Unmet prerequisites evade the
    /// group and eject the participants instead.
    pub fn start(
        &mut self,
        session: &mut dyn InstanceData,
        world: &mut World,
        initiator: EntityId,
    ) -> Result<(), StartRefusal> {
        if self.phase != GroupPhase::Armed {
            return Err(StartRefusal::NotArmed { phase: self.phase });
        }
        if !world.is_alive(initiator) {
            return Err(StartRefusal::InitiatorGone);
        }
        self.resolve_members(session);
        if !session.check_required_bosses(self.encounter, Some(initiator), &*world) {
            for index in 0..self.members.len() {
                if let Some(member) = live_member(world, &self.members, index) {
                    world.evade(member);
                }
            }
            session.refuse_engage(world, self.encounter, Some(initiator));
            return Err(StartRefusal::PrerequisitesUnmet {
                encounter: self.encounter,
            });
        }

        for (index, behaviour) in self.behaviours.iter_mut().enumerate() {
            let Some(me) = live_member(world, &self.members, index) else {
                continue;
            };
            world.attack(me, initiator);
            let mut ctx = MemberContext {
                me,
                roles: &self.roles,
                members: &self.members,
                world: &mut *world,
                rng: &mut self.rng,
            };
            behaviour.on_engaged(&mut ctx);
        }
        if let Some(narrator) = self.narrator.as_mut() {
            narrator.on_event_start();
        }
        session.set_boss_state(world, self.encounter, EncounterState::InProgress);
        self.set_phase(session, GroupPhase::Engaged);
        self.tasks
            .schedule(GroupTask::EvadeCheck, GroupPhase::Engaged, GROUP_EVADE_CHECK_MS);
        Ok(())
    }

    /// Splits `amount` into equal shares across the group. Returns the share
    /// dealt to `target`, or `None` when the hit is not the group's business.
    pub fn apply_damage(
        &mut self,
        session: &mut dyn InstanceData,
        world: &mut World,
        target: EntityId,
        attacker: EntityId,
        amount: i64,
    ) -> Option<i64> {
        if self.phase != GroupPhase::Engaged || self.is_member(attacker) {
            return None;
        }
        self.index_of(target)?;
        if !world.is_alive(target) {
            return None;
        }

        let share = amount.max(0) / self.roles.len().max(1) as i64;
        // Collect before applying so one hit never sees a half-updated group.
        let others: Vec<EntityId> = (0..self.members.len())
            .filter_map(|index| live_member(world, &self.members, index))
            .filter(|member| *member != target)
            .filter(|member| world.health_of(*member).map(|health| health > share).unwrap_or(false))
            .collect();
        for other in others {
            world.deal_damage(other, share);
        }
        let remaining = world.deal_damage(target, share);
        debug!(encounter = self.encounter, target = target.0, amount, share, "group_damage_shared");
        if remaining == Some(0) {
            self.on_member_died(session, world, target);
        }
        Some(share)
    }

    pub fn on_member_died(&mut self, session: &mut dyn InstanceData, world: &mut World, member: EntityId) {
        let Some(index) = self.index_of(member) else {
            return;
        };
        self.notify_died(world, index, member);
        session.record_event(InstanceEvent::MemberDefeated {
            encounter: self.encounter,
            member,
        });
        if self.phase == GroupPhase::Engaged {
            self.begin_cascade(session);
        }
    }

    /// A member wants to leave combat. It rejoins a peer's fight when there
    /// is one; otherwise it evades and the whole group is checked at once.
    pub fn on_member_evade(&mut self, session: &mut dyn InstanceData, world: &mut World, member: EntityId) -> bool {
        let Some(index) = self.index_of(member) else {
            return false;
        };
        if self.phase == GroupPhase::Engaged {
            let peer_victim = (0..self.members.len())
                .filter(|other| *other != index)
                .filter_map(|other| live_member(world, &self.members, other))
                .find_map(|other| world.victim_of(other));
            if let Some(victim) = peer_victim {
                if world.attack(member, victim) {
                    return true;
                }
            }
        }
        world.evade(member);
        if self.phase == GroupPhase::Engaged {
            match self.engagement(world) {
                Engagement::AllIdle => self.reset(session, world),
                Engagement::MemberDead => self.begin_cascade(session),
                Engagement::Busy => {}
            }
        }
        true
    }

    fn engagement(&self, world: &World) -> Engagement {
        let mut present = 0;
        let mut idle = 0;
        for member in self.members.iter().flatten() {
            if !world.exists(*member) {
                continue;
            }
            if !world.is_alive(*member) {
                return Engagement::MemberDead;
            }
            present += 1;
            if world.victim_of(*member).is_none() {
                idle += 1;
            }
        }
        if present > 0 && idle == present {
            Engagement::AllIdle
        } else {
            Engagement::Busy
        }
    }

    fn run_evade_check(&mut self, session: &mut dyn InstanceData, world: &mut World, overshoot_ms: i64) {
        if self.phase != GroupPhase::Engaged {
            return;
        }
        match self.engagement(world) {
            Engagement::MemberDead => self.begin_cascade(session),
            Engagement::AllIdle => self.reset(session, world),
            Engagement::Busy => self.tasks.schedule_carry(
                GroupTask::EvadeCheck,
                GroupPhase::Engaged,
                GROUP_EVADE_CHECK_MS,
                overshoot_ms,
            ),
        }
    }

    fn begin_cascade(&mut self, session: &mut dyn InstanceData) {
        if self.phase != GroupPhase::Engaged {
            return;
        }
        self.tasks.cancel_phase(GroupPhase::Engaged);
        self.death_sequence_index = 0;
        self.set_phase(session, GroupPhase::Cascading);
        self.tasks
            .schedule(GroupTask::CascadeStep, GroupPhase::Cascading, CASCADE_FIRST_STEP_MS);
    }

    fn cascade_step(&mut self, session: &mut dyn InstanceData, world: &mut World, overshoot_ms: i64) {
        if self.phase != GroupPhase::Cascading {
            return;
        }
        while self.death_sequence_index < self.members.len() {
            let index = self.death_sequence_index;
            self.death_sequence_index += 1;
            let Some(member) = live_member(world, &self.members, index) else {
                continue;
            };
            world.kill(member);
            self.notify_died(world, index, member);
            session.record_event(InstanceEvent::MemberDefeated {
                encounter: self.encounter,
                member,
            });
            info!(encounter = self.encounter, member = member.0, step = index, "group_cascade_step");
            self.tasks.schedule_carry(
                GroupTask::CascadeStep,
                GroupPhase::Cascading,
                CASCADE_STEP_MS,
                overshoot_ms,
            );
            return;
        }

        if let Some(voice) = self.voice_role.and_then(|role| session.get_guid(role)) {
            world.kill(voice);
        }
        session.set_boss_state(world, self.encounter, EncounterState::Done);
        if let Some(controller) = self.controller_role.and_then(|role| session.get_guid(role)) {
            world.kill(controller);
        }
        self.tasks.clear();
        self.set_phase(session, GroupPhase::Idle);
        info!(encounter = self.encounter, "group_completed");
    }

    fn notify_died(&mut self, world: &mut World, index: usize, member: EntityId) {
        let Some(behaviour) = self.behaviours.get_mut(index) else {
            return;
        };
        let mut ctx = MemberContext {
            me: member,
            roles: &self.roles,
            members: &self.members,
            world,
            rng: &mut self.rng,
        };
        behaviour.on_died(&mut ctx);
    }

    /// Wipe: revive and evade every member, restart their schedules and
    /// return the encounter to `NotStarted`, then re-arm.
    pub fn reset(&mut self, session: &mut dyn InstanceData, world: &mut World) {
        info!(encounter = self.encounter, "group_reset");
        self.tasks.clear();
        self.resolve_members(session);
        for member in self.members.iter().flatten() {
            if !world.is_alive(*member) {
                world.respawn(*member);
            }
            world.evade(*member);
        }
        if let Some(voice) = self.voice_role.and_then(|role| session.get_guid(role)) {
            world.evade(voice);
        }
        if session.boss_state(self.encounter) != EncounterState::Done {
            session.set_boss_state(world, self.encounter, EncounterState::NotStarted);
        }
        for behaviour in &mut self.behaviours {
            behaviour.reset(&mut self.rng);
        }
        if let Some(narrator) = self.narrator.as_mut() {
            narrator.reset();
        }
        self.death_sequence_index = 0;
        self.set_phase(session, GroupPhase::Idle);
        self.try_arm(session, world);
    }

    pub fn update(&mut self, session: &mut dyn InstanceData, world: &mut World, dt_ms: i64) {
        if self.phase == GroupPhase::Idle {
            self.try_arm(session, world);
        }

        if self.phase == GroupPhase::Engaged {
            for (index, behaviour) in self.behaviours.iter_mut().enumerate() {
                let Some(me) = live_member(world, &self.members, index) else {
                    continue;
                };
                if world.victim_of(me).is_none() {
                    continue;
                }
                let mut ctx = MemberContext {
                    me,
                    roles: &self.roles,
                    members: &self.members,
                    world: &mut *world,
                    rng: &mut self.rng,
                };
                behaviour.update(&mut ctx, dt_ms);
            }
            let voice = self
                .voice_role
                .and_then(|role| session.get_guid(role))
                .filter(|voice| world.is_alive(*voice));
            if let (Some(narrator), Some(voice)) = (self.narrator.as_mut(), voice) {
                let mut ctx = MemberContext {
                    me: voice,
                    roles: &self.roles,
                    members: &self.members,
                    world: &mut *world,
                    rng: &mut self.rng,
                };
                narrator.update(&mut ctx, dt_ms);
            }
        }

        for fired in self.tasks.update(dt_ms) {
            match fired.task {
                GroupTask::EvadeCheck => self.run_evade_check(session, world, fired.overshoot_ms),
                GroupTask::CascadeStep => self.cascade_step(session, world, fired.overshoot_ms),
            }
        }
    }

    pub fn broadcast_aura(&self, world: &mut World, spell: SpellId) -> usize {
        apply_to_live_members(world, &self.members, spell)
    }

    pub fn shared_health_fraction(&self, world: &World) -> f32 {
        let (health, max_health) = self
            .members
            .iter()
            .flatten()
            .filter_map(|member| world.actor(*member))
            .fold((0i64, 0i64), |(health, max), actor| {
                (health + actor.health, max + actor.max_health)
            });
        if max_health <= 0 {
            return 0.0;
        }
        health as f32 / max_health as f32
    }

    pub fn view(&self, world: &World) -> GroupView {
        GroupView {
            encounter: self.encounter,
            phase: self.phase,
            shared_health_fraction: self.shared_health_fraction(world),
            death_sequence_index: self.death_sequence_index,
        }
    }
}

impl EncounterController for GroupCoordinator {
    fn encounter(&self) -> EncounterId {
        self.encounter
    }

    fn on_actor_bound(&mut self, session: &mut dyn InstanceData, world: &mut World) {
        self.try_arm(session, world);
    }

    fn on_engage(
        &mut self,
        session: &mut dyn InstanceData,
        world: &mut World,
        actor: EntityId,
        attacker: EntityId,
    ) -> bool {
        if !self.is_member(actor) {
            return false;
        }
        match self.phase {
            GroupPhase::Idle => false,
            GroupPhase::Armed => {
                if let Err(refusal) = self.start(session, world, attacker) {
                    debug!(encounter = self.encounter, %refusal, "group_start_refused");
                    world.evade(actor);
                }
                true
            }
            GroupPhase::Engaged => {
                if world.victim_of(actor).is_none() {
                    world.attack(actor, attacker);
                }
                true
            }
            GroupPhase::Cascading => true,
        }
    }

    fn intercept_damage(
        &mut self,
        session: &mut dyn InstanceData,
        world: &mut World,
        target: EntityId,
        attacker: EntityId,
        amount: i64,
    ) -> Option<i64> {
        self.apply_damage(session, world, target, attacker, amount)
    }

    fn on_evade(&mut self, session: &mut dyn InstanceData, world: &mut World, actor: EntityId) -> bool {
        self.on_member_evade(session, world, actor)
    }

    fn on_died(&mut self, session: &mut dyn InstanceData, world: &mut World, actor: EntityId) {
        self.on_member_died(session, world, actor);
    }

    fn update(&mut self, session: &mut dyn InstanceData, world: &mut World, dt_ms: i64) {
        GroupCoordinator::update(self, session, world, dt_ms);
    }

    fn view(&self, world: &World) -> Option<GroupView> {
        Some(GroupCoordinator::view(self, world))
    }
}

fn live_member(world: &World, members: &[Option<EntityId>], index: usize) -> Option<EntityId> {
    members
        .get(index)
        .copied()
        .flatten()
        .filter(|member| world.is_alive(*member))
}

fn apply_to_live_members(world: &mut World, members: &[Option<EntityId>], spell: SpellId) -> usize {
    let mut applied = 0;
    for index in 0..members.len() {
        if let Some(member) = live_member(world, members, index) {
            if world.apply_aura(member, spell) {
                applied += 1;
            }
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::session::InstanceSession;
    use crate::types::{Team, TypeId};
    use crate::world::ActorCommand;
    use crate::zones::{Requirement, RoleBinding, ZoneDefinition, ZoneScript};

    const GROUP: EncounterId = 1;
    const VOICE_ROLE: RoleId = 10;
    const VOICE_TYPE: TypeId = 110;
    const MEMBER_HEALTH: i64 = 1_000;

    static GROUP_ZONE: ZoneDefinition = ZoneDefinition {
        name: "group_zone",
        map_id: 2,
        save_tag: "GZ",
        encounters: &["gatekeeper", "council"],
        doors: &[],
        requirements: &[Requirement {
            encounter: GROUP,
            requires: &[0],
        }],
        roles: &[
            RoleBinding { type_id: 101, role: 1 },
            RoleBinding { type_id: 102, role: 2 },
            RoleBinding { type_id: 103, role: 3 },
            RoleBinding { type_id: 104, role: 4 },
            RoleBinding {
                type_id: VOICE_TYPE,
                role: VOICE_ROLE,
            },
        ],
        guarded_triggers: &[],
        persisted_keys: &[],
        data_defaults: &[],
        record_keys: &[],
        team_key: None,
    };

    struct GroupScript;

    impl ZoneScript for GroupScript {
        fn definition(&self) -> &'static ZoneDefinition {
            &GROUP_ZONE
        }
    }

    struct Probe {
        role: RoleId,
        resets: Arc<AtomicUsize>,
        updates: Arc<AtomicUsize>,
    }

    impl GroupMember for Probe {
        fn role(&self) -> RoleId {
            self.role
        }

        fn reset(&mut self, _rng: &mut Rng) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }

        fn update(&mut self, _ctx: &mut MemberContext<'_>, _dt_ms: i64) {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }

        fn on_died(&mut self, ctx: &mut MemberContext<'_>) {
            ctx.talk(9);
        }
    }

    struct Fixture {
        world: World,
        session: InstanceSession,
        group: GroupCoordinator,
        members: Vec<EntityId>,
        voice: EntityId,
        player: EntityId,
        resets: Arc<AtomicUsize>,
        updates: Arc<AtomicUsize>,
    }

    fn fixture(prerequisite_done: bool) -> Fixture {
        let resets = Arc::new(AtomicUsize::new(0));
        let updates = Arc::new(AtomicUsize::new(0));
        let behaviours: Vec<Box<dyn GroupMember>> = (1..=4)
            .map(|role| {
                Box::new(Probe {
                    role,
                    resets: resets.clone(),
                    updates: updates.clone(),
                }) as Box<dyn GroupMember>
            })
            .collect();
        let mut world = World::new();
        let mut session = InstanceSession::new(Box::new(GroupScript), 3);
        if prerequisite_done {
            session.set_boss_state(&mut world, 0, EncounterState::Done);
        }
        let player = world.add_player(Team::Horde, false);
        let members: Vec<EntityId> = (101..=104)
            .map(|type_id| {
                let id = world.spawn_actor(type_id, MEMBER_HEALTH);
                session.on_creature_create(&mut world, id, type_id);
                id
            })
            .collect();
        let voice = world.spawn_actor(VOICE_TYPE, 1);
        session.on_creature_create(&mut world, voice, VOICE_TYPE);
        let mut group = GroupCoordinator::new(GROUP, behaviours, None, Some(VOICE_ROLE), 3);
        assert!(group.try_arm(&mut session, &world));
        resets.store(0, Ordering::SeqCst);
        Fixture {
            world,
            session,
            group,
            members,
            voice,
            player,
            resets,
            updates,
        }
    }

    fn engaged() -> Fixture {
        let mut fx = fixture(true);
        fx.group
            .start(&mut fx.session, &mut fx.world, fx.player)
            .expect("group starts");
        fx
    }

    fn health(fx: &Fixture, index: usize) -> i64 {
        fx.world.health_of(fx.members[index]).expect("member exists")
    }

    fn killed(world: &World) -> Vec<EntityId> {
        world
            .commands()
            .iter()
            .filter_map(|command| match command {
                ActorCommand::Kill { actor } => Some(*actor),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn start_binds_every_member_to_the_initiator() {
        let fx = engaged();
        assert_eq!(fx.group.phase(), GroupPhase::Engaged);
        assert_eq!(fx.session.boss_state(GROUP), EncounterState::InProgress);
        for member in &fx.members {
            assert_eq!(fx.world.victim_of(*member), Some(fx.player));
        }
    }

    #[test]
    fn start_requires_armed_group() {
        let mut fx = engaged();
        assert_eq!(
            fx.group.start(&mut fx.session, &mut fx.world, fx.player),
            Err(StartRefusal::NotArmed {
                phase: GroupPhase::Engaged
            })
        );
    }

    #[test]
    fn unmet_prerequisite_refuses_and_ejects() {
        let mut fx = fixture(false);
        let result = fx.group.start(&mut fx.session, &mut fx.world, fx.player);
        assert_eq!(
            result,
            Err(StartRefusal::PrerequisitesUnmet { encounter: GROUP })
        );
        assert_eq!(fx.group.phase(), GroupPhase::Armed);
        assert_eq!(fx.session.boss_state(GROUP), EncounterState::NotStarted);
        assert!(fx
            .world
            .commands()
            .contains(&ActorCommand::EjectParticipants { encounter: GROUP }));
        assert!(fx.members.iter().all(|member| fx.world.victim_of(*member).is_none()));
    }

    #[test]
    fn privileged_initiator_bypasses_prerequisites() {
        let mut fx = fixture(false);
        let admin = fx.world.add_player(Team::Horde, true);
        assert!(fx.group.start(&mut fx.session, &mut fx.world, admin).is_ok());
        assert_eq!(fx.group.phase(), GroupPhase::Engaged);
    }

    #[test]
    fn hit_of_one_hundred_costs_each_of_four_members_twenty_five() {
        let mut fx = engaged();
        let share = fx
            .group
            .apply_damage(&mut fx.session, &mut fx.world, fx.members[2], fx.player, 100);
        assert_eq!(share, Some(25));
        for index in 0..4 {
            assert_eq!(health(&fx, index), MEMBER_HEALTH - 25);
        }
    }

    #[test]
    fn total_loss_stays_within_truncation_of_the_hit() {
        let mut fx = engaged();
        fx.group
            .apply_damage(&mut fx.session, &mut fx.world, fx.members[0], fx.player, 103);
        let lost: i64 = (0..4).map(|index| MEMBER_HEALTH - health(&fx, index)).sum();
        assert_eq!(lost, 100);
        assert!(103 - lost <= 3);
    }

    #[test]
    fn shares_never_kill_a_bystander() {
        let mut fx = engaged();
        if let Some(actor) = fx.world.actor_mut(fx.members[3]) {
            actor.health = 20;
        }
        fx.group
            .apply_damage(&mut fx.session, &mut fx.world, fx.members[0], fx.player, 100);
        assert_eq!(health(&fx, 3), 20);
        assert_eq!(health(&fx, 0), MEMBER_HEALTH - 25);
    }

    #[test]
    fn friendly_damage_is_not_shared() {
        let mut fx = engaged();
        let result = fx
            .group
            .apply_damage(&mut fx.session, &mut fx.world, fx.members[0], fx.members[1], 100);
        assert_eq!(result, None);
        assert_eq!(health(&fx, 1), MEMBER_HEALTH);
    }

    #[test]
    fn first_death_cascades_in_role_order_then_finishes() {
        let mut fx = engaged();
        if let Some(actor) = fx.world.actor_mut(fx.members[1]) {
            actor.health = 10;
        }
        fx.group
            .apply_damage(&mut fx.session, &mut fx.world, fx.members[1], fx.player, 100);
        assert_eq!(fx.group.phase(), GroupPhase::Cascading);
        assert!(!fx.world.is_alive(fx.members[1]));

        fx.group.update(&mut fx.session, &mut fx.world, 950);
        assert!(killed(&fx.world).is_empty());
        fx.group.update(&mut fx.session, &mut fx.world, 50);
        assert_eq!(killed(&fx.world), vec![fx.members[0]]);

        fx.group.update(&mut fx.session, &mut fx.world, 1_500);
        assert_eq!(killed(&fx.world), vec![fx.members[0], fx.members[2]]);
        fx.group.update(&mut fx.session, &mut fx.world, 1_500);
        assert_eq!(
            killed(&fx.world),
            vec![fx.members[0], fx.members[2], fx.members[3]]
        );
        assert_eq!(fx.session.boss_state(GROUP), EncounterState::InProgress);
        assert!(fx.world.is_alive(fx.voice));

        fx.group.update(&mut fx.session, &mut fx.world, 1_500);
        assert!(!fx.world.is_alive(fx.voice));
        assert_eq!(fx.session.boss_state(GROUP), EncounterState::Done);
        assert_eq!(fx.group.phase(), GroupPhase::Idle);
        assert_eq!(fx.group.death_sequence_index(), 4);
    }

    #[test]
    fn cascade_stops_member_abilities() {
        let mut fx = engaged();
        fx.group.update(&mut fx.session, &mut fx.world, 50);
        assert_eq!(fx.updates.load(Ordering::SeqCst), 4);
        fx.group
            .on_member_died(&mut fx.session, &mut fx.world, fx.members[0]);
        fx.group.update(&mut fx.session, &mut fx.world, 50);
        assert_eq!(fx.updates.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn everyone_disengaged_resets_to_armed_on_the_periodic_check() {
        let mut fx = engaged();
        for member in fx.members.clone() {
            fx.world.evade(member);
        }
        fx.group.update(&mut fx.session, &mut fx.world, 1_950);
        assert_eq!(fx.group.phase(), GroupPhase::Engaged);
        fx.group.update(&mut fx.session, &mut fx.world, 50);
        assert_eq!(fx.group.phase(), GroupPhase::Armed);
        assert_eq!(fx.session.boss_state(GROUP), EncounterState::NotStarted);
        assert_eq!(fx.resets.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn evading_member_rejoins_a_busy_peer() {
        let mut fx = engaged();
        let member = fx.members[0];
        if let Some(actor) = fx.world.actor_mut(member) {
            actor.victim = None;
        }
        assert!(fx.group.on_member_evade(&mut fx.session, &mut fx.world, member));
        assert_eq!(fx.world.victim_of(member), Some(fx.player));
        assert_eq!(fx.group.phase(), GroupPhase::Engaged);
    }

    #[test]
    fn last_member_to_evade_resets_the_group_immediately() {
        let mut fx = engaged();
        for member in &fx.members[1..] {
            if let Some(actor) = fx.world.actor_mut(*member) {
                actor.victim = None;
            }
        }
        fx.group
            .on_member_evade(&mut fx.session, &mut fx.world, fx.members[0]);
        assert_eq!(fx.group.phase(), GroupPhase::Armed);
    }

    #[test]
    fn reset_revives_fallen_members() {
        let mut fx = engaged();
        fx.world.kill(fx.members[2]);
        fx.group.reset(&mut fx.session, &mut fx.world);
        assert!(fx.world.is_alive(fx.members[2]));
        assert_eq!(health(&fx, 2), MEMBER_HEALTH);
        assert_eq!(fx.group.phase(), GroupPhase::Armed);
    }

    #[test]
    fn broadcast_reaches_only_live_members() {
        let mut fx = engaged();
        fx.world.kill(fx.members[3]);
        assert_eq!(fx.group.broadcast_aura(&mut fx.world, 41452), 3);
        let actor = fx.world.actor(fx.members[0]).expect("member");
        assert!(actor.auras.contains(&41452));
    }

    #[test]
    fn shared_health_fraction_tracks_the_pool() {
        let mut fx = engaged();
        fx.group
            .apply_damage(&mut fx.session, &mut fx.world, fx.members[0], fx.player, 400);
        let view = fx.group.view(&fx.world);
        assert!((view.shared_health_fraction - 0.9).abs() < 1e-6);
    }
}
