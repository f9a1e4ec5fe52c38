//! Illidari Council: four members sharing one health pool, plus the voice
//! trigger that narrates the fight and enrages the council after fifteen
//! minutes.

use crate::constants::{
    COUNCIL_AGGRO_YELL_MS, COUNCIL_ENRAGE_MS, COUNCIL_ENRAGE_YELL_MS, COUNCIL_FIRST_YELL_MS,
};
use crate::group::{GroupCoordinator, GroupMember, GroupNarrator, MemberContext};
use crate::rng::Rng;
use crate::scheduler::Countdown;
use crate::types::{EntityId, RoleId, SpellId};

use super::{
    ILLIDARI_COUNCIL, ROLE_COUNCIL, ROLE_COUNCIL_VOICE, ROLE_GATHIOS, ROLE_MALANDE, ROLE_VERAS,
    ROLE_ZEREVOR,
};

pub const SPELL_BERSERK: SpellId = 45078;

pub const SPELL_DEVOTION_AURA: SpellId = 41452;
pub const SPELL_CHROMATIC_AURA: SpellId = 41453;
pub const SPELL_BLESS_PROTECTION: SpellId = 41450;
pub const SPELL_BLESS_SPELLWARD: SpellId = 41451;
pub const SPELL_CONSECRATION: SpellId = 41541;
pub const SPELL_HAMMER_OF_JUSTICE: SpellId = 41468;
pub const SPELL_SEAL_OF_COMMAND: SpellId = 41469;
pub const SPELL_SEAL_OF_BLOOD: SpellId = 41459;

pub const SPELL_FLAMESTRIKE: SpellId = 41481;
pub const SPELL_BLIZZARD: SpellId = 41482;
pub const SPELL_ARCANE_BOLT: SpellId = 41483;
pub const SPELL_ARCANE_EXPLOSION: SpellId = 41524;
pub const SPELL_DAMPEN_MAGIC: SpellId = 41478;

pub const SPELL_EMPOWERED_SMITE: SpellId = 41471;
pub const SPELL_CIRCLE_OF_HEALING: SpellId = 41455;
pub const SPELL_REFLECTIVE_SHIELD: SpellId = 41475;
pub const SPELL_DIVINE_WRATH: SpellId = 41472;

pub const SPELL_DEADLY_POISON: SpellId = 41485;
pub const SPELL_ENVENOM: SpellId = 41487;
pub const SPELL_VANISH: SpellId = 41479;

pub const SAY_AGGRO: u8 = 0;
pub const SAY_ENRAGE: u8 = 1;
pub const SAY_SPECIAL: u8 = 2;
pub const SAY_DEATH: u8 = 4;

/// Cascade order of the seats.
pub const SEATS: [RoleId; 4] = [ROLE_GATHIOS, ROLE_ZEREVOR, ROLE_MALANDE, ROLE_VERAS];

/// Order in which the voice walks the seats for aggro and enrage lines.
const VOICE_ORDER: [RoleId; 4] = [ROLE_GATHIOS, ROLE_VERAS, ROLE_MALANDE, ROLE_ZEREVOR];

/// Gathios' blessing candidates; Malande is the preferred ally.
const BLESSING_ORDER: [RoleId; 4] = [ROLE_MALANDE, ROLE_ZEREVOR, ROLE_GATHIOS, ROLE_VERAS];

pub fn coordinator(seed: u64) -> GroupCoordinator {
    let mut rng = Rng::new(seed);
    let members: Vec<Box<dyn GroupMember>> = vec![
        Box::new(Gathios::new(&mut rng)),
        Box::new(Zerevor::new(&mut rng)),
        Box::new(Malande::new(&mut rng)),
        Box::new(Veras::new(&mut rng)),
    ];
    GroupCoordinator::new(
        ILLIDARI_COUNCIL,
        members,
        Some(Box::new(CouncilVoice::new())),
        Some(ROLE_COUNCIL_VOICE),
        seed,
    )
    .with_controller(ROLE_COUNCIL)
}

fn set_or_disarm(countdown: &mut Countdown, period_ms: i64) {
    if period_ms > 0 {
        countdown.rearm(period_ms);
    } else {
        countdown.disarm();
    }
}

pub struct CouncilVoice {
    aggro_yell: Countdown,
    enrage: Countdown,
    yell_counter: usize,
    started: bool,
}

impl CouncilVoice {
    pub fn new() -> Self {
        let mut voice = Self {
            aggro_yell: Countdown::disarmed(),
            enrage: Countdown::disarmed(),
            yell_counter: 0,
            started: false,
        };
        voice.reset();
        voice
    }
}

impl Default for CouncilVoice {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupNarrator for CouncilVoice {
    fn reset(&mut self) {
        self.aggro_yell = Countdown::new(COUNCIL_FIRST_YELL_MS);
        self.enrage = Countdown::new(COUNCIL_ENRAGE_MS);
        self.yell_counter = 0;
        self.started = false;
    }

    fn on_event_start(&mut self) {
        self.started = true;
    }

    fn update(&mut self, ctx: &mut MemberContext<'_>, dt_ms: i64) {
        if !self.started || self.yell_counter >= VOICE_ORDER.len() {
            return;
        }

        if self.aggro_yell.tick(dt_ms) {
            let seat = self.yell_counter;
            if let Some(member) = ctx.peer(VOICE_ORDER[seat]) {
                ctx.world.talk(member, SAY_AGGRO);
            }
            set_or_disarm(&mut self.aggro_yell, COUNCIL_AGGRO_YELL_MS[seat]);
            self.yell_counter = (seat + 1) % VOICE_ORDER.len();
        }

        if self.enrage.tick(dt_ms) {
            let seat = self.yell_counter;
            if let Some(member) = ctx.peer(VOICE_ORDER[seat]) {
                ctx.world.cast(member, member, SPELL_BERSERK);
                ctx.world.apply_aura(member, SPELL_BERSERK);
                ctx.world.talk(member, SAY_ENRAGE);
            }
            set_or_disarm(&mut self.enrage, COUNCIL_ENRAGE_YELL_MS[seat]);
            self.yell_counter += 1;
        }
    }
}

/// High Nethermancer Zerevor. Every cast starts a short global cooldown
/// during which no timer advances.
pub struct Zerevor {
    blizzard: Countdown,
    flamestrike: Countdown,
    arcane_bolt: Countdown,
    dampen_magic: Countdown,
    arcane_explosion: Countdown,
    cooldown: Countdown,
}

impl Zerevor {
    pub fn new(rng: &mut Rng) -> Self {
        let mut zerevor = Self {
            blizzard: Countdown::disarmed(),
            flamestrike: Countdown::disarmed(),
            arcane_bolt: Countdown::disarmed(),
            dampen_magic: Countdown::disarmed(),
            arcane_explosion: Countdown::disarmed(),
            cooldown: Countdown::disarmed(),
        };
        zerevor.reset(rng);
        zerevor
    }
}

impl GroupMember for Zerevor {
    fn role(&self) -> RoleId {
        ROLE_ZEREVOR
    }

    fn reset(&mut self, rng: &mut Rng) {
        self.blizzard = Countdown::new(rng.seconds_ms(30, 90));
        self.flamestrike = Countdown::new(rng.seconds_ms(30, 90));
        self.arcane_bolt = Countdown::new(10_000);
        self.dampen_magic = Countdown::new(2_000);
        self.arcane_explosion = Countdown::new(14_000);
        self.cooldown = Countdown::disarmed();
    }

    fn update(&mut self, ctx: &mut MemberContext<'_>, dt_ms: i64) {
        if self.cooldown.is_armed() {
            if !self.cooldown.tick(dt_ms) {
                return;
            }
            self.cooldown.disarm();
        }

        if self.dampen_magic.tick(dt_ms) {
            ctx.cast_on_self(SPELL_DAMPEN_MAGIC);
            self.cooldown.set(1_000);
            self.dampen_magic.rearm(67_200);
            self.arcane_bolt.delay(1_000);
        }

        if self.blizzard.tick(dt_ms) {
            let target = ctx.random_target();
            ctx.cast_on(target, SPELL_BLIZZARD);
            self.blizzard.rearm(ctx.rng.seconds_ms(45, 90));
            self.flamestrike.delay(10_000);
            self.cooldown.set(1_000);
        }

        if self.flamestrike.tick(dt_ms) {
            let target = ctx.random_target();
            ctx.cast_on(target, SPELL_FLAMESTRIKE);
            self.flamestrike.rearm(ctx.rng.seconds_ms(55, 100));
            self.blizzard.delay(10_000);
            self.cooldown.set(2_000);
        }

        if self.arcane_bolt.tick(dt_ms) {
            ctx.cast_on_victim(SPELL_ARCANE_BOLT);
            self.arcane_bolt.rearm(3_000);
            self.cooldown.set(2_000);
        }

        if self.arcane_explosion.tick(dt_ms) {
            ctx.cast_on_victim(SPELL_ARCANE_EXPLOSION);
            self.arcane_explosion.rearm(14_000);
            self.cooldown.set(1_000);
        }
    }

    fn on_died(&mut self, ctx: &mut MemberContext<'_>) {
        ctx.talk(SAY_DEATH);
    }
}

/// Gathios the Shatterer.
pub struct Gathios {
    consecration: Countdown,
    hammer_of_justice: Countdown,
    seal: Countdown,
    aura: Countdown,
    blessing: Countdown,
}

impl Gathios {
    pub fn new(rng: &mut Rng) -> Self {
        let mut gathios = Self {
            consecration: Countdown::disarmed(),
            hammer_of_justice: Countdown::disarmed(),
            seal: Countdown::disarmed(),
            aura: Countdown::disarmed(),
            blessing: Countdown::disarmed(),
        };
        gathios.reset(rng);
        gathios
    }

    /// Malande nine times in ten, otherwise any other seat (himself included).
    fn select_ally(ctx: &mut MemberContext<'_>) -> Option<EntityId> {
        let index = ctx.rng.mostly(0, BLESSING_ORDER.len(), 10);
        ctx.peer(BLESSING_ORDER[index])
    }
}

impl GroupMember for Gathios {
    fn role(&self) -> RoleId {
        ROLE_GATHIOS
    }

    fn reset(&mut self, _rng: &mut Rng) {
        self.consecration = Countdown::new(40_000);
        self.hammer_of_justice = Countdown::new(10_000);
        self.seal = Countdown::new(40_000);
        self.aura = Countdown::new(90_000);
        self.blessing = Countdown::new(60_000);
    }

    fn update(&mut self, ctx: &mut MemberContext<'_>, dt_ms: i64) {
        if self.blessing.tick(dt_ms) {
            let ally = Self::select_ally(ctx);
            let spell = if ctx.rng.one_in(2) {
                SPELL_BLESS_SPELLWARD
            } else {
                SPELL_BLESS_PROTECTION
            };
            ctx.cast_on(ally, spell);
            self.blessing.rearm(60_000);
        }

        if self.consecration.tick(dt_ms) {
            ctx.cast_on_self(SPELL_CONSECRATION);
            self.consecration.rearm(40_000);
        }

        if self.hammer_of_justice.tick(dt_ms) {
            let target = ctx.random_target();
            ctx.cast_on(target, SPELL_HAMMER_OF_JUSTICE);
            self.hammer_of_justice.rearm(20_000);
        }

        if self.seal.tick(dt_ms) {
            let spell = if ctx.rng.one_in(2) {
                SPELL_SEAL_OF_COMMAND
            } else {
                SPELL_SEAL_OF_BLOOD
            };
            ctx.cast_on_self(spell);
            self.seal.rearm(40_000);
        }

        if self.aura.tick(dt_ms) {
            let spell = if ctx.rng.one_in(2) {
                SPELL_DEVOTION_AURA
            } else {
                SPELL_CHROMATIC_AURA
            };
            ctx.broadcast_aura(spell);
            self.aura.rearm(90_000);
        }
    }

    fn on_died(&mut self, ctx: &mut MemberContext<'_>) {
        ctx.talk(SAY_DEATH);
    }
}

/// Lady Malande.
pub struct Malande {
    empowered_smite: Countdown,
    circle_of_healing: Countdown,
    divine_wrath: Countdown,
    reflective_shield: Countdown,
}

impl Malande {
    pub fn new(rng: &mut Rng) -> Self {
        let mut malande = Self {
            empowered_smite: Countdown::disarmed(),
            circle_of_healing: Countdown::disarmed(),
            divine_wrath: Countdown::disarmed(),
            reflective_shield: Countdown::disarmed(),
        };
        malande.reset(rng);
        malande
    }
}

impl GroupMember for Malande {
    fn role(&self) -> RoleId {
        ROLE_MALANDE
    }

    fn reset(&mut self, _rng: &mut Rng) {
        self.empowered_smite = Countdown::new(38_000);
        self.circle_of_healing = Countdown::new(20_000);
        self.divine_wrath = Countdown::new(40_000);
        self.reflective_shield = Countdown::new(0);
    }

    fn update(&mut self, ctx: &mut MemberContext<'_>, dt_ms: i64) {
        if self.empowered_smite.tick(dt_ms) {
            let target = ctx.random_target();
            ctx.cast_on(target, SPELL_EMPOWERED_SMITE);
            self.empowered_smite.rearm(38_000);
        }

        if self.circle_of_healing.tick(dt_ms) {
            ctx.cast_on_self(SPELL_CIRCLE_OF_HEALING);
            self.circle_of_healing.rearm(60_000);
        }

        if self.divine_wrath.tick(dt_ms) {
            let target = ctx.random_target();
            ctx.cast_on(target, SPELL_DIVINE_WRATH);
            self.divine_wrath.rearm(ctx.rng.seconds_ms(40, 80));
        }

        if self.reflective_shield.tick(dt_ms) {
            ctx.cast_on_self(SPELL_REFLECTIVE_SHIELD);
            self.reflective_shield.rearm(65_000);
        }
    }

    fn on_died(&mut self, ctx: &mut MemberContext<'_>) {
        ctx.talk(SAY_DEATH);
    }
}

/// Veras Darkshadow. Vanishes for thirty seconds, reappearing shortly before
/// poisoning his target.
pub struct Veras {
    deadly_poison: Countdown,
    vanish: Countdown,
    appear_envenom: Countdown,
    vanished: bool,
}

impl Veras {
    pub fn new(rng: &mut Rng) -> Self {
        let mut veras = Self {
            deadly_poison: Countdown::disarmed(),
            vanish: Countdown::disarmed(),
            appear_envenom: Countdown::disarmed(),
            vanished: false,
        };
        veras.reset(rng);
        veras
    }

    pub fn is_vanished(&self) -> bool {
        self.vanished
    }
}

impl GroupMember for Veras {
    fn role(&self) -> RoleId {
        ROLE_VERAS
    }

    fn reset(&mut self, rng: &mut Rng) {
        self.deadly_poison = Countdown::new(20_000);
        self.vanish = Countdown::new(rng.seconds_ms(60, 120));
        self.appear_envenom = Countdown::new(150_000);
        self.vanished = false;
    }

    fn on_engaged(&mut self, ctx: &mut MemberContext<'_>) {
        ctx.world.set_visible(ctx.me, true);
        ctx.world.set_selectable(ctx.me, true);
    }

    fn update(&mut self, ctx: &mut MemberContext<'_>, dt_ms: i64) {
        if !self.vanished {
            if self.deadly_poison.tick(dt_ms) {
                ctx.cast_on_victim(SPELL_DEADLY_POISON);
                self.deadly_poison.rearm(ctx.rng.seconds_ms(15, 45));
            }

            if self.appear_envenom.tick(dt_ms) {
                ctx.cast_on_victim(SPELL_ENVENOM);
                self.appear_envenom.rearm(90_000);
            }

            if self.vanish.tick(dt_ms) {
                let target = ctx.random_target();
                ctx.cast_on_self(SPELL_VANISH);
                ctx.talk(SAY_SPECIAL);
                ctx.world.set_visible(ctx.me, false);
                ctx.world.set_selectable(ctx.me, false);
                if let Some(target) = target {
                    ctx.world.attack(ctx.me, target);
                }
                self.vanish.set(30_000);
                self.appear_envenom.set(28_000);
                self.vanished = true;
            }
            return;
        }

        if self.vanish.tick(dt_ms) {
            ctx.cast_on_victim(SPELL_DEADLY_POISON);
            ctx.world.set_selectable(ctx.me, true);
            self.deadly_poison.delay(6_000);
            self.vanish.set(90_000);
            self.appear_envenom.set(4_000);
            self.vanished = false;
            return;
        }

        if self.appear_envenom.tick(dt_ms) {
            ctx.world.set_visible(ctx.me, true);
            self.appear_envenom.set(6_000);
        }
    }

    fn on_died(&mut self, ctx: &mut MemberContext<'_>) {
        ctx.talk(SAY_DEATH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Team;
    use crate::world::{ActorCommand, World};

    struct Bench {
        world: World,
        members: Vec<Option<EntityId>>,
        voice: EntityId,
        rng: Rng,
    }

    impl Bench {
        fn new() -> Self {
            let mut world = World::new();
            let player = world.add_player(Team::Alliance, false);
            let members: Vec<Option<EntityId>> = SEATS
                .iter()
                .map(|_| {
                    let id = world.spawn_actor(1, 10_000);
                    world.attack(id, player);
                    Some(id)
                })
                .collect();
            let voice = world.spawn_actor(2, 1);
            Self {
                world,
                members,
                voice,
                rng: Rng::new(21),
            }
        }

        fn member(&self, seat: usize) -> EntityId {
            self.members[seat].expect("seated")
        }

        fn ctx(&mut self, me: EntityId) -> MemberContext<'_> {
            MemberContext {
                me,
                roles: &SEATS,
                members: &self.members,
                world: &mut self.world,
                rng: &mut self.rng,
            }
        }

        fn casts(&self, spell: SpellId) -> usize {
            self.world
                .commands()
                .iter()
                .filter(|command| matches!(command, ActorCommand::Cast { spell: cast, .. } if *cast == spell))
                .count()
        }

        fn talkers(&self, line: u8) -> Vec<EntityId> {
            self.world
                .commands()
                .iter()
                .filter_map(|command| match command {
                    ActorCommand::Talk { speaker, line: said } if *said == line => Some(*speaker),
                    _ => None,
                })
                .collect()
        }
    }

    fn quiet_zerevor(bench: &mut Bench) -> Zerevor {
        let mut zerevor = Zerevor::new(&mut bench.rng);
        zerevor.blizzard.disarm();
        zerevor.flamestrike.disarm();
        zerevor.arcane_bolt.disarm();
        zerevor.dampen_magic.disarm();
        zerevor.arcane_explosion.disarm();
        zerevor
    }

    #[test]
    fn blizzard_pushes_flamestrike_back() {
        let mut bench = Bench::new();
        let me = bench.member(1);
        let mut zerevor = quiet_zerevor(&mut bench);
        zerevor.blizzard = Countdown::new(100);
        zerevor.flamestrike = Countdown::new(5_000);

        zerevor.update(&mut bench.ctx(me), 100);
        assert_eq!(bench.casts(SPELL_BLIZZARD), 1);
        assert_eq!(zerevor.flamestrike.remaining_ms(), 14_900);
        assert!(zerevor.cooldown.is_armed());
    }

    #[test]
    fn global_cooldown_freezes_every_timer() {
        let mut bench = Bench::new();
        let me = bench.member(1);
        let mut zerevor = quiet_zerevor(&mut bench);
        zerevor.cooldown.set(1_000);
        zerevor.arcane_bolt = Countdown::new(50);

        zerevor.update(&mut bench.ctx(me), 50);
        assert_eq!(bench.casts(SPELL_ARCANE_BOLT), 0);
        assert_eq!(zerevor.arcane_bolt.remaining_ms(), 50);

        zerevor.update(&mut bench.ctx(me), 950);
        assert_eq!(bench.casts(SPELL_ARCANE_BOLT), 1);
        assert_eq!(zerevor.arcane_bolt.remaining_ms(), 3_000 - 900);
    }

    #[test]
    fn dampen_magic_delays_the_next_bolt() {
        let mut bench = Bench::new();
        let me = bench.member(1);
        let mut zerevor = quiet_zerevor(&mut bench);
        zerevor.dampen_magic = Countdown::new(10);
        zerevor.arcane_bolt = Countdown::new(500);

        zerevor.update(&mut bench.ctx(me), 10);
        assert_eq!(bench.casts(SPELL_DAMPEN_MAGIC), 1);
        assert_eq!(zerevor.arcane_bolt.remaining_ms(), 1_490);
    }

    #[test]
    fn gathios_blesses_malande_most_of_the_time() {
        let mut bench = Bench::new();
        let me = bench.member(0);
        let malande = bench.member(2);
        let mut malande_picks = 0;
        for _ in 0..1_000 {
            if Gathios::select_ally(&mut bench.ctx(me)) == Some(malande) {
                malande_picks += 1;
            }
        }
        assert!(malande_picks > 850, "{malande_picks}");
        assert!(malande_picks < 1_000);
    }

    #[test]
    fn gathios_aura_reaches_the_whole_council() {
        let mut bench = Bench::new();
        let me = bench.member(0);
        let mut gathios = Gathios::new(&mut bench.rng);
        gathios.update(&mut bench.ctx(me), 90_000);
        for seat in 0..SEATS.len() {
            let auras = &bench.world.actor(bench.member(seat)).expect("member").auras;
            assert!(
                auras.contains(&SPELL_DEVOTION_AURA) || auras.contains(&SPELL_CHROMATIC_AURA)
            );
        }
    }

    #[test]
    fn veras_vanish_cycle() {
        let mut bench = Bench::new();
        let me = bench.member(3);
        let mut veras = Veras::new(&mut bench.rng);
        veras.deadly_poison.disarm();
        veras.vanish = Countdown::new(10);
        veras.appear_envenom = Countdown::new(500_000);

        veras.update(&mut bench.ctx(me), 10);
        assert!(veras.is_vanished());
        let actor = bench.world.actor(me).expect("veras");
        assert!(!actor.visible && !actor.selectable);

        veras.update(&mut bench.ctx(me), 28_000);
        assert!(bench.world.actor(me).expect("veras").visible);
        assert!(veras.is_vanished());

        veras.update(&mut bench.ctx(me), 2_000);
        assert!(!veras.is_vanished());
        assert!(bench.world.actor(me).expect("veras").selectable);
        assert_eq!(bench.casts(SPELL_DEADLY_POISON), 1);
        assert_eq!(veras.vanish.remaining_ms(), 90_000);
    }

    #[test]
    fn voice_waits_for_the_event_then_yells_in_order() {
        let mut bench = Bench::new();
        let voice_id = bench.voice;
        let mut voice = CouncilVoice::new();
        voice.update(&mut bench.ctx(voice_id), 10_000);
        assert!(bench.talkers(SAY_AGGRO).is_empty());

        voice.on_event_start();
        for dt in [500, 5_000, 5_500, 5_000] {
            voice.update(&mut bench.ctx(voice_id), dt);
        }
        let expected: Vec<EntityId> = [0, 3, 2, 1].iter().map(|seat| bench.member(*seat)).collect();
        assert_eq!(bench.talkers(SAY_AGGRO), expected);
        assert!(!voice.aggro_yell.is_armed());
    }

    #[test]
    fn voice_enrages_each_member_after_fifteen_minutes() {
        let mut bench = Bench::new();
        let voice_id = bench.voice;
        let mut voice = CouncilVoice::new();
        voice.on_event_start();
        for dt in [500, 5_000, 5_500, 5_000] {
            voice.update(&mut bench.ctx(voice_id), dt);
        }
        voice.update(&mut bench.ctx(voice_id), COUNCIL_ENRAGE_MS - 16_000);
        assert_eq!(bench.casts(SPELL_BERSERK), 1);
        for dt in [2_000, 6_000, 5_000] {
            voice.update(&mut bench.ctx(voice_id), dt);
        }
        assert_eq!(bench.casts(SPELL_BERSERK), 4);
        for seat in 0..SEATS.len() {
            let actor = bench.world.actor(bench.member(seat)).expect("member");
            assert!(actor.auras.contains(&SPELL_BERSERK));
        }
        voice.update(&mut bench.ctx(voice_id), 60_000);
        assert_eq!(bench.casts(SPELL_BERSERK), 4);
    }
}
