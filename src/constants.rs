pub const TICK_RATE: u32 = 20;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const GROUP_EVADE_CHECK_MS: i64 = 2_000;
pub const CASCADE_FIRST_STEP_MS: i64 = 1_000;
pub const CASCADE_STEP_MS: i64 = 1_500;

pub const COUNCIL_ENRAGE_MS: i64 = 900_000;
pub const COUNCIL_FIRST_YELL_MS: i64 = 500;

pub const ALLIANCE_TEAM_ID: i64 = 469;
pub const HORDE_TEAM_ID: i64 = 67;

pub const SAVE_TAG_LEN: usize = 2;

/// Aggro yell delay per council seat, in the order the voice trigger walks them.
pub const COUNCIL_AGGRO_YELL_MS: [i64; 4] = [5_000, 5_500, 5_000, 0];
/// Delay between berserk applications once the enrage timer expires.
pub const COUNCIL_ENRAGE_YELL_MS: [i64; 4] = [2_000, 6_000, 5_000, 0];

pub fn crazed_first_spawn_range_ms() -> (i64, i64) {
    (7_000, 14_000)
}

pub fn crazed_repeat_spawn_range_ms() -> (i64, i64) {
    (2_000, 5_000)
}
