use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng};

/// Seeded random source shared by every controller in one instance, so a
/// replayed fight with the same seed makes the same choices.
#[derive(Clone, Debug)]
pub struct Rng {
    inner: StdRng,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
        }
    }

    pub fn int(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        self.inner.random_range(min..=max)
    }

    /// Whole seconds in `[min_s, max_s]`, expressed in milliseconds.
    pub fn seconds_ms(&mut self, min_s: i64, max_s: i64) -> i64 {
        self.int(min_s, max_s) * 1_000
    }

    pub fn one_in(&mut self, n: u32) -> bool {
        if n <= 1 {
            return true;
        }
        self.inner.random_range(0..n) == 0
    }

    pub fn pick_index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.inner.random_range(0..len)
    }

    /// Returns `preferred` most of the time; one time in `one_in` it picks
    /// uniformly among the other indices instead.
    pub fn mostly(&mut self, preferred: usize, len: usize, one_in: u32) -> usize {
        if len <= 1 || !self.one_in(one_in) {
            return preferred;
        }
        let pick = self.pick_index(len - 1);
        if pick >= preferred {
            pick + 1
        } else {
            pick
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_repeats_sequence() {
        let mut a = Rng::new(77);
        let mut b = Rng::new(77);
        for _ in 0..32 {
            assert_eq!(a.int(0, 1_000), b.int(0, 1_000));
        }
    }

    #[test]
    fn int_stays_in_bounds() {
        let mut rng = Rng::new(5);
        for _ in 0..500 {
            let value = rng.int(-3, 3);
            assert!((-3..=3).contains(&value));
        }
        assert_eq!(rng.int(4, 4), 4);
        assert_eq!(rng.int(9, 2), 9);
    }

    #[test]
    fn mostly_prefers_the_preferred_index() {
        let mut rng = Rng::new(11);
        let mut preferred_hits = 0;
        for _ in 0..1_000 {
            let pick = rng.mostly(2, 4, 10);
            assert!(pick < 4);
            if pick == 2 {
                preferred_hits += 1;
            }
        }
        assert!(preferred_hits > 800);
        assert!(preferred_hits < 1_000);
    }
}
