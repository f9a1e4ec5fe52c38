/// Remaining-duration timer advanced by elapsed tick time.
///
/// A countdown fires once its remainder drops to zero or below. The negative
/// overshoot is kept so that re-arming from it does not drift over many ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Countdown {
    remaining_ms: i64,
    armed: bool,
}

impl Countdown {
    pub fn new(delay_ms: i64) -> Self {
        Self {
            remaining_ms: delay_ms,
            armed: true,
        }
    }

    pub fn disarmed() -> Self {
        Self {
            remaining_ms: 0,
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn remaining_ms(&self) -> i64 {
        self.remaining_ms
    }

    /// Returns true when the countdown is armed and has run out.
    pub fn tick(&mut self, dt_ms: i64) -> bool {
        if !self.armed {
            return false;
        }
        self.remaining_ms -= dt_ms;
        self.remaining_ms <= 0
    }

    /// Overwrites the remainder.
    pub fn set(&mut self, delay_ms: i64) {
        self.remaining_ms = delay_ms;
        self.armed = true;
    }

    /// Starts the next period from the current remainder. An overshoot of
    /// several periods keeps its phase within the period.
    pub fn rearm(&mut self, period_ms: i64) {
        self.armed = true;
        if period_ms <= 0 {
            self.remaining_ms = 0;
            return;
        }
        let next = self.remaining_ms.min(0).rem_euclid(period_ms);
        self.remaining_ms = if next == 0 { period_ms } else { next };
    }

    /// Pushes a pending fire further out (or pulls it in for negative values).
    pub fn delay(&mut self, extra_ms: i64) {
        self.remaining_ms += extra_ms;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
        self.remaining_ms = 0;
    }
}

#[derive(Clone, Debug)]
struct ScheduledTask<T, P> {
    task: T,
    phase: P,
    countdown: Countdown,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Fired<T> {
    pub task: T,
    /// Zero or negative remainder at the moment the task fired.
    pub overshoot_ms: i64,
}

/// Deadline list where every entry belongs to a phase, so leaving a phase is
/// one `cancel_phase` call.
#[derive(Clone, Debug)]
pub struct TaskScheduler<T, P> {
    tasks: Vec<ScheduledTask<T, P>>,
}

impl<T, P> Default for TaskScheduler<T, P> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<T, P: Copy + PartialEq> TaskScheduler<T, P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, task: T, phase: P, delay_ms: i64) {
        self.schedule_carry(task, phase, delay_ms, 0);
    }

    /// Schedules `delay_ms` after a previous fire, carrying its overshoot.
    pub fn schedule_carry(&mut self, task: T, phase: P, delay_ms: i64, carry_ms: i64) {
        self.tasks.push(ScheduledTask {
            task,
            phase,
            countdown: Countdown::new(delay_ms + carry_ms.min(0)),
        });
    }

    pub fn update(&mut self, dt_ms: i64) -> Vec<Fired<T>> {
        let mut fired = Vec::new();
        let mut pending = Vec::with_capacity(self.tasks.len());
        for mut entry in self.tasks.drain(..) {
            if entry.countdown.tick(dt_ms) {
                fired.push(Fired {
                    task: entry.task,
                    overshoot_ms: entry.countdown.remaining_ms(),
                });
            } else {
                pending.push(entry);
            }
        }
        self.tasks = pending;
        fired
    }

    pub fn cancel_phase(&mut self, phase: P) {
        self.tasks.retain(|entry| entry.phase != phase);
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    pub fn pending_in(&self, phase: P) -> usize {
        self.tasks
            .iter()
            .filter(|entry| entry.phase == phase)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum Phase {
        A,
        B,
    }

    #[test]
    fn countdown_fires_at_zero_and_keeps_overshoot() {
        let mut countdown = Countdown::new(100);
        assert!(!countdown.tick(50));
        assert!(countdown.tick(80));
        assert_eq!(countdown.remaining_ms(), -30);
        countdown.rearm(100);
        assert_eq!(countdown.remaining_ms(), 70);
    }

    #[test]
    fn rearm_over_many_periods_does_not_drift() {
        let mut countdown = Countdown::new(120);
        let mut fires = 0;
        for _ in 0..600 {
            if countdown.tick(50) {
                fires += 1;
                countdown.rearm(120);
            }
        }
        // 30_000 ms of ticks at a 120 ms period.
        assert_eq!(fires, 250);
    }

    #[test]
    fn long_tick_keeps_phase_within_the_period() {
        let mut countdown = Countdown::new(100);
        assert!(countdown.tick(350));
        countdown.rearm(100);
        assert_eq!(countdown.remaining_ms(), 50);

        let mut exact = Countdown::new(100);
        assert!(exact.tick(300));
        exact.rearm(100);
        assert_eq!(exact.remaining_ms(), 100);
    }

    #[test]
    fn disarmed_countdown_never_fires() {
        let mut countdown = Countdown::disarmed();
        assert!(!countdown.tick(10_000));
        countdown.set(10);
        assert!(countdown.tick(10));
        countdown.disarm();
        assert!(!countdown.tick(10));
    }

    #[test]
    fn scheduler_fires_in_order_and_cancels_by_phase() {
        let mut scheduler = TaskScheduler::new();
        scheduler.schedule("a1", Phase::A, 100);
        scheduler.schedule("b1", Phase::B, 50);
        scheduler.schedule("a2", Phase::A, 40);

        let fired = scheduler.update(60);
        let names: Vec<_> = fired.iter().map(|fired| fired.task).collect();
        assert_eq!(names, vec!["b1", "a2"]);
        assert_eq!(fired[1].overshoot_ms, -20);

        scheduler.schedule("b2", Phase::B, 500);
        scheduler.cancel_phase(Phase::A);
        assert_eq!(scheduler.pending_in(Phase::A), 0);
        assert_eq!(scheduler.pending_in(Phase::B), 1);
    }

    #[test]
    fn carried_overshoot_shortens_next_delay() {
        let mut scheduler = TaskScheduler::new();
        scheduler.schedule_carry("step", Phase::A, 1_500, -20);
        assert!(scheduler.update(1_470).len() == 0);
        assert_eq!(scheduler.update(10).len(), 1);
        assert!(scheduler.is_empty());
    }
}
