//! Software timer wheel — spec §4.3.
//!
//! A flat, append-only array of at most `N` timers; IDs equal array indices.
//! Timers are created disarmed, armed by [`TimerTable::start`], and disarmed
//! by [`TimerTable::stop`] or (for one-shots) automatically on expiry.
//!
//! Ported from `examples/original_source/src/rtcos.c`'s
//! `rtcos_create_timer` / `rtcos_start_timer` / `rtcos_stop_timer` /
//! `rtcos_timer_expired` and the timer block of `rtcos_update_tick`.

use crate::error::Status;

/// Whether a timer self-rearms after firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Periodic,
    OneShot,
}

/// Opaque argument passed to a timer callback, and the callback type itself.
pub type TimerCallback = fn(arg: *const ());

#[derive(Clone, Copy)]
struct Timer {
    in_use: bool,
    kind: TimerKind,
    start_tick: u32,
    period: u32,
    callback: Option<TimerCallback>,
    arg: *const (),
}

impl Timer {
    const EMPTY: Self = Self {
        in_use: false,
        kind: TimerKind::OneShot,
        start_tick: 0,
        period: 0,
        callback: None,
        arg: core::ptr::null(),
    };
}

// SAFETY: `arg` is an opaque handle into application-owned state, exactly
// like `MessageHandle` and `TaskSlot::arg` — the table stores and forwards
// it to the callback, never dereferences it itself.
unsafe impl Send for Timer {}

/// Fixed-size table of up to `N` software timers.
pub struct TimerTable<const N: usize> {
    timers: [Timer; N],
    count: usize,
}

impl<const N: usize> TimerTable<N> {
    pub const EMPTY: Self = Self {
        timers: [Timer::EMPTY; N],
        count: 0,
    };

    /// Number of timers created so far (armed or not).
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Create a new, disarmed timer. Returns its ID (== array index), or
    /// [`Status::OutOfResources`] if the table is full.
    pub fn create(&mut self, kind: TimerKind, callback: TimerCallback, arg: *const ()) -> Result<usize, Status> {
        if self.count >= N {
            return Err(Status::OutOfResources);
        }
        let id = self.count;
        self.timers[id] = Timer {
            in_use: false,
            kind,
            start_tick: 0,
            period: 0,
            callback: Some(callback),
            arg,
        };
        self.count += 1;
        Ok(id)
    }

    /// Arm `id`, resetting its epoch to `now` and its period to `period`.
    pub fn start(&mut self, id: usize, period: u32, now: u32) -> Status {
        if id >= N {
            return Status::OutOfResources;
        }
        self.timers[id].period = period;
        self.timers[id].start_tick = now;
        self.timers[id].in_use = true;
        Status::None
    }

    /// Disarm `id`. Idempotent.
    pub fn stop(&mut self, id: usize) -> Status {
        if id >= N {
            return Status::OutOfResources;
        }
        self.timers[id].in_use = false;
        Status::None
    }

    /// True iff `id` is armed and its period has elapsed, under unsigned
    /// wraparound-tolerant subtraction (spec invariant 7).
    pub fn expired(&self, id: usize, now: u32) -> bool {
        let Some(timer) = self.timers.get(id) else {
            return false;
        };
        timer.in_use && now.wrapping_sub(timer.start_tick) > timer.period
    }

    /// Advance every armed timer by one tick: fire callbacks for any that
    /// have expired, disarm one-shots, and re-stamp the epoch.
    ///
    /// Runs entirely inside the kernel's critical section (spec §4.5), so
    /// callbacks must be short and non-blocking.
    pub fn advance(&mut self, now: u32) {
        for id in 0..self.count {
            if !self.expired(id, now) {
                continue;
            }
            let timer = self.timers[id];
            if let Some(cb) = timer.callback {
                cb(timer.arg);
            }
            if timer.kind == TimerKind::OneShot {
                self.timers[id].in_use = false;
            }
            // The source re-stamps start_tick even for a timer it just
            // disarmed; harmless since in_use is now false, but kept for
            // fidelity with the original (spec Design Notes §9, item 3).
            self.timers[id].start_tick = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static FIRE_COUNT: AtomicU32 = AtomicU32::new(0);

    fn bump(_arg: *const ()) {
        FIRE_COUNT.fetch_add(1, Ordering::SeqCst);
    }

    fn reset_counter() {
        FIRE_COUNT.store(0, Ordering::SeqCst);
    }

    #[test]
    fn periodic_timer_fires_at_period_boundaries() {
        reset_counter();
        let mut table: TimerTable<2> = TimerTable::EMPTY;
        let id = table.create(TimerKind::Periodic, bump, core::ptr::null()).unwrap();
        table.start(id, 5, 0);

        let mut fires = std::vec::Vec::new();
        for now in 1..=16u32 {
            let before = FIRE_COUNT.load(Ordering::SeqCst);
            table.advance(now);
            if FIRE_COUNT.load(Ordering::SeqCst) != before {
                fires.push(now);
            }
        }
        assert_eq!(fires, vec![6, 12]);

        table.stop(id);
        for now in 17..=26u32 {
            table.advance(now);
        }
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 2, "stopped timer must not fire again");
    }

    #[test]
    fn one_shot_disarms_after_firing() {
        reset_counter();
        let mut table: TimerTable<2> = TimerTable::EMPTY;
        let id = table.create(TimerKind::OneShot, bump, core::ptr::null()).unwrap();
        table.start(id, 3, 0);

        for now in 1..=3u32 {
            table.advance(now);
        }
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 0);
        table.advance(4);
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 1);

        for now in 5..=20u32 {
            table.advance(now);
        }
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 1, "one-shot must not refire");
    }

    #[test]
    fn table_full_rejects_further_creation() {
        let mut table: TimerTable<1> = TimerTable::EMPTY;
        assert!(table.create(TimerKind::OneShot, bump, core::ptr::null()).is_ok());
        assert_eq!(
            table.create(TimerKind::OneShot, bump, core::ptr::null()),
            Err(Status::OutOfResources)
        );
    }

    #[test]
    fn expiry_tolerates_tick_wraparound() {
        let mut table: TimerTable<1> = TimerTable::EMPTY;
        let id = table.create(TimerKind::OneShot, bump, core::ptr::null()).unwrap();
        // Arm near the top of u32 range, period 20.
        table.start(id, 20, 0xFFFF_FFF0);

        reset_counter();
        let mut now = 0xFFFF_FFF0u32;
        for _ in 0..40 {
            now = now.wrapping_add(1);
            table.advance(now);
        }
        assert_eq!(FIRE_COUNT.load(Ordering::SeqCst), 1, "must fire exactly once across the wrap");
    }
}
