//! Deferred-event table — spec §4.2.
//!
//! A flat, linearly-scanned array keyed by `(task_id, event_flags)`. At most
//! one live entry exists per key at any moment (invariant 4): re-posting the
//! same pair updates its `timeout` in place rather than duplicating the slot.
//!
//! Ported directly from `examples/original_source/src/rtcos.c`'s
//! `_rtcos_add_future_event` / `_rtcos_find_future_event` /
//! `_rtcos_delete_future_event` and the future-event block of
//! `rtcos_update_tick`.

use crate::error::Status;

/// One pending deferred-event delivery.
#[derive(Clone, Copy)]
struct FutureEvent {
    in_use: bool,
    task_id: usize,
    event_flags: u32,
    /// Remaining ticks until delivery.
    timeout: u32,
    /// Ticks to reload on delivery; `0` means one-shot.
    reload: u32,
}

impl FutureEvent {
    const EMPTY: Self = Self {
        in_use: false,
        task_id: 0,
        event_flags: 0,
        timeout: 0,
        reload: 0,
    };
}

/// One event flag mask delivered to a task by [`FutureEventTable::advance`].
pub struct Delivery {
    pub task_id: usize,
    pub event_flags: u32,
}

/// Fixed-size table of up to `N` pending deferred-event deliveries.
pub struct FutureEventTable<const N: usize> {
    slots: [FutureEvent; N],
    live_count: usize,
}

impl<const N: usize> FutureEventTable<N> {
    pub const EMPTY: Self = Self {
        slots: [FutureEvent::EMPTY; N],
        live_count: 0,
    };

    /// Number of currently live entries.
    pub const fn live_count(&self) -> usize {
        self.live_count
    }

    fn find(&self, task_id: usize, event_flags: u32) -> Option<usize> {
        self.slots.iter().position(|e| {
            e.in_use && e.task_id == task_id && e.event_flags == event_flags
        })
    }

    fn find_free(&self) -> Option<usize> {
        self.slots.iter().position(|e| !e.in_use)
    }

    /// Schedule (or reschedule) a deferred delivery.
    ///
    /// If a live entry already exists for `(task_id, event_flags)`, its
    /// `timeout` is overwritten with `delay` — its `reload` is left
    /// untouched. This means re-posting an existing one-shot future event
    /// can never convert it into a periodic one by re-posting with
    /// `periodic = true`; that is the source's documented behavior
    /// (spec Design Notes §9, open question 1), preserved here deliberately.
    pub fn add(&mut self, task_id: usize, event_flags: u32, delay: u32, periodic: bool) -> Status {
        if let Some(idx) = self.find(task_id, event_flags) {
            self.slots[idx].timeout = delay;
            return Status::None;
        }
        let Some(idx) = self.find_free() else {
            return Status::OutOfResources;
        };
        self.slots[idx] = FutureEvent {
            in_use: true,
            task_id,
            event_flags,
            timeout: delay,
            reload: if periodic { delay } else { 0 },
        };
        self.live_count += 1;
        Status::None
    }

    /// Remove the live entry matching `(task_id, event_flags)`, if any.
    pub fn delete(&mut self, task_id: usize, event_flags: u32) -> Status {
        match self.find(task_id, event_flags) {
            Some(idx) => {
                self.slots[idx].in_use = false;
                self.live_count = self.live_count.saturating_sub(1);
                Status::None
            }
            None => Status::NotFound,
        }
    }

    /// Decrement every live entry's timeout by one tick, delivering and
    /// reloading (or freeing) any that reach zero.
    ///
    /// Calls `on_deliver` for each delivery so the caller can OR the flags
    /// into the target task's event word — this table has no knowledge of
    /// the task table.
    pub fn advance(&mut self, mut on_deliver: impl FnMut(Delivery)) {
        for slot in self.slots.iter_mut() {
            if !slot.in_use {
                continue;
            }
            slot.timeout -= 1;
            if slot.timeout != 0 {
                continue;
            }
            on_deliver(Delivery {
                task_id: slot.task_id,
                event_flags: slot.event_flags,
            });
            self.live_count = self.live_count.saturating_sub(1);
            if slot.reload == 0 {
                slot.in_use = false;
            } else {
                slot.timeout = slot.reload;
                self.live_count += 1;
            }
        }
    }
}
