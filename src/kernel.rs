//! The kernel — spec §3 "Context", §4.4 dispatcher, §4.5 tick driver, §6 API
//! surface.
//!
//! One [`Kernel`] replaces the source's file-scope global context (spec
//! Design Notes §9, "Global context"). Its mutable state lives in a single
//! `critical_section::Mutex<RefCell<KernelState>>` so the whole struct can sit
//! in a `static` and be driven from both task context and ISR context (spec
//! §5) while every entry point below takes only `&self` — no `&mut self`
//! anywhere, matching the source's "any caller, any context" API shape.
//!
//! See DESIGN.md for why an explicit handle was chosen over a hidden
//! singleton.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::error::Status;
use crate::future_event::FutureEventTable;
use crate::task::{IdleHandler, TaskHandler, TaskSlot};

#[cfg(feature = "messages")]
use crate::message::MessageHandle;
#[cfg(feature = "timers")]
use crate::timer::{TimerCallback, TimerKind, TimerTable};

/// Outcome of one [`Kernel::step`] call, for tests and host loops that want
/// to observe what happened without re-deriving it from side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A task handler ran.
    Dispatched { task_id: usize },
    /// The idle handler ran (spec §4.4 step 3).
    Idle,
    /// Nothing was ready and idle either isn't registered or future events
    /// are still pending — the host should go do something else (sleep,
    /// wait for the next tick) and call `step` again later.
    Parked,
}

struct KernelState<const TASKS: usize, const FUTURE_EVENTS: usize, const MESSAGES: usize, const TIMERS: usize> {
    tasks: [TaskSlot<MESSAGES>; TASKS],
    tasks_count: usize,
    future_events: FutureEventTable<FUTURE_EVENTS>,
    #[cfg(feature = "timers")]
    timers: TimerTable<TIMERS>,
    current_task: usize,
    system_ticks: u32,
    idle_handler: Option<IdleHandler>,
}

/// The scheduler core, sized at compile time by its four const generics
/// (spec §6 "Build-time configuration"):
///
/// - `TASKS` — number of priorities (`MAX_TASKS`).
/// - `FUTURE_EVENTS` — deferred-event table size (`MAX_FUTURE_EVENTS`).
/// - `MESSAGES` — per-task mailbox depth (`MAX_MESSAGES`).
/// - `TIMERS` — timer table size (`MAX_TIMERS`).
pub struct Kernel<const TASKS: usize, const FUTURE_EVENTS: usize, const MESSAGES: usize, const TIMERS: usize> {
    inner: Mutex<RefCell<KernelState<TASKS, FUTURE_EVENTS, MESSAGES, TIMERS>>>,
}

impl<const TASKS: usize, const FUTURE_EVENTS: usize, const MESSAGES: usize, const TIMERS: usize>
    Kernel<TASKS, FUTURE_EVENTS, MESSAGES, TIMERS>
{
    /// A freshly zero-initialized kernel (spec §3 Lifecycles, "Context:
    /// zero-initialized by `init`"). Building the value is the whole of
    /// `init` here — there is no separate step to run afterward.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(KernelState {
                tasks: [TaskSlot::EMPTY; TASKS],
                tasks_count: 0,
                future_events: FutureEventTable::EMPTY,
                #[cfg(feature = "timers")]
                timers: TimerTable::EMPTY,
                current_task: 0,
                system_ticks: 0,
                idle_handler: None,
            })),
        }
    }

    /// Register a task's handler at a fixed priority slot. Lower `task_id`
    /// is higher priority. Registration is monotonic — a slot can never be
    /// re-registered or released (spec §3 Lifecycles).
    pub fn register_task(&self, handler: TaskHandler, task_id: usize, arg: *const ()) -> Status {
        if task_id >= TASKS {
            return Status::OutOfRange;
        }
        critical_section::with(|cs| {
            let mut state = self.inner.borrow_ref_mut(cs);
            if state.tasks[task_id].is_registered() {
                return Status::InUse;
            }
            state.tasks[task_id].handler = Some(handler);
            state.tasks[task_id].arg = arg;
            state.tasks_count += 1;
            log::info!("task {task_id} registered ({} total)", state.tasks_count);
            Status::None
        })
    }

    /// Register the handler invoked when no task is ready and no future
    /// event is pending (spec §4.4 step 3, GLOSSARY "Idle handler").
    pub fn register_idle(&self, handler: IdleHandler) -> Status {
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).idle_handler = Some(handler);
        });
        Status::None
    }

    /// Post `flags` to `task_id`, immediately (`delay == 0`) or deferred
    /// (spec §4.4 `send_event`).
    pub fn send_event(&self, task_id: usize, flags: u32, delay_ticks: u32, periodic: bool) -> Status {
        if flags == 0 {
            return Status::NoEvent;
        }
        critical_section::with(|cs| {
            let mut state = self.inner.borrow_ref_mut(cs);
            if task_id >= state.tasks_count {
                return Status::InvalidTask;
            }
            if delay_ticks == 0 {
                state.tasks[task_id].events |= flags;
                Status::None
            } else {
                state.future_events.add(task_id, flags, delay_ticks, periodic)
            }
        })
    }

    /// `send_event` to every registered task. Every task is attempted
    /// regardless of earlier failures; the first non-success status is
    /// returned (spec Design Notes §9, open question 4 — see DESIGN.md).
    pub fn broadcast_event(&self, flags: u32, delay_ticks: u32, periodic: bool) -> Status {
        let tasks_count = critical_section::with(|cs| self.inner.borrow_ref(cs).tasks_count);
        let mut first_err = Status::None;
        for task_id in 0..tasks_count {
            let status = self.send_event(task_id, flags, delay_ticks, periodic);
            if status.is_err() && !first_err.is_err() {
                first_err = status;
            }
        }
        first_err
    }

    /// Clear `flags` from `task_id`'s pending events, and drop any matching
    /// live future event. Idempotent: clearing an already-clear mask, or a
    /// `(task_id, flags)` pair with no pending future event, is not an
    /// error.
    pub fn clear_event(&self, task_id: usize, flags: u32) -> Status {
        if flags == 0 {
            return Status::NoEvent;
        }
        critical_section::with(|cs| {
            let mut state = self.inner.borrow_ref_mut(cs);
            if task_id >= state.tasks_count {
                return Status::InvalidTask;
            }
            state.tasks[task_id].events &= !flags;
            state.future_events.delete(task_id, flags);
            Status::None
        })
    }

    /// Enqueue a message in `task_id`'s mailbox (spec §4.1, §4.4 "message
    /// variants of the same pattern").
    #[cfg(feature = "messages")]
    pub fn send_message(&self, task_id: usize, msg: MessageHandle) -> Status {
        if msg.is_null() {
            return Status::Arg;
        }
        critical_section::with(|cs| {
            let mut state = self.inner.borrow_ref_mut(cs);
            if task_id >= state.tasks_count {
                return Status::InvalidTask;
            }
            state.tasks[task_id].mailbox.push(msg)
        })
    }

    /// `send_message` to every registered task; first non-success status is
    /// returned, every task still attempted.
    #[cfg(feature = "messages")]
    pub fn broadcast_message(&self, msg: MessageHandle) -> Status {
        if msg.is_null() {
            return Status::Arg;
        }
        let tasks_count = critical_section::with(|cs| self.inner.borrow_ref(cs).tasks_count);
        let mut first_err = Status::None;
        for task_id in 0..tasks_count {
            let status = self.send_message(task_id, msg);
            if status.is_err() && !first_err.is_err() {
                first_err = status;
            }
        }
        first_err
    }

    /// Pop the oldest queued message for `current_task` — the task whose
    /// handler is presently executing. Calling this outside of a handler
    /// invocation observes whatever `current_task` last was (`0` before the
    /// first dispatch — spec Design Notes §9, open question 2; a caller
    /// precondition, not a kernel bug).
    #[cfg(feature = "messages")]
    pub fn get_message(&self) -> (Status, Option<MessageHandle>) {
        critical_section::with(|cs| {
            let mut state = self.inner.borrow_ref_mut(cs);
            let current = state.current_task;
            state.tasks[current].mailbox.pop()
        })
    }

    /// Create a disarmed timer, returning its ID.
    #[cfg(feature = "timers")]
    pub fn create_timer(&self, kind: TimerKind, callback: TimerCallback, arg: *const ()) -> Result<usize, Status> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).timers.create(kind, callback, arg))
    }

    /// Arm a timer, resetting its epoch to the current tick.
    #[cfg(feature = "timers")]
    pub fn start_timer(&self, timer_id: usize, period_ticks: u32) -> Status {
        critical_section::with(|cs| {
            let mut state = self.inner.borrow_ref_mut(cs);
            let now = state.system_ticks;
            state.timers.start(timer_id, period_ticks, now)
        })
    }

    /// Disarm a timer. Idempotent.
    #[cfg(feature = "timers")]
    pub fn stop_timer(&self, timer_id: usize) -> Status {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).timers.stop(timer_id))
    }

    /// True iff `timer_id` is armed and its period has elapsed.
    #[cfg(feature = "timers")]
    pub fn timer_expired(&self, timer_id: usize) -> bool {
        critical_section::with(|cs| {
            let state = self.inner.borrow_ref(cs);
            state.timers.expired(timer_id, state.system_ticks)
        })
    }

    /// Force the tick counter to a specific value. Test-only (spec §6) —
    /// production callers only ever advance time through [`Kernel::tick`].
    pub fn set_tick_count(&self, n: u32) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).system_ticks = n);
    }

    /// Current value of the monotonic tick counter.
    pub fn get_tick_count(&self) -> u32 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).system_ticks)
    }

    /// Busy-wait until the tick counter has advanced by `ticks`. Spec §5:
    /// "must be used sparingly" — there is no suspension point in this
    /// kernel, so this spins the caller's own thread of control and starves
    /// everything else on it.
    pub fn delay(&self, ticks: u32) {
        let start = self.get_tick_count();
        while self.get_tick_count().wrapping_sub(start) < ticks {
            core::hint::spin_loop();
        }
    }

    /// The heartbeat (spec §4.5). Advances `system_ticks`, then every live
    /// future event, then every live timer, all under one critical-section
    /// entry. Intended to be called from the tick ISR.
    pub fn tick(&self) {
        critical_section::with(|cs| {
            let mut state = self.inner.borrow_ref_mut(cs);
            state.system_ticks = state.system_ticks.wrapping_add(1);

            let KernelState { tasks, future_events, .. } = &mut *state;
            future_events.advance(|delivery| {
                tasks[delivery.task_id].events |= delivery.event_flags;
            });

            #[cfg(feature = "timers")]
            {
                let now = state.system_ticks;
                state.timers.advance(now);
            }
        });
    }

    /// One iteration of the dispatcher loop body (spec §4.4 steps 1–3).
    /// [`Kernel::run`] is `loop { self.step(); }`; `step` is exposed
    /// separately so host loops and tests can drive dispatch one decision at
    /// a time (spec §8's scenarios require interleaving `tick` and dispatch
    /// deterministically).
    pub fn step(&self) -> StepOutcome {
        let ready = critical_section::with(|cs| {
            let mut state = self.inner.borrow_ref_mut(cs);
            let tasks_count = state.tasks_count;
            let found = (0..tasks_count).find(|&i| state.tasks[i].is_ready());
            // `is_ready` already requires a registered handler, so `handler`
            // is always `Some` here; `and_then` (rather than `expect`) keeps
            // this path panic-free even if that invariant is ever relaxed.
            found.and_then(|i| {
                let handler = state.tasks[i].handler?;
                let events_in = state.tasks[i].events;
                state.tasks[i].events = 0;
                state.current_task = i;
                let msg_count = state.tasks[i].mailbox_count();
                let arg = state.tasks[i].arg;
                Some((i, handler, events_in, msg_count, arg))
            })
        });

        if let Some((task_id, handler, events_in, msg_count, arg)) = ready {
            let residual = handler(events_in, msg_count, arg);
            critical_section::with(|cs| {
                self.inner.borrow_ref_mut(cs).tasks[task_id].events |= residual;
            });
            return StepOutcome::Dispatched { task_id };
        }

        let idle = critical_section::with(|cs| {
            let state = self.inner.borrow_ref(cs);
            if state.future_events.live_count() == 0 {
                state.idle_handler
            } else {
                None
            }
        });
        match idle {
            Some(idle_handler) => {
                idle_handler();
                StepOutcome::Idle
            }
            None => StepOutcome::Parked,
        }
    }

    /// The dispatcher loop (spec §4.4): never returns.
    pub fn run(&self) -> ! {
        loop {
            self.step();
        }
    }
}

impl<const TASKS: usize, const FUTURE_EVENTS: usize, const MESSAGES: usize, const TIMERS: usize> Default
    for Kernel<TASKS, FUTURE_EVENTS, MESSAGES, TIMERS>
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    type TestKernel = Kernel<4, 4, 4, 4>;

    fn ping_handler(events: u32, _msg_count: u8, _arg: *const ()) -> u32 {
        events & !1
    }

    #[test]
    fn register_task_rejects_out_of_range_and_duplicate() {
        let kernel: TestKernel = Kernel::new();
        assert_eq!(kernel.register_task(ping_handler, 10, core::ptr::null()), Status::OutOfRange);
        assert_eq!(kernel.register_task(ping_handler, 0, core::ptr::null()), Status::None);
        assert_eq!(kernel.register_task(ping_handler, 0, core::ptr::null()), Status::InUse);
    }

    #[test]
    fn dispatch_honors_ascending_priority() {
        static ORDER: Mutex<RefCell<std::vec::Vec<usize>>> =
            Mutex::new(RefCell::new(std::vec::Vec::new()));

        fn low_priority(events: u32, _m: u8, _a: *const ()) -> u32 {
            critical_section::with(|cs| ORDER.borrow_ref_mut(cs).push(0));
            events & !1
        }
        fn high_priority(events: u32, _m: u8, _a: *const ()) -> u32 {
            critical_section::with(|cs| ORDER.borrow_ref_mut(cs).push(1));
            events & !1
        }

        critical_section::with(|cs| ORDER.borrow_ref_mut(cs).clear());
        let kernel: TestKernel = Kernel::new();
        kernel.register_task(low_priority, 0, core::ptr::null());
        kernel.register_task(high_priority, 1, core::ptr::null());

        kernel.send_event(1, 1, 0, false);
        kernel.send_event(0, 1, 0, false);

        assert_eq!(kernel.step(), StepOutcome::Dispatched { task_id: 0 });
        assert_eq!(kernel.step(), StepOutcome::Dispatched { task_id: 1 });
        assert_eq!(kernel.step(), StepOutcome::Parked);

        let order = critical_section::with(|cs| ORDER.borrow_ref(cs).clone());
        assert_eq!(order, std::vec![0, 1]);
    }

    #[test]
    fn send_event_rejects_empty_mask_and_unknown_task() {
        let kernel: TestKernel = Kernel::new();
        kernel.register_task(ping_handler, 0, core::ptr::null());
        assert_eq!(kernel.send_event(0, 0, 0, false), Status::NoEvent);
        assert_eq!(kernel.send_event(1, 1, 0, false), Status::InvalidTask);
    }

    #[test]
    fn deferred_event_delivers_on_schedule_via_tick() {
        let kernel: TestKernel = Kernel::new();
        kernel.register_task(ping_handler, 0, core::ptr::null());
        kernel.send_event(0, 1, 5, false);

        for _ in 0..4 {
            kernel.tick();
            assert_eq!(kernel.step(), StepOutcome::Parked);
        }
        kernel.tick();
        assert_eq!(kernel.step(), StepOutcome::Dispatched { task_id: 0 });
    }

    #[test]
    fn clear_event_removes_pending_future_event() {
        let kernel: TestKernel = Kernel::new();
        kernel.register_task(ping_handler, 0, core::ptr::null());
        kernel.send_event(0, 4, 50, false);
        assert_eq!(kernel.clear_event(0, 4), Status::None);
        for _ in 0..100 {
            kernel.tick();
        }
        assert_eq!(kernel.step(), StepOutcome::Parked);
    }

    #[test]
    fn clear_event_rejects_empty_mask() {
        let kernel: TestKernel = Kernel::new();
        kernel.register_task(ping_handler, 0, core::ptr::null());
        assert_eq!(kernel.clear_event(0, 0), Status::NoEvent);
    }

    #[test]
    fn idle_runs_only_with_no_ready_task_and_no_pending_future_events() {
        static IDLE_COUNT: AtomicU32 = AtomicU32::new(0);
        fn idle() {
            IDLE_COUNT.fetch_add(1, Ordering::SeqCst);
        }

        let kernel: TestKernel = Kernel::new();
        kernel.register_task(ping_handler, 0, core::ptr::null());
        kernel.register_idle(idle);

        assert_eq!(kernel.step(), StepOutcome::Idle);
        assert_eq!(IDLE_COUNT.load(Ordering::SeqCst), 1);

        kernel.send_event(0, 1, 3, false); // future event now pending
        assert_eq!(kernel.step(), StepOutcome::Parked, "idle must not run while a future event is pending");
    }

    #[test]
    fn residual_events_are_redelivered() {
        fn half_handler(events: u32, _m: u8, _a: *const ()) -> u32 {
            events >> 1
        }
        let kernel: TestKernel = Kernel::new();
        kernel.register_task(half_handler, 0, core::ptr::null());
        kernel.send_event(0, 0b10, 0, false);

        assert_eq!(kernel.step(), StepOutcome::Dispatched { task_id: 0 });
        assert_eq!(kernel.step(), StepOutcome::Dispatched { task_id: 0 });
        assert_eq!(kernel.step(), StepOutcome::Parked);
    }

    #[cfg(feature = "messages")]
    #[test]
    fn mailbox_bound_and_get_message_targets_current_task() {
        fn drain_one(_events: u32, _msg_count: u8, _arg: *const ()) -> u32 {
            0
        }
        let kernel: TestKernel = Kernel::new();
        kernel.register_task(drain_one, 0, core::ptr::null());
        let payload = 7u32;
        let handle = MessageHandle::from_ptr(&payload as *const u32);

        assert_eq!(kernel.send_message(0, handle), Status::None);
        assert_eq!(kernel.send_message(0, handle), Status::None);
        assert_eq!(kernel.send_message(0, handle), Status::None);
        assert_eq!(kernel.send_message(0, handle), Status::None);
        assert_eq!(kernel.send_message(0, handle), Status::MsgFull);

        let null_msg = MessageHandle::from_ptr(core::ptr::null::<u32>());
        assert_eq!(kernel.send_message(0, null_msg), Status::Arg);
        assert_eq!(kernel.broadcast_message(null_msg), Status::Arg);

        // Not dispatched yet — current_task defaults to 0, which happens to
        // be the only registered task here, so get_message still works.
        let (status, got) = kernel.get_message();
        assert_eq!(status, Status::None);
        assert_eq!(got, Some(handle));
    }

    #[cfg(feature = "timers")]
    #[test]
    fn periodic_timer_survives_tick_overflow() {
        static FIRES: AtomicU32 = AtomicU32::new(0);
        fn bump(_arg: *const ()) {
            FIRES.fetch_add(1, Ordering::SeqCst);
        }

        let kernel: TestKernel = Kernel::new();
        kernel.set_tick_count(0xFFFF_FFF0);
        let id = kernel.create_timer(TimerKind::OneShot, bump, core::ptr::null()).unwrap();
        kernel.start_timer(id, 20);

        for _ in 0..40 {
            kernel.tick();
        }
        assert_eq!(FIRES.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn broadcast_event_reaches_every_registered_task() {
        let kernel: TestKernel = Kernel::new();
        kernel.register_task(ping_handler, 0, core::ptr::null());
        kernel.register_task(ping_handler, 1, core::ptr::null());
        assert_eq!(kernel.broadcast_event(8, 0, false), Status::None);
        assert_eq!(kernel.step(), StepOutcome::Dispatched { task_id: 0 });
        assert_eq!(kernel.step(), StepOutcome::Dispatched { task_id: 1 });
    }
}
