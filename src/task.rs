//! Task slot — spec §3 "TaskSlot" and §4.4 "TaskTable".
//!
//! One slot per statically configured priority; index 0 is highest priority.
//! Slots are allocated monotonically by [`crate::kernel::Kernel::register_task`]
//! and are never recycled (spec §3 Lifecycles).

#[cfg(feature = "messages")]
use crate::fifo::Fifo;

/// A task handler: given the event flags that became ready, the number of
/// queued messages, and the opaque argument captured at registration, returns
/// the residual (unhandled) event mask.
pub type TaskHandler = fn(events: u32, msg_count: u8, arg: *const ()) -> u32;

/// Called when no task is ready and no future event is pending — a hook for
/// power-down.
pub type IdleHandler = fn();

/// Per-task state: pending events, handler, argument, and mailbox.
///
/// `in_use` (spec §3 Data Model) is not a separate field here — a slot is
/// "in use" exactly when `handler.is_some()`, so [`TaskSlot::is_registered`]
/// reads that directly rather than keeping a second bit in sync with it.
pub struct TaskSlot<const MSGS: usize> {
    pub(crate) handler: Option<TaskHandler>,
    pub(crate) arg: *const (),
    pub(crate) events: u32,
    #[cfg(feature = "messages")]
    pub(crate) mailbox: Fifo<MSGS>,
}

impl<const MSGS: usize> TaskSlot<MSGS> {
    pub const EMPTY: Self = Self {
        handler: None,
        arg: core::ptr::null(),
        events: 0,
        #[cfg(feature = "messages")]
        mailbox: Fifo::EMPTY,
    };

    /// True once a handler has been registered in this slot.
    pub(crate) fn is_registered(&self) -> bool {
        self.handler.is_some()
    }

    /// True if this slot has a registered handler and (pending events or a
    /// non-empty mailbox) — i.e. it is eligible to be picked as the ready
    /// task. The `is_registered` guard matters only when a caller violates
    /// the "register densely from index 0 upward" precondition (spec §4.4):
    /// with dense registration every slot under `tasks_count` already has a
    /// handler, so this never changes observable behavior in the documented
    /// usage — it only keeps the dispatcher from trying to call through a
    /// `None` handler in the misuse case, where the core must still not
    /// abort (spec §7).
    pub(crate) fn is_ready(&self) -> bool {
        self.is_registered() && (self.events != 0 || self.mailbox_nonempty())
    }

    #[cfg(feature = "messages")]
    pub(crate) fn mailbox_nonempty(&self) -> bool {
        !self.mailbox.empty()
    }

    #[cfg(not(feature = "messages"))]
    pub(crate) fn mailbox_nonempty(&self) -> bool {
        false
    }

    #[cfg(feature = "messages")]
    pub(crate) fn mailbox_count(&self) -> u8 {
        self.mailbox.count() as u8
    }

    #[cfg(not(feature = "messages"))]
    pub(crate) fn mailbox_count(&self) -> u8 {
        0
    }
}

// SAFETY: `arg` is an opaque handle into application-owned state, exactly
// like `MessageHandle` — the kernel stores and forwards it, never
// dereferences it itself.
unsafe impl<const MSGS: usize> Send for TaskSlot<MSGS> {}
