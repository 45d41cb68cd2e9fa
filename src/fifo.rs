//! Per-task bounded mailbox — spec §4.1.
//!
//! A fixed-capacity ring of [`MessageHandle`]s. Strict FIFO; the core never
//! inspects message contents, only shuttles the handle from sender to
//! receiver. Every `Fifo` lives inside a [`crate::task::TaskSlot`], which in
//! turn lives inside the kernel's critical-section-guarded state, so the
//! ring itself needs no internal synchronization — unlike the teacher's
//! `events.rs` queue (which is its own lock-free SPSC ring reachable
//! directly from an ISR), this ring is only ever touched while the caller
//! already holds the kernel lock.

use crate::error::Status;
use crate::message::MessageHandle;

/// Bounded ring buffer of up to `N` pending messages for one task.
pub struct Fifo<const N: usize> {
    buffer: [Option<MessageHandle>; N],
    head: usize,
    tail: usize,
    count: usize,
}

impl<const N: usize> Fifo<N> {
    /// An empty, zeroed fifo — usable in `const` array-initializer position.
    pub const EMPTY: Self = Self {
        buffer: [None; N],
        head: 0,
        tail: 0,
        count: 0,
    };

    /// Number of messages currently queued.
    pub const fn count(&self) -> usize {
        self.count
    }

    /// True if no messages are queued.
    pub const fn empty(&self) -> bool {
        self.count == 0
    }

    /// True if the ring cannot accept another message.
    pub const fn full(&self) -> bool {
        self.count == N
    }

    /// Enqueue a message at the head. Returns [`Status::MsgFull`] without
    /// mutating state if the ring is already at capacity.
    pub fn push(&mut self, msg: MessageHandle) -> Status {
        if self.full() {
            return Status::MsgFull;
        }
        self.buffer[self.head] = Some(msg);
        self.head = (self.head + 1) % N;
        self.count += 1;
        Status::None
    }

    /// Dequeue the oldest message. Returns [`Status::MsgEmpty`] if nothing is
    /// queued.
    pub fn pop(&mut self) -> (Status, Option<MessageHandle>) {
        if self.empty() {
            return (Status::MsgEmpty, None);
        }
        let msg = self.buffer[self.tail].take();
        self.tail = (self.tail + 1) % N;
        self.count -= 1;
        (Status::None, msg)
    }
}
