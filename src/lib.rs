//! Cooperative, event-driven, run-to-completion scheduler core.
//!
//! Four subsystems share one [`kernel::Kernel`]: a fixed-priority task
//! dispatcher, a deferred-event engine, a per-task message mailbox, and a
//! software timer wheel, all driven by one monotonic tick counter and one
//! critical section. See each module for its share of the design.
//!
//! `no_std`-friendly: nothing here allocates, and every fixed-size table is
//! sized by const generics on [`kernel::Kernel`] rather than a heap.

#![no_std]
#![deny(unused_must_use)]

#[cfg(test)]
extern crate std;

pub mod error;
pub mod future_event;
pub mod kernel;
pub mod task;

#[cfg(feature = "messages")]
pub mod fifo;
#[cfg(feature = "messages")]
pub mod message;

#[cfg(feature = "timers")]
pub mod timer;

pub use error::Status;
pub use kernel::{Kernel, StepOutcome};
pub use task::{IdleHandler, TaskHandler};

#[cfg(feature = "messages")]
pub use message::MessageHandle;

#[cfg(feature = "timers")]
pub use timer::{TimerCallback, TimerKind};
