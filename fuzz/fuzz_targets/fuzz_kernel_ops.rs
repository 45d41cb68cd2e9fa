//! Fuzz target: random `Kernel` API call sequences.
//!
//! Drives an arbitrary interleaving of every producer/consumer entry point
//! against a fixed-size kernel and asserts it never panics, regardless of
//! call order — mailbox overflow, unknown task/timer IDs, and clearing an
//! already-clear event are all expected, recoverable outcomes (`Status`),
//! not bugs.
//!
//! cargo fuzz run fuzz_kernel_ops

#![no_main]

use libfuzzer_sys::fuzz_target;
use rtcos::kernel::Kernel;
use rtcos::message::MessageHandle;
use rtcos::timer::TimerKind;

const TASKS: usize = 4;
const FUTURE_EVENTS: usize = 4;
const MESSAGES: usize = 4;
const TIMERS: usize = 4;

type FuzzKernel = Kernel<TASKS, FUTURE_EVENTS, MESSAGES, TIMERS>;

fn handler_a(events: u32, _msg_count: u8, _arg: *const ()) -> u32 {
    events >> 1
}

fn handler_b(events: u32, _msg_count: u8, _arg: *const ()) -> u32 {
    0
}

fn noop_timer_callback(_arg: *const ()) {}

#[derive(Debug, arbitrary::Arbitrary)]
enum Op {
    RegisterTask { task_id: u8, which: bool },
    SendEvent { task_id: u8, flags: u32, delay: u8, periodic: bool },
    BroadcastEvent { flags: u32, delay: u8, periodic: bool },
    ClearEvent { task_id: u8, flags: u32 },
    SendMessage { task_id: u8 },
    BroadcastMessage,
    GetMessage,
    CreateTimer,
    StartTimer { timer_id: u8, period: u8 },
    StopTimer { timer_id: u8 },
    TimerExpired { timer_id: u8 },
    Tick,
    Step,
    SetTickCount { n: u32 },
}

fuzz_target!(|ops: Vec<Op>| {
    let kernel: FuzzKernel = Kernel::new();
    let payload = 0u8;
    let msg = MessageHandle::from_ptr(&payload as *const u8);
    let mut timer_ids: Vec<usize> = Vec::new();

    for op in ops {
        match op {
            Op::RegisterTask { task_id, which } => {
                let handler = if which { handler_a } else { handler_b };
                let _ = kernel.register_task(handler, task_id as usize, core::ptr::null());
            }
            Op::SendEvent { task_id, flags, delay, periodic } => {
                let _ = kernel.send_event(task_id as usize, flags, delay as u32, periodic);
            }
            Op::BroadcastEvent { flags, delay, periodic } => {
                let _ = kernel.broadcast_event(flags, delay as u32, periodic);
            }
            Op::ClearEvent { task_id, flags } => {
                let _ = kernel.clear_event(task_id as usize, flags);
            }
            Op::SendMessage { task_id } => {
                let _ = kernel.send_message(task_id as usize, msg);
            }
            Op::BroadcastMessage => {
                let _ = kernel.broadcast_message(msg);
            }
            Op::GetMessage => {
                let _ = kernel.get_message();
            }
            Op::CreateTimer => {
                if let Ok(id) = kernel.create_timer(TimerKind::Periodic, noop_timer_callback, core::ptr::null()) {
                    timer_ids.push(id);
                }
            }
            Op::StartTimer { timer_id, period } => {
                let _ = kernel.start_timer(timer_id as usize, period as u32);
            }
            Op::StopTimer { timer_id } => {
                let _ = kernel.stop_timer(timer_id as usize);
            }
            Op::TimerExpired { timer_id } => {
                let _ = kernel.timer_expired(timer_id as usize);
            }
            Op::Tick => kernel.tick(),
            Op::Step => {
                let _ = kernel.step();
            }
            Op::SetTickCount { n } => kernel.set_tick_count(n),
        }
    }
});
