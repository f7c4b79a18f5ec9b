//! Timing syscalls (component F over component D's scheduler): ticks
//! elapsed since boot and millisecond sleeps.

use crate::arch::x86::context::TrapFrame;
use crate::arch::x86::TICK_HZ;
use crate::error::KernelError;
use crate::process::ProcessState;
use crate::sched::scheduler;

pub fn get_ticks() -> Result<i32, KernelError> {
    Ok(scheduler::current_tick() as i32)
}

/// `sleep_ms(ms)`: block the caller for at least `ms` milliseconds,
/// rounded up to the next whole tick. `ms == 0` returns immediately.
pub fn sleep_ms(frame: &mut TrapFrame, ms: u32) -> Result<i32, KernelError> {
    if ms == 0 {
        return Ok(0);
    }
    let ticks = (ms as u64 * TICK_HZ as u64).div_ceil(1000).max(1);
    let until_ticks = scheduler::current_tick() + ticks;
    scheduler::block_current(frame, ProcessState::Sleeping { until_ticks });
    Err(KernelError::WouldBlock)
}
