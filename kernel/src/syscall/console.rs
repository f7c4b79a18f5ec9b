//! Console/TTY syscalls (component F over the VGA writer and keyboard
//! driver): screen clearing, color, and raw key input.

use crate::arch::x86::context::TrapFrame;
use crate::arch::x86::vga;
use crate::drivers::keyboard;
use crate::error::KernelError;
use crate::process::ProcessState;

pub fn clear() -> Result<i32, KernelError> {
    vga::clear();
    Ok(0)
}

pub fn setcolor(foreground: u32, background: u32) -> Result<i32, KernelError> {
    vga::set_color(foreground as u8, background as u8);
    Ok(0)
}

/// `getchar()`: blocks until a key is available, then returns it.
pub fn getchar(frame: &mut TrapFrame) -> Result<i32, KernelError> {
    match keyboard::read_key() {
        Some(b) => Ok(b as i32),
        None => {
            super::park(frame, ProcessState::BlockedOnKeyboard);
            Err(KernelError::WouldBlock)
        }
    }
}

pub fn keyboard_has_input() -> Result<i32, KernelError> {
    Ok(if keyboard::has_input() { 1 } else { 0 })
}
