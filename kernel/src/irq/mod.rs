//! Interrupt dispatch: the single entry point every vector in
//! `arch::x86::idt` funnels into. Exceptions are handled here directly
//! (page faults resolve to a COW copy or kill the process); IRQ0/IRQ1
//! feed the scheduler and keyboard driver and send their own EOI;
//! `int 0x80` is handed to the syscall dispatcher.

use crate::arch::x86::context::TrapFrame;
use crate::error::SyscallError;
use crate::process::table;
use crate::sched::scheduler;

const VEC_DIVIDE_ERROR: u32 = 0;
const VEC_INVALID_OPCODE: u32 = 6;
const VEC_DOUBLE_FAULT: u32 = 8;
const VEC_GENERAL_PROTECTION: u32 = 13;
const VEC_PAGE_FAULT: u32 = 14;
const VEC_IRQ0_TIMER: u32 = 32;
const VEC_IRQ1_KEYBOARD: u32 = 33;
const VEC_SYSCALL: u32 = 0x80;

/// Page fault error code bit 0: set if the fault was a protection
/// violation (page present), clear if the page was simply not present.
const PF_PRESENT: u32 = 1 << 0;
/// Page fault error code bit 1: set if the fault was a write.
const PF_WRITE: u32 = 1 << 1;

/// Called by `interrupt_dispatch` in `idt.rs` for every vector.
pub fn dispatch(frame: &mut TrapFrame) {
    match frame.int_no {
        VEC_DIVIDE_ERROR | VEC_INVALID_OPCODE | VEC_DOUBLE_FAULT | VEC_GENERAL_PROTECTION => {
            handle_fatal_exception(frame)
        }
        VEC_PAGE_FAULT => handle_page_fault(frame),
        VEC_IRQ0_TIMER => {
            scheduler::on_timer_tick(frame);
            crate::arch::x86::send_eoi(0);
        }
        VEC_IRQ1_KEYBOARD => {
            // SAFETY: reading the PS/2 data port in response to IRQ1 is
            // the documented way to collect the scancode that caused it.
            let scancode = unsafe { crate::arch::x86::inb(0x60) };
            crate::drivers::keyboard::handle_scancode(scancode);
            crate::arch::x86::send_eoi(1);
        }
        VEC_SYSCALL => crate::syscall::dispatch(frame),
        other => {
            log::warn!("[irq] unhandled vector {}", other);
        }
    }
}

/// CR2 holds the faulting linear address; read it immediately, before
/// anything else can fault and clobber it.
fn read_cr2() -> usize {
    let cr2: u32;
    // SAFETY: reading CR2 has no side effects.
    unsafe {
        core::arch::asm!("mov {0:e}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags));
    }
    cr2 as usize
}

fn handle_page_fault(frame: &mut TrapFrame) {
    let vaddr = read_cr2();
    let present = frame.err_code & PF_PRESENT != 0;
    let write = frame.err_code & PF_WRITE != 0;

    let Some(pid) = table::current_pid() else {
        panic!("page fault at {:#x} with no current process", vaddr);
    };

    if present && write {
        let resolved = table::with(pid, |p| p.page_directory.handle_cow_fault(vaddr))
            .map(|r| r.is_ok())
            .unwrap_or(false);
        if resolved {
            return;
        }
    }

    log::warn!(
        "[irq] unresolved page fault: pid={} vaddr={:#x} present={} write={}",
        pid,
        vaddr,
        present,
        write
    );
    kill_current(frame, pid);
}

fn handle_fatal_exception(frame: &mut TrapFrame) {
    let Some(pid) = table::current_pid() else {
        panic!("fatal exception {} with no current process", frame.int_no);
    };
    log::warn!(
        "[irq] fatal exception {} in pid {} (eip={:#x})",
        frame.int_no,
        pid,
        frame.eip
    );
    kill_current(frame, pid);
}

/// Force-exit the faulting process and switch away from it; the fault
/// happened on its own kernel stack, so `frame` must be overwritten with
/// a different process's trap frame before `iretd` can safely run.
fn kill_current(frame: &mut TrapFrame, pid: u32) {
    crate::process::lifecycle::exit(pid, SyscallError::Fault as i32);
    scheduler::block_current(frame, crate::process::ProcessState::Zombie);
}
