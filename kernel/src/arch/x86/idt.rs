//! Interrupt Descriptor Table: CPU exceptions, PIC IRQs, and the `int
//! 0x80` syscall gate. Every vector lands on a common assembly stub that
//! builds a [`super::context::TrapFrame`] on the kernel stack and calls
//! [`dispatch`], mirroring the original kernel's single syscall
//! entrypoint plus per-exception handlers.

use super::context::TrapFrame;
use core::arch::{asm, global_asm};
use core::mem::size_of;

const IDT_ENTRIES: usize = 256;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn new(handler: u32, selector: u16, type_attr: u8) -> Self {
        Self {
            offset_low: (handler & 0xFFFF) as u16,
            selector,
            zero: 0,
            type_attr,
            offset_high: ((handler >> 16) & 0xFFFF) as u16,
        }
    }
}

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

static mut IDT: [IdtEntry; IDT_ENTRIES] = [IdtEntry::missing(); IDT_ENTRIES];

// Interrupt gate, present, DPL0 (0x8E) and DPL3 for the syscall gate so
// ring3 code can execute `int 0x80` (0xEE).
const GATE_INT_DPL0: u8 = 0x8E;
const GATE_INT_DPL3: u8 = 0xEE;

macro_rules! isr_stub {
    ($name:ident, $num:expr, has_err_code: $err:expr) => {
        global_asm!(concat!(
            ".global ", stringify!($name), "\n",
            stringify!($name), ":\n",
            if $err { "" } else { "push 0\n" },
            "push ", stringify!($num), "\n",
            "jmp isr_common_stub\n",
        ));
    };
}

extern "C" {
    fn isr0();
    fn isr6();
    fn isr8();
    fn isr13();
    fn isr14();
    fn irq0();
    fn irq1();
    fn isr_syscall();
}

isr_stub!(isr0, 0, has_err_code: false); // divide error
isr_stub!(isr6, 6, has_err_code: false); // invalid opcode
isr_stub!(isr8, 8, has_err_code: true); // double fault
isr_stub!(isr13, 13, has_err_code: true); // general protection fault
isr_stub!(isr14, 14, has_err_code: true); // page fault
isr_stub!(irq0, 32, has_err_code: false); // timer
isr_stub!(irq1, 33, has_err_code: false); // keyboard
isr_stub!(isr_syscall, 0x80, has_err_code: false);

global_asm!(
    r#"
.global isr_common_stub
isr_common_stub:
    pushad
    push ds
    push es
    push fs
    push gs
    mov ax, 0x10
    mov ds, ax
    mov es, ax
    mov fs, ax
    mov gs, ax
    push esp
    call interrupt_dispatch
    add esp, 4
    pop gs
    pop fs
    pop es
    pop ds
    popad
    add esp, 8
    iretd
"#
);

#[no_mangle]
extern "C" fn interrupt_dispatch(frame: *mut TrapFrame) {
    // SAFETY: `frame` points at the trap frame the assembly stub just
    // built on this CPU's kernel stack; it is valid for the duration of
    // this call and nothing else aliases it.
    let frame = unsafe { &mut *frame };
    crate::irq::dispatch(frame);
}

global_asm!(
    r#"
.global enter_first_process
enter_first_process:
    mov esp, [esp + 4]
    pop gs
    pop fs
    pop es
    pop ds
    popad
    add esp, 8
    iretd
"#
);

extern "C" {
    fn enter_first_process(frame: *const TrapFrame);
}

/// Jump into the first process's saved frame the same way a normal
/// interrupt return would, having never entered the interrupt path in
/// the first place. `TrapFrame`'s field order is `#[repr(C)]`-identical
/// to what `pop gs/fs/es/ds; popad; iretd` expects, so this is the exact
/// tail of `isr_common_stub` pointed at a frame that was never pushed by
/// a real trap.
///
/// # Safety
/// `frame` must describe a valid ring-3 entry point and stack in an
/// address space that is already the active one (its page directory
/// must already be loaded). Never returns.
pub unsafe fn jump_to_first_process(frame: &TrapFrame) -> ! {
    unsafe {
        enter_first_process(frame as *const TrapFrame);
    }
    unreachable!("iretd does not return")
}

/// Load `handler` into IDT slot `vector`.
fn set_gate(vector: u8, handler: unsafe extern "C" fn(), type_attr: u8) {
    // SAFETY: IDT is only mutated here, during single-threaded boot
    // before `lidt` runs.
    unsafe {
        IDT[vector as usize] = IdtEntry::new(
            handler as usize as u32,
            super::gdt::KERNEL_CODE_SELECTOR,
            type_attr,
        );
    }
}

/// Build and load the IDT.
pub fn init() {
    set_gate(0, isr0, GATE_INT_DPL0);
    set_gate(6, isr6, GATE_INT_DPL0);
    set_gate(8, isr8, GATE_INT_DPL0);
    set_gate(13, isr13, GATE_INT_DPL0);
    set_gate(14, isr14, GATE_INT_DPL0);
    set_gate(32, irq0, GATE_INT_DPL0);
    set_gate(33, irq1, GATE_INT_DPL0);
    set_gate(0x80, isr_syscall, GATE_INT_DPL3);

    let ptr = DescriptorTablePointer {
        limit: (size_of::<[IdtEntry; IDT_ENTRIES]>() - 1) as u16,
        // SAFETY: reading the address of IDT, not its contents; no
        // concurrent mutation is possible (single-threaded boot).
        base: unsafe { core::ptr::addr_of!(IDT) as u32 },
    };

    // SAFETY: `ptr` references an IDT fully populated above, 'static for
    // the kernel's lifetime.
    unsafe {
        asm!("lidt [{0}]", in(reg) &ptr, options(nostack, preserves_flags));
    }
}
