//! Bare-metal entry point. Everything lives in the library crate;
//! `arch::x86::multiboot`'s trampoline calls `kernel_main_impl` directly
//! inside that crate once the bootloader hands off, so this binary only
//! needs to provide the panic handler the library leaves for the final
//! link target to supply.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log::error!("kernel panic: {}", info);
    loop {
        rohkernel::arch::x86::halt();
    }
}
