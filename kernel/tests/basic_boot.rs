//! Basic boot test: bring up the architecture layer and memory manager
//! exactly as `kernel_main_impl` does, then confirm the kernel is still
//! alive and the heap is usable.

#![no_std]
#![no_main]

extern crate alloc;

use core::panic::PanicInfo;

use rohkernel::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting basic boot tests...");

    test_arch_bringup();
    test_mm_bringup();
    test_heap_alloc();

    serial_println!("All tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn test_arch_bringup() {
    rohkernel::arch::x86::init();
    serial_println!("arch bring-up ok");
}

fn test_mm_bringup() {
    // No real Multiboot2 hand-off under the test harness; `mm::init`
    // falls back to assuming 16MB of RAM, which is enough to build the
    // kernel address space template and turn on paging.
    rohkernel::mm::init(0);
    serial_println!("mm bring-up ok, paging enabled");
}

fn test_heap_alloc() {
    use alloc::vec::Vec;
    let mut v: Vec<u32> = Vec::new();
    for i in 0..64 {
        v.push(i);
    }
    assert_eq!(v.len(), 64);
    assert_eq!(v.iter().sum::<u32>(), (0..64).sum());
    serial_println!("heap alloc ok");
}
