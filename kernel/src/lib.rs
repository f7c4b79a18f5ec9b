//! rohkernel library crate: the 32-bit x86 hobby kernel's core, built
//! as a library so the bare-metal binary and the host-side unit tests
//! share one implementation.

#![no_std]
#![cfg_attr(all(test, target_os = "none"), no_main)]
#![feature(custom_test_frameworks)]
#![feature(abi_x86_interrupt)]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]
#![cfg_attr(target_os = "none", test_runner(crate::test_runner))]
#![cfg_attr(target_os = "none", reexport_test_harness_main = "test_main")]

extern crate alloc;

// Bare metal: the global allocator is the kernel heap set up in
// `mm::heap` over a region the frame allocator reserved at boot.
#[cfg(all(target_arch = "x86", target_os = "none"))]
use linked_list_allocator::LockedHeap;

#[cfg(all(target_arch = "x86", target_os = "none"))]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

// Host target (cargo test): delegate to the system allocator so
// `alloc::{Vec, String, Box}` work in ordinary `#[test]` functions.
#[cfg(not(target_os = "none"))]
extern crate std;
#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

#[macro_use]
pub mod print;

pub mod arch;
pub mod drivers;
pub mod elf;
pub mod error;
pub mod fs;
pub mod irq;
pub mod mm;
pub mod net;
pub mod process;
pub mod sched;
pub mod serial;
pub mod sync;
mod syscall;

mod test_framework;

#[cfg(test)]
pub use test_framework::test_runner;
pub use test_framework::{cycles_to_ns, exit_qemu, read_timestamp, test_panic_handler, BenchmarkRunner, QemuExitCode, Testable};

#[cfg(all(test, target_os = "none"))]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    test_main();
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(all(test, target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    test_framework::test_panic_handler(info)
}

/// Heap allocation failure in a `no_std` kernel has no recovery path.
#[cfg(target_os = "none")]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("allocation error: {:?}", layout);
}

/// Path the first userspace process is loaded from once the root
/// filesystem is mounted. There is no initrd or embedded-binary loader
/// in this kernel -- the boot disk image is expected to already contain
/// this file.
#[cfg(target_os = "none")]
const INIT_PATH: &str = "/bin/init";

/// Kernel entry point, called from `arch::x86::multiboot::kernel_main_entry`
/// once the bootloader hands off in 32-bit protected mode.
///
/// Brings up every subsystem in dependency order, loads and starts the
/// first userspace process, and never returns: control passes to that
/// process via [`arch::x86::idt::jump_to_first_process`], and from then
/// on the kernel only runs inside interrupt handlers.
#[cfg(target_os = "none")]
pub fn kernel_main_impl(multiboot_info_addr: usize) -> ! {
    serial::init();
    log::info!("rohkernel booting");

    arch::x86::init();
    mm::init(multiboot_info_addr);
    process::init();
    sched::init();
    drivers::init();
    fs::init();
    #[cfg(feature = "net")]
    if let Err(e) = net::init() {
        log::warn!("[net] initialization failed: {}", e);
    }

    let pid = match fs::blockfs::BLOCK_FS.stat(INIT_PATH) {
        Ok((inode, fs_inode)) => {
            let mut image = alloc::vec![0u8; fs_inode.size as usize];
            match fs::blockfs::BLOCK_FS.read(inode, 0, &mut image) {
                Ok(_) => process::lifecycle::spawn("init", &image, alloc::vec::Vec::new()).ok(),
                Err(e) => {
                    log::warn!("[boot] failed to read {}: {:?}", INIT_PATH, e);
                    None
                }
            }
        }
        Err(e) => {
            log::warn!("[boot] {} not found: {:?}", INIT_PATH, e);
            None
        }
    };

    let Some(pid) = pid else {
        log::error!("[boot] no init process; halting");
        loop {
            arch::x86::halt();
        }
    };

    arch::x86::enable_interrupts();

    let frame = process::table::with(pid, |p| {
        // SAFETY: this is the only process in the table and nothing
        // else is running yet, so loading its page directory here,
        // before ever touching user memory, is safe.
        unsafe {
            arch::x86::load_page_directory(p.page_directory.phys_addr());
        }
        arch::x86::gdt::set_kernel_stack(p.kernel_stack_top as u32);
        p.state = process::ProcessState::Running;
        p.trap_frame
    })
    .expect("init process vanished from the table immediately after spawn");

    process::table::set_current_pid(Some(pid));

    log::info!("[boot] entering init (pid {})", pid);
    // SAFETY: `frame` is the freshly built entry frame for `pid`, whose
    // page directory and kernel stack were just loaded above.
    unsafe { arch::x86::idt::jump_to_first_process(&frame) }
}
