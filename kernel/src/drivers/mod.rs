//! Device drivers module.
//!
//! Only the devices this kernel actually talks to survive: the PS/2
//! keyboard (the VGA console lives under `arch::x86::vga`, grounded in
//! the common ISR trampoline's register layout) and the ATA disk the
//! block filesystem is mounted from. The network interface card is
//! driven directly by `net::device`, not a separate `drivers` stack.

pub mod keyboard;
pub mod storage;

/// Initialize all drivers.
pub fn init() {
    log::info!("[drivers] initializing device drivers");

    keyboard::init();
    storage::init();

    log::info!("[drivers] device drivers initialized");
}
