//! Process table, control blocks, and lifecycle operations (component D).

pub mod lifecycle;
pub mod pcb;
pub mod table;

pub use pcb::{ProcessControlBlock, ProcessState};

pub fn init() {
    log::info!("[process] process table ready ({} slots)", table::MAX_PROCESSES);
}

pub fn current_pid() -> Option<u32> {
    table::current_pid()
}
