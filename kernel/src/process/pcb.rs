//! Process control block (component D).

use crate::arch::x86::context::TrapFrame;
use crate::fs::pipe::PipeId;
use crate::fs::FileTable;
use crate::mm::AddressSpace;
use alloc::string::String;
use alloc::vec::Vec;

pub const NUM_PRIORITIES: u8 = 4;
pub const DEFAULT_PRIORITY: u8 = 2;
pub const DEFAULT_TIME_SLICE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Sleeping { until_ticks: u64 },
    BlockedOnPipe { pipe: PipeId, for_read: bool },
    BlockedOnWait { child: Option<u32> },
    BlockedOnKeyboard,
    Zombie,
}

pub struct ProcessControlBlock {
    pub pid: u32,
    pub parent: Option<u32>,
    pub name: String,
    pub args: Vec<String>,
    pub state: ProcessState,
    pub priority: u8,
    pub time_slice: u32,
    pub total_time: u64,
    pub page_directory: AddressSpace,
    pub kernel_stack_base: usize,
    pub kernel_stack_top: usize,
    pub user_stack_top: usize,
    pub heap_base: usize,
    pub heap_end: usize,
    pub trap_frame: TrapFrame,
    pub fds: FileTable,
    pub cwd: String,
    pub wait_status_ptr: u32,
    pub exit_code: i32,
    pub uid: u32,
    pub gid: u32,
}

impl ProcessControlBlock {
    pub fn is_runnable(&self) -> bool {
        matches!(self.state, ProcessState::Ready | ProcessState::Running)
    }

    pub fn is_zombie(&self) -> bool {
        self.state == ProcessState::Zombie
    }
}
