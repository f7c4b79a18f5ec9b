//! System call dispatcher (component F): the single handler `int 0x80`
//! in `irq::dispatch` hands every trap to. One call number in EAX, up
//! to four arguments in EBX/ECX/EDX/EDI, one `i32` return value written
//! back into EAX -- negative is a [`SyscallError`], matching the
//! original kernel's `syscall.c` convention.

mod console;
mod debug;
mod filesystem;
mod ipc;
mod process;
mod time;
mod user;

use crate::arch::x86::context::TrapFrame;
use crate::error::{KernelError, SyscallError};
use crate::process::{table, ProcessState};
use crate::sched::scheduler;

#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Read = 0,
    Write = 1,
    Open = 2,
    Close = 3,
    Seek = 4,
    Stat = 5,
    Listdir = 6,
    Mkdir = 7,
    Rm = 8,
    Touch = 9,
    Rename = 10,
    FsFreeBlocks = 11,
    Getcwd = 12,
    Setcwd = 13,
    Pipe = 14,
    Dup2 = 15,
    Exit = 16,
    Fork = 17,
    Exec = 18,
    Wait = 19,
    Spawn = 20,
    Kill = 21,
    Brk = 22,
    Getpid = 23,
    Getppid = 24,
    Getargs = 25,
    ProcessCount = 26,
    ProcessList = 27,
    GetTicks = 28,
    SleepMs = 29,
    Clear = 30,
    Setcolor = 31,
    Getchar = 32,
    KeyboardHasInput = 33,
    HeapStats = 34,
    Writefile = 35,
}

impl TryFrom<usize> for Syscall {
    type Error = ();

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        use Syscall::*;
        Ok(match value {
            0 => Read,
            1 => Write,
            2 => Open,
            3 => Close,
            4 => Seek,
            5 => Stat,
            6 => Listdir,
            7 => Mkdir,
            8 => Rm,
            9 => Touch,
            10 => Rename,
            11 => FsFreeBlocks,
            12 => Getcwd,
            13 => Setcwd,
            14 => Pipe,
            15 => Dup2,
            16 => Exit,
            17 => Fork,
            18 => Exec,
            19 => Wait,
            20 => Spawn,
            21 => Kill,
            22 => Brk,
            23 => Getpid,
            24 => Getppid,
            25 => Getargs,
            26 => ProcessCount,
            27 => ProcessList,
            28 => GetTicks,
            29 => SleepMs,
            30 => Clear,
            31 => Setcolor,
            32 => Getchar,
            33 => KeyboardHasInput,
            34 => HeapStats,
            35 => Writefile,
            _ => return Err(()),
        })
    }
}

/// Rewind `frame.eip` back onto the `int 0x80` instruction and switch
/// away. When this process is next scheduled, it re-enters the same
/// syscall from scratch with its own address space active again --
/// the only place user-memory completion (reading a pipe into the
/// caller's buffer, reaping a zombie's exit status) can happen safely.
fn park(frame: &mut TrapFrame, state: ProcessState) {
    frame.eip = frame.eip.wrapping_sub(2);
    scheduler::block_current(frame, state);
}

/// Called from `irq::dispatch` for vector `0x80`.
pub fn dispatch(frame: &mut TrapFrame) {
    let (num, a0, a1, a2, a3) = frame.syscall_args();

    let Ok(pid) = table::current_pid().ok_or(()) else {
        frame.set_return_value(SyscallError::NoSuchProcess as i32);
        return;
    };

    let Ok(call) = Syscall::try_from(num as usize) else {
        frame.set_return_value(SyscallError::InvalidSyscall as i32);
        return;
    };

    let result = handle(frame, pid, call, a0, a1, a2, a3);

    match result {
        Ok(value) => frame.set_return_value(value),
        // The handler already rewound eip (or, for a one-shot sleep,
        // arranged for `table::wake_ready` to set the return value) and
        // switched `*frame` to a different process -- touching it
        // further here would corrupt whoever is running now.
        Err(KernelError::WouldBlock) => {}
        Err(e) => frame.set_return_value(SyscallError::from(e) as i32),
    }
}

#[allow(clippy::too_many_arguments)]
fn handle(
    frame: &mut TrapFrame,
    pid: u32,
    call: Syscall,
    a0: u32,
    a1: u32,
    a2: u32,
    a3: u32,
) -> Result<i32, KernelError> {
    use Syscall::*;
    match call {
        Read => filesystem::read(frame, pid, a0, a1, a2),
        Write => filesystem::write(frame, pid, a0, a1, a2),
        Open => filesystem::open(pid, a0),
        Close => filesystem::close(pid, a0),
        Seek => filesystem::seek(pid, a0, a1 as i32, a2),
        Stat => filesystem::stat(pid, a0, a1),
        Listdir => filesystem::listdir(pid, a0, a1, a2),
        Mkdir => filesystem::mkdir(pid, a0),
        Rm => filesystem::rm(pid, a0),
        Touch => filesystem::touch(pid, a0),
        Rename => filesystem::rename(pid, a0, a1),
        FsFreeBlocks => filesystem::fs_free_blocks(),
        Getcwd => filesystem::getcwd(pid, a0, a1),
        Setcwd => filesystem::setcwd(pid, a0),
        Pipe => ipc::pipe(pid, a0),
        Dup2 => ipc::dup2(pid, a0, a1),
        Exit => process::exit(pid, a0 as i32),
        Fork => process::fork(pid),
        Exec => process::exec(pid, a0, a2, a3),
        Wait => process::wait(frame, pid, a0 as i32, a1),
        Spawn => process::spawn(pid, a0),
        Kill => process::kill(a0, a1 as i32),
        Brk => process::brk(pid, a0),
        Getpid => process::getpid(pid),
        Getppid => process::getppid(pid),
        Getargs => process::getargs(pid, a0, a1),
        ProcessCount => process::process_count(),
        ProcessList => process::process_list(a0, a1),
        GetTicks => time::get_ticks(),
        SleepMs => time::sleep_ms(frame, a0),
        Clear => console::clear(),
        Setcolor => console::setcolor(a0, a1),
        Getchar => console::getchar(frame),
        KeyboardHasInput => console::keyboard_has_input(),
        HeapStats => debug::heap_stats(a0),
        Writefile => filesystem::writefile(pid, a0, a1, a2),
    }
}
