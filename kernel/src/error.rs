//! Crate-wide kernel error type.
//!
//! Every subsystem below the syscall dispatcher returns `Result<T,
//! KernelError>` (or a local error enum with a `From` conversion into
//! it); the dispatcher is the only place a `KernelError` collapses to
//! the syscall ABI's `-errno`-style `isize` return (see
//! `syscall::SyscallError`).

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    OutOfMemory { requested: usize, available: usize },
    InvalidAddress { addr: usize },
    UnmappedMemory { addr: usize },
    ProcessNotFound { pid: u32 },
    InvalidState { expected: &'static str, actual: &'static str },
    FsError(FsError),
    IpcError(PipeError),
    SyscallError(SyscallError),
    HardwareError { device: &'static str, code: u32 },
    InvalidArgument { name: &'static str, value: &'static str },
    ResourceExhausted { resource: &'static str },
    NotFound { resource: &'static str },
    AlreadyExists { resource: &'static str },
    WouldBlock,
    BrokenPipe,
    NotInitialized { subsystem: &'static str },
}

/// Pipe-specific errors (component E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeError {
    Full,
    Empty,
    BrokenPipe,
    NoReaders,
    NoWriters,
    TooManyPipes,
}

/// System call ABI errors (component F). Negative values returned
/// directly to user space in EAX.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SyscallError {
    InvalidSyscall = -1,
    InvalidArgument = -2,
    PermissionDenied = -3,
    ResourceNotFound = -4,
    OutOfMemory = -5,
    WouldBlock = -6,
    Interrupted = -7,
    Fault = -8,
    NoSuchProcess = -9,
    BadFileDescriptor = -10,
}

/// Filesystem errors (component G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    NotADirectory,
    NotAFile,
    IsADirectory,
    ReadOnly,
    InvalidPath,
    NotMounted,
    IoError,
    DirectoryNotEmpty,
    TooManyOpenFiles,
    BadFileDescriptor,
    NoSpace,
    NoInodes,
    NameTooLong,
    FileTooLarge,
    WouldBlock,
}

pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested, available } => write!(
                f,
                "out of memory: requested {} bytes, {} available",
                requested, available
            ),
            Self::InvalidAddress { addr } => write!(f, "invalid address: {:#x}", addr),
            Self::UnmappedMemory { addr } => write!(f, "unmapped memory at {:#x}", addr),
            Self::ProcessNotFound { pid } => write!(f, "process {} not found", pid),
            Self::InvalidState { expected, actual } => {
                write!(f, "invalid state: expected {}, got {}", expected, actual)
            }
            Self::FsError(e) => write!(f, "filesystem error: {:?}", e),
            Self::IpcError(e) => write!(f, "pipe error: {:?}", e),
            Self::SyscallError(e) => write!(f, "syscall error: {:?}", e),
            Self::HardwareError { device, code } => {
                write!(f, "hardware error on {}: code {:#x}", device, code)
            }
            Self::InvalidArgument { name, value } => {
                write!(f, "invalid argument '{}': {}", name, value)
            }
            Self::ResourceExhausted { resource } => write!(f, "resource exhausted: {}", resource),
            Self::NotFound { resource } => write!(f, "{} not found", resource),
            Self::AlreadyExists { resource } => write!(f, "{} already exists", resource),
            Self::WouldBlock => write!(f, "operation would block"),
            Self::BrokenPipe => write!(f, "broken pipe"),
            Self::NotInitialized { subsystem } => write!(f, "{} not initialized", subsystem),
        }
    }
}

impl From<PipeError> for KernelError {
    fn from(err: PipeError) -> Self {
        Self::IpcError(err)
    }
}

impl From<SyscallError> for KernelError {
    fn from(err: SyscallError) -> Self {
        Self::SyscallError(err)
    }
}

impl From<FsError> for KernelError {
    fn from(err: FsError) -> Self {
        Self::FsError(err)
    }
}

impl From<KernelError> for SyscallError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::OutOfMemory { .. } => SyscallError::OutOfMemory,
            KernelError::WouldBlock => SyscallError::WouldBlock,
            KernelError::ProcessNotFound { .. } => SyscallError::NoSuchProcess,
            KernelError::FsError(FsError::BadFileDescriptor) => SyscallError::BadFileDescriptor,
            KernelError::FsError(FsError::PermissionDenied) => SyscallError::PermissionDenied,
            KernelError::FsError(FsError::WouldBlock) => SyscallError::WouldBlock,
            KernelError::FsError(_) => SyscallError::ResourceNotFound,
            KernelError::IpcError(_) => SyscallError::ResourceNotFound,
            KernelError::InvalidAddress { .. } | KernelError::UnmappedMemory { .. } => {
                SyscallError::Fault
            }
            _ => SyscallError::InvalidArgument,
        }
    }
}
