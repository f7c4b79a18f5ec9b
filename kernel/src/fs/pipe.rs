//! Bounded pipe IPC (component E).
//!
//! A fixed pool of pipes, each a 1024-byte circular buffer with reader
//! and writer reference counts. There is no per-pipe heap allocation:
//! every pipe lives inline in a static table, and `create` fails with
//! `TooManyPipes` once the pool is exhausted rather than growing it.
//! Reading an empty pipe with at least one writer left, or writing a
//! full pipe with at least one reader left, is a blocking condition —
//! this module reports that condition (`Err(PipeError::WouldBlock)`)
//! rather than spinning; the caller (the syscall dispatcher) is
//! responsible for parking the current process on the pipe and letting
//! the scheduler retry it once a sibling `read`/`write`/`close` wakes it.

extern crate alloc;

use crate::error::PipeError;
use spin::Mutex;

pub const PIPE_BUFFER_SIZE: usize = 1024;
pub const MAX_PIPES: usize = 64;

pub type PipeId = usize;

struct PipeSlot {
    buffer: [u8; PIPE_BUFFER_SIZE],
    read_pos: usize,
    write_pos: usize,
    count: usize,
    readers: u32,
    writers: u32,
}

impl PipeSlot {
    const fn new() -> Self {
        Self {
            buffer: [0; PIPE_BUFFER_SIZE],
            read_pos: 0,
            write_pos: 0,
            count: 0,
            readers: 1,
            writers: 1,
        }
    }

    fn is_full(&self) -> bool {
        self.count == PIPE_BUFFER_SIZE
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn push(&mut self, byte: u8) {
        self.buffer[self.write_pos] = byte;
        self.write_pos = (self.write_pos + 1) % PIPE_BUFFER_SIZE;
        self.count += 1;
    }

    fn pop(&mut self) -> u8 {
        let byte = self.buffer[self.read_pos];
        self.read_pos = (self.read_pos + 1) % PIPE_BUFFER_SIZE;
        self.count -= 1;
        byte
    }
}

static PIPES: Mutex<[Option<PipeSlot>; MAX_PIPES]> = Mutex::new([const { None }; MAX_PIPES]);

/// Allocate a pipe from the fixed pool. Returns its id, shared by both
/// the read and write end until each side closes it.
pub fn create() -> Result<PipeId, PipeError> {
    let mut pipes = PIPES.lock();
    let slot = pipes.iter().position(|p| p.is_none()).ok_or(PipeError::TooManyPipes)?;
    pipes[slot] = Some(PipeSlot::new());
    Ok(slot)
}

/// Record an additional reader (e.g. `fork` duplicating the fd table).
pub fn add_reader(id: PipeId) {
    if let Some(pipe) = PIPES.lock()[id].as_mut() {
        pipe.readers += 1;
    }
}

/// Record an additional writer.
pub fn add_writer(id: PipeId) {
    if let Some(pipe) = PIPES.lock()[id].as_mut() {
        pipe.writers += 1;
    }
}

/// Drop one reference to the read end; the pipe is torn down once both
/// ends have no references left.
pub fn close_read(id: PipeId) {
    let mut pipes = PIPES.lock();
    let mut drop_slot = false;
    if let Some(pipe) = pipes[id].as_mut() {
        pipe.readers = pipe.readers.saturating_sub(1);
        drop_slot = pipe.readers == 0 && pipe.writers == 0;
    }
    if drop_slot {
        pipes[id] = None;
    }
}

/// Drop one reference to the write end.
pub fn close_write(id: PipeId) {
    let mut pipes = PIPES.lock();
    let mut drop_slot = false;
    if let Some(pipe) = pipes[id].as_mut() {
        pipe.writers = pipe.writers.saturating_sub(1);
        drop_slot = pipe.readers == 0 && pipe.writers == 0;
    }
    if drop_slot {
        pipes[id] = None;
    }
}

/// Attempt to read up to `buf.len()` bytes without blocking.
///
/// `Ok(0)` means end-of-pipe (no data, and no writers remain). A
/// nonzero-capacity pipe with no data but at least one writer returns
/// `Err(WouldBlock)` so the caller can park the process instead of
/// spinning.
pub fn try_read(id: PipeId, buf: &mut [u8]) -> Result<usize, PipeError> {
    let mut pipes = PIPES.lock();
    let pipe = pipes[id].as_mut().ok_or(PipeError::BrokenPipe)?;
    if pipe.is_empty() {
        return if pipe.writers == 0 { Ok(0) } else { Err(PipeError::Empty) };
    }
    let to_read = buf.len().min(pipe.count);
    for slot in buf.iter_mut().take(to_read) {
        *slot = pipe.pop();
    }
    Ok(to_read)
}

/// Attempt to write up to `data.len()` bytes without blocking. Returns
/// the number of bytes actually accepted, which may be less than
/// `data.len()` if the buffer fills partway through.
pub fn try_write(id: PipeId, data: &[u8]) -> Result<usize, PipeError> {
    let mut pipes = PIPES.lock();
    let pipe = pipes[id].as_mut().ok_or(PipeError::BrokenPipe)?;
    if pipe.readers == 0 {
        return Err(PipeError::NoReaders);
    }
    if pipe.is_full() {
        return Err(PipeError::Full);
    }
    let mut written = 0;
    for &byte in data {
        if pipe.is_full() {
            break;
        }
        pipe.push(byte);
        written += 1;
    }
    Ok(written)
}

pub fn has_data(id: PipeId) -> bool {
    PIPES.lock()[id].as_ref().is_some_and(|p| !p.is_empty())
}

pub fn has_space(id: PipeId) -> bool {
    PIPES.lock()[id].as_ref().is_some_and(|p| !p.is_full())
}

pub fn writers_remaining(id: PipeId) -> u32 {
    PIPES.lock()[id].as_ref().map_or(0, |p| p.writers)
}

pub fn readers_remaining(id: PipeId) -> u32 {
    PIPES.lock()[id].as_ref().map_or(0, |p| p.readers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_round_trips() {
        let id = create().unwrap();
        assert_eq!(try_write(id, b"hello").unwrap(), 5);
        let mut buf = [0u8; 16];
        let n = try_read(id, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        close_read(id);
        close_write(id);
    }

    #[test]
    fn full_buffer_rejects_further_writes() {
        let id = create().unwrap();
        let chunk = [0u8; PIPE_BUFFER_SIZE];
        assert_eq!(try_write(id, &chunk).unwrap(), PIPE_BUFFER_SIZE);
        assert_eq!(try_write(id, b"x"), Err(PipeError::Full));
        close_read(id);
        close_write(id);
    }

    #[test]
    fn empty_buffer_with_writer_blocks() {
        let id = create().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(try_read(id, &mut buf), Err(PipeError::Empty));
        close_read(id);
        close_write(id);
    }

    #[test]
    fn eof_once_writer_closed() {
        let id = create().unwrap();
        close_write(id);
        let mut buf = [0u8; 4];
        assert_eq!(try_read(id, &mut buf), Ok(0));
        close_read(id);
    }

    #[test]
    fn write_with_no_readers_is_broken_pipe() {
        let id = create().unwrap();
        close_read(id);
        assert_eq!(try_write(id, b"x"), Err(PipeError::NoReaders));
        close_write(id);
    }

    #[test]
    fn pool_exhaustion_reports_too_many_pipes() {
        let mut ids = alloc::vec::Vec::new();
        while let Ok(id) = create() {
            ids.push(id);
        }
        assert_eq!(create(), Err(PipeError::TooManyPipes));
        for id in ids {
            close_read(id);
            close_write(id);
        }
    }
}
