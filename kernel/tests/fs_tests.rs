//! Filesystem tests: pipe IPC (component E) end to end. The block
//! filesystem (component G) needs a mounted ATA drive to exercise
//! meaningfully, which this bare-metal harness doesn't provision; its
//! on-disk format invariants are covered by the host-run unit tests in
//! `fs::blockfs`.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use rohkernel::error::PipeError;
use rohkernel::fs::pipe;
use rohkernel::{exit_qemu, kernel_assert_eq, serial_println, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting filesystem tests...");

    test_pipe_round_trip();
    test_pipe_broken_pipe();
    test_pipe_eof_on_writer_close();
    test_pipe_full_buffer_rejects_write();

    serial_println!("All tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn test_pipe_round_trip() {
    let id = pipe::create().expect("pipe creation failed");

    let written = pipe::try_write(id, b"hello, pipe").expect("write failed");
    kernel_assert_eq!(written, 11);

    let mut buf = [0u8; 32];
    let read = pipe::try_read(id, &mut buf).expect("read failed");
    kernel_assert_eq!(&buf[..read], b"hello, pipe");

    pipe::close_read(id);
    pipe::close_write(id);
}

fn test_pipe_broken_pipe() {
    let id = pipe::create().expect("pipe creation failed");
    pipe::close_read(id);
    kernel_assert_eq!(pipe::try_write(id, b"x"), Err(PipeError::NoReaders));
    pipe::close_write(id);
}

fn test_pipe_eof_on_writer_close() {
    let id = pipe::create().expect("pipe creation failed");
    pipe::close_write(id);
    let mut buf = [0u8; 4];
    kernel_assert_eq!(pipe::try_read(id, &mut buf), Ok(0));
    pipe::close_read(id);
}

fn test_pipe_full_buffer_rejects_write() {
    let id = pipe::create().expect("pipe creation failed");
    let chunk = [0u8; pipe::PIPE_BUFFER_SIZE];
    kernel_assert_eq!(pipe::try_write(id, &chunk).unwrap(), pipe::PIPE_BUFFER_SIZE);
    kernel_assert_eq!(pipe::try_write(id, b"x"), Err(PipeError::Full));
    pipe::close_read(id);
    pipe::close_write(id);
}
