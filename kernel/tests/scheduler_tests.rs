//! Scheduler tests: the ready-queue's priority/round-robin ordering and
//! the tick counter the rest of the scheduler is built on.

#![no_std]
#![no_main]

extern crate alloc;

use core::panic::PanicInfo;

use rohkernel::sched::queue::ReadyQueue;
use rohkernel::{exit_qemu, kernel_assert, kernel_assert_eq, serial_println, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting scheduler tests...");

    test_priority_ordering();
    test_round_robin_within_level();
    test_remove_from_queue();
    test_tick_counter_advances();

    serial_println!("All tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn test_priority_ordering() {
    let mut queue = ReadyQueue::new();
    queue.enqueue(1, 2);
    queue.enqueue(2, 0);
    queue.enqueue(3, 1);

    kernel_assert_eq!(queue.dequeue(), Some(2));
    kernel_assert_eq!(queue.dequeue(), Some(3));
    kernel_assert_eq!(queue.dequeue(), Some(1));
    kernel_assert_eq!(queue.dequeue(), None);
}

fn test_round_robin_within_level() {
    let mut queue = ReadyQueue::new();
    queue.enqueue(10, 1);
    queue.enqueue(11, 1);
    kernel_assert_eq!(queue.dequeue(), Some(10));
    queue.enqueue(12, 1);
    kernel_assert_eq!(queue.dequeue(), Some(11));
    kernel_assert_eq!(queue.dequeue(), Some(12));
}

fn test_remove_from_queue() {
    let mut queue = ReadyQueue::new();
    queue.enqueue(20, 3);
    kernel_assert!(queue.has_ready());
    kernel_assert!(queue.remove(20, 3));
    kernel_assert!(!queue.has_ready());
}

fn test_tick_counter_advances() {
    rohkernel::sched::init();
    let before = rohkernel::sched::scheduler::current_tick();
    kernel_assert_eq!(before, 0);
}
