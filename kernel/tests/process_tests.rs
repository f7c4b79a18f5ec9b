//! Process lifecycle tests: spawn, fork, exec, and reap against a
//! minimal synthetic ELF32 binary, exercised the same way
//! `kernel_main_impl` loads `/bin/init` but without a real block device
//! backing it.

#![no_std]
#![no_main]

extern crate alloc;

use alloc::vec::Vec;
use core::panic::PanicInfo;

use rohkernel::process::{lifecycle, table, ProcessState};
use rohkernel::{exit_qemu, kernel_assert, kernel_assert_eq, serial_println, test_panic_handler, QemuExitCode};

/// Build a minimal statically-linked ET_EXEC/EM_386 binary with a
/// single `PT_LOAD` segment, just large enough for `elf::load` to
/// accept and map.
fn build_test_elf(entry_vaddr: u32, code: &[u8]) -> Vec<u8> {
    const EHDR_SIZE: u32 = 52;
    const PHDR_SIZE: u32 = 32;

    let mut image = Vec::with_capacity((EHDR_SIZE + PHDR_SIZE) as usize + code.len());

    // e_ident
    image.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    image.extend_from_slice(&2u16.to_le_bytes()); // e_type = ET_EXEC
    image.extend_from_slice(&3u16.to_le_bytes()); // e_machine = EM_386
    image.extend_from_slice(&1u32.to_le_bytes()); // e_version
    image.extend_from_slice(&entry_vaddr.to_le_bytes()); // e_entry
    image.extend_from_slice(&EHDR_SIZE.to_le_bytes()); // e_phoff
    image.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
    image.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    image.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes()); // e_ehsize
    image.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes()); // e_phentsize
    image.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
    image.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
    image.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    image.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
    kernel_assert_eq!(image.len() as u32, EHDR_SIZE);

    image.extend_from_slice(&1u32.to_le_bytes()); // p_type = PT_LOAD
    image.extend_from_slice(&(EHDR_SIZE + PHDR_SIZE).to_le_bytes()); // p_offset
    image.extend_from_slice(&entry_vaddr.to_le_bytes()); // p_vaddr
    image.extend_from_slice(&0u32.to_le_bytes()); // p_paddr
    image.extend_from_slice(&(code.len() as u32).to_le_bytes()); // p_filesz
    image.extend_from_slice(&(code.len() as u32).to_le_bytes()); // p_memsz
    image.extend_from_slice(&5u32.to_le_bytes()); // p_flags (R+X)
    image.extend_from_slice(&0x1000u32.to_le_bytes()); // p_align

    image.extend_from_slice(code);
    image
}

fn test_elf_image() -> Vec<u8> {
    let entry = rohkernel::mm::USER_SPACE_START as u32 + 0x1000;
    build_test_elf(entry, &[0xF4, 0xF4, 0xF4, 0xF4])
}

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("Starting process tests...");

    rohkernel::arch::x86::init();
    rohkernel::mm::init(0);
    rohkernel::process::init();

    test_spawn();
    test_fork();
    test_exec();
    test_exit_and_reap();

    serial_println!("All tests passed!");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn test_spawn() {
    let image = test_elf_image();
    let pid = lifecycle::spawn("spawn_test", &image, Vec::new()).expect("spawn failed");

    let state = table::with(pid, |p| p.state).expect("process missing after spawn");
    kernel_assert_eq!(state, ProcessState::Ready);

    lifecycle::exit(pid, 0);
    let _ = table::remove(pid);
}

fn test_fork() {
    let image = test_elf_image();
    let parent = lifecycle::spawn("fork_parent", &image, Vec::new()).expect("spawn failed");

    let child = lifecycle::fork(parent).expect("fork failed");
    kernel_assert!(child != parent);

    let parent_exists = table::with(parent, |_| ()).is_some();
    let child_exists = table::with(child, |_| ()).is_some();
    kernel_assert!(parent_exists);
    kernel_assert!(child_exists);

    let child_parent = table::with(child, |p| p.parent).flatten();
    kernel_assert_eq!(child_parent, Some(parent));

    lifecycle::exit(child, 0);
    let reaped = lifecycle::try_reap(parent, Some(child)).expect("expected child zombie to reap");
    kernel_assert_eq!(reaped.0, child);

    lifecycle::exit(parent, 0);
    let _ = table::remove(parent);
}

fn test_exec() {
    let image = test_elf_image();
    let pid = lifecycle::spawn("exec_test", &image, Vec::new()).expect("spawn failed");

    let original_heap_base = table::with(pid, |p| p.heap_base).unwrap();

    let second_image = test_elf_image();
    lifecycle::exec(pid, &second_image, alloc::vec![alloc::string::String::from("arg0")]).expect("exec failed");

    let new_heap_base = table::with(pid, |p| p.heap_base).unwrap();
    kernel_assert_eq!(new_heap_base, original_heap_base);

    let args_len = table::with(pid, |p| p.args.len()).unwrap();
    kernel_assert_eq!(args_len, 1);

    lifecycle::exit(pid, 0);
    let _ = table::remove(pid);
}

fn test_exit_and_reap() {
    let image = test_elf_image();
    let parent = lifecycle::spawn("reap_parent", &image, Vec::new()).expect("spawn failed");
    let child = lifecycle::fork(parent).expect("fork failed");

    kernel_assert!(table::with(child, |p| p.state) != Some(ProcessState::Zombie));

    lifecycle::exit(child, 7);
    let zombie_state = table::with(child, |p| p.state);
    kernel_assert_eq!(zombie_state, Some(ProcessState::Zombie));

    let (reaped_pid, code) = lifecycle::try_reap(parent, None).expect("expected a zombie to reap");
    kernel_assert_eq!(reaped_pid, child);
    kernel_assert_eq!(code, 7);
    kernel_assert!(table::with(child, |_| ()).is_none());

    lifecycle::exit(parent, 0);
    let _ = table::remove(parent);
}
