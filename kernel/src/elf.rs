//! 32-bit ELF loader.
//!
//! Only statically linked `ET_EXEC`/`EM_386` binaries with `PT_LOAD`
//! segments are accepted — no dynamic linking, no interpreter, no
//! relocations. Segments are mapped page-granular into a freshly
//! created `AddressSpace`; bytes beyond `p_filesz` up to `p_memsz`
//! (BSS) are left zeroed by `map_alloc`.

use crate::error::KernelError;
use crate::mm::frame_allocator::FRAME_SIZE;
use crate::mm::page_table::PageFlags;
use crate::mm::AddressSpace;

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_386: u16 = 3;
const PT_LOAD: u32 = 1;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct Elf32Header {
    ident: [u8; 16],
    e_type: u16,
    machine: u16,
    version: u32,
    entry: u32,
    phoff: u32,
    shoff: u32,
    flags: u32,
    ehsize: u16,
    phentsize: u16,
    phnum: u16,
    shentsize: u16,
    shnum: u16,
    shstrndx: u16,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct Elf32ProgramHeader {
    p_type: u32,
    offset: u32,
    vaddr: u32,
    paddr: u32,
    filesz: u32,
    memsz: u32,
    flags: u32,
    align: u32,
}

const EHDR_SIZE: usize = core::mem::size_of::<Elf32Header>();
const PHDR_SIZE: usize = core::mem::size_of::<Elf32ProgramHeader>();

fn invalid(reason: &'static str) -> KernelError {
    KernelError::InvalidArgument { name: "elf", value: reason }
}

fn read_header(data: &[u8]) -> Result<Elf32Header, KernelError> {
    if data.len() < EHDR_SIZE {
        return Err(invalid("truncated header"));
    }
    // SAFETY: `data` is at least `EHDR_SIZE` bytes and `Elf32Header` is
    // `repr(C, packed)`, so any byte pattern is a valid bit-for-bit read.
    let header = unsafe { core::ptr::read_unaligned(data.as_ptr() as *const Elf32Header) };
    if header.ident[0..4] != ELF_MAGIC {
        return Err(invalid("bad magic"));
    }
    if header.ident[4] != ELFCLASS32 || header.ident[5] != ELFDATA2LSB {
        return Err(invalid("not 32-bit little-endian"));
    }
    if header.e_type != ET_EXEC {
        return Err(invalid("not ET_EXEC"));
    }
    if header.machine != EM_386 {
        return Err(invalid("not EM_386"));
    }
    Ok(header)
}

/// Load `data` as an ELF32 executable into `address_space`, returning
/// the entry point.
pub fn load(data: &[u8], address_space: &AddressSpace) -> Result<u32, KernelError> {
    let header = read_header(data)?;
    let phoff = header.phoff as usize;
    let phentsize = header.phentsize as usize;
    let phnum = header.phnum as usize;
    if phentsize < PHDR_SIZE {
        return Err(invalid("program header too small"));
    }

    for i in 0..phnum {
        let off = phoff + i * phentsize;
        if off + PHDR_SIZE > data.len() {
            return Err(invalid("program header out of bounds"));
        }
        // SAFETY: bounds checked above.
        let ph = unsafe { core::ptr::read_unaligned(data[off..].as_ptr() as *const Elf32ProgramHeader) };
        if ph.p_type != PT_LOAD || ph.memsz == 0 {
            continue;
        }
        load_segment(data, &ph, address_space)?;
    }

    Ok(header.entry)
}

fn load_segment(data: &[u8], ph: &Elf32ProgramHeader, address_space: &AddressSpace) -> Result<(), KernelError> {
    let file_start = ph.offset as usize;
    let file_end = file_start
        .checked_add(ph.filesz as usize)
        .ok_or_else(|| invalid("segment file range overflows"))?;
    if file_end > data.len() {
        return Err(invalid("segment extends past file"));
    }

    let vaddr_start = (ph.vaddr as usize) & !(FRAME_SIZE - 1);
    let vaddr_end = ((ph.vaddr as usize) + (ph.memsz as usize)).div_ceil(FRAME_SIZE) * FRAME_SIZE;

    let mut page_vaddr = vaddr_start;
    while page_vaddr < vaddr_end {
        let frame = address_space.map_alloc(page_vaddr, PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER)?;

        let seg_start = ph.vaddr as usize;
        let seg_file_end = seg_start + ph.filesz as usize;
        let page_end = page_vaddr + FRAME_SIZE;
        let copy_start = seg_start.max(page_vaddr);
        let copy_end = seg_file_end.min(page_end);
        if copy_end > copy_start {
            let file_off = file_start + (copy_start - seg_start);
            let page_off = copy_start - page_vaddr;
            let len = copy_end - copy_start;
            // SAFETY: physical memory is identity-mapped; `frame` was
            // just allocated by `map_alloc` and nothing else can alias
            // it yet.
            unsafe {
                let dst = (frame.as_phys_addr() as *mut u8).add(page_off);
                core::ptr::copy_nonoverlapping(data[file_off..file_off + len].as_ptr(), dst, len);
            }
        }
        page_vaddr += FRAME_SIZE;
    }
    Ok(())
}
