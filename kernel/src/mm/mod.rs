//! Memory management: physical frame allocator (component A), the
//! copy-on-write page-directory service (component B), and kernel heap
//! bring-up.

pub mod frame_allocator;
pub mod heap;
pub mod kernel_stack;
pub mod page_directory;
pub mod page_table;

pub use frame_allocator::{FrameNumber, FRAME_ALLOCATOR, FRAME_SIZE};
pub use page_directory::{
    AddressSpace, KERNEL_PHYS_WINDOW_END, USER_SPACE_END, USER_SPACE_START, USER_STACK_SIZE, USER_STACK_TOP,
};
pub use page_table::PageFlags;

static KERNEL_ADDRESS_SPACE: spin::Once<AddressSpace> = spin::Once::new();

/// The template address space every process's page directory copies its
/// kernel-half entries from. Populated once by [`init`].
pub fn kernel_address_space() -> &'static AddressSpace {
    KERNEL_ADDRESS_SPACE
        .get()
        .expect("kernel_address_space() called before mm::init()")
}

/// Bring up the frame allocator from the Multiboot2 memory map, then the
/// kernel heap. Called once from `kernel_main_impl` after `arch::init`.
pub fn init(multiboot_info_addr: usize) {
    log::info!("[mm] initializing memory management");

    // SAFETY: `multiboot_info_addr` is the physical address the
    // bootloader handed the kernel in EBX, still valid and unmodified
    // since boot.
    let boot_info = unsafe {
        multiboot2::BootInformation::load(multiboot_info_addr as *const multiboot2::BootInformationHeader)
    };

    match boot_info {
        Ok(info) => {
            if let Some(mmap) = info.memory_map_tag() {
                for area in mmap.memory_areas() {
                    if area.typ() == multiboot2::MemoryAreaType::Available {
                        let start = FrameNumber::from_phys_addr(area.start_address() as usize);
                        let count = (area.size() as usize) / FRAME_SIZE;
                        FRAME_ALLOCATOR.add_region(start, count);
                    }
                }
            }
        }
        Err(e) => {
            log::warn!("[mm] failed to parse Multiboot2 info: {:?}; assuming 16MB RAM", e);
            FRAME_ALLOCATOR.add_region(FrameNumber::new(0), (16 * 1024 * 1024) / FRAME_SIZE);
        }
    }

    // Reserve everything below and including the static kernel heap
    // region (the first megabyte of legacy BIOS/VGA memory, the kernel
    // image, and the heap's backing frames).
    let reserved_end = crate::arch::x86::HEAP_START + heap::HEAP_SIZE;
    FRAME_ALLOCATOR.reserve_region(FrameNumber::new(0), reserved_end / FRAME_SIZE);

    // SAFETY: called exactly once, here, before any `alloc::*` usage.
    unsafe {
        heap::init(crate::arch::x86::HEAP_START);
    }

    kernel_stack::init();

    // Build the template every process's page directory copies its
    // kernel half from, identity-mapping every frame the allocator
    // could ever hand out. Built and populated before paging is turned
    // on, so these are plain physical-address writes; `enable_paging`
    // below is the only place CR0.PG is ever set.
    let kernel_as = AddressSpace::create(None).expect("failed to create kernel address space");
    let mut vaddr = 0;
    while vaddr < KERNEL_PHYS_WINDOW_END {
        let frame = FrameNumber::from_phys_addr(vaddr);
        kernel_as
            .map(vaddr, frame, PageFlags::PRESENT | PageFlags::WRITABLE)
            .expect("identity-map kernel physical window");
        vaddr += FRAME_SIZE;
    }
    let kernel_as_phys = kernel_as.phys_addr();
    KERNEL_ADDRESS_SPACE.call_once(|| kernel_as);

    // SAFETY: every frame this kernel will ever touch before or after
    // this point -- its own image, the heap, and every frame the
    // allocator can hand out -- is identity-mapped in the page
    // directory just built above.
    unsafe {
        crate::arch::x86::enable_paging(kernel_as_phys);
    }

    log::info!("[mm] memory management initialized, paging enabled");
}
