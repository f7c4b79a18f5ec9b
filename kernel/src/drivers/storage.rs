//! ATA (PIO mode) block device driver.
//!
//! Exposes the block device contract the filesystem (`fs::blockfs`) is
//! written against: `ata_read_sectors`/`ata_write_sectors(drive, lba,
//! count, buf) -> bool`, always moving exactly one 512-byte sector per
//! call (the filesystem's block size equals the sector size, so there is
//! never a reason to batch). Two drives are recognized: 0 = primary
//! master, 1 = primary slave, both on the legacy 0x1F0 I/O range.

use alloc::string::String;
use spin::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    HardDisk,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct StorageInfo {
    pub model: String,
    pub serial: String,
    pub capacity: u64,
    pub sector_size: u32,
    pub storage_type: StorageType,
}

#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub reads: u64,
    pub writes: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub read_errors: u64,
    pub write_errors: u64,
}

const PRIMARY_BASE_PORT: u16 = 0x1F0;
const SECTOR_SIZE: u32 = 512;

pub struct AtaDriver {
    base_port: u16,
    is_master: bool,
    info: Mutex<StorageInfo>,
    stats: Mutex<StorageStats>,
}

impl AtaDriver {
    const fn new(base_port: u16, is_master: bool) -> Self {
        Self {
            base_port,
            is_master,
            info: Mutex::new(StorageInfo {
                model: String::new(),
                serial: String::new(),
                capacity: 0,
                sector_size: SECTOR_SIZE,
                storage_type: StorageType::Unknown,
            }),
            stats: Mutex::new(StorageStats {
                reads: 0,
                writes: 0,
                bytes_read: 0,
                bytes_written: 0,
                read_errors: 0,
                write_errors: 0,
            }),
        }
    }

    pub fn init(&self) -> bool {
        let drive_select = if self.is_master { 0xA0 } else { 0xB0 };
        self.write_register(6, drive_select);
        if self.wait_busy().is_err() {
            return false;
        }

        self.write_register(7, 0xEC); // IDENTIFY
        if self.wait_busy().is_err() {
            return false;
        }

        if self.read_register(7) == 0 {
            return false; // no device on this channel
        }

        let mut identify = [0u16; 256];
        for word in identify.iter_mut() {
            *word = self.read_data();
        }
        self.parse_identify_data(&identify);
        log::info!(
            "[ATA] drive {} ready: {} sectors",
            if self.is_master { 0 } else { 1 },
            self.info.lock().capacity / SECTOR_SIZE as u64
        );
        true
    }

    fn parse_identify_data(&self, data: &[u16; 256]) {
        let mut info = self.info.lock();
        info.model = ascii_words(&data[27..47]);
        info.serial = ascii_words(&data[10..20]);

        let capacity_28 = data[60] as u64 | ((data[61] as u64) << 16);
        info.capacity = capacity_28 * SECTOR_SIZE as u64;

        if data[83] & (1 << 10) != 0 {
            let capacity_48 = data[100] as u64
                | ((data[101] as u64) << 16)
                | ((data[102] as u64) << 32)
                | ((data[103] as u64) << 48);
            if capacity_48 > capacity_28 {
                info.capacity = capacity_48 * SECTOR_SIZE as u64;
            }
        }
        info.storage_type = StorageType::HardDisk;
    }

    fn read_register(&self, offset: u16) -> u8 {
        // SAFETY: offset is one of the seven defined ATA task-file
        // registers, all readable without side effects relevant here.
        unsafe { crate::arch::x86::inb(self.base_port + offset) }
    }

    fn write_register(&self, offset: u16, value: u8) {
        // SAFETY: offset is one of the seven defined ATA task-file
        // registers; writes follow the standard PIO command protocol.
        unsafe { crate::arch::x86::outb(self.base_port + offset, value) }
    }

    fn read_data(&self) -> u16 {
        // SAFETY: the data register (offset 0) is always safe to read
        // once a PIO data-transfer command has set DRQ.
        unsafe { crate::arch::x86::inw(self.base_port) }
    }

    fn write_data(&self, value: u16) {
        // SAFETY: see `read_data`.
        unsafe { crate::arch::x86::outw(self.base_port, value) }
    }

    fn wait_busy(&self) -> Result<(), ()> {
        for _ in 0..100_000 {
            if self.read_register(7) & 0x80 == 0 {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(())
    }

    fn wait_ready(&self) -> Result<(), ()> {
        for _ in 0..100_000 {
            let status = self.read_register(7);
            if status & 0x80 == 0 && status & 0x40 != 0 {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(())
    }

    fn select_lba(&self, lba: u32) -> Result<(), ()> {
        let drive_select = if self.is_master { 0xE0 } else { 0xF0 };
        self.write_register(6, drive_select | (((lba >> 24) & 0x0F) as u8));
        self.write_register(2, 1); // sector count: always one block
        self.write_register(3, lba as u8);
        self.write_register(4, (lba >> 8) as u8);
        self.write_register(5, (lba >> 16) as u8);
        self.wait_ready()
    }

    fn read_sector(&self, lba: u32, buf: &mut [u8; 512]) -> bool {
        if self.select_lba(lba).is_err() {
            self.stats.lock().read_errors += 1;
            return false;
        }
        self.write_register(7, 0x20); // READ SECTORS
        if self.wait_ready().is_err() {
            self.stats.lock().read_errors += 1;
            return false;
        }
        for i in 0..256 {
            let word = self.read_data();
            buf[i * 2] = word as u8;
            buf[i * 2 + 1] = (word >> 8) as u8;
        }
        let mut stats = self.stats.lock();
        stats.reads += 1;
        stats.bytes_read += 512;
        true
    }

    fn write_sector(&self, lba: u32, buf: &[u8; 512]) -> bool {
        if self.select_lba(lba).is_err() {
            self.stats.lock().write_errors += 1;
            return false;
        }
        self.write_register(7, 0x30); // WRITE SECTORS
        if self.wait_ready().is_err() {
            self.stats.lock().write_errors += 1;
            return false;
        }
        for i in 0..256 {
            let word = buf[i * 2] as u16 | ((buf[i * 2 + 1] as u16) << 8);
            self.write_data(word);
        }
        if self.wait_ready().is_err() {
            self.stats.lock().write_errors += 1;
            return false;
        }
        let mut stats = self.stats.lock();
        stats.writes += 1;
        stats.bytes_written += 512;
        true
    }

    fn flush(&self) -> bool {
        self.write_register(7, 0xE7); // FLUSH CACHE
        self.wait_ready().is_ok()
    }
}

fn ascii_words(words: &[u16]) -> String {
    let mut s = String::new();
    for &word in words {
        for byte in [(word >> 8) as u8, word as u8] {
            if byte != 0 {
                s.push(byte as char);
            }
        }
    }
    s.trim().into()
}

static DRIVE0: AtaDriver = AtaDriver::new(PRIMARY_BASE_PORT, true);
static DRIVE1: AtaDriver = AtaDriver::new(PRIMARY_BASE_PORT, false);

fn drive(index: u8) -> Option<&'static AtaDriver> {
    match index {
        0 => Some(&DRIVE0),
        1 => Some(&DRIVE1),
        _ => None,
    }
}

/// Probe both channels on the primary IDE bus.
pub fn init() {
    log::info!("[ATA] probing primary IDE bus");
    DRIVE0.init();
    DRIVE1.init();
    log::info!("[ATA] probe complete");
}

/// Read `count` consecutive 512-byte sectors starting at `lba` from
/// `drive` into `buf`. `buf` must be at least `count * 512` bytes.
/// Returns `false` on any device error or timeout. `count` is always 1
/// in this kernel's only caller (`fs::blockfs`), but the loop supports
/// more to match the external contract's shape.
pub fn ata_read_sectors(drive_index: u8, lba: u32, count: u32, buf: &mut [u8]) -> bool {
    let Some(dev) = drive(drive_index) else {
        return false;
    };
    if buf.len() < (count as usize) * 512 {
        return false;
    }
    for i in 0..count {
        let chunk: &mut [u8; 512] = match (&mut buf[(i as usize) * 512..(i as usize + 1) * 512])
            .try_into()
        {
            Ok(c) => c,
            Err(_) => return false,
        };
        if !dev.read_sector(lba + i, chunk) {
            return false;
        }
    }
    true
}

/// Write `count` consecutive 512-byte sectors starting at `lba` on
/// `drive` from `buf`. Returns `false` on any device error or timeout.
pub fn ata_write_sectors(drive_index: u8, lba: u32, count: u32, buf: &[u8]) -> bool {
    let Some(dev) = drive(drive_index) else {
        return false;
    };
    if buf.len() < (count as usize) * 512 {
        return false;
    }
    for i in 0..count {
        let chunk: &[u8; 512] = match (&buf[(i as usize) * 512..(i as usize + 1) * 512]).try_into()
        {
            Ok(c) => c,
            Err(_) => return false,
        };
        if !dev.write_sector(lba + i, chunk) {
            return false;
        }
    }
    true
}

/// Flush the write cache on `drive`.
pub fn ata_flush(drive_index: u8) -> bool {
    drive(drive_index).is_some_and(|d| d.flush())
}

pub fn get_stats(drive_index: u8) -> Option<StorageStats> {
    drive(drive_index).map(|d| d.stats.lock().clone())
}

pub fn get_info(drive_index: u8) -> Option<StorageInfo> {
    drive(drive_index).map(|d| d.info.lock().clone())
}
