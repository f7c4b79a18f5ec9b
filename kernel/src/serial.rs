// Serial (COM1, 0x3F8) output used for logging and the test harness.

use core::fmt;

/// Serial print macros, always available (boot-time logging before the
/// VGA console is up, and the test harness' pass/fail reporting).
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_serial_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => {
        $crate::serial_print!("{}\n", format_args!($($arg)*))
    };
}

#[doc(hidden)]
pub fn _serial_print(args: fmt::Arguments) {
    use core::fmt::Write;
    use uart_16550::SerialPort;

    crate::arch::x86::without_interrupts(|| {
        // SAFETY: 0x3F8 is the standard COM1 base port, present (as a
        // no-op UART) on every PC-compatible target including QEMU.
        let mut port = unsafe { SerialPort::new(0x3F8) };
        port.init();
        port.write_fmt(args).unwrap();
    });
}

struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        serial_println!("[{:<5}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Route the `log` crate's macros to the serial port. Called once at
/// the very start of boot, before anything else logs.
pub fn init() {
    // Only fails if a logger was already installed, which never
    // happens -- this runs exactly once.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Info);
}
