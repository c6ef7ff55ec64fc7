//! CRT console

use std::io;
use std::time::{Duration, Instant};

use super::Console;

extern "C" {
    fn _kbhit() -> libc::c_int;
    fn _getch() -> libc::c_int;
}

const KEY_POLL: Duration = Duration::from_millis(10);

/// Console backed by the CRT keyboard functions
///
/// The CRT already delivers unbuffered, unechoed keys, so setup and cleanup
/// have nothing to do.
#[derive(Default)]
pub struct WindowsConsole;

impl WindowsConsole {
    /// Create the console
    pub fn new() -> Self {
        Self
    }
}

impl Console for WindowsConsole {
    fn setup(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read_unit(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            // SAFETY: CRT keyboard functions take no arguments
            while unsafe { _kbhit() } != 0 {
                let key = unsafe { _getch() };
                // function keys arrive as a prefix plus a scan code
                if key == 0x00 || key == 0xE0 {
                    unsafe { _getch() };
                    continue;
                }
                if key == b'\r' as libc::c_int {
                    return Ok(Some(b'\n'));
                }
                return Ok(Some(key as u8));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(KEY_POLL.min(deadline - now));
        }
    }

    fn cleanup(&mut self) -> io::Result<()> {
        Ok(())
    }
}
