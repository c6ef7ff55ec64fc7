//! termios console

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use super::Console;

/// Raw-mode console on a terminal file descriptor
pub struct PosixConsole {
    fd: RawFd,
    saved: Option<libc::termios>,
}

impl PosixConsole {
    /// Console on standard input
    pub fn stdin() -> Self {
        Self {
            fd: libc::STDIN_FILENO,
            saved: None,
        }
    }
}

impl Console for PosixConsole {
    fn setup(&mut self) -> io::Result<()> {
        // SAFETY: isatty only inspects the descriptor
        if unsafe { libc::isatty(self.fd) } != 1 {
            tracing::debug!("stdin is not a terminal, leaving line discipline untouched");
            return Ok(());
        }

        // SAFETY: termios is plain data and is fully written by tcgetattr
        let mut old: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(self.fd, &mut old) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut raw = old;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ISIG);
        raw.c_cc[libc::VMIN] = 1;
        raw.c_cc[libc::VTIME] = 0;

        // SAFETY: raw is a valid termios derived from the current settings
        if unsafe { libc::tcsetattr(self.fd, libc::TCSANOW, &raw) } != 0 {
            return Err(io::Error::last_os_error());
        }
        self.saved = Some(old);
        Ok(())
    }

    fn read_unit(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;

        // SAFETY: pfd is a single valid pollfd
        let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(None);
            }
            return Err(err);
        }
        if ready == 0 {
            return Ok(None);
        }

        let mut byte = 0u8;
        // SAFETY: reading one byte into a stack variable
        let n = unsafe { libc::read(self.fd, (&mut byte as *mut u8).cast(), 1) };
        match n {
            1 => Ok(Some(byte)),
            0 => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "console input closed")),
            _ => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn cleanup(&mut self) -> io::Result<()> {
        if let Some(old) = self.saved.take() {
            // SAFETY: old was filled by tcgetattr in setup
            if unsafe { libc::tcsetattr(self.fd, libc::TCSAFLUSH, &old) } != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }
}
