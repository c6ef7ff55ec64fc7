//! Local console input
//!
//! The keyboard loop reads single input units from a [`Console`]. The
//! platform variant is picked once by [`platform_console`]; the terminal is
//! switched into raw mode by [`ConsoleGuard`] and restored when the guard is
//! dropped, whichever way the session ends.

use std::io;
use std::time::Duration;

#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use posix::PosixConsole;
#[cfg(windows)]
pub use windows::WindowsConsole;

/// Source of single-key input
pub trait Console: Send {
    /// Prepare the terminal (raw mode, no local echo)
    fn setup(&mut self) -> io::Result<()>;

    /// Read one input unit, waiting at most `timeout`
    ///
    /// Returns `Ok(None)` when no key arrived in time.
    fn read_unit(&mut self, timeout: Duration) -> io::Result<Option<u8>>;

    /// Restore the terminal to the state found by `setup`
    fn cleanup(&mut self) -> io::Result<()>;
}

/// Console implementation family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleKind {
    /// termios raw mode on stdin
    Posix,
    /// CRT keyboard functions
    Windows,
}

impl ConsoleKind {
    /// The family for the platform this binary was built for
    pub fn current() -> Self {
        if cfg!(windows) {
            ConsoleKind::Windows
        } else {
            ConsoleKind::Posix
        }
    }
}

/// Create the console for `kind`
pub fn create_console(kind: ConsoleKind) -> io::Result<Box<dyn Console>> {
    match kind {
        #[cfg(unix)]
        ConsoleKind::Posix => Ok(Box::new(PosixConsole::stdin())),
        #[cfg(windows)]
        ConsoleKind::Windows => Ok(Box::new(WindowsConsole::new())),
        #[allow(unreachable_patterns)]
        other => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{:?} console is not available on this platform", other),
        )),
    }
}

/// Create the console for the current platform
pub fn platform_console() -> io::Result<Box<dyn Console>> {
    create_console(ConsoleKind::current())
}

/// Scoped console acquisition: `setup` on creation, `cleanup` on drop
pub struct ConsoleGuard {
    console: Box<dyn Console>,
}

impl ConsoleGuard {
    /// Set up `console`; it is cleaned up when the guard drops
    pub fn acquire(mut console: Box<dyn Console>) -> io::Result<Self> {
        console.setup()?;
        Ok(Self { console })
    }

    /// Read one input unit, waiting at most `timeout`
    pub fn read_unit(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        self.console.read_unit(timeout)
    }
}

impl Drop for ConsoleGuard {
    fn drop(&mut self) {
        if let Err(e) = self.console.cleanup() {
            tracing::warn!("failed to restore console: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        setups: Arc<AtomicUsize>,
        cleanups: Arc<AtomicUsize>,
    }

    impl Console for Counting {
        fn setup(&mut self) -> io::Result<()> {
            self.setups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn read_unit(&mut self, _timeout: Duration) -> io::Result<Option<u8>> {
            Ok(None)
        }

        fn cleanup(&mut self) -> io::Result<()> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let setups = Arc::new(AtomicUsize::new(0));
        let cleanups = Arc::new(AtomicUsize::new(0));
        {
            let mut guard = ConsoleGuard::acquire(Box::new(Counting {
                setups: setups.clone(),
                cleanups: cleanups.clone(),
            }))
            .unwrap();
            assert_eq!(guard.read_unit(Duration::from_millis(1)).unwrap(), None);
            assert_eq!(setups.load(Ordering::SeqCst), 1);
            assert_eq!(cleanups.load(Ordering::SeqCst), 0);
        }
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_current_kind_matches_platform() {
        let kind = ConsoleKind::current();
        if cfg!(windows) {
            assert_eq!(kind, ConsoleKind::Windows);
        } else {
            assert_eq!(kind, ConsoleKind::Posix);
        }
        assert!(create_console(kind).is_ok());
    }
}
