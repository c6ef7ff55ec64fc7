//! Shared test doubles: a scripted serial transport, a scripted console and
//! a capturing output.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use instasend_core::console::Console;
use instasend_core::protocol::telegram::TELEGRAM_LEN;
use instasend_core::protocol::{Transport, ACK, INQ};
use instasend_core::session::Output;

#[derive(Debug, Default)]
struct MockState {
    /// Bytes the radio will send us
    inbound: VecDeque<u8>,
    /// One entry per `write` call
    writes: Vec<Vec<u8>>,
    /// Queue an ACK whenever INQ is written
    ack_on_inq: bool,
    /// Fail every telegram-sized write
    fail_telegram_write: bool,
    /// Fail every write
    fail_writes: bool,
    /// Fail reads with this kind once set
    read_error: Option<io::ErrorKind>,
    timeout: Duration,
    telegram_attempts: usize,
}

/// Scripted serial link recording the boundaries of every write
///
/// Clones share state, so a test can keep a handle while the session owns
/// the boxed transport.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().timeout = Duration::from_millis(10);
        mock
    }

    /// A radio that grants every INQ
    pub fn acking() -> Self {
        let mock = Self::new();
        mock.state.lock().unwrap().ack_on_inq = true;
        mock
    }

    pub fn push_inbound(&self, data: &[u8]) {
        self.state.lock().unwrap().inbound.extend(data);
    }

    pub fn fail_telegram_write(&self) {
        self.state.lock().unwrap().fail_telegram_write = true;
    }

    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    pub fn fail_reads(&self, kind: io::ErrorKind) {
        self.state.lock().unwrap().read_error = Some(kind);
    }

    /// Every write call seen so far, failed ones included
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    /// All written bytes, concatenated
    pub fn written(&self) -> Vec<u8> {
        self.writes().concat()
    }

    pub fn telegram_attempts(&self) -> usize {
        self.state.lock().unwrap().telegram_attempts
    }

    pub fn boxed(&self) -> Box<dyn Transport> {
        Box::new(self.clone())
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = Instant::now();
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if let Some(kind) = state.read_error {
                    return Err(io::Error::new(kind, "mock read failure"));
                }
                if let Some(byte) = state.inbound.pop_front() {
                    buf[0] = byte;
                    return Ok(1);
                }
                if start.elapsed() >= state.timeout {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "mock timeout"));
                }
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(buf.to_vec());
        if buf.len() == TELEGRAM_LEN {
            state.telegram_attempts += 1;
            if state.fail_telegram_write {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
            }
        }
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        if state.ack_on_inq && buf == [INQ] {
            state.inbound.push_back(ACK);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockTransport {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.state.lock().unwrap().timeout = timeout;
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let state = self.state.lock().unwrap();
        if let Some(kind) = state.read_error {
            return Err(io::Error::new(kind, "mock read failure"));
        }
        Ok(state.inbound.len() as u32)
    }
}

/// Console replaying a fixed key sequence
///
/// Once the keys run out it either idles (returns `None` until the timeout)
/// or reports end of input.
#[derive(Debug, Clone)]
pub struct ScriptedConsole {
    keys: Arc<Mutex<VecDeque<u8>>>,
    eof_when_empty: bool,
    key_delay: Duration,
    pub setups: Arc<AtomicUsize>,
    pub cleanups: Arc<AtomicUsize>,
}

impl ScriptedConsole {
    pub fn new(keys: &[u8]) -> Self {
        Self {
            keys: Arc::new(Mutex::new(keys.iter().copied().collect())),
            eof_when_empty: false,
            key_delay: Duration::ZERO,
            setups: Arc::new(AtomicUsize::new(0)),
            cleanups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn idle() -> Self {
        Self::new(&[])
    }

    pub fn with_eof(mut self) -> Self {
        self.eof_when_empty = true;
        self
    }

    pub fn with_key_delay(mut self, delay: Duration) -> Self {
        self.key_delay = delay;
        self
    }

    pub fn remaining(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    pub fn boxed(&self) -> Box<dyn Console> {
        Box::new(self.clone())
    }
}

impl Console for ScriptedConsole {
    fn setup(&mut self) -> io::Result<()> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_unit(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        let next = self.keys.lock().unwrap().pop_front();
        match next {
            Some(key) => {
                if !self.key_delay.is_zero() {
                    thread::sleep(self.key_delay);
                }
                Ok(Some(key))
            }
            None if self.eof_when_empty => Err(io::ErrorKind::UnexpectedEof.into()),
            None => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn cleanup(&mut self) -> io::Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Display output captured in memory
#[derive(Debug, Clone, Default)]
pub struct Capture {
    data: Arc<Mutex<Vec<u8>>>,
}

impl Capture {
    pub fn output(&self) -> Output {
        Arc::new(Mutex::new(Box::new(self.clone())))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data.lock().unwrap()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Route library logs through the test harness; `RUST_LOG=debug` shows them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
