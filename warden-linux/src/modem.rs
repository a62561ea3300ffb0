//! Modem session: owns the serial connection, runs the open/initialize
//! sequence, and surfaces caller-ID lines through a non-blocking poll.
//! Any I/O error drops the handle and moves the session to Degraded; the
//! run loop decides when to reopen.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serialport::SerialPort;

use crate::config::ModemSettings;

/// Hangup command issued on a block decision.
pub const HANGUP_COMMAND: &str = "ATH";

/// Read timeout on the port. Reads only happen when bytes are already
/// buffered, so this is a backstop, not a pacing mechanism.
const PORT_TIMEOUT: Duration = Duration::from_millis(500);

/// Settle time after the reset command before draining its response.
const INIT_SETTLE: Duration = Duration::from_millis(1000);

/// Settle time after each caller-ID enable command.
const COMMAND_SETTLE: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 512;

/// Session state. Ready degrades on any I/O error; Degraded only leaves via
/// a reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemState {
    Closed,
    Opening,
    Ready,
    Degraded,
}

impl ModemState {
    pub fn as_str(self) -> &'static str {
        match self {
            ModemState::Closed => "closed",
            ModemState::Opening => "opening",
            ModemState::Ready => "ready",
            ModemState::Degraded => "degraded",
        }
    }
}

/// One decoded modem output line and its arrival time.
#[derive(Debug, Clone)]
pub struct CallerIdLine {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl CallerIdLine {
    fn new(text: String) -> Self {
        Self {
            text,
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModemError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },
    #[error("modem I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("modem port is not open")]
    NotOpen,
}

/// Byte-level view of the modem port. `serialport`'s boxed port satisfies
/// it; tests substitute an in-memory double.
pub trait ModemPort: io::Read + io::Write + Send {
    /// Bytes readable right now without blocking.
    fn bytes_to_read(&self) -> io::Result<u32>;
}

impl ModemPort for Box<dyn SerialPort> {
    fn bytes_to_read(&self) -> io::Result<u32> {
        SerialPort::bytes_to_read(&**self).map_err(io::Error::from)
    }
}

/// Owns the serial connection to the modem. At most one handle is ever open:
/// degrading or reopening drops the previous one first.
pub struct ModemSession {
    settings: ModemSettings,
    port: Option<Box<dyn ModemPort>>,
    lines: LineBuffer,
    state: ModemState,
}

impl ModemSession {
    pub fn new(settings: ModemSettings) -> Self {
        Self {
            settings,
            port: None,
            lines: LineBuffer::default(),
            state: ModemState::Closed,
        }
    }

    /// Build a session around an already-open port. The caller owns any
    /// initialization the device needs.
    pub fn with_port(settings: ModemSettings, port: Box<dyn ModemPort>) -> Self {
        Self {
            settings,
            port: Some(port),
            lines: LineBuffer::default(),
            state: ModemState::Ready,
        }
    }

    pub fn state(&self) -> ModemState {
        self.state
    }

    /// Open the configured serial device and run the initialization
    /// sequence. Closes any previous handle first.
    pub async fn open(&mut self) -> Result<(), ModemError> {
        self.close();
        self.state = ModemState::Opening;
        let path = self.settings.device.clone();
        let port = serialport::new(path.clone(), self.settings.baud)
            .timeout(PORT_TIMEOUT)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()
            .map_err(|source| {
                self.state = ModemState::Degraded;
                ModemError::Open { path, source }
            })?;
        self.port = Some(Box::new(port));
        self.lines = LineBuffer::default();
        self.initialize().await
    }

    /// Reset the modem and enable caller ID. Each configured enable variant
    /// is sent in order; the dialect the modem actually speaks is unknown
    /// until a call arrives.
    pub(crate) async fn initialize(&mut self) -> Result<(), ModemError> {
        self.state = ModemState::Opening;
        let init = self.settings.init_command.clone();
        self.write_command(&init)?;
        tokio::time::sleep(INIT_SETTLE).await;
        let response = self.drain_response()?;
        tracing::debug!(command = %init, response = %response, "modem reset");

        for command in self.settings.caller_id_commands.clone() {
            self.write_command(&command)?;
            tokio::time::sleep(COMMAND_SETTLE).await;
            let response = self.drain_response()?;
            tracing::debug!(command = %command, response = %response, "caller-id enable");
        }

        // Discard init chatter so the first poll starts clean.
        self.lines = LineBuffer::default();
        self.state = ModemState::Ready;
        Ok(())
    }

    /// Non-blocking: returns one pending line, or None when nothing complete
    /// is buffered. Undecodable byte sequences are replaced, not fatal.
    pub fn poll(&mut self) -> Result<Option<CallerIdLine>, ModemError> {
        if let Some(text) = self.lines.next_line() {
            return Ok(Some(CallerIdLine::new(text)));
        }
        let Some(port) = self.port.as_mut() else {
            return Ok(None);
        };
        let available = match port.bytes_to_read() {
            Ok(n) => n as usize,
            Err(err) => return self.fail(err),
        };
        if available == 0 {
            return Ok(None);
        }
        let mut buf = [0u8; READ_CHUNK];
        let want = available.min(READ_CHUNK);
        let n = match port.read(&mut buf[..want]) {
            Ok(n) => n,
            Err(err) if is_transient(&err) => 0,
            Err(err) => return self.fail(err),
        };
        self.lines.extend(&buf[..n]);
        Ok(self.lines.next_line().map(CallerIdLine::new))
    }

    /// Write one AT command followed by a carriage return. Best-effort:
    /// failure degrades the session.
    pub fn write_command(&mut self, command: &str) -> Result<(), ModemError> {
        let Some(port) = self.port.as_mut() else {
            return Err(ModemError::NotOpen);
        };
        let result = port
            .write_all(command.as_bytes())
            .and_then(|()| port.write_all(b"\r"))
            .and_then(|()| port.flush());
        match result {
            Ok(()) => Ok(()),
            Err(err) => self.fail(err),
        }
    }

    /// Force the line on-hook.
    pub fn hang_up(&mut self) -> Result<(), ModemError> {
        self.write_command(HANGUP_COMMAND)
    }

    /// Release the port. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            let _ = port.flush();
        }
        self.lines = LineBuffer::default();
        self.state = ModemState::Closed;
    }

    /// Read whatever the modem has buffered, for command-response logging.
    fn drain_response(&mut self) -> Result<String, ModemError> {
        let mut out = Vec::new();
        loop {
            let Some(port) = self.port.as_mut() else {
                return Err(ModemError::NotOpen);
            };
            let available = match port.bytes_to_read() {
                Ok(n) => n as usize,
                Err(err) => return self.fail(err),
            };
            if available == 0 {
                break;
            }
            let mut buf = [0u8; READ_CHUNK];
            let want = available.min(READ_CHUNK);
            match port.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(err) if is_transient(&err) => break,
                Err(err) => return self.fail(err),
            }
        }
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    fn fail<T>(&mut self, err: io::Error) -> Result<T, ModemError> {
        if self.port.take().is_some() {
            tracing::warn!(error = %err, "modem port degraded, handle dropped");
        }
        self.state = ModemState::Degraded;
        Err(ModemError::Io(err))
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Assembles raw port bytes into trimmed, lossily-decoded lines.
#[derive(Default)]
struct LineBuffer {
    partial: Vec<u8>,
    ready: VecDeque<String>,
}

impl LineBuffer {
    fn extend(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if b == b'\n' {
                let text = String::from_utf8_lossy(&self.partial).trim().to_string();
                self.partial.clear();
                if !text.is_empty() {
                    self.ready.push_back(text);
                }
            } else {
                self.partial.push(b);
            }
        }
    }

    fn next_line(&mut self) -> Option<String> {
        self.ready.pop_front()
    }
}

#[cfg(test)]
pub(crate) mod testport {
    use super::ModemPort;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// In-memory modem double: `rx` holds what the modem "sends us", `tx`
    /// collects what the session writes to it.
    pub(crate) struct FakePort {
        pub(crate) rx: Arc<Mutex<VecDeque<u8>>>,
        pub(crate) tx: Arc<Mutex<Vec<u8>>>,
    }

    impl FakePort {
        pub(crate) fn new() -> Self {
            Self {
                rx: Arc::new(Mutex::new(VecDeque::new())),
                tx: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub(crate) fn feed(&self, bytes: &[u8]) {
            self.rx.lock().unwrap().extend(bytes.iter().copied());
        }
    }

    impl io::Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut rx = self.rx.lock().unwrap();
            let n = buf.len().min(rx.len());
            for slot in buf.iter_mut().take(n) {
                *slot = rx.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl io::Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.tx.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ModemPort for FakePort {
        fn bytes_to_read(&self) -> io::Result<u32> {
            Ok(self.rx.lock().unwrap().len() as u32)
        }
    }

    /// Port whose I/O always fails; drives the Degraded transition.
    pub(crate) struct BrokenPort;

    impl io::Read for BrokenPort {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "port gone"))
        }
    }

    impl io::Write for BrokenPort {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "port gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ModemPort for BrokenPort {
        fn bytes_to_read(&self) -> io::Result<u32> {
            Ok(1)
        }
    }
}
