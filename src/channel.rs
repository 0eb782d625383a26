//! Command/response channel over a firmware shell.
//!
//! One transaction is: discard unread input, write the command plus CRLF,
//! then poll the port until the shell prompt shows up in the accumulated
//! bytes or the deadline passes. A missed deadline is not an error; the
//! partial text is returned so the caller's assertion reports what the
//! target actually said.

use crate::port::{PortError, SerialPortAdapter};
use memchr::memmem;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Prompt printed by the Zephyr shell on the sampler's console UART.
pub const DEFAULT_PROMPT: &str = "uart:~$";

/// Line terminator appended to every command.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Sleep between polls while waiting for the prompt.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Timeout used by `send`-style helpers when the caller gives none.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// How a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The prompt marker was observed.
    Prompt,
    /// The deadline passed first; the text is whatever arrived.
    TimedOut,
}

/// Result of one command transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub command: String,
    pub response: String,
    pub completion: Completion,
    pub elapsed: Duration,
}

impl Transaction {
    pub fn saw_prompt(&self) -> bool {
        self.completion == Completion::Prompt
    }
}

/// Line-oriented channel to a firmware shell.
#[derive(Debug)]
pub struct CommandChannel<P: SerialPortAdapter = Box<dyn SerialPortAdapter>> {
    port: P,
    prompt: memmem::Finder<'static>,
    poll_interval: Duration,
}

impl<P: SerialPortAdapter> CommandChannel<P> {
    /// Wrap an already open port using the default prompt.
    pub fn new(port: P) -> Self {
        Self::with_prompt(port, DEFAULT_PROMPT)
    }

    /// Wrap an already open port with a custom prompt marker.
    pub fn with_prompt(port: P, prompt: &str) -> Self {
        Self {
            port,
            prompt: memmem::Finder::new(prompt.as_bytes()).into_owned(),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the poll interval; tests use this to keep runs short.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn port_name(&self) -> &str {
        self.port.name()
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Give the port back, e.g. to close it explicitly.
    pub fn into_inner(self) -> P {
        self.port
    }

    /// Drop whatever the target has sent since the last transaction.
    pub fn discard_input(&mut self) -> Result<(), PortError> {
        self.port.clear_input()
    }

    /// Send `command` and return the decoded response text.
    ///
    /// Errors only when the port itself fails; a missing prompt yields
    /// `Ok` with the partial response.
    pub fn send_command(&mut self, command: &str, timeout: Duration) -> Result<String, PortError> {
        self.transact(command, timeout).map(|t| t.response)
    }

    /// Like [`send_command`](Self::send_command) but reports how the
    /// transaction ended.
    pub fn transact(&mut self, command: &str, timeout: Duration) -> Result<Transaction, PortError> {
        self.port.clear_input()?;

        let mut line = Vec::with_capacity(command.len() + LINE_TERMINATOR.len());
        line.extend_from_slice(command.as_bytes());
        line.extend_from_slice(LINE_TERMINATOR);
        self.port.write_all_bytes(&line)?;
        debug!(port = self.port.name(), command, "sent command");

        let start = Instant::now();
        let mut response = Vec::new();
        let mut completion = Completion::TimedOut;

        while start.elapsed() < timeout {
            if self.drain_available(&mut response)? && self.prompt.find(&response).is_some() {
                completion = Completion::Prompt;
                break;
            }
            std::thread::sleep(self.poll_interval);
        }

        let elapsed = start.elapsed();
        if completion == Completion::TimedOut {
            warn!(
                port = self.port.name(),
                command,
                ?elapsed,
                received = response.len(),
                "prompt not seen before timeout, returning partial response"
            );
        }

        Ok(Transaction {
            command: command.to_string(),
            response: String::from_utf8_lossy(&response).into_owned(),
            completion,
            elapsed,
        })
    }

    /// Read everything currently available. Returns true if anything arrived.
    fn drain_available(&mut self, response: &mut Vec<u8>) -> Result<bool, PortError> {
        let available = self.port.bytes_to_read()?;
        if available == 0 {
            return Ok(false);
        }

        let mut buffer = vec![0u8; available];
        let mut filled = 0;
        while filled < available {
            match self.port.read_bytes(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.is_would_block() => break,
                Err(e) => return Err(e),
            }
        }
        response.extend_from_slice(&buffer[..filled]);
        Ok(filled > 0)
    }
}
