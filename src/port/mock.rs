//! Mock serial port implementation for testing.
//!
//! `MockSerialPort` stands in for a firmware shell: tests register replies
//! keyed on the line written to the port, so a reply only appears after the
//! command channel has discarded stale input and sent its command, the same
//! ordering a real target produces.

use super::error::PortError;
use super::traits::SerialPortAdapter;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A reply the mock emits when a write containing `trigger` arrives.
#[derive(Debug, Clone)]
struct ReplyRule {
    trigger: Vec<u8>,
    reply: Vec<u8>,
    /// Rules registered with `reply_once` are consumed on first match.
    once: bool,
}

#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes waiting to be read.
    read_queue: VecDeque<u8>,
    /// Every write, in order.
    write_log: Vec<Vec<u8>>,
    rules: Vec<ReplyRule>,
    /// Bytes handed out per `read_bytes` call; 0 means unlimited.
    chunk_size: usize,
    clear_count: usize,
    fail_writes: bool,
    fail_clear: bool,
}

/// Mock serial port implementation for testing.
///
/// Clones share state, so a test can keep one handle for inspection while
/// the connector under test owns another.
///
/// # Example
/// ```
/// use adc_hil::port::{MockSerialPort, SerialPortAdapter};
///
/// let port = MockSerialPort::new("MOCK0");
/// port.reply_to("adcset", b"Set ch[0] = 100 mV\r\nuart:~$ ");
///
/// let mut dut_side = port.clone();
/// dut_side.write_bytes(b"adcset 0 100\r\n").unwrap();
/// assert_eq!(port.available_bytes(), 28);
/// assert_eq!(port.written_lines(), vec!["adcset 0 100".to_string()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState::default())),
        }
    }

    /// Append bytes to the receive queue right away.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Emit `reply` every time a write containing `trigger` is seen.
    pub fn reply_to(&self, trigger: impl AsRef<[u8]>, reply: &[u8]) {
        self.state.lock().rules.push(ReplyRule {
            trigger: trigger.as_ref().to_vec(),
            reply: reply.to_vec(),
            once: false,
        });
    }

    /// Emit `reply` for the first write containing `trigger` only.
    pub fn reply_once(&self, trigger: impl AsRef<[u8]>, reply: &[u8]) {
        self.state.lock().rules.push(ReplyRule {
            trigger: trigger.as_ref().to_vec(),
            reply: reply.to_vec(),
            once: true,
        });
    }

    /// Limit how many bytes a single read returns, to exercise reassembly.
    pub fn set_chunk_size(&self, chunk_size: usize) {
        self.state.lock().chunk_size = chunk_size;
    }

    /// Make every subsequent write fail as if the cable had been pulled.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Make `clear_input` fail.
    pub fn set_fail_clear(&self, fail: bool) {
        self.state.lock().fail_clear = fail;
    }

    /// Raw copy of every write.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Writes decoded as text with the line terminator stripped.
    pub fn written_lines(&self) -> Vec<String> {
        self.state
            .lock()
            .write_log
            .iter()
            .map(|w| {
                String::from_utf8_lossy(w)
                    .trim_end_matches(['\r', '\n'])
                    .to_string()
            })
            .collect()
    }

    /// How many times the receive queue was discarded.
    pub fn clear_count(&self) -> usize {
        self.state.lock().clear_count
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();

        if state.fail_writes {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock port disconnected",
            )));
        }

        state.write_log.push(data.to_vec());

        let matched = state.rules.iter().position(|rule| {
            memchr::memmem::find(data, &rule.trigger).is_some()
        });
        if let Some(idx) = matched {
            let rule = if state.rules[idx].once {
                state.rules.remove(idx)
            } else {
                state.rules[idx].clone()
            };
            state.read_queue.extend(rule.reply);
        }

        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();

        let limit = match state.chunk_size {
            0 => buffer.len(),
            n => n.min(buffer.len()),
        };

        let mut bytes_read = 0;
        for byte in buffer.iter_mut().take(limit) {
            match state.read_queue.pop_front() {
                Some(b) => {
                    *byte = b;
                    bytes_read += 1;
                }
                None => break,
            }
        }

        if bytes_read == 0 {
            Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "No data available",
            )))
        } else {
            Ok(bytes_read)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn clear_input(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if state.fail_clear {
            return Err(PortError::config("mock clear failure"));
        }
        state.read_queue.clear();
        state.clear_count += 1;
        Ok(())
    }

    fn bytes_to_read(&self) -> Result<usize, PortError> {
        let state = self.state.lock();
        Ok(match state.chunk_size {
            0 => state.read_queue.len(),
            n => state.read_queue.len().min(n),
        })
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}
