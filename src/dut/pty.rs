//! PTY discovery from the emulator's console output.
//!
//! QEMU announces the PTY it allocated for `-serial pty` with a line such as
//! `char device redirected to /dev/pts/7 (label serial0)`. The scanner reads
//! the merged stdout/stderr of the emulator without blocking and reports the
//! first device path it sees.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, Read};
use tracing::trace;

static PTY_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/dev/pts/\d+").expect("PTY path pattern is valid"));

/// Longest unterminated output kept while draining.
const MAX_PARTIAL_LINE: usize = 4096;

/// Extract a PTY device path from one line of emulator output.
pub fn find_pty_path(line: &str) -> Option<&str> {
    PTY_PATH.find(line).map(|m| m.as_str())
}

/// What one poll of the emulator output produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A PTY path was announced.
    Found(String),
    /// Nothing conclusive yet; the stream is still open.
    Pending,
    /// The stream hit end-of-file without announcing a PTY.
    Closed,
}

/// Incremental line scanner over a non-blocking reader.
#[derive(Debug)]
pub struct PtyScanner<R> {
    reader: R,
    partial: Vec<u8>,
    eof: bool,
}

impl<R: Read> PtyScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            partial: Vec::new(),
            eof: false,
        }
    }

    /// Read whatever is available and scan complete lines.
    ///
    /// `WouldBlock` from the reader means "nothing yet" and is not an error.
    pub fn poll(&mut self) -> io::Result<ScanOutcome> {
        let mut buf = [0u8; 1024];
        while !self.eof {
            match self.reader.read(&mut buf) {
                Ok(0) => self.eof = true,
                Ok(n) => {
                    self.partial.extend_from_slice(&buf[..n]);
                    if let Some(path) = self.scan_complete_lines() {
                        return Ok(ScanOutcome::Found(path));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ScanOutcome::Pending),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        // A final line without a newline still counts once the stream ends.
        let tail = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        Ok(match find_pty_path(&tail) {
            Some(path) => ScanOutcome::Found(path.to_string()),
            None => ScanOutcome::Closed,
        })
    }

    /// Read and discard whatever is available, tracing complete lines.
    ///
    /// Keeps the pipe from filling once discovery is over; a child blocked
    /// on a full pipe stops running. Returns the number of bytes consumed.
    pub fn drain(&mut self) -> io::Result<usize> {
        let mut buf = [0u8; 4096];
        let mut total = 0;
        while !self.eof {
            match self.reader.read(&mut buf) {
                Ok(0) => self.eof = true,
                Ok(n) => {
                    total += n;
                    self.partial.extend_from_slice(&buf[..n]);
                    self.trace_complete_lines();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    fn trace_complete_lines(&mut self) {
        while let Some(pos) = memchr::memchr(b'\n', &self.partial) {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            trace!(line = %String::from_utf8_lossy(&line).trim_end(), "emulator output");
        }
        if self.partial.len() > MAX_PARTIAL_LINE {
            self.partial.clear();
        }
    }

    fn scan_complete_lines(&mut self) -> Option<String> {
        while let Some(pos) = memchr::memchr(b'\n', &self.partial) {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            trace!(line = %line.trim_end(), "emulator output");
            if let Some(path) = find_pty_path(&line) {
                return Some(path.to_string());
            }
        }
        None
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(unix)]
pub(crate) mod sys {
    //! Merged, non-blocking output pipe for the emulator process.

    use std::fs::File;
    use std::io;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    /// A pipe whose write end is handed to the child as both stdout and
    /// stderr and whose read end never blocks.
    pub struct OutputPipe {
        pub reader: File,
        pub writer: OwnedFd,
    }

    pub fn output_pipe() -> io::Result<OutputPipe> {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` is a valid two-element array for pipe(2) to fill.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe(2) succeeded, so both descriptors are open and owned
        // by nothing else.
        let (reader, writer) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        set_cloexec(&reader)?;
        set_cloexec(&writer)?;
        set_nonblocking(&reader)?;

        Ok(OutputPipe {
            reader: File::from(reader),
            writer,
        })
    }

    fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
        let raw = fd.as_raw_fd();
        // SAFETY: `raw` is an open descriptor borrowed from `fd`.
        let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: as above.
        if unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn set_cloexec(fd: &OwnedFd) -> io::Result<()> {
        let raw = fd.as_raw_fd();
        // SAFETY: `raw` is an open descriptor borrowed from `fd`.
        if unsafe { libc::fcntl(raw, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
