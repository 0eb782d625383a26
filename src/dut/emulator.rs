//! Emulated target: QEMU supervised as a child process.
//!
//! ```text
//! Idle ──start──> ProcessStarted ──PTY line──> PtyDiscovered ──open──> ChannelOpen
//!                       │                            │                      │
//!                       └──boot timeout / exit───────┴──────stop────────────┴──> Stopped
//! ```
//!
//! The child process is held by [`EmulatorProcess`], whose `Drop` performs
//! the two-phase teardown (SIGTERM, bounded wait, SIGKILL, reap). Every exit
//! path out of `start`, including errors, therefore releases the process.

use super::locate::{launch_args, locate_emulator, locate_image};
use super::pty::{PtyScanner, ScanOutcome};
use super::{Dut, DutError, DutKind};
use crate::channel::{CommandChannel, DEFAULT_PROMPT};
use crate::port::{PortConfiguration, SyncSerialPort, DEFAULT_BAUD_RATE, DEFAULT_PORT_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Default time allowed for QEMU to announce its PTY.
pub const DEFAULT_BOOT_TIMEOUT: Duration = Duration::from_secs(5);

/// Delays applied while bringing the emulated target up and down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorTimings {
    /// Step between polls of the emulator output during PTY discovery.
    pub boot_poll_ms: u64,
    /// Wait for the PTY device node to become openable.
    pub pty_settle_ms: u64,
    /// Wait for the firmware to reach its shell.
    pub firmware_boot_ms: u64,
    /// Wait after opening the PTY.
    pub open_settle_ms: u64,
    /// Wait after discarding the boot banner.
    pub flush_settle_ms: u64,
    /// How long SIGTERM gets before SIGKILL.
    pub graceful_exit_ms: u64,
}

impl Default for EmulatorTimings {
    fn default() -> Self {
        Self {
            boot_poll_ms: 100,
            pty_settle_ms: 500,
            firmware_boot_ms: 2000,
            open_settle_ms: 500,
            flush_settle_ms: 1000,
            graceful_exit_ms: 2000,
        }
    }
}

impl EmulatorTimings {
    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }
}

/// Everything needed to find and boot the emulated target.
#[derive(Debug, Clone)]
pub struct EmulatorSettings {
    /// Explicit emulator binary; wins over the SDK lookup.
    pub emulator_path: Option<PathBuf>,
    /// Zephyr SDK root containing the emulator.
    pub sdk_path: Option<PathBuf>,
    /// Explicit firmware image.
    pub kernel_path: Option<PathBuf>,
    /// Base directory for relative images and the default build outputs.
    pub project_root: PathBuf,
    pub boot_timeout: Duration,
    pub prompt: String,
    pub timings: EmulatorTimings,
}

impl Default for EmulatorSettings {
    fn default() -> Self {
        Self {
            emulator_path: None,
            sdk_path: None,
            kernel_path: None,
            project_root: PathBuf::from("."),
            boot_timeout: DEFAULT_BOOT_TIMEOUT,
            prompt: DEFAULT_PROMPT.to_string(),
            timings: EmulatorTimings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulatorState {
    Idle,
    ProcessStarted,
    PtyDiscovered,
    ChannelOpen,
    Stopped,
}

/// Running emulator process plus its merged console output.
#[derive(Debug)]
struct EmulatorProcess {
    child: Child,
    output: PtyScanner<File>,
    graceful_exit: Duration,
    reaped: bool,
}

impl EmulatorProcess {
    #[cfg(unix)]
    fn spawn(binary: &Path, args: &[OsString], graceful_exit: Duration) -> Result<Self, DutError> {
        use super::pty::sys::output_pipe;
        use std::process::{Command, Stdio};

        let pipe = output_pipe().map_err(DutError::Output)?;
        let stderr = pipe.writer.try_clone().map_err(DutError::Output)?;

        let mut command = Command::new(binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(pipe.writer))
            .stderr(Stdio::from(stderr));

        let child = command.spawn().map_err(|source| DutError::Spawn {
            binary: binary.to_path_buf(),
            source,
        })?;
        // The command still owns our copies of the write end; drop them so
        // the read end sees EOF when the emulator exits.
        drop(command);

        info!(binary = %binary.display(), pid = child.id(), "emulator process started");
        Ok(Self {
            child,
            output: PtyScanner::new(pipe.reader),
            graceful_exit,
            reaped: false,
        })
    }

    #[cfg(not(unix))]
    fn spawn(_binary: &Path, _args: &[OsString], _graceful_exit: Duration) -> Result<Self, DutError> {
        Err(DutError::Unsupported)
    }

    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn exit_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Poll the console output until a PTY is announced or `timeout` passes.
    fn discover_pty(&mut self, timeout: Duration, step: Duration) -> Result<String, DutError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.output.poll().map_err(DutError::Output)? {
                ScanOutcome::Found(path) => return Ok(path),
                ScanOutcome::Closed => {
                    if let Some(status) = self.exit_status() {
                        return Err(DutError::EmulatorExited { status });
                    }
                }
                ScanOutcome::Pending => {}
            }
            if Instant::now() >= deadline {
                return Err(DutError::BootTimeout { timeout });
            }
            std::thread::sleep(step);
        }
    }

    /// Consume console output that arrived since the last call.
    fn drain_output(&mut self) {
        match self.output.drain() {
            Ok(0) => {}
            Ok(bytes) => trace!(bytes, "drained emulator output"),
            Err(e) => debug!(error = %e, "emulator output drain failed"),
        }
    }

    /// Ask the process to exit, then force it. Never fails.
    fn terminate(&mut self) {
        if self.reaped {
            return;
        }
        self.reaped = true;
        let pid = self.pid();

        if let Some(status) = self.exit_status() {
            debug!(pid, %status, "emulator already exited");
            return;
        }

        request_exit(&mut self.child);
        let deadline = Instant::now() + self.graceful_exit;
        while Instant::now() < deadline {
            if let Some(status) = self.exit_status() {
                debug!(pid, %status, "emulator exited");
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        warn!(pid, grace = ?self.graceful_exit, "emulator ignored SIGTERM, killing");
        // kill() only fails if the child is already gone; wait() reaps either way.
        if let Err(e) = self.child.kill() {
            debug!(pid, error = %e, "kill failed");
        }
        if let Err(e) = self.child.wait() {
            warn!(pid, error = %e, "failed to reap emulator");
        }
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    let Ok(pid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: `pid` belongs to a child we have not reaped yet, so it cannot
    // have been recycled for another process.
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    let _ = child.kill();
}

impl Drop for EmulatorProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// A sampler firmware image booted under QEMU, reached over a PTY.
#[derive(Debug)]
pub struct EmulatorDut {
    settings: EmulatorSettings,
    state: EmulatorState,
    process: Option<EmulatorProcess>,
    channel: Option<CommandChannel>,
    pty_path: Option<String>,
    last_pid: Option<u32>,
}

impl EmulatorDut {
    pub fn new(settings: EmulatorSettings) -> Self {
        Self {
            settings,
            state: EmulatorState::Idle,
            process: None,
            channel: None,
            pty_path: None,
            last_pid: None,
        }
    }

    pub fn settings(&self) -> &EmulatorSettings {
        &self.settings
    }

    pub fn state(&self) -> EmulatorState {
        self.state
    }

    /// PTY announced by the emulator, once discovered.
    pub fn pty_path(&self) -> Option<&str> {
        self.pty_path.as_deref()
    }

    /// PID of the most recently spawned emulator, kept after it is reaped.
    pub fn pid(&self) -> Option<u32> {
        self.last_pid
    }

    fn boot(&mut self) -> Result<(), DutError> {
        let binary = locate_emulator(
            self.settings.emulator_path.as_deref(),
            self.settings.sdk_path.as_deref(),
        )?;
        let image = locate_image(
            self.settings.kernel_path.as_deref(),
            &self.settings.project_root,
        )?;
        let timings = self.settings.timings;

        let process = self.process.insert(EmulatorProcess::spawn(
            &binary,
            &launch_args(&image),
            EmulatorTimings::ms(timings.graceful_exit_ms),
        )?);
        self.last_pid = Some(process.pid());
        self.state = EmulatorState::ProcessStarted;

        let pty = process.discover_pty(
            self.settings.boot_timeout,
            EmulatorTimings::ms(timings.boot_poll_ms),
        )?;
        info!(pty = %pty, image = %image.display(), "emulator PTY discovered");
        self.pty_path = Some(pty.clone());
        self.state = EmulatorState::PtyDiscovered;

        std::thread::sleep(EmulatorTimings::ms(timings.pty_settle_ms));
        std::thread::sleep(EmulatorTimings::ms(timings.firmware_boot_ms));

        let port = SyncSerialPort::open_boxed(
            &pty,
            PortConfiguration::with_baud(DEFAULT_BAUD_RATE).timeout(DEFAULT_PORT_TIMEOUT),
        )?;
        let mut channel = CommandChannel::with_prompt(port, &self.settings.prompt);
        std::thread::sleep(EmulatorTimings::ms(timings.open_settle_ms));
        channel.discard_input()?;
        std::thread::sleep(EmulatorTimings::ms(timings.flush_settle_ms));

        self.channel = Some(channel);
        self.state = EmulatorState::ChannelOpen;
        Ok(())
    }
}

impl Dut for EmulatorDut {
    fn kind(&self) -> DutKind {
        DutKind::Emulator
    }

    fn start(&mut self) -> Result<(), DutError> {
        if self.process.is_some() {
            return Err(DutError::AlreadyStarted);
        }
        self.pty_path = None;

        match self.boot() {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, state = ?self.state, "emulator start failed, tearing down");
                self.stop();
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        if let Some(channel) = self.channel.take() {
            drop(channel.into_inner());
            debug!(pty = ?self.pty_path, "emulator channel closed");
        }
        if let Some(mut process) = self.process.take() {
            process.terminate();
        }
        if self.state != EmulatorState::Idle {
            self.state = EmulatorState::Stopped;
        }
    }

    fn send_command(&mut self, command: &str, timeout: Duration) -> Result<String, DutError> {
        let channel = self.channel.as_mut().ok_or(DutError::NotConnected)?;
        if let Some(process) = self.process.as_mut() {
            process.drain_output();
        }
        Ok(channel.send_command(command, timeout)?)
    }

    fn is_connected(&self) -> bool {
        self.state == EmulatorState::ChannelOpen
    }
}

impl Drop for EmulatorDut {
    fn drop(&mut self) {
        self.stop();
    }
}
