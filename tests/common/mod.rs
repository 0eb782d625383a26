//! Shared fixtures for the integration tests.
//!
//! - [`FakeFirmware`]: a sampler shell served on the master side of a real
//!   PTY pair, so the crate talks to `/dev/pts/N` exactly as it would to
//!   QEMU's console
//! - [`FakeEmulator`]: a shell script standing in for `qemu-system-i386`,
//!   plus a dummy firmware image for it to "boot"
//! - small helpers for process and config assertions

#![allow(dead_code)]
#![cfg(unix)]

use adc_hil::dut::{EmulatorSettings, EmulatorTimings};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ffi::CStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Shell prompt printed by the fake firmware.
pub const PROMPT: &str = "uart:~$ ";

/// Text printed once, before any client connects.
pub const BOOT_BANNER: &str = "*** Booting Zephyr OS build v4.2.0 ***\r\nADC sampler ready\r\n";

/// Channels listed in the fake register dump.
pub const FIRMWARE_CHANNELS: u8 = 16;

/// Sampling period of the fake firmware.
pub const SAMPLE_PERIOD: Duration = Duration::from_millis(100);

// ========== PTY pair ==========

/// Both ends of a freshly allocated pseudo-terminal.
pub struct PtyPair {
    pub master: File,
    /// Held open so the master never sees a hangup between clients.
    pub slave: File,
    pub path: String,
}

/// Allocate a PTY pair with the slave in raw mode and the master non-blocking.
pub fn open_pty_pair() -> io::Result<PtyPair> {
    // SAFETY: plain libc calls on a descriptor we own; every return value is
    // checked before the descriptor is used further.
    unsafe {
        let fd = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let master = OwnedFd::from_raw_fd(fd);

        if libc::grantpt(fd) != 0 || libc::unlockpt(fd) != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut name = [0 as libc::c_char; 128];
        if libc::ptsname_r(fd, name.as_mut_ptr(), name.len()) != 0 {
            return Err(io::Error::last_os_error());
        }
        let path = CStr::from_ptr(name.as_ptr()).to_string_lossy().into_owned();

        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) != 0 {
            return Err(io::Error::last_os_error());
        }

        let slave = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&path)?;

        let mut termios = std::mem::zeroed::<libc::termios>();
        if libc::tcgetattr(slave.as_raw_fd(), &mut termios) != 0 {
            return Err(io::Error::last_os_error());
        }
        libc::cfmakeraw(&mut termios);
        if libc::tcsetattr(slave.as_raw_fd(), libc::TCSANOW, &termios) != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(PtyPair {
            master: File::from(master),
            slave,
            path,
        })
    }
}

// ========== Fake firmware ==========

/// Observable state of the fake shell.
#[derive(Debug)]
pub struct FirmwareState {
    booted_at: Instant,
    /// Injected millivolts per channel.
    pub channels: BTreeMap<u8, i32>,
    /// Every command line received, in order.
    pub received: Vec<String>,
    /// When set, commands are echoed but no output or prompt follows.
    pub silent: bool,
    /// Added to every channel in the register dump, like an uncalibrated ADC.
    pub offset_mv: i32,
}

impl FirmwareState {
    fn new() -> Self {
        Self {
            booted_at: Instant::now(),
            channels: BTreeMap::new(),
            received: Vec::new(),
            silent: false,
            offset_mv: 0,
        }
    }

    /// Full reply to one command line, echo and prompt included.
    pub fn respond(&mut self, line: &str) -> String {
        self.received.push(line.to_string());
        let mut out = format!("{line}\r\n");
        if self.silent {
            return out;
        }

        let mut words = line.split_whitespace();
        match words.next() {
            None => {}
            Some("adcset") => {
                let ch = words.next().and_then(|w| w.parse::<u8>().ok());
                let mv = words.next().and_then(|w| w.parse::<i32>().ok());
                match (ch, mv) {
                    (Some(ch), Some(mv)) if ch < FIRMWARE_CHANNELS => {
                        self.channels.insert(ch, mv);
                        out.push_str(&format!("Set ch[{ch}] = {mv} mV\r\n"));
                    }
                    _ => out.push_str("adcset: invalid argument\r\n"),
                }
            }
            Some("adcregs") => {
                let uptime = self.booted_at.elapsed();
                let seq = uptime.as_millis() / SAMPLE_PERIOD.as_millis();
                out.push_str("ADC Register File:\r\n");
                out.push_str(&format!("  seq:       {seq}\r\n"));
                out.push_str(&format!("  timestamp: {} ms\r\n", seq * SAMPLE_PERIOD.as_millis()));
                out.push_str("  channels:\r\n");
                for ch in 0..FIRMWARE_CHANNELS {
                    let mv = self.channels.get(&ch).copied().unwrap_or(0) + self.offset_mv;
                    out.push_str(&format!("    ch[{ch}]: {mv} mV\r\n"));
                }
            }
            Some(other) => out.push_str(&format!("{other}: command not found\r\n")),
        }

        out.push_str(PROMPT);
        out
    }
}

/// A sampler shell answering on a PTY from a background thread.
pub struct FakeFirmware {
    path: String,
    state: Arc<Mutex<FirmwareState>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    _slave: File,
}

impl FakeFirmware {
    /// Allocate a PTY, print the boot banner into it and start answering.
    pub fn spawn() -> Self {
        let PtyPair {
            mut master,
            slave,
            path,
        } = open_pty_pair().expect("allocate PTY pair");

        master
            .write_all(format!("{BOOT_BANNER}{PROMPT}").as_bytes())
            .expect("write boot banner");

        let state = Arc::new(Mutex::new(FirmwareState::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let worker = {
            let state = Arc::clone(&state);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || serve(master, state, stop))
        };

        Self {
            path,
            state,
            stop,
            worker: Some(worker),
            _slave: slave,
        }
    }

    /// `/dev/pts/N` for the client side.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn received(&self) -> Vec<String> {
        self.state.lock().received.clone()
    }

    pub fn channel_mv(&self, channel: u8) -> Option<i32> {
        self.state.lock().channels.get(&channel).copied()
    }

    pub fn set_offset(&self, offset_mv: i32) {
        self.state.lock().offset_mv = offset_mv;
    }

    /// Stop printing output and prompts; echoes still appear.
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }
}

impl Drop for FakeFirmware {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn serve(mut master: File, state: Arc<Mutex<FirmwareState>>, stop: Arc<AtomicBool>) {
    let mut line = Vec::new();
    let mut buf = [0u8; 256];

    while !stop.load(Ordering::SeqCst) {
        let n = match master.read(&mut buf) {
            Ok(n) => n,
            // WouldBlock: nothing yet. EIO: no client has the slave open.
            Err(_) => {
                std::thread::sleep(Duration::from_millis(2));
                continue;
            }
        };

        for &byte in &buf[..n] {
            match byte {
                b'\r' => {}
                b'\n' => {
                    let text = String::from_utf8_lossy(&line).into_owned();
                    line.clear();
                    let reply = state.lock().respond(&text);
                    write_reply(&mut master, reply.as_bytes());
                }
                other => line.push(other),
            }
        }
    }
}

fn write_reply(master: &mut File, mut data: &[u8]) {
    while !data.is_empty() {
        match master.write(data) {
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(1))
            }
            Err(_) => return,
        }
    }
}

// ========== Fake emulator ==========

/// An executable script in place of QEMU, with a dummy image beside it.
pub struct FakeEmulator {
    dir: TempDir,
    pub binary: PathBuf,
    pub image: PathBuf,
}

impl FakeEmulator {
    /// Write `body` as a `/bin/sh` script.
    pub fn from_script(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let binary = dir.path().join("qemu-system-i386");
        let image = dir.path().join("zephyr.elf");

        fs::write(&binary, format!("#!/bin/sh\n{body}\n")).expect("write emulator script");
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755))
            .expect("make emulator script executable");
        fs::write(&image, b"\x7fELF").expect("write image");

        Self { dir, binary, image }
    }

    /// Announces `pty` the way QEMU does, then runs until signalled.
    pub fn announcing(pty: &str) -> Self {
        Self::from_script(&format!(
            "echo \"QEMU emulator version 8.2.0\"\n\
             echo \"char device redirected to {pty} (label serial0)\" >&2\n\
             exec sleep 30"
        ))
    }

    /// Never announces a PTY.
    pub fn silent() -> Self {
        Self::from_script("exec sleep 30")
    }

    /// Fails before allocating a PTY.
    pub fn crashing(code: i32) -> Self {
        Self::from_script(&format!(
            "echo \"qemu-system-i386: could not load kernel\" >&2\nexit {code}"
        ))
    }

    /// Announces `pty` and ignores SIGTERM.
    pub fn stubborn(pty: &str) -> Self {
        Self::from_script(&format!(
            "trap '' TERM\n\
             echo \"char device redirected to {pty} (label serial0)\"\n\
             while true; do sleep 1; done"
        ))
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Settings that boot this script with no settle delays.
    pub fn settings(&self) -> EmulatorSettings {
        EmulatorSettings {
            emulator_path: Some(self.binary.clone()),
            kernel_path: Some(self.image.clone()),
            project_root: self.dir.path().to_path_buf(),
            boot_timeout: Duration::from_secs(3),
            timings: fast_timings(),
            ..EmulatorSettings::default()
        }
    }
}

/// Emulator timings with every settle delay removed.
pub fn fast_timings() -> EmulatorTimings {
    EmulatorTimings {
        boot_poll_ms: 10,
        pty_settle_ms: 0,
        firmware_boot_ms: 0,
        open_settle_ms: 0,
        flush_settle_ms: 0,
        graceful_exit_ms: 500,
    }
}

// ========== Assertions ==========

/// True once no process with `pid` exists (it was reaped, not just killed).
pub fn process_gone(pid: u32) -> bool {
    let pid = libc::pid_t::try_from(pid).expect("pid fits pid_t");
    // SAFETY: signal 0 only probes for existence.
    unsafe { libc::kill(pid, 0) == -1 }
}

/// Config text for a physical DUT on `port` driven through the shell.
pub fn physical_config_toml(port: &str) -> String {
    format!(
        r#"
num_channels = 15

[dut]
type = "physical"
port = "{port}"
baud_rate = 115200

[dut.timings]
open_settle_ms = 0
flush_settle_ms = 0

[instrument]
type = "virtual"
"#
    )
}

/// Config text for an emulated DUT booted from `emulator`.
pub fn emulator_config_toml(emulator: &FakeEmulator) -> String {
    format!(
        r#"
[dut]
type = "qemu"
emulator_path = "{}"
kernel_path = "{}"
project_root = "{}"
boot_timeout_ms = 3000

[dut.timings]
boot_poll_ms = 10
pty_settle_ms = 0
firmware_boot_ms = 0
open_settle_ms = 0
flush_settle_ms = 0
graceful_exit_ms = 500
"#,
        emulator.binary.display(),
        emulator.image.display(),
        emulator.dir().display(),
    )
}
