//! Finding the emulator binary and the firmware image, and the fixed QEMU
//! command line used to boot it.

use super::DutError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// SDK directory assumed when neither the configuration nor the environment
/// names one, relative to the user's home directory.
pub const DEFAULT_SDK_DIR_NAME: &str = "zephyr-sdk-0.17.4";

/// Location of the x86 system emulator inside a Zephyr SDK.
pub const SDK_QEMU_RELATIVE: &str = "sysroots/x86_64-pokysdk-linux/usr/bin/qemu-system-i386";

/// Image locations tried when no explicit path is configured, in order.
pub const DEFAULT_IMAGE_CANDIDATES: [&str; 2] =
    ["build-qemu/zephyr/zephyr.elf", "build/zephyr/zephyr.elf"];

/// `~/zephyr-sdk-0.17.4`, if a home directory can be determined.
pub fn default_sdk_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(DEFAULT_SDK_DIR_NAME))
}

/// Resolve the emulator binary.
///
/// An explicit binary wins outright; otherwise the binary is looked up
/// inside the configured SDK, falling back to the default SDK location.
pub fn locate_emulator(explicit: Option<&Path>, sdk: Option<&Path>) -> Result<PathBuf, DutError> {
    let candidate = match (explicit, sdk) {
        (Some(binary), _) => binary.to_path_buf(),
        (None, Some(sdk)) => sdk.join(SDK_QEMU_RELATIVE),
        (None, None) => match default_sdk_path() {
            Some(sdk) => sdk.join(SDK_QEMU_RELATIVE),
            None => return Err(DutError::EmulatorNotFound { tried: Vec::new() }),
        },
    };

    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(DutError::EmulatorNotFound {
            tried: vec![candidate],
        })
    }
}

/// Resolve the firmware image.
///
/// A relative explicit path is taken relative to `project_root`. Without an
/// explicit path the default build directories are tried in order and the
/// first existing file wins.
pub fn locate_image(explicit: Option<&Path>, project_root: &Path) -> Result<PathBuf, DutError> {
    let candidates: Vec<PathBuf> = match explicit {
        Some(path) if path.is_absolute() => vec![path.to_path_buf()],
        Some(path) => vec![project_root.join(path)],
        None => DEFAULT_IMAGE_CANDIDATES
            .iter()
            .map(|rel| project_root.join(rel))
            .collect(),
    };

    match candidates.iter().find(|p| p.is_file()) {
        Some(found) => Ok(found.clone()),
        None => Err(DutError::ImageNotFound { tried: candidates }),
    }
}

/// QEMU arguments for the sampler's `qemu_x86` target: no network, console
/// UART on a freshly allocated PTY.
pub fn launch_args(image: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-m",
        "32",
        "-cpu",
        "qemu32,+nx,+pae",
        "-machine",
        "q35",
        "-device",
        "isa-debug-exit,iobase=0xf4,iosize=0x04",
        "-no-reboot",
        "-nographic",
        "-machine",
        "acpi=off",
        "-net",
        "none",
        "-serial",
        "pty",
        "-kernel",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(image.as_os_str().to_os_string());
    args
}
