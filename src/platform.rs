//! Platform identification for native artifact selection
//!
//! The engine ships one shared library per OS/CPU class. This module works
//! out which one the current host needs. On embedded Linux the CPU is read
//! from `/proc/cpuinfo` and its `CPU part` code mapped to a device tier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::{PorcupineError, Result};

const CPU_INFO_PATH: &str = "/proc/cpuinfo";

/// Base name of the engine library inside each platform directory.
const LIBRARY_STEM: &str = "libpv_porcupine";

/// OS family / device class the engine is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OsFamily {
    Mac,
    Linux,
    Windows,
    RaspberryPi,
    Jetson,
    Beaglebone,
}

impl OsFamily {
    /// Directory name used in the resource bundle
    pub fn name(&self) -> &'static str {
        match self {
            OsFamily::Mac => "mac",
            OsFamily::Linux => "linux",
            OsFamily::Windows => "windows",
            OsFamily::RaspberryPi => "raspberry-pi",
            OsFamily::Jetson => "jetson",
            OsFamily::Beaglebone => "beaglebone",
        }
    }

    /// Shared library extension for this family
    pub fn library_extension(&self) -> &'static str {
        match self {
            OsFamily::Mac => "dylib",
            OsFamily::Windows => "dll",
            _ => "so",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Platform the engine artifacts are selected for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDescriptor {
    /// OS family / device class
    pub os_family: OsFamily,

    /// CPU tag (e.g. `x86_64`, `cortex-a72-aarch64`); empty for Beaglebone
    pub cpu_tag: String,
}

impl PlatformDescriptor {
    pub fn new(os_family: OsFamily, cpu_tag: impl Into<String>) -> Self {
        Self {
            os_family,
            cpu_tag: cpu_tag.into(),
        }
    }

    /// Identify the current host.
    ///
    /// Fails only when the host is unsupported or the CPU identification
    /// source can't be read on an embedded Linux target.
    pub fn identify() -> Result<Self> {
        if cfg!(target_os = "macos") {
            let cpu = if cfg!(target_arch = "aarch64") { "arm64" } else { "x86_64" };
            Ok(Self::new(OsFamily::Mac, cpu))
        } else if cfg!(target_os = "windows") {
            Ok(Self::new(OsFamily::Windows, "amd64"))
        } else if cfg!(target_os = "linux") {
            Self::identify_linux()
        } else {
            Err(PorcupineError::Platform(format!(
                "{} is not a supported OS",
                std::env::consts::OS
            )))
        }
    }

    fn identify_linux() -> Result<Self> {
        if cfg!(target_arch = "x86_64") {
            return Ok(Self::new(OsFamily::Linux, "x86_64"));
        }

        if !cfg!(any(target_arch = "arm", target_arch = "aarch64")) {
            return Err(PorcupineError::Platform(format!(
                "{} is not a supported CPU architecture",
                std::env::consts::ARCH
            )));
        }

        let cpu_info = std::fs::read_to_string(CPU_INFO_PATH).map_err(|e| {
            PorcupineError::Platform(format!("failed to read {}: {}", CPU_INFO_PATH, e))
        })?;

        Ok(Self::from_cpu_info(&cpu_info, cfg!(target_arch = "aarch64")))
    }

    /// Classify an ARM Linux host from `/proc/cpuinfo` contents.
    ///
    /// Unrecognized (or absent) `CPU part` codes fall back to the armv6
    /// Raspberry Pi build, which runs on every supported ARM core.
    pub fn from_cpu_info(cpu_info: &str, aarch64: bool) -> Self {
        let cpu_part = cpu_part(cpu_info);
        let arch_suffix = if aarch64 { "-aarch64" } else { "" };
        let with_suffix = |tag: &str| format!("{}{}", tag, arch_suffix);

        let descriptor = match cpu_part.as_deref() {
            Some("0xb76") => Self::new(OsFamily::RaspberryPi, with_suffix("arm11")),
            Some("0xc07") => Self::new(OsFamily::RaspberryPi, with_suffix("cortex-a7")),
            Some("0xd03") => Self::new(OsFamily::RaspberryPi, with_suffix("cortex-a53")),
            Some("0xd08") => Self::new(OsFamily::RaspberryPi, with_suffix("cortex-a72")),
            Some("0xd07") => Self::new(OsFamily::Jetson, with_suffix("cortex-a57")),
            Some("0xc08") => Self::new(OsFamily::Beaglebone, ""),
            other => {
                warn!(
                    "Device (CPU part = {}) is not officially supported, falling back to the armv6 \
                     (Raspberry Pi Zero) library; this is neither tested nor optimal",
                    other.unwrap_or("unknown")
                );
                Self::new(OsFamily::RaspberryPi, with_suffix("arm11"))
            }
        };

        debug!("Classified CPU part {:?} as {}", cpu_part, descriptor);
        descriptor
    }

    /// Logical bundle path of the engine library for this platform
    pub fn library_resource_path(&self) -> String {
        let file_name = format!("{}.{}", LIBRARY_STEM, self.os_family.library_extension());
        let mut path = PathBuf::from("lib");
        path.push(self.os_family.name());
        if !self.cpu_tag.is_empty() {
            path.push(&self.cpu_tag);
        }
        path.push(file_name);
        to_logical(path)
    }

    /// Logical bundle directory holding this platform's built-in keyword files
    pub fn keyword_resource_dir(&self) -> String {
        format!("resources/keyword_files/{}", self.os_family.name())
    }
}

impl fmt::Display for PlatformDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cpu_tag.is_empty() {
            write!(f, "{}", self.os_family)
        } else {
            write!(f, "{}/{}", self.os_family, self.cpu_tag)
        }
    }
}

/// First `CPU part` value, lowercased.
fn cpu_part(cpu_info: &str) -> Option<String> {
    cpu_info
        .lines()
        .find(|line| line.contains("CPU part"))
        .and_then(|line| line.split_whitespace().last())
        .map(|part| part.to_lowercase())
}

// Bundle paths always use '/' regardless of host separator
fn to_logical(path: PathBuf) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
