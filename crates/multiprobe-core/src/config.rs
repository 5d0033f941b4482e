//! Centralized configuration for the probe proxy.
//!
//! Holds the proxy's tuning constants and the construction parameters that the
//! worker forwards, uninterpreted, to the Target API.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Proxy-level configuration.
pub struct ProxyConfig;

impl ProxyConfig {
    /// Bounded wait for the per-proxy execution lock.
    pub const EXEC_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
    pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB
    pub const LOCAL_PIPE_CAPACITY: usize = 64 * 1024;
    pub const WORKER_BINARY: &'static str = "multiprobe-worker";
}

/// Device family the Target API is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceFamily {
    Nrf51,
    Nrf52,
    Nrf53,
    Nrf91,
    Unknown,
}

impl DeviceFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceFamily::Nrf51 => "NRF51",
            DeviceFamily::Nrf52 => "NRF52",
            DeviceFamily::Nrf53 => "NRF53",
            DeviceFamily::Nrf91 => "NRF91",
            DeviceFamily::Unknown => "UNKNOWN",
        }
    }

    /// Native `device_family_t` value.
    pub fn value(&self) -> u32 {
        match self {
            DeviceFamily::Nrf51 => 0,
            DeviceFamily::Nrf52 => 1,
            DeviceFamily::Nrf53 => 53,
            DeviceFamily::Nrf91 => 91,
            DeviceFamily::Unknown => 99,
        }
    }

    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(DeviceFamily::Nrf51),
            1 => Some(DeviceFamily::Nrf52),
            53 => Some(DeviceFamily::Nrf53),
            91 => Some(DeviceFamily::Nrf91),
            99 => Some(DeviceFamily::Unknown),
            _ => None,
        }
    }

    /// Parse a family from its name (any case) or its numeric value.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(value) = s.parse::<u32>() {
            return Self::from_value(value);
        }
        match s.to_uppercase().as_str() {
            "NRF51" => Some(DeviceFamily::Nrf51),
            "NRF52" => Some(DeviceFamily::Nrf52),
            "NRF53" => Some(DeviceFamily::Nrf53),
            "NRF91" => Some(DeviceFamily::Nrf91),
            "UNKNOWN" => Some(DeviceFamily::Unknown),
            _ => None,
        }
    }
}

impl Default for DeviceFamily {
    fn default() -> Self {
        DeviceFamily::Unknown
    }
}

impl std::fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeviceFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown device family: {}", s))
    }
}

/// Construction parameters for the Target API.
///
/// The proxy never interprets these; they are handed to the worker, which
/// passes them to [`TargetApi::create`](crate::target::TargetApi::create).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    pub device_family: DeviceFamily,
    /// Path to the native probe library, when not in the default location.
    pub library_path: Option<PathBuf>,
    /// Enable debug logging in the worker.
    pub log: bool,
    /// Prefix attached to every worker log line.
    pub log_prefix: Option<String>,
    /// Write worker logs to this file instead of stderr.
    pub log_file_path: Option<PathBuf>,
}

impl ProbeSettings {
    pub fn new(device_family: DeviceFamily) -> Self {
        Self {
            device_family,
            ..Default::default()
        }
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    pub fn with_logging(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn with_log_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.log_prefix = Some(prefix.into());
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file_path = Some(path.into());
        self
    }

    /// Whether any logging option is set.
    pub fn logging_requested(&self) -> bool {
        self.log || self.log_prefix.is_some() || self.log_file_path.is_some()
    }

    /// Command-line flags understood by the worker binary.
    pub fn to_worker_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--family".into(), self.device_family.as_str().into()];
        if let Some(path) = &self.library_path {
            args.push("--library-path".into());
            args.push(path.clone().into_os_string());
        }
        if self.log {
            args.push("--log".into());
        }
        if let Some(prefix) = &self.log_prefix {
            args.push("--log-prefix".into());
            args.push(prefix.into());
        }
        if let Some(path) = &self.log_file_path {
            args.push("--log-file".into());
            args.push(path.clone().into_os_string());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_family_roundtrip() {
        for family in [
            DeviceFamily::Nrf51,
            DeviceFamily::Nrf52,
            DeviceFamily::Nrf53,
            DeviceFamily::Nrf91,
            DeviceFamily::Unknown,
        ] {
            assert_eq!(DeviceFamily::parse(family.as_str()), Some(family));
            assert_eq!(DeviceFamily::from_value(family.value()), Some(family));
        }
    }

    #[test]
    fn test_device_family_parse_accepts_numbers_and_any_case() {
        assert_eq!(DeviceFamily::parse("nrf52"), Some(DeviceFamily::Nrf52));
        assert_eq!(DeviceFamily::parse("91"), Some(DeviceFamily::Nrf91));
        assert_eq!(DeviceFamily::parse("7"), None);
        assert!("bogus".parse::<DeviceFamily>().is_err());
    }

    #[test]
    fn test_worker_args_minimal() {
        let args = ProbeSettings::new(DeviceFamily::Nrf52).to_worker_args();
        assert_eq!(args, vec![OsString::from("--family"), OsString::from("NRF52")]);
    }

    #[test]
    fn test_worker_args_full() {
        let settings = ProbeSettings::new(DeviceFamily::Nrf91)
            .with_library_path("/opt/SEGGER/libjlinkarm.so")
            .with_logging(true)
            .with_log_prefix("[probe-a] ")
            .with_log_file("/tmp/probe.log");
        let args: Vec<String> = settings
            .to_worker_args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "--family",
                "NRF91",
                "--library-path",
                "/opt/SEGGER/libjlinkarm.so",
                "--log",
                "--log-prefix",
                "[probe-a] ",
                "--log-file",
                "/tmp/probe.log",
            ]
        );
        assert!(settings.logging_requested());
    }

    #[test]
    fn test_lock_timeout_is_ten_seconds() {
        assert_eq!(ProxyConfig::EXEC_LOCK_TIMEOUT, Duration::from_secs(10));
    }
}
