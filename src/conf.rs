//! The serializable configuration data structures used for setup.
//!
//! A configuration file is optional. Without one the framework starts with the
//! two virtual sensors of the bench setup; the command line can add the GPS
//! device on top of either.
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{error::StartupError, table::DEFAULT_CAPACITY};

pub const GPS_TOKEN: &str = "GPS";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DeviceKind {
    /// A character device or other path that becomes readable when data
    /// arrives (GPS receiver, mouse).
    Serial { path: PathBuf },
    /// A TCP port on localhost that a virtual sensor connects to.
    Socket { port: u16 },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceConf {
    pub token: String,

    #[serde(flatten)]
    pub kind: DeviceKind,

    #[serde(default = "default_required")]
    pub required: bool,

    #[serde(default = "default_read_bufsize")]
    pub read_bufsize: usize,
}

impl DeviceConf {
    pub fn new(token: impl Into<String>, kind: DeviceKind, required: bool) -> Self {
        Self {
            token: token.into(),
            kind,
            required,
            read_bufsize: default_read_bufsize(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_cfg_ver")]
    pub version: u32,

    /// Milliseconds; `-1` blocks until a source is ready.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: i32,

    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_screen_log")]
    pub screen_log: bool,

    #[serde(default = "default_bus_bufsize")]
    pub bus_bufsize: usize,

    #[serde(default = "default_devices")]
    pub device: Vec<DeviceConf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_cfg_ver(),
            poll_timeout_ms: default_poll_timeout_ms(),
            capacity: default_capacity(),
            log_dir: default_log_dir(),
            screen_log: default_screen_log(),
            bus_bufsize: default_bus_bufsize(),
            device: default_devices(),
        }
    }
}

impl Config {
    /// Reads a configuration file, picking the format from its extension.
    pub fn load(path: &Path) -> Result<Self, StartupError> {
        let text = fs::read_to_string(path).map_err(|source| StartupError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_err = |reason: String| StartupError::ConfigParse {
            path: path.to_path_buf(),
            reason,
        };
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&text).map_err(|e| parse_err(e.to_string())),
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&text).map_err(|e| parse_err(e.to_string()))
            }
            Some("json") => serde_json::from_str(&text).map_err(|e| parse_err(e.to_string())),
            _ => Err(StartupError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Adds (or repoints) the GPS receiver. A device named on the command line
    /// is one the operator expects to be there, so it is required.
    pub fn set_gps_device_path(&mut self, path: impl Into<PathBuf>) {
        let kind = DeviceKind::Serial { path: path.into() };
        match self.device.iter_mut().find(|dev| dev.token == GPS_TOKEN) {
            Some(dev) => {
                dev.kind = kind;
                dev.required = true;
            }
            None => self.device.push(DeviceConf::new(GPS_TOKEN, kind, true)),
        }
    }
}

fn default_cfg_ver() -> u32 {
    1
}

fn default_poll_timeout_ms() -> i32 {
    5 * 1000
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_screen_log() -> bool {
    true
}

fn default_bus_bufsize() -> usize {
    4096
}

fn default_required() -> bool {
    false
}

fn default_read_bufsize() -> usize {
    1024
}

fn default_devices() -> Vec<DeviceConf> {
    vec![
        DeviceConf::new("GYRO", DeviceKind::Socket { port: 8081 }, false),
        DeviceConf::new("ACCO", DeviceKind::Socket { port: 8082 }, false),
    ]
}
