use std::{collections::HashMap, path::PathBuf};

use argh::FromArgs;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

#[derive(FromArgs, Serialize, Deserialize, Debug, Clone, PartialEq)]
/// Watch a GNSS receiver and print its status
pub struct MonitorCfg {
    /// connection kind: serial, socket or file
    #[argh(option, default = "String::from(\"serial\")")]
    pub kind: String,
    /// serial device
    #[argh(option)]
    #[serde(default)]
    pub port: Option<String>,
    /// baud rate
    #[argh(option, default = "38400")]
    pub baud: u32,
    /// socket host
    #[argh(option, default = "String::from(\"localhost\")")]
    pub host: String,
    /// socket port
    #[argh(option, default = "50010")]
    pub socket_port: u16,
    /// socket protocol: tcp or udp
    #[argh(option, default = "String::from(\"tcp\")")]
    pub protocol: String,
    /// recorded stream to replay
    #[argh(option)]
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// delay between replay reads in milliseconds
    #[argh(option, default = "20")]
    pub delay: u64,
    /// read timeout in milliseconds
    #[argh(option, default = "100")]
    pub timeout: u64,
    /// protocols to decode, e.g. ubx,nmea,rtcm
    #[argh(option, default = "String::from(\"ubx,nmea,rtcm\")")]
    pub protocols: String,
    /// include satellites without signal
    #[argh(switch)]
    #[serde(default)]
    pub show_unused: bool,
    /// seconds before an unreported satellite is dropped
    #[argh(option, default = "10")]
    pub expiry: u64,
    /// re-broadcast raw frames to TCP clients on this port
    #[argh(option)]
    #[serde(default)]
    pub fanout_port: Option<u16>,
    /// seconds between status summaries
    #[argh(option, default = "1")]
    pub interval: u64,
    /// print status as JSON
    #[argh(switch)]
    #[serde(default)]
    pub json: bool,
    /// debug logging
    #[argh(switch, short = 'v')]
    #[serde(default)]
    pub verbose: bool,
    /// save these options as the default
    #[argh(switch)]
    #[serde(skip)]
    pub save: bool,
    /// start from the saved options instead of the command line
    #[argh(switch)]
    #[serde(skip)]
    pub load: bool,
}

impl MonitorCfg {
    /// Store the configuration in the default location
    pub fn store_default(&self) -> Result<PathBuf, std::io::Error> {
        let path = default_path();
        self.store(&path)?;
        Ok(path)
    }

    /// Load the configuration from the default location
    pub fn load_default() -> Result<Self, std::io::Error> {
        Self::load(&default_path())
    }

    fn store(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, data)
    }

    fn load(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data).map_err(std::io::Error::other)
    }

    /// Flat settings understood by `TransportConfig::from_settings`.
    pub fn to_settings(&self) -> HashMap<String, String> {
        let mut settings = HashMap::from([
            ("kind".to_string(), self.kind.clone()),
            ("baud".to_string(), self.baud.to_string()),
            ("host".to_string(), self.host.clone()),
            ("socket_port".to_string(), self.socket_port.to_string()),
            ("protocol".to_string(), self.protocol.clone()),
            ("delay".to_string(), (self.delay as f64 / 1000.0).to_string()),
            ("timeout".to_string(), (self.timeout as f64 / 1000.0).to_string()),
        ]);
        if let Some(port) = &self.port {
            settings.insert("port".into(), port.clone());
        }
        if let Some(path) = &self.path {
            settings.insert("path".into(), path.display().to_string());
        }
        settings
    }
}

fn default_path() -> PathBuf {
    let mut path = if let Some(dirs) = ProjectDirs::from("", "", "gnss_monitor") {
        dirs.config_dir().to_path_buf()
    } else {
        PathBuf::from(".")
    };
    path.push("config.json");
    path
}
