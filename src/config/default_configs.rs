use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::collectors::{Command, Directory, EventLog, Item};
use crate::config::items_config::ItemsConfig;

/// Built-in item lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Environment and hostname snapshots only
    Generic,
    Linux,
    Macos,
    Windows,
}

impl Preset {
    pub fn for_current_os() -> Self {
        match std::env::consts::OS {
            "windows" => Preset::Windows,
            "linux" => Preset::Linux,
            "macos" => Preset::Macos,
            _ => Preset::Generic,
        }
    }

    pub fn config(self) -> ItemsConfig {
        match self {
            Preset::Generic => ItemsConfig::default_generic(),
            Preset::Linux => ItemsConfig::default_linux(),
            Preset::Macos => ItemsConfig::default_macos(),
            Preset::Windows => ItemsConfig::default_windows(),
        }
    }
}

fn snapshots() -> Vec<Item> {
    vec![Item::Environment, Item::Hostname]
}

impl ItemsConfig {
    /// Default configuration for any platform
    pub fn default_generic() -> Self {
        ItemsConfig {
            version: "1.0".into(),
            description: "Generic diagnostics configuration".into(),
            items: snapshots(),
        }
    }

    /// Default configuration for Linux
    pub fn default_linux() -> Self {
        let mut items = snapshots();
        items.extend([
            Item::Directory(Directory::new("/var/log", ".*").recursive(true)),
            Item::file("/etc/os-release"),
            Item::file("/proc/cmdline"),
            Item::command("uname", &["-a"]),
            Item::command("df", &["-h"]),
            Item::command("mount", &[]),
            Item::command("ps", &["aux"]),
            Item::command("ip", &["addr"]),
            Item::Command(Command::new("dmesg", &[]).wait_time_in_seconds(30)),
        ]);
        ItemsConfig {
            version: "1.0".into(),
            description: "Default Linux diagnostics configuration".into(),
            items,
        }
    }

    /// Default configuration for macOS
    pub fn default_macos() -> Self {
        let mut items = snapshots();
        items.extend([
            Item::directory("/var/log", ".*"),
            Item::Directory(Directory::new("/Library/Logs/DiagnosticReports", ".*").recursive(true)),
            Item::command("uname", &["-a"]),
            Item::command("sw_vers", &[]),
            Item::command("df", &["-h"]),
            Item::command("ps", &["aux"]),
            Item::command("ifconfig", &["-a"]),
        ]);
        ItemsConfig {
            version: "1.0".into(),
            description: "Default macOS diagnostics configuration".into(),
            items,
        }
    }

    /// Default configuration for Windows
    pub fn default_windows() -> Self {
        let mut items = snapshots();
        items.extend([
            Item::Directory(Directory::new(r"%SystemRoot%\Logs\CBS", ".*")),
            Item::Directory(Directory::new(r"%SystemRoot%\Minidump", ".*")),
            Item::file(r"%SystemRoot%\System32\drivers\etc\hosts"),
            Item::Command(Command::new("systeminfo", &[]).wait_time_in_seconds(120)),
            Item::command("ipconfig", &["/all"]),
            Item::command("tasklist", &["/v"]),
            Item::EventLog(EventLog::default()),
        ]);
        ItemsConfig {
            version: "1.0".into(),
            description: "Default Windows diagnostics configuration".into(),
            items,
        }
    }
}
