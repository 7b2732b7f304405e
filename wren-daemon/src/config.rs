//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use serde::Deserialize;
use wren_forwarding::interface::InterfaceType;
use wren_forwarding::tunnel::TunnelMode;
use wren_utils::mac_addr::MacAddr;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    /// OSPF router identity; defaults to the first interface address.
    pub router_id: Option<Ipv4Addr>,
    pub logging: Logging,
    pub interfaces: Vec<InterfaceConfig>,
    pub routes: Vec<RouteConfig>,
    pub tunnels: Vec<TunnelConfig>,
    pub ospf: OspfConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub stdout: LoggingStdout,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingStdout {
    pub enabled: bool,
    pub style: LoggingFmtStyle,
    pub colors: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFmtStyle {
    #[default]
    Compact,
    Full,
    Json,
    Pretty,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct InterfaceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub if_type: InterfaceType,
    pub mac: Option<MacAddr>,
    pub address: Option<Ipv4Addr>,
    pub mask: Option<Ipv4Addr>,
    pub speed_mbps: u32,
    pub enabled: bool,
    /// Seconds between HELLOs on this interface; the protocol default when
    /// absent.
    pub hello_interval: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouteConfig {
    pub dest: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub interface: String,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TunnelConfig {
    pub name: String,
    pub mode: TunnelMode,
    pub remote: Ipv4Addr,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OspfConfig {
    pub enabled: bool,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/wrend.toml";

    /// Parses the configuration file, exiting on malformed input. A missing
    /// file yields the built-in defaults.
    pub fn load(config_file: Option<&str>) -> Config {
        let path = config_file.unwrap_or(Config::DFLT_FILEPATH);
        match std::fs::read_to_string(path) {
            Ok(config_str) => match toml::from_str(&config_str) {
                Ok(config) => config,
                Err(error) => {
                    eprintln!("failed to parse configuration: {}", error);
                    std::process::exit(1);
                }
            },
            Err(error) => {
                eprintln!(
                    "failed to read configuration file {}: {}",
                    path, error
                );
                eprintln!("using default parameters...");
                Config::default()
            }
        }
    }
}

// ===== impl LoggingStdout =====

impl Default for LoggingStdout {
    fn default() -> LoggingStdout {
        LoggingStdout {
            enabled: true,
            style: LoggingFmtStyle::default(),
            colors: true,
        }
    }
}

// ===== impl InterfaceConfig =====

impl Default for InterfaceConfig {
    fn default() -> InterfaceConfig {
        InterfaceConfig {
            name: String::new(),
            if_type: InterfaceType::Hardware,
            mac: None,
            address: None,
            mask: None,
            speed_mbps: 0,
            enabled: true,
            hello_interval: None,
        }
    }
}

// ===== impl RouteConfig =====

impl Default for RouteConfig {
    fn default() -> RouteConfig {
        RouteConfig {
            dest: Ipv4Addr::UNSPECIFIED,
            mask: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            interface: String::new(),
        }
    }
}

// ===== impl TunnelConfig =====

impl Default for TunnelConfig {
    fn default() -> TunnelConfig {
        TunnelConfig {
            name: String::new(),
            mode: TunnelMode::Gre,
            remote: Ipv4Addr::UNSPECIFIED,
        }
    }
}

// ===== impl OspfConfig =====

impl Default for OspfConfig {
    fn default() -> OspfConfig {
        OspfConfig { enabled: true }
    }
}
