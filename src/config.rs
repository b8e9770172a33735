//! Server configuration (spec §2a): a plain `serde`-deserializable pair of structs mirroring the
//! teacher's `serde`+`toml` dependencies. No CLI argument parser is built; this is the seam one
//! would populate.

use std::time::Duration;

use serde::Deserialize;

use crate::auth::SquashMode;
use crate::connection::ConnectionLimits;
use crate::memory_monitor::PressureConfig;
use crate::nfs::TransferLimits;

fn default_bind_addr() -> String {
    "0.0.0.0:2049".to_string()
}

fn default_mount_bind_addr() -> String {
    "0.0.0.0:635".to_string()
}

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub nfs_bind_addr: String,
    #[serde(default = "default_mount_bind_addr")]
    pub mount_bind_addr: String,
    pub max_connections: usize,
    #[serde(with = "humantime_secs")]
    pub idle_timeout: Duration,
    #[serde(with = "humantime_secs")]
    pub read_deadline: Duration,
    #[serde(with = "humantime_secs")]
    pub write_deadline: Duration,
    #[serde(with = "humantime_secs")]
    pub shutdown_drain_timeout: Duration,
    pub attr_cache_capacity: usize,
    #[serde(with = "humantime_secs")]
    pub attr_cache_ttl: Duration,
    pub read_ahead_max_files: usize,
    pub read_ahead_max_bytes: usize,
    pub worker_pool_max_workers: Option<usize>,
    pub memory_monitor: Option<PressureConfig>,
    pub export: ExportOptions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            nfs_bind_addr: default_bind_addr(),
            mount_bind_addr: default_mount_bind_addr(),
            max_connections: 100,
            idle_timeout: Duration::from_secs(300),
            read_deadline: Duration::from_secs(5),
            write_deadline: Duration::from_secs(5),
            shutdown_drain_timeout: Duration::from_secs(10),
            attr_cache_capacity: 10_000,
            attr_cache_ttl: Duration::from_secs(5),
            read_ahead_max_files: 64,
            read_ahead_max_bytes: 64 * 1024 * 1024,
            worker_pool_max_workers: None,
            memory_monitor: Some(PressureConfig::default()),
            export: ExportOptions::default(),
        }
    }
}

impl Config {
    pub fn connection_limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            max_connections: self.max_connections,
            idle_timeout: self.idle_timeout,
            read_deadline: self.read_deadline,
            write_deadline: self.write_deadline,
            shutdown_drain_timeout: self.shutdown_drain_timeout,
        }
    }
}

/// Per-export policy, the subset of configuration `server::update_export_options` may change
/// after startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub read_only: bool,
    pub transfer_size: u32,
    pub read_ahead_size: u32,
    pub enable_read_ahead: bool,
    pub squash: String,
    pub require_secure_port: bool,
    pub allow_list: Vec<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            read_only: false,
            transfer_size: 65_536,
            read_ahead_size: 262_144,
            enable_read_ahead: true,
            squash: "none".to_string(),
            require_secure_port: false,
            allow_list: Vec::new(),
        }
    }
}

impl ExportOptions {
    pub fn transfer_limits(&self) -> TransferLimits {
        TransferLimits {
            transfer_size: self.transfer_size,
            read_ahead_size: self.read_ahead_size,
            enable_read_ahead: self.enable_read_ahead,
            read_only: self.read_only,
        }
    }

    pub fn squash_mode(&self) -> SquashMode {
        SquashMode::from_config_str(&self.squash)
    }

    pub fn allow_entries(&self) -> Vec<crate::auth::AllowEntry> {
        self.allow_list
            .iter()
            .filter_map(|entry| parse_allow_entry(entry))
            .collect()
    }
}

fn parse_allow_entry(entry: &str) -> Option<crate::auth::AllowEntry> {
    use crate::auth::AllowEntry;
    if let Some((addr, prefix)) = entry.split_once('/') {
        let addr = addr.parse().ok()?;
        let prefix: u8 = prefix.parse().ok()?;
        Some(AllowEntry::Cidr(addr, prefix))
    } else {
        entry.parse().ok().map(AllowEntry::Literal)
    }
}

/// (De)serializes a `Duration` as whole seconds, matching the teacher's TOML field style.
mod humantime_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
