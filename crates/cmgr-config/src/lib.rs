//! Typed, file-loaded configuration for the reconciliation engine.
//!
//! Mirrors the node-agent convention elsewhere in this codebase: a plain
//! struct with `#[serde(default = ...)]` fallbacks, loaded with
//! `serde_json::from_str` and wrapped in a crate-local error type. A missing
//! or malformed file is a startup error, never a per-tick error.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {0}: {1}")]
    Read(String, std::io::Error),
    #[error("parse {0}: {1}")]
    Parse(String, serde_json::Error),
    #[error("write {0}: {1}")]
    Write(String, std::io::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Engine configuration, loaded once at daemon startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub region: String,
    pub cluster_name: String,

    #[serde(default = "default_loop_time_secs")]
    pub loop_time_secs: u64,

    #[serde(default)]
    pub disable_all_cluster_management: bool,

    #[serde(default = "default_heartbeat_file_path")]
    pub heartbeat_file_path: PathBuf,

    #[serde(default = "default_launch_max_batch_size")]
    pub launch_max_batch_size: usize,
    #[serde(default = "default_terminate_max_batch_size")]
    pub terminate_max_batch_size: usize,

    #[serde(default = "default_true")]
    pub update_node_address: bool,

    #[serde(default = "default_node_replacement_timeout_secs")]
    pub node_replacement_timeout_secs: i64,

    #[serde(default = "default_true")]
    pub terminate_drain_nodes: bool,
    #[serde(default = "default_true")]
    pub terminate_down_nodes: bool,

    #[serde(default = "default_orphaned_instance_timeout_secs")]
    pub orphaned_instance_timeout_secs: i64,

    #[serde(default)]
    pub disable_ec2_health_check: bool,
    #[serde(default)]
    pub disable_scheduled_event_health_check: bool,
    #[serde(default)]
    pub disable_all_health_checks: bool,

    #[serde(default = "default_health_check_timeout_secs")]
    pub health_check_timeout_secs: i64,
}

fn default_loop_time_secs() -> u64 {
    30
}
fn default_heartbeat_file_path() -> PathBuf {
    PathBuf::from("/var/run/cmgr/heartbeat")
}
fn default_launch_max_batch_size() -> usize {
    100
}
fn default_terminate_max_batch_size() -> usize {
    1000
}
fn default_node_replacement_timeout_secs() -> i64 {
    600
}
fn default_orphaned_instance_timeout_secs() -> i64 {
    180
}
fn default_health_check_timeout_secs() -> i64 {
    180
}
fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            cluster_name: String::new(),
            loop_time_secs: default_loop_time_secs(),
            disable_all_cluster_management: false,
            heartbeat_file_path: default_heartbeat_file_path(),
            launch_max_batch_size: default_launch_max_batch_size(),
            terminate_max_batch_size: default_terminate_max_batch_size(),
            update_node_address: true,
            node_replacement_timeout_secs: default_node_replacement_timeout_secs(),
            terminate_drain_nodes: true,
            terminate_down_nodes: true,
            orphaned_instance_timeout_secs: default_orphaned_instance_timeout_secs(),
            disable_ec2_health_check: false,
            disable_scheduled_event_health_check: false,
            disable_all_health_checks: false,
            health_check_timeout_secs: default_health_check_timeout_secs(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
        serde_json::from_str(&data).map_err(|e| ConfigError::Parse(path.display().to_string(), e))
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Write(path.display().to_string(), e))?;
        }
        let data = serde_json::to_string_pretty(self).expect("EngineConfig always serializes");
        std::fs::write(path, data).map_err(|e| ConfigError::Write(path.display().to_string(), e))
    }

    pub fn ec2_health_check_enabled(&self) -> bool {
        !self.disable_all_health_checks && !self.disable_ec2_health_check
    }

    pub fn scheduled_event_check_enabled(&self) -> bool {
        !self.disable_all_health_checks && !self.disable_scheduled_event_health_check
    }
}
