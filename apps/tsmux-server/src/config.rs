//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tsmux_core::MuxConfig;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP status/control server to.
    /// Override: `TSMUX_BIND_PORT`
    pub bind_port: u16,

    /// Maximum chunks buffered per client mailbox before the oldest is
    /// dropped. Override: `TSMUX_CLIENT_MAILBOX_CAPACITY`
    pub client_mailbox_capacity: usize,

    /// Seconds of read silence after which a client is evicted.
    pub client_read_timeout_secs: u64,

    /// Seconds without a chunk while `ONAir` before the encoder is
    /// considered frozen.
    pub onair_freeze_secs: u64,

    /// Seconds without a chunk while `Standby` before the encoder is
    /// considered frozen.
    pub standby_freeze_secs: u64,

    /// Number of preemption spins `connect` performs while searching for
    /// an `Idling` sibling to reclaim a tuner from.
    pub tuner_preempt_attempts: u32,

    /// Interval between preemption spins, in milliseconds.
    pub tuner_preempt_interval_ms: u64,

    /// Path to the `psisiarc` binary.
    pub psi_archiver_binary: String,

    /// Seconds to wait for the PSI archiver to exit on stop.
    pub psi_archiver_stop_timeout_secs: u64,

    /// Candidate recording destination directories.
    pub recorded_folders: Vec<PathBuf>,

    /// Argv for the supervised encoder subprocess.
    pub encoder_command: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = MuxConfig::default();
        Self {
            bind_port: 49400,
            client_mailbox_capacity: core.client_mailbox_capacity,
            client_read_timeout_secs: core.client_read_timeout_secs,
            onair_freeze_secs: core.onair_freeze_secs,
            standby_freeze_secs: core.standby_freeze_secs,
            tuner_preempt_attempts: core.tuner_preempt_attempts,
            tuner_preempt_interval_ms: core.tuner_preempt_interval_ms,
            psi_archiver_binary: core.psi_archiver_binary,
            psi_archiver_stop_timeout_secs: core.psi_archiver_stop_timeout_secs,
            recorded_folders: core.recorded_folders,
            encoder_command: core.encoder_command,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TSMUX_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("TSMUX_CLIENT_MAILBOX_CAPACITY") {
            if let Ok(capacity) = val.parse() {
                self.client_mailbox_capacity = capacity;
            }
        }

        if let Ok(val) = std::env::var("TSMUX_PSI_ARCHIVER_BINARY") {
            self.psi_archiver_binary = val;
        }
    }

    /// Converts to tsmux-core's `MuxConfig` type.
    pub fn to_core_config(&self) -> MuxConfig {
        MuxConfig {
            client_mailbox_capacity: self.client_mailbox_capacity,
            client_read_timeout_secs: self.client_read_timeout_secs,
            onair_freeze_secs: self.onair_freeze_secs,
            standby_freeze_secs: self.standby_freeze_secs,
            tuner_preempt_attempts: self.tuner_preempt_attempts,
            tuner_preempt_interval_ms: self.tuner_preempt_interval_ms,
            psi_archiver_binary: self.psi_archiver_binary.clone(),
            psi_archiver_stop_timeout_secs: self.psi_archiver_stop_timeout_secs,
            recorded_folders: self.recorded_folders.clone(),
            encoder_command: self.encoder_command.clone(),
        }
    }
}
