//! Core configuration for the stream multiplexer.
//!
//! Groups the timing/sizing constants the spec leaves to the implementer
//! (client mailbox capacity, eviction and freeze timeouts, tuner preemption
//! cadence) alongside the external collaborator settings (PSI archiver
//! binary, recording destinations, encoder argv).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the live stream multiplexer core.
///
/// All fields have defaults chosen per spec.md §9's Open Questions and
/// §5's stated timeout values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Maximum chunks buffered per client mailbox before the oldest is
    /// dropped (drop-oldest, high-water mark policy per spec.md §4.1).
    pub client_mailbox_capacity: usize,

    /// Seconds of read silence after which a client is evicted (§4.5.4, §5).
    pub client_read_timeout_secs: u64,

    /// Seconds without a broadcast chunk while `ONAir` before the encoder
    /// supervisor considers the encoder frozen (§4.2, §5).
    pub onair_freeze_secs: u64,

    /// Seconds without a broadcast chunk while `Standby` before the encoder
    /// supervisor considers the encoder frozen (§4.2, §5).
    pub standby_freeze_secs: u64,

    /// Number of 100ms-ish spins `connect` performs while searching for an
    /// `Idling` sibling to preempt (§4.5.1, §5).
    pub tuner_preempt_attempts: u32,

    /// Interval between tuner preemption spins, in milliseconds.
    pub tuner_preempt_interval_ms: u64,

    /// Path to the `psisiarc` binary (§6).
    pub psi_archiver_binary: String,

    /// Seconds to wait for the PSI archiver to exit on stop before
    /// abandoning it (§4.3, §5).
    pub psi_archiver_stop_timeout_secs: u64,

    /// Candidate recording destination directories; the tee resolves the
    /// first entry (§4.4 step 2).
    pub recorded_folders: Vec<PathBuf>,

    /// Argv template for the supervised encoder subprocess. The first
    /// element is the program; the rest are arguments.
    pub encoder_command: Vec<String>,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            client_mailbox_capacity: 32,
            client_read_timeout_secs: 10,
            onair_freeze_secs: 5,
            standby_freeze_secs: 20,
            tuner_preempt_attempts: 8,
            tuner_preempt_interval_ms: 100,
            psi_archiver_binary: "psisiarc".to_string(),
            psi_archiver_stop_timeout_secs: 3,
            recorded_folders: Vec::new(),
            encoder_command: Vec::new(),
        }
    }
}

impl MuxConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.client_mailbox_capacity == 0 {
            return Err("client_mailbox_capacity must be >= 1".to_string());
        }
        if self.client_read_timeout_secs == 0 {
            return Err("client_read_timeout_secs must be >= 1".to_string());
        }
        if self.onair_freeze_secs == 0 || self.standby_freeze_secs == 0 {
            return Err("freeze thresholds must be >= 1".to_string());
        }
        if self.tuner_preempt_attempts == 0 {
            return Err("tuner_preempt_attempts must be >= 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = MuxConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_mailbox_capacity() {
        let mut config = MuxConfig::default();
        config.client_mailbox_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_freeze_thresholds() {
        let mut config = MuxConfig::default();
        config.onair_freeze_secs = 0;
        assert!(config.validate().is_err());
    }
}
