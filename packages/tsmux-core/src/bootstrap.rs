//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. This pattern provides:
//!
//! - **Clarity**: All dependency relationships are visible in one place
//! - **Testability**: Easy to swap implementations for testing
//! - **Maintainability**: Service creation logic is isolated from usage

use std::sync::Arc;

use crate::channel_meta::ChannelMetadata;
use crate::config::MuxConfig;
use crate::error::{MuxError, MuxResult};
use crate::recorded_registry::{NullRecordedFileRegistry, RecordedFileRegistry};
use crate::registry::LiveStreamRegistry;

/// Container for all bootstrapped services.
///
/// This struct holds all the wired services created during bootstrap. It's
/// consumed by `AppState` to build the final application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Process-wide registry of live streams.
    pub registry: Arc<LiveStreamRegistry>,
}

impl BootstrappedServices {
    /// Initiates graceful shutdown: cancels every stream's encoder
    /// supervision task (spec §9, "Dynamic task handles").
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] beginning graceful shutdown");
        let streams_cleared = self.clear_all_streams().await;
        log::info!("[Bootstrap] shut down {streams_cleared} stream(s)");
    }

    /// Shuts down every registered stream's encoder task.
    ///
    /// # Returns
    /// The number of streams that were shut down.
    pub async fn clear_all_streams(&self) -> usize {
        let streams = self.registry.get_all_live_streams();
        for stream in &streams {
            stream.shutdown().await;
        }
        streams.len()
    }
}

/// Bootstraps all application services with their dependencies.
///
/// This is the composition root where all services are instantiated and
/// wired together. The wiring order matters:
///
/// 1. Validate configuration (panics early if invalid, matching the
///    teacher's `config.streaming.validate().expect(...)` guard).
/// 2. Channel metadata collaborator (depends on nothing).
/// 3. Recorded-file registry collaborator (depends on nothing).
/// 4. Live stream registry (depends on 1-3).
///
/// # Errors
///
/// Returns an error if `config` fails validation.
pub fn bootstrap_services(
    config: &MuxConfig,
    channel_metadata: Arc<dyn ChannelMetadata>,
    recorded_file_registry: Option<Arc<dyn RecordedFileRegistry>>,
) -> MuxResult<BootstrappedServices> {
    config
        .validate()
        .map_err(MuxError::Configuration)?;

    let recorded_file_registry =
        recorded_file_registry.unwrap_or_else(|| Arc::new(NullRecordedFileRegistry));

    let registry = Arc::new(LiveStreamRegistry::new(
        config.clone(),
        channel_metadata,
        recorded_file_registry,
    ));

    Ok(BootstrappedServices { registry })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_meta::{Channel, Program};
    use async_trait::async_trait;

    struct NoMetadata;

    #[async_trait]
    impl ChannelMetadata for NoMetadata {
        async fn get(&self, _display_channel_id: &str) -> Option<Channel> {
            None
        }
        async fn get_current_and_next_program(
            &self,
            _channel: &Channel,
        ) -> (Option<Program>, Option<Program>) {
            (None, None)
        }
    }

    #[test]
    fn bootstrap_rejects_invalid_config() {
        let mut config = MuxConfig::default();
        config.client_mailbox_capacity = 0;
        let result = bootstrap_services(&config, Arc::new(NoMetadata), None);
        assert!(result.is_err());
    }

    #[test]
    fn bootstrap_succeeds_with_default_config() {
        let config = MuxConfig::default();
        let result = bootstrap_services(&config, Arc::new(NoMetadata), None);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn clear_all_streams_on_empty_registry_returns_zero() {
        let config = MuxConfig::default();
        let services = bootstrap_services(&config, Arc::new(NoMetadata), None).unwrap();
        assert_eq!(services.clear_all_streams().await, 0);
    }
}
