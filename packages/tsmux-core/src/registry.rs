//! Process-wide singleton-per-(channel,quality) registry (spec §3, §9).
//!
//! Re-expresses the source's module-level map as an explicit registry
//! object: repeated construction with the same key returns the same
//! `Arc<LiveStream>` instance, with the insert-or-get race resolved under
//! `DashMap`'s per-shard locking.

use std::sync::Arc;

use dashmap::DashMap;

use crate::channel_meta::ChannelMetadata;
use crate::config::MuxConfig;
use crate::live_stream::{LiveStream, StreamStatus};
use crate::recorded_registry::RecordedFileRegistry;
use crate::tuner::Tuner;

/// Key identifying a live stream: its display channel id and quality.
pub type StreamKey = (String, String);

/// Process-wide registry of live streams, keyed by `(display_channel_id,
/// quality)`.
pub struct LiveStreamRegistry {
    streams: DashMap<StreamKey, Arc<LiveStream>>,
    config: MuxConfig,
    channel_metadata: Arc<dyn ChannelMetadata>,
    recorded_file_registry: Arc<dyn RecordedFileRegistry>,
}

impl LiveStreamRegistry {
    /// Creates an empty registry sharing the given collaborators across
    /// every stream it creates.
    pub fn new(
        config: MuxConfig,
        channel_metadata: Arc<dyn ChannelMetadata>,
        recorded_file_registry: Arc<dyn RecordedFileRegistry>,
    ) -> Self {
        Self {
            streams: DashMap::new(),
            config,
            channel_metadata,
            recorded_file_registry,
        }
    }

    /// Returns the existing stream for `(display_channel_id, quality)`, or
    /// creates and inserts a new `Offline` one.
    pub fn get_or_create(
        &self,
        display_channel_id: &str,
        quality: &str,
        tuner: Option<Arc<dyn Tuner>>,
    ) -> Arc<LiveStream> {
        let key = (display_channel_id.to_string(), quality.to_string());
        if let Some(existing) = self.streams.get(&key) {
            return existing.clone();
        }
        let created = Arc::new(LiveStream::new(
            display_channel_id.to_string(),
            quality.to_string(),
            self.config.clone(),
            self.channel_metadata.clone(),
            self.recorded_file_registry.clone(),
            tuner,
        ));
        self.streams
            .entry(key)
            .or_insert_with(|| created)
            .clone()
    }

    /// Looks up a stream without creating one.
    pub fn get(&self, display_channel_id: &str, quality: &str) -> Option<Arc<LiveStream>> {
        let key = (display_channel_id.to_string(), quality.to_string());
        self.streams.get(&key).map(|entry| entry.clone())
    }

    /// Snapshot of every registered stream (spec §4.5.8).
    pub fn get_all_live_streams(&self) -> Vec<Arc<LiveStream>> {
        self.streams.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Streams currently `ONAir` (spec §4.5.8).
    pub fn get_onair_live_streams(&self) -> Vec<Arc<LiveStream>> {
        self.get_all_live_streams()
            .into_iter()
            .filter(|s| s.get_status().status == StreamStatus::ONAir)
            .collect()
    }

    /// Streams currently `Idling` (spec §4.5.8), excluding `except_key` so
    /// that `connect`'s preemption loop never considers the caller's own
    /// stream a sibling.
    pub fn get_idling_live_streams_except(&self, except_key: &StreamKey) -> Vec<Arc<LiveStream>> {
        self.streams
            .iter()
            .filter(|entry| entry.key() != except_key)
            .filter(|entry| entry.value().get_status().status == StreamStatus::Idling)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Sum of `client_count` across every stream sharing `display_channel_id`
    /// (spec §4.5.8).
    pub fn get_viewer_count(&self, display_channel_id: &str) -> usize {
        self.streams
            .iter()
            .filter(|entry| entry.key().0 == display_channel_id)
            .map(|entry| entry.value().get_status().client_count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_meta::{Channel, Program};
    use crate::recorded_registry::NullRecordedFileRegistry;
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

    fn make_registry() -> LiveStreamRegistry {
        LiveStreamRegistry::new(
            MuxConfig::default(),
            Arc::new(NoMetadata),
            Arc::new(NullRecordedFileRegistry),
        )
    }

    #[test]
    fn get_or_create_returns_the_same_instance() {
        let registry = make_registry();
        let a = registry.get_or_create("gr011", "1080p", None);
        let b = registry.get_or_create("gr011", "1080p", None);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_keys_yield_distinct_instances() {
        let registry = make_registry();
        let a = registry.get_or_create("gr011", "1080p", None);
        let b = registry.get_or_create("gr011", "720p", None);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn get_without_create_misses_on_unknown_key() {
        let registry = make_registry();
        assert!(registry.get("gr011", "1080p").is_none());
    }
}
