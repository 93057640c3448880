//! Live Stream Core (spec §4.5): the singleton-per-(channel,quality)
//! orchestrator. Holds state, broadcasts chunks to clients, evicts stale
//! clients, drives the state machine, and arbitrates tuner reuse across
//! sibling streams.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::channel_meta::{ChannelMetadata, NO_PROGRAM_TITLE};
use crate::client::{ClientKind, LiveStreamClient, MailboxItem};
use crate::config::MuxConfig;
use crate::psi_archiver::PsiArchiver;
use crate::recorded_registry::RecordedFileRegistry;
use crate::recording::{build_recording_stem, RecordingMode, RecordingState};
use crate::registry::{LiveStreamRegistry, StreamKey};
use crate::time::now_millis;
use crate::tuner::Tuner;

/// The five literal status values (spec §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Offline,
    Standby,
    ONAir,
    Idling,
    Restart,
}

impl StreamStatus {
    /// The literal string used in `getStatus` snapshots and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "Offline",
            Self::Standby => "Standby",
            Self::ONAir => "ONAir",
            Self::Idling => "Idling",
            Self::Restart => "Restart",
        }
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of `begin_cold_start_if_offline`: either the stream was `Offline`
/// and has just been moved to `Standby` under one lock acquisition, or it
/// was already in some other status (carried along so callers can still act
/// on an `Idling` read without a second, racy lock acquisition).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColdStart {
    Began,
    Unchanged(StreamStatus),
}

/// Read-side view returned by `get_status` (spec §4.5.7).
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub status: StreamStatus,
    pub detail: String,
    pub started_at: i64,
    pub updated_at: i64,
    pub client_count: usize,
    pub is_recording: bool,
    pub recording_start_time: i64,
    pub recording_file_path: Option<PathBuf>,
}

struct StreamInner {
    status: StreamStatus,
    detail: String,
    started_at: i64,
    updated_at: i64,
    stream_data_written_at: i64,
    clients: Vec<Arc<LiveStreamClient>>,
    recording: RecordingState,
    psi_archiver: Option<Arc<PsiArchiver>>,
    encoder_task: Option<JoinHandle<()>>,
    encoder_shutdown: Option<Arc<Notify>>,
}

impl Default for StreamInner {
    fn default() -> Self {
        Self {
            status: StreamStatus::Offline,
            detail: String::new(),
            started_at: 0,
            updated_at: 0,
            stream_data_written_at: 0,
            clients: Vec::new(),
            recording: RecordingState::default(),
            psi_archiver: None,
            encoder_task: None,
            encoder_shutdown: None,
        }
    }
}

/// Singleton-per-`(display_channel_id, quality)` live stream orchestrator.
/// Never constructed directly outside `LiveStreamRegistry`.
pub struct LiveStream {
    display_channel_id: String,
    quality: String,
    config: MuxConfig,
    channel_metadata: Arc<dyn ChannelMetadata>,
    recorded_file_registry: Arc<dyn RecordedFileRegistry>,
    tuner: Option<Arc<dyn Tuner>>,
    inner: Mutex<StreamInner>,
}

impl LiveStream {
    pub(crate) fn new(
        display_channel_id: String,
        quality: String,
        config: MuxConfig,
        channel_metadata: Arc<dyn ChannelMetadata>,
        recorded_file_registry: Arc<dyn RecordedFileRegistry>,
        tuner: Option<Arc<dyn Tuner>>,
    ) -> Self {
        Self {
            display_channel_id,
            quality,
            config,
            channel_metadata,
            recorded_file_registry,
            tuner,
            inner: Mutex::new(StreamInner::default()),
        }
    }

    /// The `(display_channel_id, quality)` registry key for this stream.
    pub fn key(&self) -> StreamKey {
        (self.display_channel_id.clone(), self.quality.clone())
    }

    pub fn display_channel_id(&self) -> &str {
        &self.display_channel_id
    }

    pub fn quality(&self) -> &str {
        &self.quality
    }

    pub(crate) fn tuner(&self) -> Option<Arc<dyn Tuner>> {
        self.tuner.clone()
    }

    /// Read-side snapshot for HTTP handlers (spec §4.5.7).
    pub fn get_status(&self) -> StatusSnapshot {
        let inner = self.inner.lock();
        StatusSnapshot {
            status: inner.status,
            detail: inner.detail.clone(),
            started_at: inner.started_at,
            updated_at: inner.updated_at,
            client_count: inner.clients.len(),
            is_recording: inner.recording.is_recording,
            recording_start_time: inner.recording.start_time,
            recording_file_path: inner.recording.file_path.clone(),
        }
    }

    /// Last wall-clock instant, in milliseconds, a non-empty chunk was
    /// broadcast. Consumed by the encoder supervisor's freeze detector
    /// (spec §4.2 step vi).
    pub fn stream_data_written_at(&self) -> i64 {
        self.inner.lock().stream_data_written_at
    }

    /// Whether the encoder is considered frozen given the current status's
    /// threshold (5s ONAir / 20s Standby, spec §5).
    pub(crate) fn is_frozen(&self) -> bool {
        let inner = self.inner.lock();
        let threshold_secs = match inner.status {
            StreamStatus::ONAir => self.config.onair_freeze_secs,
            StreamStatus::Standby => self.config.standby_freeze_secs,
            _ => return false,
        };
        if inner.stream_data_written_at == 0 {
            return false;
        }
        now_millis() - inner.stream_data_written_at > (threshold_secs as i64) * 1000
    }

    /// Sets the stream's status (spec §4.5.6). Returns `true` iff the
    /// state actually changed.
    ///
    /// Guard order (SPEC_FULL.md §B, following the original's method body):
    /// full idempotence guard, then the `Offline|Restart` same-status
    /// guard, then the `Offline -> Restart` forbidden transition.
    pub async fn set_status(
        &self,
        status: StreamStatus,
        detail: impl Into<String>,
        quiet: bool,
    ) -> bool {
        let detail = detail.into();
        let mut unlock_tuner = false;
        let mut lock_tuner = false;

        {
            let mut inner = self.inner.lock();
            if inner.status == status && inner.detail == detail {
                return false;
            }
            if inner.status == status
                && matches!(status, StreamStatus::Offline | StreamStatus::Restart)
            {
                return false;
            }
            if inner.status == StreamStatus::Offline && status == StreamStatus::Restart {
                warn!(
                    "[LiveStream] rejected forbidden Offline -> Restart transition on {}/{}",
                    self.display_channel_id, self.quality
                );
                return false;
            }

            let now = now_millis();
            let from_cold = matches!(inner.status, StreamStatus::Offline | StreamStatus::Restart);
            if from_cold && status == StreamStatus::Standby {
                inner.started_at = now;
                inner.stream_data_written_at = now;
            }
            if !quiet && inner.status == StreamStatus::Standby && status == StreamStatus::ONAir {
                info!(
                    "[LiveStream] {}/{} startup took {}ms",
                    self.display_channel_id,
                    self.quality,
                    now - inner.started_at
                );
            }

            if !quiet {
                debug!(
                    "[LiveStream] {}/{} {} -> {} ({detail})",
                    self.display_channel_id, self.quality, inner.status, status
                );
            }

            inner.status = status;
            inner.detail = detail;
            inner.updated_at = now;

            unlock_tuner = status == StreamStatus::Idling;
            lock_tuner = status == StreamStatus::ONAir;
        }

        if let Some(tuner) = &self.tuner {
            if unlock_tuner {
                tuner.unlock().await;
            } else if lock_tuner {
                tuner.lock().await;
            }
        }

        true
    }

    /// Atomically checks whether the stream is `Offline` and, if so, moves it
    /// to `Standby` before releasing the lock. `connect` used to do this as a
    /// separate `get_status` + `set_status` pair, which let two concurrent
    /// `connect` calls both observe `Offline` and both spawn an encoder task.
    /// Folding the check and the write into one lock acquisition closes that
    /// window.
    fn begin_cold_start_if_offline(&self) -> ColdStart {
        let mut inner = self.inner.lock();
        if inner.status != StreamStatus::Offline {
            return ColdStart::Unchanged(inner.status);
        }

        let now = now_millis();
        debug!(
            "[LiveStream] {}/{} {} -> {} (cold start)",
            self.display_channel_id, self.quality, inner.status, StreamStatus::Standby
        );
        inner.status = StreamStatus::Standby;
        inner.detail = "cold start".to_string();
        inner.started_at = now;
        inner.stream_data_written_at = now;
        inner.updated_at = now;
        ColdStart::Began
    }

    /// Attaches a new client (spec §4.5.1).
    pub async fn connect(self: &Arc<Self>, kind: ClientKind, registry: &LiveStreamRegistry) -> Arc<LiveStreamClient> {
        let cold_start = self.begin_cold_start_if_offline();

        if matches!(cold_start, ColdStart::Began) {
            let key = self.key();
            for attempt in 0..self.config.tuner_preempt_attempts {
                if registry.get_onair_live_streams().is_empty() {
                    debug!("[LiveStream] no ONAir sibling, stopping preempt spin early");
                    break;
                }
                let idling = registry.get_idling_live_streams_except(&key);
                if let Some(sibling) = idling.into_iter().next() {
                    if let Some(tuner) = sibling.tuner() {
                        tuner.unlock().await;
                    }
                    sibling
                        .set_status(StreamStatus::Offline, "tuner reclaimed", false)
                        .await;
                    break;
                }
                if attempt + 1 < self.config.tuner_preempt_attempts {
                    tokio::time::sleep(Duration::from_millis(self.config.tuner_preempt_interval_ms))
                        .await;
                }
            }

            self.spawn_encoder_task();
        }

        let client = Arc::new(LiveStreamClient::new(kind, self.config.client_mailbox_capacity));
        {
            let mut inner = self.inner.lock();
            inner.clients.push(client.clone());
        }

        if matches!(cold_start, ColdStart::Unchanged(StreamStatus::Idling)) {
            self.set_status(StreamStatus::ONAir, "client reconnected while idling", false)
                .await;
        }

        client
    }

    /// Removes a client if present; tolerates an already-removed client
    /// (spec §4.5.2). No status side effects.
    pub fn disconnect(&self, client_id: &str) {
        let mut inner = self.inner.lock();
        inner.clients.retain(|c| c.client_id() != client_id);
    }

    /// Pushes the end-of-stream sentinel to every client, then clears the
    /// list (spec §4.5.3). Used by the encoder supervisor on exit.
    pub async fn disconnect_all(&self) {
        let clients = {
            let mut inner = self.inner.lock();
            std::mem::take(&mut inner.clients)
        };
        for client in clients {
            client.write_stream_data(MailboxItem::EndOfStream);
        }
    }

    /// Broadcasts a chunk to all clients, evicting stale ones first
    /// (spec §4.5.4).
    pub async fn write_stream_data(&self, chunk: Bytes) {
        let (clients_snapshot, evicted_count, should_write_encoded) = {
            let mut inner = self.inner.lock();
            let now = now_millis();
            let timeout_ms = (self.config.client_read_timeout_secs as i64) * 1000;
            let before = inner.clients.len();
            inner
                .clients
                .retain(|c| now - c.last_read_at() < timeout_ms);
            let evicted_count = before - inner.clients.len();

            if !chunk.is_empty() {
                inner.stream_data_written_at = now;
            }

            let should_write_encoded =
                inner.recording.is_recording && inner.recording.mode == RecordingMode::Encoded;
            (inner.clients.clone(), evicted_count, should_write_encoded)
        };

        if evicted_count > 0 {
            debug!(
                "[LiveStream] {}/{} evicted {evicted_count} stale client(s)",
                self.display_channel_id, self.quality
            );
        }

        for client in &clients_snapshot {
            client.write_stream_data(MailboxItem::Chunk(chunk.clone()));
        }

        if should_write_encoded {
            self.append_to_recording_file(&chunk).await;
        }
    }

    /// Guarded no-op unless raw-mode recording is active (spec §4.5.5).
    pub async fn write_raw_recording_chunk(&self, chunk: &Bytes) {
        let should_write = {
            let inner = self.inner.lock();
            inner.recording.is_recording && inner.recording.mode == RecordingMode::Raw
        };
        if should_write {
            self.append_to_recording_file(chunk).await;
        }
    }

    /// Guarded no-op unless the PSI archiver is running (spec §4.5.5).
    pub async fn push_psi_archive_chunk(&self, chunk: &Bytes) {
        let archiver = self.inner.lock().psi_archiver.clone();
        if let Some(archiver) = archiver {
            archiver.push_chunk(chunk).await;
        }
    }

    async fn append_to_recording_file(&self, chunk: &Bytes) {
        let mut file = match self.inner.lock().recording.file.take() {
            Some(file) => file,
            None => return,
        };
        match file.write_all(chunk).await {
            Ok(()) => {
                self.inner.lock().recording.file = Some(file);
            }
            Err(err) => {
                warn!(
                    "[Recording] write failed on {}/{}, stopping recording: {err}",
                    self.display_channel_id, self.quality
                );
                drop(file);
                self.stop_recording_internal().await;
            }
        }
    }

    /// Starts recording (spec §4.4). Returns `(success, message)`; never
    /// raises across the public surface (spec §7).
    pub async fn start_recording(&self) -> (bool, String) {
        if self.get_status().status != StreamStatus::ONAir {
            return (false, "not ONAir".to_string());
        }
        if self.get_status().is_recording {
            return (false, "already recording".to_string());
        }

        let Some(folder) = self.config.recorded_folders.first().cloned() else {
            return (false, "no recording folder configured".to_string());
        };
        if let Err(err) = tokio::fs::create_dir_all(&folder).await {
            return (false, format!("failed to create recording folder: {err}"));
        }

        let channel = self.channel_metadata.get(&self.display_channel_id).await;
        let channel_name = channel
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| self.display_channel_id.clone());
        let service_id = channel.as_ref().map(|c| c.service_id);
        let title = match &channel {
            Some(channel) => {
                let (current, _next) = self
                    .channel_metadata
                    .get_current_and_next_program(channel)
                    .await;
                current
                    .map(|p| p.title)
                    .unwrap_or_else(|| NO_PROGRAM_TITLE.to_string())
            }
            None => NO_PROGRAM_TITLE.to_string(),
        };

        let now = now_millis();
        let stem = build_recording_stem(&channel_name, &title, now);
        let file_path = folder.join(format!("{stem}.ts"));
        let psc_path = folder.join(format!("{stem}.psc"));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .await
        {
            Ok(file) => file,
            Err(err) => return (false, format!("failed to open recording file: {err}")),
        };

        let archiver = match service_id {
            Some(service_id) => {
                let archiver = Arc::new(PsiArchiver::new(
                    self.config.psi_archiver_binary.clone(),
                    Duration::from_secs(self.config.psi_archiver_stop_timeout_secs),
                ));
                if let Err(err) = archiver.start(service_id, &psc_path).await {
                    warn!("[PsiArchiver] best-effort start failed, continuing without it: {err}");
                    None
                } else {
                    Some(archiver)
                }
            }
            None => {
                warn!("[PsiArchiver] no service_id available, recording without a PSI archive");
                None
            }
        };

        {
            let mut inner = self.inner.lock();
            inner.recording.is_recording = true;
            inner.recording.mode = RecordingMode::Raw;
            inner.recording.file_path = Some(file_path.clone());
            inner.recording.file = Some(file);
            inner.recording.start_time = now;
            inner.recording.psi_archive_path = Some(psc_path);
            inner.psi_archiver = archiver;
        }

        self.recorded_file_registry.register_recording_file(&file_path).await;

        (true, "recording started".to_string())
    }

    /// Stops recording (spec §4.4). Idempotent; returns `(false, "not
    /// recording")` on a redundant call (spec §8).
    pub async fn stop_recording(&self) -> (bool, String) {
        if !self.get_status().is_recording {
            return (false, "not recording".to_string());
        }
        self.stop_recording_internal().await;
        (true, "recording stopped".to_string())
    }

    async fn stop_recording_internal(&self) {
        let (archiver, file_path) = {
            let inner = self.inner.lock();
            (inner.psi_archiver.clone(), inner.recording.file_path.clone())
        };

        if let Some(archiver) = archiver {
            archiver.stop().await;
        }

        {
            let mut inner = self.inner.lock();
            inner.recording.file = None;
            inner.recording.reset();
            inner.psi_archiver = None;
        }

        if let Some(file_path) = file_path {
            self.recorded_file_registry
                .unregister_recording_file(&file_path)
                .await;
        }
    }

    fn spawn_encoder_task(self: &Arc<Self>) {
        let shutdown = Arc::new(Notify::new());
        let stream = self.clone();
        let command = self.config.encoder_command.clone();
        let shutdown_for_task = shutdown.clone();
        let handle = tokio::spawn(async move {
            crate::encoder::run(stream, command, shutdown_for_task).await;
        });

        let mut inner = self.inner.lock();
        inner.encoder_task = Some(handle);
        inner.encoder_shutdown = Some(shutdown);
    }

    /// Cancels and joins the encoder supervision task, if any (spec §9,
    /// "Dynamic task handles": explicit ownership, joined/cancelled on
    /// teardown).
    pub async fn shutdown(&self) {
        let (shutdown, handle) = {
            let mut inner = self.inner.lock();
            (inner.encoder_shutdown.take(), inner.encoder_task.take())
        };
        if let Some(shutdown) = shutdown {
            shutdown.notify_one();
        }
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_meta::Channel;
    use crate::recorded_registry::NullRecordedFileRegistry;
    use crate::registry::LiveStreamRegistry;
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
        ) -> (Option<crate::channel_meta::Program>, Option<crate::channel_meta::Program>) {
            (None, None)
        }
    }

    fn make_stream() -> Arc<LiveStream> {
        Arc::new(LiveStream::new(
            "gr011".to_string(),
            "1080p".to_string(),
            MuxConfig::default(),
            Arc::new(NoMetadata),
            Arc::new(NullRecordedFileRegistry),
            None,
        ))
    }

    #[tokio::test]
    async fn starts_offline() {
        let stream = make_stream();
        assert_eq!(stream.get_status().status, StreamStatus::Offline);
    }

    #[tokio::test]
    async fn offline_to_restart_is_forbidden() {
        let stream = make_stream();
        let changed = stream.set_status(StreamStatus::Restart, "bogus", false).await;
        assert!(!changed);
        assert_eq!(stream.get_status().status, StreamStatus::Offline);
    }

    #[tokio::test]
    async fn redundant_offline_setstatus_is_idempotent() {
        let stream = make_stream();
        let first = stream.set_status(StreamStatus::Offline, "x", false).await;
        let second = stream.set_status(StreamStatus::Offline, "x", false).await;
        assert!(!first);
        assert!(!second);
    }

    #[tokio::test]
    async fn same_status_different_detail_rejected_for_offline() {
        let stream = make_stream();
        // Initial status is already Offline with an empty detail; setting
        // Offline again with a different detail must still be rejected
        // (spec §3 idempotence guard on Offline|Restart).
        let changed = stream.set_status(StreamStatus::Offline, "different", false).await;
        assert!(!changed);
    }

    #[tokio::test]
    async fn standby_refreshes_started_at() {
        let stream = make_stream();
        let changed = stream.set_status(StreamStatus::Standby, "cold start", false).await;
        assert!(changed);
        let status = stream.get_status();
        assert_eq!(status.status, StreamStatus::Standby);
        assert!(status.started_at > 0);
    }

    #[tokio::test]
    async fn stop_recording_twice_returns_not_recording() {
        let stream = make_stream();
        let (ok, msg) = stream.stop_recording().await;
        assert!(!ok);
        assert_eq!(msg, "not recording");
    }

    #[tokio::test]
    async fn start_recording_refuses_when_not_onair() {
        let stream = make_stream();
        let (ok, msg) = stream.start_recording().await;
        assert!(!ok);
        assert_eq!(msg, "not ONAir");
    }

    #[tokio::test]
    async fn disconnect_all_empties_client_list() {
        let stream = make_stream();
        {
            let mut inner = stream.inner.lock();
            inner
                .clients
                .push(Arc::new(LiveStreamClient::new(ClientKind::Mpegts, 4)));
        }
        assert_eq!(stream.get_status().client_count, 1);
        stream.disconnect_all().await;
        assert_eq!(stream.get_status().client_count, 0);
    }

    #[tokio::test]
    async fn disconnect_all_delivers_end_of_stream() {
        let stream = make_stream();
        let client = Arc::new(LiveStreamClient::new(ClientKind::Mpegts, 4));
        {
            let mut inner = stream.inner.lock();
            inner.clients.push(client.clone());
        }
        stream.disconnect_all().await;
        match client.read_stream_data().await {
            MailboxItem::EndOfStream => {}
            MailboxItem::Chunk(_) => panic!("expected end-of-stream sentinel"),
        }
    }

    #[tokio::test]
    async fn disconnect_tolerates_unknown_client_id() {
        let stream = make_stream();
        stream.disconnect("does-not-exist");
        assert_eq!(stream.get_status().client_count, 0);
    }

    struct FixedMetadata;

    #[async_trait]
    impl ChannelMetadata for FixedMetadata {
        async fn get(&self, display_channel_id: &str) -> Option<Channel> {
            Some(Channel {
                display_channel_id: display_channel_id.to_string(),
                name: "Test Channel".to_string(),
                service_id: 1024,
            })
        }
        async fn get_current_and_next_program(
            &self,
            _channel: &Channel,
        ) -> (Option<crate::channel_meta::Program>, Option<crate::channel_meta::Program>) {
            (
                Some(crate::channel_meta::Program {
                    title: "Evening News".to_string(),
                }),
                None,
            )
        }
    }

    fn make_onair_stream_with_folder(folder: PathBuf) -> Arc<LiveStream> {
        let config = MuxConfig {
            recorded_folders: vec![folder],
            ..MuxConfig::default()
        };
        Arc::new(LiveStream::new(
            "gr011".to_string(),
            "1080p".to_string(),
            config,
            Arc::new(FixedMetadata),
            Arc::new(NullRecordedFileRegistry),
            None,
        ))
    }

    #[tokio::test]
    async fn start_recording_opens_file_under_configured_folder() {
        let dir = tempfile::tempdir().unwrap();
        let stream = make_onair_stream_with_folder(dir.path().to_path_buf());
        stream.set_status(StreamStatus::Standby, "cold start", false).await;
        stream.set_status(StreamStatus::ONAir, "first chunk received", false).await;

        let (ok, msg) = stream.start_recording().await;
        assert!(ok, "start_recording failed: {msg}");

        let status = stream.get_status();
        assert!(status.is_recording);
        let file_path = status.recording_file_path.expect("file path set");
        assert!(file_path.starts_with(dir.path()));
        assert!(file_path.to_string_lossy().contains("Test Channel"));
        assert!(file_path.to_string_lossy().contains("Evening News"));
    }

    #[tokio::test]
    async fn write_raw_recording_chunk_appends_bytes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let stream = make_onair_stream_with_folder(dir.path().to_path_buf());
        stream.set_status(StreamStatus::Standby, "cold start", false).await;
        stream.set_status(StreamStatus::ONAir, "first chunk received", false).await;
        let (ok, _) = stream.start_recording().await;
        assert!(ok);

        let file_path = stream.get_status().recording_file_path.unwrap();
        stream.write_raw_recording_chunk(&Bytes::from_static(b"hello")).await;
        stream.write_raw_recording_chunk(&Bytes::from_static(b" world")).await;

        // Drop the in-memory handle so the OS flushes before we read it back.
        stream.stop_recording().await;

        let contents = std::fs::read(&file_path).unwrap();
        assert_eq!(contents, b"hello world");
    }

    #[tokio::test]
    async fn start_recording_refuses_when_already_recording() {
        let dir = tempfile::tempdir().unwrap();
        let stream = make_onair_stream_with_folder(dir.path().to_path_buf());
        stream.set_status(StreamStatus::Standby, "cold start", false).await;
        stream.set_status(StreamStatus::ONAir, "first chunk received", false).await;
        assert!(stream.start_recording().await.0);

        let (ok, msg) = stream.start_recording().await;
        assert!(!ok);
        assert_eq!(msg, "already recording");
    }

    fn make_stream_with_encoder_command(command: Vec<String>) -> Arc<LiveStream> {
        let config = MuxConfig {
            encoder_command: command,
            ..MuxConfig::default()
        };
        Arc::new(LiveStream::new(
            "gr011".to_string(),
            "1080p".to_string(),
            config,
            Arc::new(NoMetadata),
            Arc::new(NullRecordedFileRegistry),
            None,
        ))
    }

    async fn wait_for_status(stream: &LiveStream, status: StreamStatus, within: Duration) {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if stream.get_status().status == status {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for status {status:?}, last seen {:?}", stream.get_status().status);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Regression test for the encoder supervisor's terminal-exit path (spec
    /// §4.2 step vii, §4.5.9 "encoder exits" arrow): a subprocess that
    /// writes once and exits must disconnect every client and drop the
    /// stream to `Offline`, never leaving it stuck mid-state.
    #[tokio::test]
    async fn encoder_exit_disconnects_clients_and_returns_offline() {
        let stream = make_stream_with_encoder_command(vec![
            "sh".to_string(),
            "-c".to_string(),
            "printf '\\107'".to_string(),
        ]);
        let registry = LiveStreamRegistry::new(
            MuxConfig::default(),
            Arc::new(NoMetadata),
            Arc::new(NullRecordedFileRegistry),
        );

        let client = stream.connect(ClientKind::Mpegts, &registry).await;

        wait_for_status(&stream, StreamStatus::Offline, Duration::from_secs(3)).await;
        assert_eq!(stream.get_status().client_count, 0);

        match client.read_stream_data().await {
            MailboxItem::EndOfStream => {}
            MailboxItem::Chunk(_) => panic!("expected end-of-stream sentinel after encoder exit"),
        }
    }

    /// Regression test: a freeze must respawn the encoder (`Restart ->
    /// Standby`) without disconnecting clients, in contrast to a real
    /// encoder exit. Uses a tiny freeze threshold so the test doesn't wait
    /// on the production 5s/20s thresholds.
    #[tokio::test]
    async fn freeze_respawns_encoder_without_disconnecting_clients() {
        let config = MuxConfig {
            onair_freeze_secs: 1,
            standby_freeze_secs: 1,
            encoder_command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "printf '\\107'; sleep 5".to_string(),
            ],
            ..MuxConfig::default()
        };
        let stream = Arc::new(LiveStream::new(
            "gr011".to_string(),
            "1080p".to_string(),
            config,
            Arc::new(NoMetadata),
            Arc::new(NullRecordedFileRegistry),
            None,
        ));
        let registry = LiveStreamRegistry::new(
            MuxConfig::default(),
            Arc::new(NoMetadata),
            Arc::new(NullRecordedFileRegistry),
        );

        let _client = stream.connect(ClientKind::Mpegts, &registry).await;
        wait_for_status(&stream, StreamStatus::ONAir, Duration::from_secs(2)).await;

        // Give the freeze watcher time to trip and the attempt to respawn
        // at least once; the stream must still be alive (not Offline) and
        // the client must still be attached throughout.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_ne!(stream.get_status().status, StreamStatus::Offline);
        assert_eq!(stream.get_status().client_count, 1);

        stream.shutdown().await;
        wait_for_status(&stream, StreamStatus::Offline, Duration::from_secs(2)).await;
        assert_eq!(stream.get_status().client_count, 0);
    }

    /// Regression test for the previously-dead `Idling -> ONAir` wake in
    /// `connect` (spec §4.5.2, §4.5.9): once the health watcher's
    /// `client_count == 0` demotion (encoder.rs) actually runs, the last
    /// client leaving an `ONAir` stream must demote it to `Idling`, and a
    /// fresh `connect` must wake it straight back to `ONAir` without tearing
    /// down and respawning the encoder.
    #[tokio::test]
    async fn idling_stream_wakes_to_onair_on_reconnect() {
        let stream = make_stream_with_encoder_command(vec![
            "sh".to_string(),
            "-c".to_string(),
            "printf '\\107'; sleep 5".to_string(),
        ]);
        let registry = LiveStreamRegistry::new(
            MuxConfig::default(),
            Arc::new(NoMetadata),
            Arc::new(NullRecordedFileRegistry),
        );

        let client = stream.connect(ClientKind::Mpegts, &registry).await;
        wait_for_status(&stream, StreamStatus::ONAir, Duration::from_secs(2)).await;

        stream.disconnect(client.client_id());
        wait_for_status(&stream, StreamStatus::Idling, Duration::from_secs(2)).await;

        let _second_client = stream.connect(ClientKind::Mpegts, &registry).await;
        assert_eq!(stream.get_status().status, StreamStatus::ONAir);

        stream.shutdown().await;
        wait_for_status(&stream, StreamStatus::Offline, Duration::from_secs(2)).await;
    }

    /// Regression test for the previously-dead tuner-preemption spin in
    /// `connect` (spec §4.5.1 step 3): with one sibling `ONAir` and another
    /// `Idling`, a cold `connect` on a third stream must reclaim the idling
    /// sibling's tuner and drop it to `Offline`.
    #[tokio::test]
    async fn connect_preempts_idling_sibling_tuner() {
        let registry = LiveStreamRegistry::new(
            MuxConfig::default(),
            Arc::new(NoMetadata),
            Arc::new(NullRecordedFileRegistry),
        );

        let onair_sibling = registry.get_or_create("gr011", "720p", None);
        onair_sibling
            .set_status(StreamStatus::Standby, "cold start", false)
            .await;
        onair_sibling
            .set_status(StreamStatus::ONAir, "first chunk received", false)
            .await;

        let idling_tuner = Arc::new(CountingTuner::default());
        let idling_sibling =
            registry.get_or_create("gr012", "1080p", Some(idling_tuner.clone() as Arc<dyn Tuner>));
        idling_sibling
            .set_status(StreamStatus::Standby, "cold start", false)
            .await;
        idling_sibling
            .set_status(StreamStatus::ONAir, "first chunk received", false)
            .await;
        idling_sibling
            .set_status(StreamStatus::Idling, "last client disconnected", false)
            .await;
        assert_eq!(idling_tuner.unlock_count(), 1);

        let connecting = make_stream_with_encoder_command(vec![
            "sh".to_string(),
            "-c".to_string(),
            "printf '\\107'; sleep 5".to_string(),
        ]);
        let _client = connecting.connect(ClientKind::Mpegts, &registry).await;

        wait_for_status(&idling_sibling, StreamStatus::Offline, Duration::from_secs(2)).await;
        assert_eq!(idling_tuner.unlock_count(), 2, "preemption must unlock the reclaimed tuner again");

        connecting.shutdown().await;
        wait_for_status(&connecting, StreamStatus::Offline, Duration::from_secs(2)).await;
    }

    #[derive(Default)]
    struct CountingTuner {
        unlocks: std::sync::atomic::AtomicUsize,
    }

    impl CountingTuner {
        fn unlock_count(&self) -> usize {
            self.unlocks.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Tuner for CountingTuner {
        async fn lock(&self) {}
        async fn unlock(&self) {
            self.unlocks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }
}
