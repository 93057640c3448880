//! External recorded-file registry collaborator.
//!
//! The recorded-file post-scan pipeline lives outside this crate (spec §1);
//! the recording tee only needs to announce when a live capture starts or
//! stops so the scanner can skip files that are still being written.

use std::path::Path;

use async_trait::async_trait;

/// Best-effort notifier for in-progress live recordings.
///
/// Both methods are best-effort: failures are logged as warnings and never
/// propagate to the recording tee's own start/stop result.
#[async_trait]
pub trait RecordedFileRegistry: Send + Sync {
    /// Announces that `path` is currently being written by a live capture.
    async fn register_recording_file(&self, path: &Path);

    /// Announces that `path` is no longer being written.
    async fn unregister_recording_file(&self, path: &Path);
}

/// A registry that does nothing, for deployments with no downstream scanner.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecordedFileRegistry;

#[async_trait]
impl RecordedFileRegistry for NullRecordedFileRegistry {
    async fn register_recording_file(&self, _path: &Path) {}
    async fn unregister_recording_file(&self, _path: &Path) {}
}
