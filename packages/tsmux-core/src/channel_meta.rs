//! Channel and program metadata collaborator.
//!
//! The database layer that actually holds this data is out of scope
//! (spec §1); this module only declares the narrow contract the core
//! consumes from it.

use async_trait::async_trait;

/// Placeholder program title used when no current program is reported.
pub const NO_PROGRAM_TITLE: &str = "番組情報なし";

/// A broadcast channel as seen by the metadata collaborator.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Stable routing key, e.g. `gr011`.
    pub display_channel_id: String,
    /// Human-readable channel name, used in recording filenames.
    pub name: String,
    /// Service id used to invoke the PSI/SI archiver.
    pub service_id: u32,
}

/// A single EPG program entry.
#[derive(Debug, Clone)]
pub struct Program {
    /// Program title, used in recording filenames.
    pub title: String,
}

/// Metadata lookup consumed by the recording tee and PSI archiver.
#[async_trait]
pub trait ChannelMetadata: Send + Sync {
    /// Looks up a channel by its display id.
    async fn get(&self, display_channel_id: &str) -> Option<Channel>;

    /// Returns the channel's current and next program, if known.
    ///
    /// When there is no current program, callers substitute
    /// [`NO_PROGRAM_TITLE`] for the title rather than treating absence as
    /// an error.
    async fn get_current_and_next_program(
        &self,
        channel: &Channel,
    ) -> (Option<Program>, Option<Program>);
}
