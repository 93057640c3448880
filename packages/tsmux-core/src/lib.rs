//! tsmux-core - shared library for the live broadcast stream multiplexer.
//!
//! This crate sits between a physical TV tuner (or an upstream broadcast
//! gateway) and an arbitrary number of HTTP clients subscribed to the same
//! channel at the same quality. It accepts a single raw MPEG-TS byte stream
//! from a supervised encoder subprocess, fans it out to all connected
//! viewers with bounded buffering and per-client timeout, manages the
//! encoder's lifecycle so tuner resources are reclaimed when nobody is
//! watching, and optionally tees the live stream to disk alongside a
//! PSI/SI archive produced by a sibling subprocess.
//!
//! # Architecture
//!
//! - [`live_stream`]: the singleton-per-(channel,quality) orchestrator —
//!   state machine, broadcast, eviction, tuner arbitration.
//! - [`registry`]: the process-wide `(channel, quality) -> LiveStream` map.
//! - [`client`]: per-client bounded mailbox and client id generation.
//! - [`encoder`]: concrete subprocess supervision for the external encoder.
//! - [`psi_archiver`]: concrete subprocess supervision for `psisiarc`.
//! - [`recording`]: recording-tee state and filename conventions.
//! - [`tuner`], [`channel_meta`], [`recorded_registry`]: narrow contracts
//!   for the external collaborators this crate does not implement.
//! - [`config`]: runtime configuration.
//! - [`error`]: centralized error types.
//! - [`bootstrap`]: composition root wiring the above together.
//! - [`api`]: a thin status/control HTTP surface over the core's contract.
//!
//! # Abstraction traits
//!
//! [`tuner::Tuner`], [`channel_meta::ChannelMetadata`] and
//! [`recorded_registry::RecordedFileRegistry`] decouple this crate from the
//! database, EPG and tuner-hardware layers it deliberately does not own.

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod channel_meta;
pub mod client;
pub mod config;
pub mod encoder;
pub mod error;
pub mod live_stream;
pub mod psi_archiver;
pub mod recorded_registry;
pub mod recording;
pub mod registry;
mod time;
pub mod tuner;

pub use api::{start_server, AppState, AppStateBuilder, ServerError};
pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use channel_meta::{Channel, ChannelMetadata, Program, NO_PROGRAM_TITLE};
pub use client::{ClientKind, LiveStreamClient, MailboxItem};
pub use config::MuxConfig;
pub use error::{ErrorCode, MuxError, MuxResult};
pub use live_stream::{LiveStream, StatusSnapshot, StreamStatus};
pub use psi_archiver::PsiArchiver;
pub use recorded_registry::{NullRecordedFileRegistry, RecordedFileRegistry};
pub use recording::{sanitize_path_component, RecordingMode, RecordingState};
pub use registry::{LiveStreamRegistry, StreamKey};
pub use time::now_millis;
pub use tuner::Tuner;
