//! Thin handle to the tuner-hardware control protocol.
//!
//! The core never speaks the tuner protocol itself; it only ever calls
//! `lock`/`unlock` on a handle supplied by whatever upstream collaborator
//! owns the physical device.

use async_trait::async_trait;

/// A scarce hardware resource abstracted as a lock/unlock handle.
///
/// At most one live stream may hold a given tuner locked at a time; the
/// core coordinates this only through `connect`'s preemption spin
/// (see `LiveStream::connect`), never by inspecting the tuner itself.
#[async_trait]
pub trait Tuner: Send + Sync {
    /// Acquires exclusive use of the tuner.
    async fn lock(&self);

    /// Releases exclusive use of the tuner.
    async fn unlock(&self);
}
