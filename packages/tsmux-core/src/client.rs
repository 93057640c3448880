//! Per-client bounded byte-chunk mailbox (spec §4.1).
//!
//! A `LiveStreamClient` is never constructed directly; it is only produced
//! by `LiveStream::connect` (see `live_stream.rs`), which is the only thing
//! allowed to hand out a `client_id`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::time::now_millis;

const CLIENT_ID_PREFIX: &str = "MPEGTS-";
const CLIENT_ID_SUFFIX_LEN: usize = 10;
const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generates a client id: `MPEGTS-` followed by a length-10 base36
/// encoding of a millisecond timestamp, left-padded with `0`.
///
/// The original implementation uses a Hashids encoding of the same
/// timestamp; base36 is a deterministic, dependency-free analogue with the
/// same "short, collision-resistant, human-legible" property (see
/// SPEC_FULL.md §B).
pub fn generate_client_id(millis: i64) -> String {
    let mut value = millis.max(0) as u64;
    let mut digits = [b'0'; CLIENT_ID_SUFFIX_LEN];
    for slot in digits.iter_mut().rev() {
        *slot = BASE36_ALPHABET[(value % 36) as usize];
        value /= 36;
    }
    let mut id = String::with_capacity(CLIENT_ID_PREFIX.len() + CLIENT_ID_SUFFIX_LEN);
    id.push_str(CLIENT_ID_PREFIX);
    id.push_str(std::str::from_utf8(&digits).expect("base36 alphabet is ASCII"));
    id
}

/// The one kind of client this design admits today (spec §9, "Duck-typed
/// client kind").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Mpegts,
}

/// An item delivered through a client's mailbox.
#[derive(Debug, Clone)]
pub enum MailboxItem {
    /// An opaque MPEG-TS chunk.
    Chunk(Bytes),
    /// The end-of-stream sentinel, delivered by `disconnectAll`.
    EndOfStream,
}

struct Mailbox {
    queue: Mutex<VecDeque<MailboxItem>>,
    notify: Notify,
    capacity: usize,
}

impl Mailbox {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueues an item, dropping the oldest queued item if over capacity.
    /// Never blocks and never suspends.
    fn push(&self, item: MailboxItem) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(item);
        drop(queue);
        self.notify.notify_one();
    }

    fn try_pop(&self) -> Option<MailboxItem> {
        self.queue.lock().pop_front()
    }
}

/// A client attached to a `LiveStream`, created only through `connect`.
pub struct LiveStreamClient {
    client_id: String,
    kind: ClientKind,
    mailbox: Arc<Mailbox>,
    last_read_at: AtomicI64,
}

impl LiveStreamClient {
    /// Creates a new client with a mailbox of the given capacity.
    ///
    /// `pub(crate)` because only `LiveStream::connect` is allowed to mint
    /// clients (spec §3, "created only through `LiveStream.connect`").
    pub(crate) fn new(kind: ClientKind, mailbox_capacity: usize) -> Self {
        let now = now_millis();
        Self {
            client_id: generate_client_id(now),
            kind,
            mailbox: Arc::new(Mailbox::new(mailbox_capacity)),
            last_read_at: AtomicI64::new(now),
        }
    }

    /// The client's identifier, stable for its lifetime.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The client kind.
    pub fn kind(&self) -> ClientKind {
        self.kind
    }

    /// Wall-clock instant, in milliseconds, of the last successful read.
    pub fn last_read_at(&self) -> i64 {
        self.last_read_at.load(Ordering::Acquire)
    }

    /// Non-blocking enqueue; drops the oldest item on overflow (spec §4.1).
    /// Never suspends, so a slow reader never blocks the broadcast path.
    pub(crate) fn write_stream_data(&self, item: MailboxItem) {
        self.mailbox.push(item);
    }

    /// Yields the next chunk or the end-of-stream sentinel, suspending
    /// while the mailbox is empty. Refreshes `last_read_at` before
    /// suspending so the eviction sweep observes progress even on this
    /// call that is still waiting (spec §4.1).
    pub async fn read_stream_data(&self) -> MailboxItem {
        loop {
            self.last_read_at
                .store(now_millis(), Ordering::Release);
            if let Some(item) = self.mailbox.try_pop() {
                return item;
            }
            let notified = self.mailbox.notify.notified();
            if let Some(item) = self.mailbox.try_pop() {
                return item;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for LiveStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveStreamClient")
            .field("client_id", &self.client_id)
            .field("kind", &self.kind)
            .field("last_read_at", &self.last_read_at())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_has_prefix_and_length() {
        let id = generate_client_id(1_700_000_000_000);
        assert!(id.starts_with(CLIENT_ID_PREFIX));
        assert_eq!(id.len(), CLIENT_ID_PREFIX.len() + CLIENT_ID_SUFFIX_LEN);
    }

    #[test]
    fn distinct_timestamps_yield_distinct_ids() {
        let a = generate_client_id(1_700_000_000_000);
        let b = generate_client_id(1_700_000_000_001);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn write_then_read_roundtrips_a_chunk() {
        let client = LiveStreamClient::new(ClientKind::Mpegts, 8);
        client.write_stream_data(MailboxItem::Chunk(Bytes::from_static(b"abc")));
        match client.read_stream_data().await {
            MailboxItem::Chunk(bytes) => assert_eq!(&bytes[..], b"abc"),
            MailboxItem::EndOfStream => panic!("expected a chunk"),
        }
    }

    #[tokio::test]
    async fn overflow_drops_oldest_chunk() {
        let client = LiveStreamClient::new(ClientKind::Mpegts, 2);
        client.write_stream_data(MailboxItem::Chunk(Bytes::from_static(b"1")));
        client.write_stream_data(MailboxItem::Chunk(Bytes::from_static(b"2")));
        client.write_stream_data(MailboxItem::Chunk(Bytes::from_static(b"3")));

        let first = client.read_stream_data().await;
        match first {
            MailboxItem::Chunk(bytes) => assert_eq!(&bytes[..], b"2"),
            MailboxItem::EndOfStream => panic!("expected a chunk"),
        }
    }

    #[tokio::test]
    async fn last_read_at_advances_on_read() {
        let client = LiveStreamClient::new(ClientKind::Mpegts, 4);
        let before = client.last_read_at();
        client.write_stream_data(MailboxItem::Chunk(Bytes::from_static(b"x")));
        client.read_stream_data().await;
        assert!(client.last_read_at() >= before);
    }
}
