//! Chunked byte streaming between pipeline stages.
//!
//! Plaintext and ciphertext flow through bounded mpsc channels of
//! [`Bytes`]. The bound gives backpressure: a producer suspends when the
//! consumer falls behind, so a large message never has to be resident
//! twice.

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

/// Default channel bound, in chunks.
pub const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// Default chunk size for producers that split a contiguous buffer.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

pub type ChunkSender = mpsc::Sender<Bytes>;
pub type ChunkReceiver = mpsc::Receiver<Bytes>;

/// Create a bounded chunk channel.
pub fn chunk_channel() -> (ChunkSender, ChunkReceiver) {
    mpsc::channel(CHUNK_CHANNEL_CAPACITY)
}

/// Send a contiguous buffer as a sequence of chunks.
///
/// Returns `false` if the receiver hung up; producers treat that as
/// cancellation, not as an error of their own.
pub async fn send_split(tx: &ChunkSender, data: Bytes, chunk_size: usize) -> bool {
    let mut remaining = data;
    while !remaining.is_empty() {
        let take = remaining.len().min(chunk_size);
        let chunk = remaining.split_to(take);
        if tx.send(chunk).await.is_err() {
            return false;
        }
    }
    true
}

/// Drain a chunk stream into one contiguous buffer.
pub async fn collect(rx: &mut ChunkReceiver) -> Bytes {
    let mut buf = BytesMut::new();
    while let Some(chunk) = rx.recv().await {
        buf.extend_from_slice(&chunk);
    }
    buf.freeze()
}
