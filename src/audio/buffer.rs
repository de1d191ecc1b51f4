// ABOUTME: Bounded FIFO of decoded, timestamped PCM chunks
// ABOUTME: Producer drops on a full queue after a bounded wait; consumer dequeues with timeout

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::audio::chunk::PcmChunk;

pub const DEFAULT_CAPACITY: usize = 50;
const PRODUCER_WAIT: Duration = Duration::from_millis(1000);

/// Bounded FIFO queue sitting between the decoder (producer) and the scheduler (consumer). On
/// overflow the producer waits briefly then drops the new chunk rather than blocking the
/// protocol task indefinitely.
pub struct ChunkBuffer {
    tx: Sender<PcmChunk>,
    rx: Receiver<PcmChunk>,
}

impl ChunkBuffer {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    pub fn producer(&self) -> ChunkProducer {
        ChunkProducer {
            tx: self.tx.clone(),
        }
    }

    pub fn consumer(&self) -> ChunkConsumer {
        ChunkConsumer {
            rx: self.rx.clone(),
        }
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[derive(Clone)]
pub struct ChunkProducer {
    tx: Sender<PcmChunk>,
}

impl ChunkProducer {
    /// Push a chunk. On a full queue, waits up to 1000ms for room, then drops the new chunk and
    /// returns `false` so the caller can log it.
    pub fn push(&self, chunk: PcmChunk) -> bool {
        match self.tx.send_timeout(chunk, PRODUCER_WAIT) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(dropped)) => {
                log::warn!(
                    "chunk buffer full after {}ms wait, dropping chunk at timestamp {}",
                    PRODUCER_WAIT.as_millis(),
                    dropped.timestamp_us
                );
                false
            }
            Err(SendTimeoutError::Disconnected(_)) => false,
        }
    }
}

#[derive(Clone)]
pub struct ChunkConsumer {
    rx: Receiver<PcmChunk>,
}

impl ChunkConsumer {
    /// Dequeue with a timeout, used by the scheduler both to get the next chunk and as a
    /// liveness check when idle.
    pub fn pop(&self, timeout: Duration) -> Option<PcmChunk> {
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => Some(chunk),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
