// crates/stream/src/output.rs
//! Append-only console output log with independent reader cursors.
//!
//! The producer appends into a shared `Vec` of immutable chunks and bumps a
//! `watch` channel; readers keep their own position and read lazily, so a slow
//! reader never holds the producer up.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;

use crate::error::StreamError;
use crate::types::{JobId, OutputChunk};

#[derive(Default)]
struct Log {
    chunks: Vec<OutputChunk>,
    closed: bool,
}

/// Wake-up signal published after every append and on close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tail {
    len: usize,
    closed: bool,
}

/// Single-writer, multi-reader output channel for one job execution.
pub struct OutputChannel {
    job_id: JobId,
    log: RwLock<Log>,
    tail_tx: watch::Sender<Tail>,
}

impl OutputChannel {
    pub fn new(job_id: JobId) -> Self {
        let (tail_tx, _) = watch::channel(Tail::default());
        Self {
            job_id,
            log: RwLock::new(Log::default()),
            tail_tx,
        }
    }

    /// Append one chunk and wake every waiting reader.
    ///
    /// Appending after `close` is a producer bug: it fails loudly in debug
    /// builds and returns `StreamError::ChannelClosed` otherwise.
    pub fn append(&self, text: impl Into<Arc<str>>) -> Result<u64, StreamError> {
        let len = {
            let mut log = self.write_log();
            if log.closed {
                tracing::error!(job_id = %self.job_id, "append after output channel close");
                debug_assert!(!log.closed, "append after output channel close");
                return Err(StreamError::ChannelClosed(self.job_id.clone()));
            }
            let seq = log.chunks.len() as u64;
            log.chunks.push(OutputChunk::new(seq, text.into()));
            log.chunks.len()
        };
        self.tail_tx.send_modify(|tail| tail.len = len);
        Ok((len - 1) as u64)
    }

    /// Close the channel. Idempotent; returns `true` on the first call only.
    ///
    /// Readers still drain every chunk appended before the close, then see
    /// end of stream.
    pub fn close(&self) -> bool {
        {
            let mut log = self.write_log();
            if log.closed {
                return false;
            }
            log.closed = true;
        }
        self.tail_tx.send_modify(|tail| tail.closed = true);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.read_log().closed
    }

    pub fn len(&self) -> usize {
        self.read_log().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a cursor at the current tail. It sees only chunks appended from now on.
    pub fn open_reader(self: &Arc<Self>) -> OutputReader {
        // Subscribe before sampling the length so an append in between is
        // still signalled to the new reader.
        let tail_rx = self.tail_tx.subscribe();
        let position = self.len();
        OutputReader {
            channel: Arc::clone(self),
            tail_rx,
            position,
        }
    }

    /// Open a cursor at position zero, replaying everything still buffered.
    pub fn open_reader_from_start(self: &Arc<Self>) -> OutputReader {
        OutputReader {
            channel: Arc::clone(self),
            tail_rx: self.tail_tx.subscribe(),
            position: 0,
        }
    }

    fn chunk_at(&self, position: usize) -> Option<OutputChunk> {
        self.read_log().chunks.get(position).cloned()
    }

    fn read_log(&self) -> RwLockReadGuard<'_, Log> {
        self.log.read().unwrap_or_else(|e| {
            tracing::error!(job_id = %self.job_id, "RwLock poisoned reading output log: {e}");
            e.into_inner()
        })
    }

    fn write_log(&self) -> RwLockWriteGuard<'_, Log> {
        self.log.write().unwrap_or_else(|e| {
            tracing::error!(job_id = %self.job_id, "RwLock poisoned writing output log: {e}");
            e.into_inner()
        })
    }
}

/// A reader's cursor into an `OutputChannel`.
pub struct OutputReader {
    channel: Arc<OutputChannel>,
    tail_rx: watch::Receiver<Tail>,
    position: usize,
}

impl OutputReader {
    /// Wait for the next chunk. Returns `None` once the channel is closed and
    /// every chunk before the close has been read.
    ///
    /// Cancel-safe: the cursor only advances when a chunk is returned.
    pub async fn read_next(&mut self) -> Option<OutputChunk> {
        loop {
            let closed = self.tail_rx.borrow_and_update().closed;
            if let Some(chunk) = self.channel.chunk_at(self.position) {
                self.position += 1;
                return Some(chunk);
            }
            if closed {
                return None;
            }
            if self.tail_rx.changed().await.is_err() {
                // Sender lives inside the channel we hold an Arc to.
                return None;
            }
        }
    }

    /// Position of the next chunk this reader will return.
    pub fn position(&self) -> usize {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn channel() -> Arc<OutputChannel> {
        Arc::new(OutputChannel::new(JobId::new("job-1")))
    }

    #[tokio::test]
    async fn test_readers_see_appends_in_order() {
        let channel = channel();
        let mut a = channel.open_reader();
        let mut b = channel.open_reader();

        for i in 0..50 {
            channel.append(format!("line {i}")).unwrap();
        }
        channel.close();

        for reader in [&mut a, &mut b] {
            let mut seen = Vec::new();
            while let Some(chunk) = reader.read_next().await {
                seen.push(chunk.text().to_string());
            }
            let expected: Vec<String> = (0..50).map(|i| format!("line {i}")).collect();
            assert_eq!(seen, expected);
        }
    }

    #[tokio::test]
    async fn test_reader_starts_at_tail() {
        let channel = channel();
        channel.append("before").unwrap();

        let mut reader = channel.open_reader();
        assert_eq!(reader.position(), 1);
        channel.append("after").unwrap();

        let chunk = reader.read_next().await.unwrap();
        assert_eq!(chunk.text(), "after");
        assert_eq!(chunk.seq(), 1);
    }

    #[tokio::test]
    async fn test_reader_from_start_replays_buffer() {
        let channel = channel();
        channel.append("one").unwrap();
        channel.append("two").unwrap();
        channel.close();

        let mut reader = channel.open_reader_from_start();
        assert_eq!(reader.read_next().await.unwrap().text(), "one");
        assert_eq!(reader.read_next().await.unwrap().text(), "two");
        assert!(reader.read_next().await.is_none());
    }

    #[tokio::test]
    async fn test_read_next_waits_for_producer() {
        let channel = channel();
        let mut reader = channel.open_reader();

        let producer = Arc::clone(&channel);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.append("late").unwrap();
        });

        let chunk = tokio::time::timeout(Duration::from_millis(500), reader.read_next())
            .await
            .expect("timeout waiting for chunk")
            .unwrap();
        assert_eq!(chunk.text(), "late");
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_reader() {
        let channel = channel();
        let mut reader = channel.open_reader();

        let closer = Arc::clone(&channel);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close();
        });

        let next = tokio::time::timeout(Duration::from_millis(500), reader.read_next())
            .await
            .expect("close should unblock the reader");
        assert!(next.is_none());
        // Future reads return immediately as well.
        assert!(reader.read_next().await.is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let channel = channel();
        assert!(channel.close());
        assert!(!channel.close());
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_concurrent_producer_and_readers() {
        let channel = channel();
        let readers: Vec<_> = (0..8).map(|_| channel.open_reader()).collect();

        let producer = Arc::clone(&channel);
        let writer = tokio::spawn(async move {
            for i in 0..200u64 {
                producer.append(i.to_string()).unwrap();
                if i % 16 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            producer.close();
        });

        let mut handles = Vec::new();
        for mut reader in readers {
            handles.push(tokio::spawn(async move {
                let mut seqs = Vec::new();
                while let Some(chunk) = reader.read_next().await {
                    seqs.push(chunk.seq());
                }
                seqs
            }));
        }

        writer.await.unwrap();
        for handle in handles {
            let seqs = tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .expect("reader hung")
                .unwrap();
            assert_eq!(seqs, (0..200).collect::<Vec<_>>());
        }
    }
}
