//! Adaptor channels - FIFO queues of event-info records
//!
//! A channel is created by the wiring layer, which hands one [`ChannelWriter`]
//! and one [`ChannelReader`] to the two endpoints. Reads never block and
//! writes to a full channel drop the incoming record.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, warn};

use crate::event::EventInfo;

/// Result of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Accepted,
    /// Channel was at capacity; the record was discarded
    Dropped,
}

impl WriteOutcome {
    pub fn is_dropped(self) -> bool {
        matches!(self, Self::Dropped)
    }
}

/// Counters for a channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub written: u64,
    pub read: u64,
    pub dropped: u64,
    pub len: usize,
}

#[derive(Debug)]
struct ChannelInner {
    name: String,
    capacity: Option<usize>,
    queue: VecDeque<EventInfo>,
    stats: ChannelStats,
}

impl ChannelInner {
    fn write(&mut self, info: EventInfo) -> WriteOutcome {
        if self.capacity.is_some_and(|cap| self.queue.len() >= cap) {
            warn!(channel = %self.name, tag = info.tag, "channel is full, dropping record");
            self.stats.dropped += 1;
            return WriteOutcome::Dropped;
        }
        debug!(channel = %self.name, tag = info.tag, "write record");
        self.queue.push_back(info);
        self.stats.written += 1;
        WriteOutcome::Accepted
    }

    fn read(&mut self) -> Option<EventInfo> {
        let info = self.queue.pop_front()?;
        debug!(channel = %self.name, tag = info.tag, "read record");
        self.stats.read += 1;
        Some(info)
    }
}

/// Bounded or unbounded FIFO of [`EventInfo`] records
#[derive(Debug, Clone)]
pub struct AdaptorChannel {
    inner: Arc<Mutex<ChannelInner>>,
}

impl AdaptorChannel {
    /// Create a channel; `None` capacity means unbounded
    pub fn new(name: impl Into<String>, capacity: Option<usize>) -> Self {
        let name = name.into();
        debug!(%name, ?capacity, "AdaptorChannel::new: called");
        Self {
            inner: Arc::new(Mutex::new(ChannelInner {
                name,
                capacity,
                queue: VecDeque::new(),
                stats: ChannelStats::default(),
            })),
        }
    }

    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    pub fn bounded(name: impl Into<String>, capacity: usize) -> Self {
        Self::new(name, Some(capacity))
    }

    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.lock().capacity
    }

    /// Append unless at capacity
    pub fn write(&self, info: EventInfo) -> WriteOutcome {
        self.lock().write(info)
    }

    /// Pop the oldest record, `None` when empty
    pub fn read(&self) -> Option<EventInfo> {
        self.lock().read()
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn stats(&self) -> ChannelStats {
        let inner = self.lock();
        ChannelStats {
            len: inner.queue.len(),
            ..inner.stats.clone()
        }
    }

    /// Port for the producing endpoint
    pub fn writer(&self) -> ChannelWriter {
        ChannelWriter { channel: self.clone() }
    }

    /// Port for the consuming endpoint
    pub fn reader(&self) -> ChannelReader {
        ChannelReader { channel: self.clone() }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write side of a channel
#[derive(Debug, Clone)]
pub struct ChannelWriter {
    channel: AdaptorChannel,
}

impl ChannelWriter {
    pub fn write(&self, info: EventInfo) -> WriteOutcome {
        self.channel.write(info)
    }

    pub fn channel(&self) -> &AdaptorChannel {
        &self.channel
    }
}

/// Read side of a channel
#[derive(Debug, Clone)]
pub struct ChannelReader {
    channel: AdaptorChannel,
}

impl ChannelReader {
    pub fn read(&self) -> Option<EventInfo> {
        self.channel.read()
    }

    /// Read until the channel reports empty
    pub fn drain(&self) -> Vec<EventInfo> {
        std::iter::from_fn(|| self.channel.read()).collect()
    }

    pub fn channel(&self) -> &AdaptorChannel {
        &self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn info(tag: u64) -> EventInfo {
        EventInfo::new(tag, "t", serde_json::Value::Null)
    }

    #[test]
    fn test_empty_read_returns_none() {
        let channel = AdaptorChannel::unbounded("c");
        assert!(channel.read().is_none());
        assert!(channel.is_empty());
    }

    #[test]
    fn test_write_to_full_channel_drops() {
        let channel = AdaptorChannel::bounded("c", 2);
        assert_eq!(channel.write(info(1)), WriteOutcome::Accepted);
        assert_eq!(channel.write(info(2)), WriteOutcome::Accepted);
        assert_eq!(channel.write(info(3)), WriteOutcome::Dropped);

        let stats = channel.stats();
        assert_eq!(stats.written, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.len, 2);

        assert_eq!(channel.read().map(|i| i.tag), Some(1));
        assert_eq!(channel.read().map(|i| i.tag), Some(2));
        assert!(channel.read().is_none());
    }

    #[test]
    fn test_zero_capacity_drops_everything() {
        let channel = AdaptorChannel::bounded("c", 0);
        assert!(channel.write(info(1)).is_dropped());
        assert!(channel.is_empty());
    }

    #[test]
    fn test_ports_share_one_queue() {
        let channel = AdaptorChannel::bounded("link", 4);
        let writer = channel.writer();
        let reader = channel.reader();

        writer.write(info(5));
        writer.write(info(6));
        let drained: Vec<u64> = reader.drain().into_iter().map(|i| i.tag).collect();
        assert_eq!(drained, vec![5, 6]);
        assert_eq!(reader.channel().stats().read, 2);
        assert_eq!(writer.channel().name(), "link");
    }

    proptest! {
        #[test]
        fn prop_fifo_order_preserved(tags in proptest::collection::vec(any::<u64>(), 0..64)) {
            let channel = AdaptorChannel::bounded("fifo", 64);
            for tag in &tags {
                prop_assert_eq!(channel.write(info(*tag)), WriteOutcome::Accepted);
            }
            let read: Vec<u64> = channel.reader().drain().into_iter().map(|i| i.tag).collect();
            prop_assert_eq!(read, tags);
        }

        #[test]
        fn prop_full_channel_unchanged_by_write(cap in 0usize..16, extra in 1u64..8) {
            let channel = AdaptorChannel::bounded("cap", cap);
            for tag in 0..cap as u64 {
                channel.write(info(tag));
            }
            for tag in 0..extra {
                prop_assert!(channel.write(info(1000 + tag)).is_dropped());
            }
            prop_assert_eq!(channel.len(), cap);
            prop_assert_eq!(channel.stats().dropped, extra);
            let read: Vec<u64> = channel.reader().drain().into_iter().map(|i| i.tag).collect();
            prop_assert_eq!(read, (0..cap as u64).collect::<Vec<_>>());
        }
    }
}
