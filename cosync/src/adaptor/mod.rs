//! Adaptors - actors that carry event-info records across a domain boundary
//!
//! Every iteration an adaptor synchronizes with the coordinator, then drains
//! its input channel, rewrites the buffered records, and flushes them to its
//! output channel in order. The rewrite is what distinguishes the variants:
//! - **copy:** records pass unchanged
//! - **df-fsm:** untimed records receive strictly increasing tags
//! - **fsm-df:** timed records pass to the untimed side unchanged

mod transform;

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::channel::{ChannelReader, ChannelWriter};
use crate::component::{Component, ComponentSummary, Resumed, propose};
use crate::coordinator::CoordinatorHandle;
use crate::event::{Event, EventInfo};

pub use transform::{CopyTransform, DEFAULT_TAG_RANGE, EventTransform, PassthroughTransform, TagInjector};

/// Adaptor construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdaptorError {
    #[error("Tag range must be at least 1")]
    ZeroRange,

    #[error("Unknown adaptor kind: {0}. Use: copy, df-fsm, or fsm-df")]
    UnknownKind(String),
}

/// Built-in adaptor variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdaptorKind {
    Copy,
    DfFsm,
    FsmDf,
}

impl fmt::Display for AdaptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::DfFsm => write!(f, "df-fsm"),
            Self::FsmDf => write!(f, "fsm-df"),
        }
    }
}

impl std::str::FromStr for AdaptorKind {
    type Err = AdaptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "df-fsm" | "df2fsm" => Ok(Self::DfFsm),
            "fsm-df" | "fsm2df" => Ok(Self::FsmDf),
            _ => Err(AdaptorError::UnknownKind(s.to_string())),
        }
    }
}

/// Channel-domain translation actor
#[derive(Debug)]
pub struct Adaptor<T> {
    name: String,
    event: Event,
    input: ChannelReader,
    output: ChannelWriter,
    buffer: VecDeque<EventInfo>,
    transform: T,
    records_in: u64,
    records_out: u64,
    records_dropped: u64,
}

impl<T: EventTransform> Adaptor<T> {
    pub fn new(name: impl Into<String>, event: Event, input: ChannelReader, output: ChannelWriter, transform: T) -> Self {
        let name = name.into();
        debug!(%name, transform = transform.name(), "Adaptor::new: called");
        Self {
            name,
            event,
            input,
            output,
            buffer: VecDeque::new(),
            transform,
            records_in: 0,
            records_out: 0,
            records_dropped: 0,
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }

    /// Records read but not yet written
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Move every available input record into the buffer
    pub fn read_events(&mut self) -> usize {
        let before = self.buffer.len();
        while let Some(info) = self.input.read() {
            self.buffer.push_back(info);
        }
        let read = self.buffer.len() - before;
        self.records_in += read as u64;
        read
    }

    pub fn transform_events(&mut self) {
        self.transform.transform(&mut self.buffer);
    }

    /// Flush the buffer to the output, one record per write
    pub fn write_events(&mut self) -> usize {
        let mut written = 0;
        while let Some(info) = self.buffer.pop_front() {
            if self.output.write(info).is_dropped() {
                self.records_dropped += 1;
            } else {
                self.records_out += 1;
                written += 1;
            }
        }
        written
    }

    /// One read, transform, write sequence
    pub fn step(&mut self) -> usize {
        let read = self.read_events();
        self.transform_events();
        let written = self.write_events();
        if read > 0 {
            debug!(name = %self.name, read, written, "Adaptor::step");
        }
        written
    }

    fn summary(&self, admitted: u64, stopped_early: bool) -> ComponentSummary {
        ComponentSummary {
            admitted,
            stopped_early,
            records_in: self.records_in,
            records_out: self.records_out,
            records_dropped: self.records_dropped,
            ..ComponentSummary::new(&self.name)
        }
    }
}

#[async_trait]
impl<T: EventTransform> Component for Adaptor<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_daemon(&self) -> bool {
        true
    }

    async fn run(&mut self, handle: &CoordinatorHandle) -> eyre::Result<ComponentSummary> {
        debug!(name = %self.name, "Adaptor::run: called");
        let mut admitted = 0;

        loop {
            match propose(handle, &self.event).await? {
                Resumed::Admitted => {
                    admitted += 1;
                    self.step();
                }
                Resumed::Stopped => {
                    // Forward what the last round left behind
                    self.step();
                    break;
                }
            }
        }

        info!(name = %self.name, admitted, records_out = self.records_out, "Adaptor stopped");
        Ok(self.summary(admitted, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::AdaptorChannel;
    use crate::coordinator::{Coordinator, CoordinatorConfig};

    fn record(tag: u64) -> EventInfo {
        EventInfo::new(tag, "r", serde_json::Value::Null)
    }

    fn wired<T: EventTransform>(transform: T) -> (AdaptorChannel, AdaptorChannel, Adaptor<T>) {
        let input = AdaptorChannel::unbounded("in");
        let output = AdaptorChannel::unbounded("out");
        let adaptor = Adaptor::new("adaptor", Event::new("adaptor"), input.reader(), output.writer(), transform);
        (input, output, adaptor)
    }

    #[test]
    fn test_copy_adaptor_preserves_fifo_order() {
        let (input, output, mut adaptor) = wired(CopyTransform);
        for tag in [4, 1, 9] {
            input.write(record(tag));
        }

        assert_eq!(adaptor.step(), 3);
        let tags: Vec<u64> = output.reader().drain().iter().map(|r| r.tag).collect();
        assert_eq!(tags, vec![4, 1, 9]);
        assert_eq!(adaptor.buffered(), 0);
    }

    #[test]
    fn test_tag_injection_over_three_records() {
        let (input, output, mut adaptor) = wired(TagInjector::new(5).unwrap());
        for _ in 0..3 {
            input.write(record(0));
        }

        assert_eq!(adaptor.read_events(), 3);
        adaptor.transform_events();
        assert_eq!(adaptor.write_events(), 3);

        let mut previous = 0;
        for info in output.reader().drain() {
            assert!(info.tag > previous);
            assert!(info.tag - previous <= 5);
            previous = info.tag;
        }
        assert_eq!(adaptor.transform().counter(), previous);
    }

    #[test]
    fn test_full_output_drops_and_counts() {
        let input = AdaptorChannel::unbounded("in");
        let output = AdaptorChannel::bounded("out", 1);
        let mut adaptor = Adaptor::new("a", Event::new("a"), input.reader(), output.writer(), PassthroughTransform);
        input.write(record(1));
        input.write(record(2));

        assert_eq!(adaptor.step(), 1);
        assert_eq!(adaptor.summary(0, false).records_dropped, 1);
        assert_eq!(output.read().map(|r| r.tag), Some(1));
    }

    #[test]
    fn test_empty_input_is_a_no_op() {
        let (_input, output, mut adaptor) = wired(CopyTransform);
        assert_eq!(adaptor.step(), 0);
        assert!(output.is_empty());
    }

    #[test]
    fn test_adaptor_kind_parsing() {
        assert_eq!("df-fsm".parse::<AdaptorKind>().unwrap(), AdaptorKind::DfFsm);
        assert_eq!("FSM2DF".parse::<AdaptorKind>().unwrap(), AdaptorKind::FsmDf);
        assert!(matches!("bogus".parse::<AdaptorKind>(), Err(AdaptorError::UnknownKind(_))));
        let kind: AdaptorKind = serde_yaml::from_str("copy").unwrap();
        assert_eq!(kind, AdaptorKind::Copy);
    }

    #[tokio::test]
    async fn test_adaptor_runs_until_shutdown() {
        let coord = Coordinator::new(CoordinatorConfig {
            max_rounds: Some(3),
            ..Default::default()
        });
        let handle = coord.register("adaptor").await.unwrap();
        let coord_task = tokio::spawn(coord.run());

        let (input, output, mut adaptor) = wired(CopyTransform);
        input.write(record(1));
        input.write(record(2));

        let summary = adaptor.run(&handle).await.unwrap();
        assert_eq!(summary.admitted, 3);
        assert!(summary.stopped_early);
        assert_eq!(summary.records_out, 2);
        assert_eq!(output.len(), 2);

        assert_eq!(coord_task.await.unwrap().unwrap().rounds, 3);
    }
}
