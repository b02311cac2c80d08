//! Record transforms applied by adaptors between read and write

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::event::EventInfo;

use super::AdaptorError;

/// Tag increment bound used when none is configured
pub const DEFAULT_TAG_RANGE: u64 = 10;

/// Rewrites the buffered records in place
pub trait EventTransform: Send {
    fn name(&self) -> &'static str;

    fn transform(&mut self, buffer: &mut VecDeque<EventInfo>);
}

/// Identity transform for compatible domains
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyTransform;

impl EventTransform for CopyTransform {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn transform(&mut self, _buffer: &mut VecDeque<EventInfo>) {}
}

/// Timed to dataflow; records pass unchanged for now
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTransform;

impl EventTransform for PassthroughTransform {
    fn name(&self) -> &'static str {
        "fsm-df"
    }

    fn transform(&mut self, _buffer: &mut VecDeque<EventInfo>) {}
}

/// Dataflow to timed: stamps records with strictly increasing tags
///
/// Each record advances a running counter by a uniform increment in
/// `[1, range]` and takes the new counter value as its tag. The counter
/// saturates at `u64::MAX`, after which tags stop increasing.
#[derive(Debug)]
pub struct TagInjector {
    range: u64,
    counter: u64,
    rng: StdRng,
}

impl TagInjector {
    /// Injector seeded from the OS
    pub fn new(range: u64) -> Result<Self, AdaptorError> {
        Self::build(range, StdRng::from_os_rng())
    }

    /// Injector with a reproducible increment sequence
    pub fn with_seed(range: u64, seed: u64) -> Result<Self, AdaptorError> {
        Self::build(range, StdRng::seed_from_u64(seed))
    }

    fn build(range: u64, rng: StdRng) -> Result<Self, AdaptorError> {
        debug!(range, "TagInjector::build: called");
        if range == 0 {
            return Err(AdaptorError::ZeroRange);
        }
        Ok(Self { range, counter: 0, rng })
    }

    /// Start counting from `counter` instead of 0
    pub fn starting_at(mut self, counter: u64) -> Self {
        self.counter = counter;
        self
    }

    pub fn range(&self) -> u64 {
        self.range
    }

    /// Last tag handed out
    pub fn counter(&self) -> u64 {
        self.counter
    }
}

impl EventTransform for TagInjector {
    fn name(&self) -> &'static str {
        "df-fsm"
    }

    fn transform(&mut self, buffer: &mut VecDeque<EventInfo>) {
        for info in buffer.iter_mut() {
            self.counter = self.counter.saturating_add(self.rng.random_range(1..=self.range));
            info.tag = self.counter;
        }
    }
}
