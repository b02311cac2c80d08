//! Components - actors driven by a simulation
//!
//! A component owns its event and channel ports and talks to the coordinator
//! only through its [`CoordinatorHandle`]. Finite components run a fixed
//! script; daemon components (adaptors) run until the coordinator releases
//! them without admission.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::channel::{ChannelReader, ChannelWriter};
use crate::coordinator::{CoordinatorError, CoordinatorHandle};
use crate::event::{Event, EventInfo, EventValue};

/// An actor that can be spawned by a simulation
#[async_trait]
pub trait Component: Send {
    fn name(&self) -> &str;

    /// Daemon components are stopped once every finite component is done
    fn is_daemon(&self) -> bool {
        false
    }

    /// Run to completion; deregistration is left to the caller
    async fn run(&mut self, handle: &CoordinatorHandle) -> eyre::Result<ComponentSummary>;
}

/// What a component did during a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComponentSummary {
    pub name: String,

    /// Proposals that were admitted
    pub admitted: u64,

    /// Released by shutdown or the round budget instead of a round
    pub stopped_early: bool,

    /// Event value observed after each admission
    pub values: Vec<EventValue>,

    pub records_in: u64,
    pub records_out: u64,

    /// Records lost to full channels
    pub records_dropped: u64,

    /// Tags of the records read, in order
    pub received_tags: Vec<u64>,
}

impl ComponentSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Outcome of one proposal from a component's point of view
pub(crate) enum Resumed {
    Admitted,
    Stopped,
}

/// Propose and map the coordinator going away to a normal stop
pub(crate) async fn propose(handle: &CoordinatorHandle, event: &Event) -> Result<Resumed, CoordinatorError> {
    match handle.propose_and_suspend(event).await {
        Ok(true) => Ok(Resumed::Admitted),
        Ok(false) | Err(CoordinatorError::Closed) => Ok(Resumed::Stopped),
        Err(e) => Err(e),
    }
}

/// Finite actor with a fixed number of iterations
///
/// Each iteration writes one record (if it has an output), offers its value
/// (if it has one), proposes its event, and after admission drains its input.
#[derive(Debug)]
pub struct ScriptedActor {
    name: String,
    event: Event,
    iterations: u64,
    offer: Option<i64>,
    output: Option<ChannelWriter>,
    input: Option<ChannelReader>,
}

impl ScriptedActor {
    pub fn new(name: impl Into<String>, event: Event, iterations: u64) -> Self {
        let name = name.into();
        debug!(%name, iterations, "ScriptedActor::new: called");
        Self {
            name,
            event,
            iterations,
            offer: None,
            output: None,
            input: None,
        }
    }

    /// Value written into the event slot before every proposal
    pub fn with_offer(mut self, value: i64) -> Self {
        self.offer = Some(value);
        self
    }

    pub fn with_output(mut self, writer: ChannelWriter) -> Self {
        self.output = Some(writer);
        self
    }

    pub fn with_input(mut self, reader: ChannelReader) -> Self {
        self.input = Some(reader);
        self
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    fn drain_input(&self, summary: &mut ComponentSummary) {
        if let Some(input) = &self.input {
            for info in input.drain() {
                summary.records_in += 1;
                summary.received_tags.push(info.tag);
            }
        }
    }
}

#[async_trait]
impl Component for ScriptedActor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, handle: &CoordinatorHandle) -> eyre::Result<ComponentSummary> {
        debug!(name = %self.name, "ScriptedActor::run: called");
        let mut summary = ComponentSummary::new(&self.name);

        for iteration in 0..self.iterations {
            if let Some(output) = &self.output {
                let info = EventInfo::new(iteration, &self.name, serde_json::json!({ "iteration": iteration }));
                if output.write(info).is_dropped() {
                    summary.records_dropped += 1;
                } else {
                    summary.records_out += 1;
                }
            }
            if let Some(value) = self.offer {
                self.event.set_value(value);
            }

            match propose(handle, &self.event).await? {
                Resumed::Admitted => {
                    summary.admitted += 1;
                    summary.values.push(self.event.value());
                }
                Resumed::Stopped => {
                    summary.stopped_early = true;
                    break;
                }
            }

            self.drain_input(&mut summary);
        }

        // Pick up anything that arrived after the last admission
        self.drain_input(&mut summary);
        info!(name = %self.name, admitted = summary.admitted, "Actor finished");
        Ok(summary)
    }
}
