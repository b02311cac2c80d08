//! Scenario files - YAML wiring of actors, adaptors, channels and constraints
//!
//! ```yaml
//! trace-rounds: true
//! channels:
//!   - name: raw
//!   - name: timed
//!     max-size: 16
//! actors:
//!   - name: producer
//!     iterations: 3
//!     writes: raw
//!   - name: consumer
//!     iterations: 6
//!     reads: timed
//! adaptors:
//!   - name: inject
//!     kind: df-fsm
//!     range: 5
//!     reads: raw
//!     writes: timed
//! solvers:
//!   - name: main
//!     constraints: []
//! ```
//!
//! Every actor and adaptor owns one event named after it; constraints refer
//! to events by that name.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::adaptor::{
    Adaptor, AdaptorError, AdaptorKind, CopyTransform, DEFAULT_TAG_RANGE, PassthroughTransform, TagInjector,
};
use crate::channel::AdaptorChannel;
use crate::component::{Component, ScriptedActor};
use crate::constraint::{ConstraintKind, ConstraintSolver, MappingConstraint, RendezvousConstraint};
use crate::coordinator::CoordinatorConfig;
use crate::event::Event;
use crate::hooks::RoundTraceAnnotator;
use crate::simulation::Simulation;

/// Problems found while validating a scenario
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioError {
    #[error("Name '{0}' is used more than once")]
    DuplicateName(String),

    #[error("'{owner}' refers to unknown channel '{channel}'")]
    UnknownChannel { owner: String, channel: String },

    #[error("Channel '{channel}' has more than one {side}")]
    SharedEndpoint { channel: String, side: &'static str },

    #[error("Constraint '{constraint}' refers to unknown event '{event}'")]
    UnknownEvent { constraint: String, event: String },

    #[error("{kind} constraint '{constraint}' cannot bind {count} events")]
    Arity {
        constraint: String,
        kind: ConstraintKind,
        count: usize,
    },

    #[error("Adaptor '{adaptor}': {source}")]
    Adaptor {
        adaptor: String,
        #[source]
        source: AdaptorError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,

    /// Unbounded when absent
    #[serde(rename = "max-size", default)]
    pub max_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorSpec {
    pub name: String,

    #[serde(default = "default_iterations")]
    pub iterations: u64,

    /// Concrete value offered with every proposal
    #[serde(default)]
    pub offer: Option<i64>,

    #[serde(default)]
    pub writes: Option<String>,

    #[serde(default)]
    pub reads: Option<String>,
}

fn default_iterations() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptorSpec {
    pub name: String,
    pub kind: AdaptorKind,

    /// Tag increment bound for `df-fsm`
    #[serde(default)]
    pub range: Option<u64>,

    /// Fixed seed for reproducible tags
    #[serde(default)]
    pub seed: Option<u64>,

    pub reads: String,
    pub writes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub name: String,
    pub kind: ConstraintKind,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverSpec {
    pub name: String,

    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
}

/// Parsed scenario file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub channels: Vec<ChannelSpec>,
    pub actors: Vec<ActorSpec>,
    pub adaptors: Vec<AdaptorSpec>,
    pub solvers: Vec<SolverSpec>,

    /// Register a [`RoundTraceAnnotator`]
    #[serde(rename = "trace-rounds")]
    pub trace_rounds: bool,
}

impl Scenario {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).context(format!("Failed to read scenario {}", path.display()))?;
        let scenario = Self::from_yaml(&content).context(format!("Failed to parse scenario {}", path.display()))?;
        info!("Loaded scenario from: {}", path.display());
        Ok(scenario)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let scenario: Self = serde_yaml::from_str(content)?;
        Ok(scenario)
    }

    /// Names of every event-owning component
    fn event_names(&self) -> impl Iterator<Item = &str> {
        self.actors
            .iter()
            .map(|a| a.name.as_str())
            .chain(self.adaptors.iter().map(|a| a.name.as_str()))
    }

    /// Check names, channel endpoints, constraint arity and adaptor settings
    pub fn validate(&self) -> Result<(), ScenarioError> {
        debug!("Scenario::validate: called");
        let mut seen = HashSet::new();
        for name in self.event_names() {
            if !seen.insert(name) {
                return Err(ScenarioError::DuplicateName(name.to_string()));
            }
        }

        let mut channels = HashSet::new();
        for channel in &self.channels {
            if !channels.insert(channel.name.as_str()) {
                return Err(ScenarioError::DuplicateName(channel.name.clone()));
            }
        }

        let mut endpoints = EndpointTracker::default();
        for actor in &self.actors {
            if let Some(channel) = &actor.writes {
                endpoints.claim(&channels, &actor.name, channel, "writer")?;
            }
            if let Some(channel) = &actor.reads {
                endpoints.claim(&channels, &actor.name, channel, "reader")?;
            }
        }
        for adaptor in &self.adaptors {
            endpoints.claim(&channels, &adaptor.name, &adaptor.writes, "writer")?;
            endpoints.claim(&channels, &adaptor.name, &adaptor.reads, "reader")?;
            if adaptor.kind == AdaptorKind::DfFsm && adaptor.range == Some(0) {
                return Err(ScenarioError::Adaptor {
                    adaptor: adaptor.name.clone(),
                    source: AdaptorError::ZeroRange,
                });
            }
        }

        for constraint in self.solvers.iter().flat_map(|s| &s.constraints) {
            let count = constraint.events.len();
            let arity_ok = match constraint.kind {
                ConstraintKind::Rendezvous => count >= 2,
                ConstraintKind::Mapping => count == 2,
            };
            if !arity_ok {
                return Err(ScenarioError::Arity {
                    constraint: constraint.name.clone(),
                    kind: constraint.kind,
                    count,
                });
            }
            if let Some(missing) = constraint.events.iter().find(|e| !seen.contains(e.as_str())) {
                return Err(ScenarioError::UnknownEvent {
                    constraint: constraint.name.clone(),
                    event: missing.clone(),
                });
            }
        }

        Ok(())
    }

    /// Validate and wire everything into a ready-to-run simulation
    pub fn build(&self, config: CoordinatorConfig) -> Result<Simulation> {
        debug!("Scenario::build: called");
        self.validate()?;

        let channels: HashMap<&str, AdaptorChannel> = self
            .channels
            .iter()
            .map(|c| (c.name.as_str(), AdaptorChannel::new(&c.name, c.max_size)))
            .collect();
        let events: HashMap<&str, Event> = self.event_names().map(|name| (name, Event::new(name))).collect();
        let channel = |name: &str| channels.get(name).cloned().ok_or_else(|| eyre::eyre!("channel {} missing", name));
        let event = |name: &str| events.get(name).cloned().ok_or_else(|| eyre::eyre!("event {} missing", name));

        let mut sim = Simulation::new(config);

        for solver_spec in &self.solvers {
            let mut solver = ConstraintSolver::new(&solver_spec.name);
            for spec in &solver_spec.constraints {
                let bound = spec.events.iter().map(|e| event(e.as_str())).collect::<Result<Vec<_>>>()?;
                match spec.kind {
                    ConstraintKind::Rendezvous => {
                        solver.add_constraint(RendezvousConstraint::n_way(&spec.name, bound));
                    }
                    ConstraintKind::Mapping => {
                        let [a, b] = bound.as_slice() else {
                            eyre::bail!("mapping constraint {} is not binary", spec.name);
                        };
                        solver.add_constraint(MappingConstraint::new(&spec.name, a.clone(), b.clone()));
                    }
                }
            }
            sim.add_constraint_solver(solver);
        }

        if self.trace_rounds {
            sim.add_annotator(RoundTraceAnnotator::new());
        }

        for spec in &self.actors {
            let mut actor = ScriptedActor::new(&spec.name, event(spec.name.as_str())?, spec.iterations);
            if let Some(value) = spec.offer {
                actor = actor.with_offer(value);
            }
            if let Some(name) = &spec.writes {
                actor = actor.with_output(channel(name.as_str())?.writer());
            }
            if let Some(name) = &spec.reads {
                actor = actor.with_input(channel(name.as_str())?.reader());
            }
            sim.add_component(actor);
        }

        for spec in &self.adaptors {
            let input = channel(spec.reads.as_str())?.reader();
            let output = channel(spec.writes.as_str())?.writer();
            let owned = event(spec.name.as_str())?;
            let component: Box<dyn Component> = match spec.kind {
                AdaptorKind::Copy => Box::new(Adaptor::new(&spec.name, owned, input, output, CopyTransform)),
                AdaptorKind::FsmDf => Box::new(Adaptor::new(&spec.name, owned, input, output, PassthroughTransform)),
                AdaptorKind::DfFsm => {
                    let range = spec.range.unwrap_or(DEFAULT_TAG_RANGE);
                    let injector = match spec.seed {
                        Some(seed) => TagInjector::with_seed(range, seed),
                        None => TagInjector::new(range),
                    }
                    .map_err(|source| ScenarioError::Adaptor {
                        adaptor: spec.name.clone(),
                        source,
                    })?;
                    Box::new(Adaptor::new(&spec.name, owned, input, output, injector))
                }
            };
            sim.add_boxed_component(component);
        }

        for spec in &self.channels {
            sim.add_channel(channel(spec.name.as_str())?);
        }

        info!(components = sim.component_count(), "Scenario wired");
        Ok(sim)
    }
}

/// At most one writer and one reader per channel
#[derive(Default)]
struct EndpointTracker<'a> {
    claimed: HashSet<(&'a str, &'static str)>,
}

impl<'a> EndpointTracker<'a> {
    fn claim(
        &mut self,
        channels: &HashSet<&str>,
        owner: &str,
        channel: &'a str,
        side: &'static str,
    ) -> Result<(), ScenarioError> {
        if !channels.contains(channel) {
            return Err(ScenarioError::UnknownChannel {
                owner: owner.to_string(),
                channel: channel.to_string(),
            });
        }
        if !self.claimed.insert((channel, side)) {
            return Err(ScenarioError::SharedEndpoint {
                channel: channel.to_string(),
                side,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPELINE: &str = r#"
trace-rounds: true
channels:
  - name: raw
  - name: timed
    max-size: 16
actors:
  - name: producer
    iterations: 3
    writes: raw
  - name: consumer
    iterations: 6
    reads: timed
adaptors:
  - name: inject
    kind: df-fsm
    range: 5
    seed: 7
    reads: raw
    writes: timed
"#;

    #[test]
    fn test_parse_pipeline() {
        let scenario = Scenario::from_yaml(PIPELINE).unwrap();
        assert!(scenario.trace_rounds);
        assert_eq!(scenario.channels.len(), 2);
        assert_eq!(scenario.channels[1].max_size, Some(16));
        assert_eq!(scenario.actors[0].iterations, 3);
        assert_eq!(scenario.adaptors[0].kind, AdaptorKind::DfFsm);
        assert_eq!(scenario.adaptors[0].range, Some(5));
        assert!(scenario.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let scenario = Scenario::from_yaml("actors:\n  - name: a\n").unwrap();
        assert_eq!(scenario.actors[0].iterations, 1);
        assert!(!scenario.trace_rounds);
        assert!(scenario.solvers.is_empty());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let scenario = Scenario::from_yaml("actors:\n  - name: a\n  - name: a\n").unwrap();
        assert_eq!(scenario.validate(), Err(ScenarioError::DuplicateName("a".to_string())));
    }

    #[test]
    fn test_unknown_channel_rejected() {
        let scenario = Scenario::from_yaml("actors:\n  - name: a\n    writes: nowhere\n").unwrap();
        assert!(matches!(scenario.validate(), Err(ScenarioError::UnknownChannel { .. })));
    }

    #[test]
    fn test_second_writer_rejected() {
        let yaml = r#"
channels:
  - name: c
actors:
  - name: a
    writes: c
  - name: b
    writes: c
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(
            scenario.validate(),
            Err(ScenarioError::SharedEndpoint {
                channel: "c".to_string(),
                side: "writer"
            })
        );
    }

    #[test]
    fn test_constraint_checks() {
        let yaml = r#"
actors:
  - name: a
  - name: b
solvers:
  - name: s
    constraints:
      - name: bad
        kind: mapping
        events: [a]
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert!(matches!(scenario.validate(), Err(ScenarioError::Arity { count: 1, .. })));

        let yaml = r#"
actors:
  - name: a
solvers:
  - name: s
    constraints:
      - name: ab
        kind: rendezvous
        events: [a, ghost]
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(
            scenario.validate(),
            Err(ScenarioError::UnknownEvent {
                constraint: "ab".to_string(),
                event: "ghost".to_string()
            })
        );
    }

    #[test]
    fn test_zero_range_rejected() {
        let yaml = r#"
channels:
  - name: in
  - name: out
adaptors:
  - name: inject
    kind: df-fsm
    range: 0
    reads: in
    writes: out
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::Adaptor {
                source: AdaptorError::ZeroRange,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_adaptor_kind_fails_to_parse() {
        let yaml = "adaptors:\n  - name: x\n    kind: teleport\n    reads: a\n    writes: b\n";
        assert!(Scenario::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yml");
        fs::write(&path, PIPELINE).unwrap();

        let scenario = Scenario::load(&path).unwrap();
        assert_eq!(scenario.actors.len(), 2);
        assert!(Scenario::load(dir.path().join("missing.yml")).is_err());
    }

    #[tokio::test]
    async fn test_build_and_run_pipeline() {
        let scenario = Scenario::from_yaml(PIPELINE).unwrap();
        let sim = scenario.build(CoordinatorConfig::default()).unwrap();
        assert_eq!(sim.component_count(), 3);

        let report = sim.run().await.unwrap();
        let consumer = report.component("consumer").unwrap();
        assert_eq!(consumer.records_in, 3);

        let mut previous = 0;
        for tag in &consumer.received_tags {
            assert!(*tag > previous && *tag - previous <= 5);
            previous = *tag;
        }
        assert_eq!(report.channels["raw"].written, 3);
        assert_eq!(report.channels["timed"].read, 3);
    }
}
