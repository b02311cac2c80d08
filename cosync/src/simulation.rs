//! Simulation - wires components to a coordinator and runs them to completion

use std::collections::BTreeMap;

use eyre::{Context, Result};
use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{AdaptorChannel, ChannelStats};
use crate::component::{Component, ComponentSummary};
use crate::constraint::ConstraintSolver;
use crate::coordinator::{Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorHandle, CoordinatorMetrics};
use crate::hooks::{Annotator, Scheduler};

/// Result of a completed simulation
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub metrics: CoordinatorMetrics,
    pub components: Vec<ComponentSummary>,
    pub channels: BTreeMap<String, ChannelStats>,
}

impl SimulationReport {
    pub fn component(&self, name: &str) -> Option<&ComponentSummary> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// A coordinator plus the components and channels it drives
pub struct Simulation {
    coordinator: Coordinator,
    components: Vec<Box<dyn Component>>,
    channels: Vec<AdaptorChannel>,
}

type ComponentTask = JoinHandle<Result<ComponentSummary>>;

impl Simulation {
    pub fn new(config: CoordinatorConfig) -> Self {
        debug!("Simulation::new: called");
        Self {
            coordinator: Coordinator::new(config),
            components: Vec::new(),
            channels: Vec::new(),
        }
    }

    pub fn add_constraint_solver(&mut self, solver: ConstraintSolver) {
        self.coordinator.add_constraint_solver(solver);
    }

    pub fn add_annotator(&mut self, annotator: impl Annotator + 'static) {
        self.coordinator.add_annotator(annotator);
    }

    pub fn add_scheduler(&mut self, scheduler: impl Scheduler + 'static) {
        self.coordinator.add_scheduler(scheduler);
    }

    pub fn add_component(&mut self, component: impl Component + 'static) {
        self.add_boxed_component(Box::new(component));
    }

    pub fn add_boxed_component(&mut self, component: Box<dyn Component>) {
        debug!(name = %component.name(), daemon = component.is_daemon(), "Simulation::add_component: called");
        self.components.push(component);
    }

    /// Track a channel so its statistics land in the report
    pub fn add_channel(&mut self, channel: AdaptorChannel) {
        self.channels.push(channel);
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Run every component until the finite ones are done
    ///
    /// Daemon components are stopped by shutting the coordinator down once all
    /// finite components have returned. A coordinator fault fails the run.
    pub async fn run(self) -> Result<SimulationReport> {
        let Simulation {
            mut coordinator,
            components,
            channels,
        } = self;

        info!(components = components.len(), "Simulation starting");
        coordinator.expect_actors(components.len());
        let control = coordinator.control_handle();
        let coord_task = tokio::spawn(coordinator.run());

        // All registrations are queued before any component can propose
        let mut registered = Vec::with_capacity(components.len());
        for component in components {
            let handle = control
                .register_actor(component.name())
                .await
                .context(format!("Failed to register component {}", component.name()))?;
            registered.push((component, handle));
        }

        let mut finite: Vec<ComponentTask> = Vec::new();
        let mut daemons: Vec<ComponentTask> = Vec::new();
        for (component, handle) in registered {
            let daemon = component.is_daemon();
            let task = tokio::spawn(run_component(component, handle));
            if daemon {
                daemons.push(task);
            } else {
                finite.push(task);
            }
        }

        let finite_results = join_all(finite).await;
        debug!("Simulation::run: finite components done");
        match control.shutdown().await {
            Ok(()) | Err(CoordinatorError::Closed) => {}
            Err(e) => warn!(error = %e, "Failed to request shutdown"),
        }
        let daemon_results = join_all(daemons).await;

        let metrics = coord_task
            .await
            .context("Coordinator task panicked")?
            .map_err(|fault| eyre::Report::new(fault).wrap_err("Coordinator stopped on a fault"))?;

        let mut summaries = Vec::new();
        for result in finite_results.into_iter().chain(daemon_results) {
            summaries.push(result.context("Component task panicked")??);
        }

        let channels = channels.iter().map(|c| (c.name(), c.stats())).collect();
        info!(rounds = metrics.rounds, admitted = metrics.admitted, "Simulation finished");
        Ok(SimulationReport {
            metrics,
            components: summaries,
            channels,
        })
    }
}

async fn run_component(mut component: Box<dyn Component>, handle: CoordinatorHandle) -> Result<ComponentSummary> {
    let result = component
        .run(&handle)
        .await
        .with_context(|| format!("Component {} failed", component.name()));

    // The coordinator may already be gone after a fault or shutdown
    if let Err(e) = handle.deregister().await {
        debug!(name = %component.name(), error = %e, "deregister after run");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ScriptedActor;
    use crate::constraint::{MappingConstraint, RendezvousConstraint};
    use crate::event::{Event, EventValue};

    fn config() -> CoordinatorConfig {
        CoordinatorConfig {
            barrier_timeout_ms: Some(2_000),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_simulation_finishes() {
        let report = Simulation::new(config()).run().await.unwrap();
        assert_eq!(report.metrics.rounds, 0);
        assert!(report.components.is_empty());
    }

    #[tokio::test]
    async fn test_rendezvous_pair_moves_in_lockstep() {
        let a = Event::new("a");
        let b = Event::new("b");
        let mut sim = Simulation::new(config());
        sim.add_constraint_solver(
            ConstraintSolver::new("s").with_constraint(RendezvousConstraint::new("ab", a.clone(), b.clone())),
        );
        sim.add_component(ScriptedActor::new("a", a, 4));
        sim.add_component(ScriptedActor::new("b", b, 4));

        let report = sim.run().await.unwrap();
        assert_eq!(report.metrics.rounds, 4);
        assert_eq!(report.metrics.admitted, 8);
        assert_eq!(report.component("a").unwrap().admitted, 4);
        assert_eq!(report.component("b").unwrap().admitted, 4);
    }

    #[tokio::test]
    async fn test_mapping_value_flows_to_partner() {
        let a = Event::new("a");
        let b = Event::new("b");
        let mut sim = Simulation::new(config());
        sim.add_constraint_solver(
            ConstraintSolver::new("s").with_constraint(MappingConstraint::new("ab", a.clone(), b.clone())),
        );
        sim.add_component(ScriptedActor::new("a", a, 2));
        sim.add_component(ScriptedActor::new("b", b, 2).with_offer(7));

        let report = sim.run().await.unwrap();
        assert_eq!(report.component("a").unwrap().values, vec![EventValue::Concrete(7); 2]);
    }

    #[tokio::test]
    async fn test_fault_fails_the_run() {
        let a = Event::new("a");
        let orphan = Event::new("orphan");
        let mut sim = Simulation::new(CoordinatorConfig {
            stall_timeout_ms: Some(50),
            ..config()
        });
        sim.add_constraint_solver(
            ConstraintSolver::new("s").with_constraint(RendezvousConstraint::new("ao", a.clone(), orphan)),
        );
        sim.add_component(ScriptedActor::new("a", a, 1));

        let err = sim.run().await.unwrap_err();
        assert!(format!("{:?}", err).contains("admitted nobody"));
    }
}
