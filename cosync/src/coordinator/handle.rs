//! CoordinatorHandle - actor-facing interface to the round coordinator

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::event::Event;

use super::error::CoordinatorError;
use super::messages::{ActorId, CoordRequest, CoordinatorMetrics, ResumeReply};

/// Handle for actors to interact with the Coordinator
///
/// Cloneable; every clone speaks for the same actor.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    /// Sender to the Coordinator task
    tx: mpsc::Sender<CoordRequest>,

    /// This handle's actor
    actor_id: ActorId,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CoordRequest>, actor_id: ActorId) -> Self {
        debug!(%actor_id, "CoordinatorHandle::new: called");
        Self { tx, actor_id }
    }

    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    /// Register another actor over the same coordinator channel
    ///
    /// Requests are processed in order, so an actor registered here is counted
    /// before any proposal sent after this call returns.
    pub async fn register_actor(&self, name: &str) -> Result<CoordinatorHandle, CoordinatorError> {
        debug!(%name, "CoordinatorHandle::register_actor: called");
        let actor_id = ActorId::new(name);
        self.send(CoordRequest::Register {
            actor_id: actor_id.clone(),
        })
        .await?;

        Ok(Self::new(self.tx.clone(), actor_id))
    }

    /// Offer `event` for this round and suspend until the coordinator decides
    ///
    /// Resolves `Ok(true)` once the event is admitted and `Ok(false)` if the
    /// coordinator shut down while this actor was suspended. A structural fault
    /// ends the coordinator and is returned to every suspended actor.
    pub async fn propose_and_suspend(&self, event: &Event) -> Result<bool, CoordinatorError> {
        debug!(actor_id = %self.actor_id, event = %event.name(), "CoordinatorHandle::propose_and_suspend: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.send(CoordRequest::Propose {
            actor_id: self.actor_id.clone(),
            event: event.clone(),
            reply_tx,
        })
        .await?;

        debug!(actor_id = %self.actor_id, "CoordinatorHandle::propose_and_suspend: suspended");
        Self::resume(reply_rx).await
    }

    /// Suspend without proposing until the next round has run
    pub async fn wait(&self) -> Result<bool, CoordinatorError> {
        debug!(actor_id = %self.actor_id, "CoordinatorHandle::wait: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.send(CoordRequest::Wait {
            actor_id: self.actor_id.clone(),
            reply_tx,
        })
        .await?;

        Self::resume(reply_rx).await
    }

    /// End of process: the actor no longer takes part in rounds
    pub async fn deregister(&self) -> Result<(), CoordinatorError> {
        debug!(actor_id = %self.actor_id, "CoordinatorHandle::deregister: called");
        self.send(CoordRequest::Deregister {
            actor_id: self.actor_id.clone(),
        })
        .await
    }

    /// Get current coordinator metrics
    pub async fn metrics(&self) -> Result<CoordinatorMetrics, CoordinatorError> {
        debug!(actor_id = %self.actor_id, "CoordinatorHandle::metrics: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.send(CoordRequest::GetMetrics { reply_tx }).await?;
        reply_rx.await.map_err(|_| CoordinatorError::Closed)
    }

    /// Ask the coordinator to release everyone and stop
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        debug!(actor_id = %self.actor_id, "CoordinatorHandle::shutdown: called");
        self.send(CoordRequest::Shutdown).await
    }

    async fn send(&self, req: CoordRequest) -> Result<(), CoordinatorError> {
        self.tx.send(req).await.map_err(|_| CoordinatorError::Closed)
    }

    async fn resume(reply_rx: oneshot::Receiver<ResumeReply>) -> Result<bool, CoordinatorError> {
        reply_rx.await.map_err(|_| CoordinatorError::Closed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_actor_id() {
        let (tx, _rx) = mpsc::channel(10);
        let handle = CoordinatorHandle::new(tx, ActorId::new("a"));
        assert_eq!(handle.actor_id().as_str(), "a");
    }

    #[tokio::test]
    async fn test_register_actor_sends_register() {
        let (tx, mut rx) = mpsc::channel(10);
        let control = CoordinatorHandle::new(tx, ActorId::new("control"));

        let handle = control.register_actor("worker").await.unwrap();
        assert_eq!(handle.actor_id().as_str(), "worker");
        match rx.recv().await {
            Some(CoordRequest::Register { actor_id }) => assert_eq!(actor_id.as_str(), "worker"),
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_coordinator_reports_closed() {
        let (tx, rx) = mpsc::channel(10);
        drop(rx);
        let handle = CoordinatorHandle::new(tx, ActorId::new("a"));

        let err = handle.propose_and_suspend(&Event::new("e")).await.unwrap_err();
        assert_eq!(err, CoordinatorError::Closed);
        assert_eq!(handle.deregister().await.unwrap_err(), CoordinatorError::Closed);
    }

    #[tokio::test]
    async fn test_dropped_reply_reports_closed() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = CoordinatorHandle::new(tx, ActorId::new("a"));

        let task = tokio::spawn(async move { handle.wait().await });
        // Receive the request and drop its reply sender without answering
        match rx.recv().await {
            Some(CoordRequest::Wait { reply_tx, .. }) => drop(reply_tx),
            other => panic!("unexpected request: {:?}", other),
        }

        assert_eq!(task.await.unwrap(), Err(CoordinatorError::Closed));
    }
}
