//! Change Feed Listener
//!
//! One task per register drains its feed in delivery order. Record
//! failures are already recorded by the orchestrator and never end the
//! loop; a broken or closed feed does.

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::domain::Register;
use crate::gateway::ChangeFeed;

use super::{SyncError, SyncOrchestrator};

pub(crate) struct ListenerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Ask the loop to exit and wait for the in-flight event to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Listener task panicked");
        }
    }
}

pub(crate) fn spawn(
    orchestrator: SyncOrchestrator,
    register: Register,
    feed: ChangeFeed,
) -> ListenerHandle {
    let (shutdown, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(run(orchestrator, register, feed, shutdown_rx));
    ListenerHandle { shutdown, task }
}

async fn run(
    orchestrator: SyncOrchestrator,
    register: Register,
    mut feed: ChangeFeed,
    mut shutdown: oneshot::Receiver<()>,
) {
    tracing::debug!(%register, "Listener started");

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                tracing::debug!(%register, "Listener shutting down");
                break;
            }
            item = feed.recv() => match item {
                Some(Ok(event)) => {
                    tracing::trace!(%register, kind = event.event_type(), "Change event received");
                    // outcome and failures are recorded by the orchestrator
                    let _ = orchestrator.handle_event(register, event).await;
                }
                Some(Err(e)) => {
                    let err = SyncError::subscription(register, e.to_string());
                    tracing::error!(%register, error = %err, "Change feed failed");
                    orchestrator.listener_failed(register, &err).await;
                    break;
                }
                None => {
                    let err = SyncError::subscription(register, "change feed closed");
                    tracing::error!(%register, "Change feed closed");
                    orchestrator.listener_failed(register, &err).await;
                    break;
                }
            }
        }
    }
}
