//! Event queue and per-event task dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{error, info};
use uuid::Uuid;

use super::events::RoleChangeEvent;
use super::reconciler::Reconciler;

/// Bounded intake queue.
pub fn event_queue(
    capacity: usize,
) -> (mpsc::Sender<RoleChangeEvent>, mpsc::Receiver<RoleChangeEvent>) {
    mpsc::channel(capacity.max(1))
}

/// Drains the intake queue, running one task per event.
pub struct Dispatcher {
    reconciler: Arc<Reconciler>,
    events: mpsc::Receiver<RoleChangeEvent>,
}

impl Dispatcher {
    pub fn new(reconciler: Arc<Reconciler>, events: mpsc::Receiver<RoleChangeEvent>) -> Self {
        Self { reconciler, events }
    }

    /// Run until every sender is dropped, then wait for in-flight events.
    ///
    /// Each event runs in its own task, so a panic stays confined to it.
    pub async fn run(mut self) {
        info!("Event dispatcher started");
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<Id, Uuid> = HashMap::new();

        loop {
            tokio::select! {
                received = self.events.recv() => {
                    let Some(event) = received else { break };
                    let event_id = event.event_id;
                    let reconciler = Arc::clone(&self.reconciler);
                    let handle = tasks.spawn(async move {
                        reconciler.process(&event).await;
                    });
                    in_flight.insert(handle.id(), event_id);
                }
                Some(finished) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                    report_join(&mut in_flight, finished);
                }
            }
        }

        info!(in_flight = tasks.len(), "Event queue closed, draining");
        while let Some(finished) = tasks.join_next_with_id().await {
            report_join(&mut in_flight, finished);
        }
        info!("Event dispatcher stopped");
    }
}

fn report_join(in_flight: &mut HashMap<Id, Uuid>, result: Result<(Id, ()), JoinError>) {
    match result {
        Ok((id, ())) => {
            in_flight.remove(&id);
        }
        Err(e) => {
            let event_id = in_flight.remove(&e.id());
            error!(event_id = ?event_id, "Event task panicked: {}", e);
        }
    }
}
