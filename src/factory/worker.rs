use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::abstractions::communication::LinkSender;
use crate::abstractions::Message;
use crate::error::FactoryError;
use crate::factory::order::OrderCounter;
use crate::factory::FactoryEvent;

/// Fixed for a sub-factory's whole lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerProfile {
    pub capacity: u32,
    pub duration: Duration,
}

impl WorkerProfile {
    pub fn duration_ms(&self) -> u32 {
        u32::try_from(self.duration.as_millis()).unwrap_or(u32::MAX)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerState {
    pub id: u32,
    pub capacity: u32,
    pub duration_ms: u32,
    pub units_produced: u32,
    pub iterations: u32,
}

/// One sub-factory of an order.
///
/// Claims at most `capacity` units per iteration, spends `duration` producing
/// them, and sends a production report to `peer`. Once a claim comes back
/// empty it sends a single completion report and hands its final state back.
pub struct SubFactory<L, A> {
    state: WorkerState,
    duration: Duration,
    counter: Arc<OrderCounter>,
    link: Arc<L>,
    peer: A,
    events: broadcast::Sender<FactoryEvent>,
    cancel_token: CancellationToken,
}

impl<L, A> SubFactory<L, A>
where
    A: 'static + Send + Sync + Copy + Debug,
    L: 'static + LinkSender<A, Message> + Send + Sync,
{
    pub fn new(
        id: u32,
        profile: WorkerProfile,
        counter: Arc<OrderCounter>,
        link: Arc<L>,
        peer: A,
        events: broadcast::Sender<FactoryEvent>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            state: WorkerState {
                id,
                capacity: profile.capacity,
                duration_ms: profile.duration_ms(),
                units_produced: 0,
                iterations: 0,
            },
            duration: profile.duration,
            counter,
            link,
            peer,
            events,
            cancel_token,
        }
    }

    /// Runs to completion. Cancellation abandons the order without a
    /// completion report.
    pub async fn run(mut self) -> Result<WorkerState, FactoryError> {
        self.publish(FactoryEvent::Started {
            worker_id: self.state.id,
            capacity: self.state.capacity,
            duration_ms: self.state.duration_ms,
        });

        loop {
            if self.cancel_token.is_cancelled() {
                return Err(FactoryError::Cancelled);
            }

            let claimed = self.counter.claim(self.state.capacity);
            if claimed == 0 {
                break;
            }

            self.publish(FactoryEvent::Producing {
                worker_id: self.state.id,
                units: claimed,
                duration_ms: self.state.duration_ms,
            });

            tokio::select! {
                _ = self.cancel_token.cancelled() => return Err(FactoryError::Cancelled),
                _ = tokio::time::sleep(self.duration) => {}
            }

            self.state.units_produced += claimed;
            self.state.iterations += 1;

            self.report(Message::Production {
                worker_id: self.state.id,
                capacity: self.state.capacity,
                units_produced: claimed,
                duration_ms: self.state.duration_ms,
            })
            .await;
        }

        self.counter.mark_reported();
        self.report(Message::Completion {
            worker_id: self.state.id,
            units_produced: self.state.units_produced,
        })
        .await;

        self.publish(FactoryEvent::Finished(self.state));
        Ok(self.state)
    }

    // Delivery is best effort; a failed send is never retried.
    async fn report(&self, message: Message) {
        match self.link.send(self.peer, message).await {
            Ok(()) => debug!(worker_id = self.state.id, ?message, "report sent"),
            Err(err) => warn!(
                worker_id = self.state.id,
                peer = ?self.peer,
                %err,
                ?message,
                "failed to send report"
            ),
        }
    }

    fn publish(&self, event: FactoryEvent) {
        // No subscriber is fine.
        let _ = self.events.send(event);
    }
}
