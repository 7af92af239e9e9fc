use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use crate::abstractions::communication::LinkSender;
use crate::abstractions::process::ID;
use crate::abstractions::Message;
use crate::config::Staffing;
use crate::error::{ConfigError, FactoryError};
use crate::factory::order::{Order, OrderCounter, OrderId};
use crate::factory::worker::{SubFactory, WorkerProfile, WorkerState};
use crate::factory::FactoryEvent;

/// Final accounting of one fulfilled order, workers in id order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub order_id: OrderId,
    pub order_size: u32,
    pub workers: Vec<WorkerState>,
    pub grand_total: u64,
    pub elapsed: Duration,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "****** FACTORY Summary Report ({}) ******", self.order_id)?;
        writeln!(f, "Sub-Factory      Parts Made      Iterations")?;
        for worker in &self.workers {
            writeln!(
                f,
                "{:>6}{:>16}{:>16}",
                worker.id, worker.units_produced, worker.iterations
            )?;
        }
        writeln!(f, "============================================")?;
        writeln!(
            f,
            "Grand total parts made  =  {}  vs  order size of   {}",
            self.grand_total, self.order_size
        )?;
        write!(
            f,
            "Order-to-Completion time = {:.1} milliseconds",
            self.elapsed.as_secs_f64() * 1000.0
        )
    }
}

/// Fulfils orders with a fresh pool of sub-factories each time.
pub struct Coordinator<L> {
    link: Arc<L>,
    staffing: Staffing,
    rng: Mutex<StdRng>,
}

impl<L> Coordinator<L>
where
    L: 'static + Send + Sync,
{
    pub fn new(link: Arc<L>, staffing: Staffing) -> Result<Self, ConfigError> {
        staffing.validate()?;
        let rng = match &staffing {
            Staffing::Random {
                seed: Some(seed), ..
            } => StdRng::seed_from_u64(*seed),
            _ => StdRng::from_os_rng(),
        };

        Ok(Self {
            link,
            staffing,
            rng: Mutex::new(rng),
        })
    }

    pub fn link(&self) -> &Arc<L> {
        &self.link
    }

    fn draw_profiles(&self, count: u32) -> Vec<WorkerProfile> {
        match &self.staffing {
            Staffing::Random {
                capacity,
                duration_ms,
                ..
            } => {
                let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                (0..count)
                    .map(|_| WorkerProfile {
                        capacity: rng.random_range(capacity.clone()),
                        duration: Duration::from_millis(u64::from(
                            rng.random_range(duration_ms.clone()),
                        )),
                    })
                    .collect()
            }
            Staffing::Fixed(profiles) => profiles
                .iter()
                .cycle()
                .take(count as usize)
                .copied()
                .collect(),
        }
    }

    /// Drains `order` with `order.worker_count` concurrent sub-factories that
    /// report to `peer`, and waits for all of them to finish.
    ///
    /// Each call owns its counter, so two orders never share remaining work.
    /// Lifecycle events go to `events`; the bus closes once every sub-factory
    /// is done.
    pub async fn fulfill<A>(
        &self,
        order: &Order,
        peer: A,
        events: broadcast::Sender<FactoryEvent>,
        cancel_token: CancellationToken,
    ) -> Result<Summary, FactoryError>
    where
        A: 'static + Send + Sync + Copy + Debug,
        L: LinkSender<A, Message>,
    {
        let counter = Arc::new(OrderCounter::for_order(order));
        self.fulfill_with(order, counter, peer, events, cancel_token).await
    }

    /// Like [`Coordinator::fulfill`], drawing from a counter the caller keeps
    /// a handle on. `counter` must be fresh for `order`.
    pub async fn fulfill_with<A>(
        &self,
        order: &Order,
        counter: Arc<OrderCounter>,
        peer: A,
        events: broadcast::Sender<FactoryEvent>,
        cancel_token: CancellationToken,
    ) -> Result<Summary, FactoryError>
    where
        A: 'static + Send + Sync + Copy + Debug,
        L: LinkSender<A, Message>,
    {
        let span = info_span!("order", order_id = %order.id, size = order.requested_quantity);
        let started = Instant::now();

        let handles: Vec<_> = ID::starting_at(1)
            .zip(self.draw_profiles(order.worker_count))
            .map(|(id, profile)| {
                let worker = SubFactory::new(
                    id,
                    profile,
                    counter.clone(),
                    self.link.clone(),
                    peer,
                    events.clone(),
                    cancel_token.clone(),
                );
                (id, tokio::spawn(worker.run().instrument(span.clone())))
            })
            .collect();
        drop(events);

        let mut workers = Vec::with_capacity(handles.len());
        let mut failure = None;
        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(state)) => workers.push(state),
                Ok(Err(err)) => {
                    failure.get_or_insert(err);
                }
                Err(_) => {
                    failure.get_or_insert(FactoryError::WorkerPanicked(id));
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let grand_total = workers.iter().map(|w| u64::from(w.units_produced)).sum();
        let remaining = counter.remaining();
        if grand_total != u64::from(order.requested_quantity) || remaining != 0 {
            return Err(FactoryError::Shortfall {
                produced: grand_total,
                ordered: order.requested_quantity,
                remaining,
            });
        }

        let summary = Summary {
            order_id: order.id,
            order_size: order.requested_quantity,
            workers,
            grand_total,
            elapsed: started.elapsed(),
        };
        span.in_scope(|| info!(grand_total, elapsed = ?summary.elapsed, "order fulfilled"));
        Ok(summary)
    }
}
