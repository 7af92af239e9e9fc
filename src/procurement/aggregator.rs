use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::abstractions::communication::{is_transient, LinkReceiver, LinkSender};
use crate::abstractions::Message;
use crate::config::ProcurementConfig;
use crate::error::ProcurementError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerTally {
    /// Sum of the production reports received.
    pub units_produced: u64,
    pub iterations: u32,
    /// Total the sub-factory claimed in its completion report.
    pub reported_total: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    Match,
    Mismatch { delivered: u64, ordered: u32 },
}

/// Everything procurement learned about one order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateReport {
    pub requested: u32,
    /// Order size as confirmed by the factory; the expected total.
    pub order_size: u32,
    pub worker_count: u32,
    pub workers: BTreeMap<u32, WorkerTally>,
    pub elapsed: Duration,
}

impl AggregateReport {
    fn confirmed(requested: u32, order_size: u32, worker_count: u32) -> Self {
        Self {
            requested,
            order_size,
            worker_count,
            workers: BTreeMap::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn grand_total(&self) -> u64 {
        self.workers.values().map(|w| w.units_produced).sum()
    }

    pub fn completed(&self) -> usize {
        self.workers
            .values()
            .filter(|w| w.reported_total.is_some())
            .count()
    }

    pub fn reconcile(&self) -> Reconciliation {
        let delivered = self.grand_total();
        if delivered == u64::from(self.order_size) {
            Reconciliation::Match
        } else {
            Reconciliation::Mismatch {
                delivered,
                ordered: self.order_size,
            }
        }
    }

    fn knows(&self, worker_id: u32) -> bool {
        (1..=self.worker_count).contains(&worker_id)
    }

    fn record_production(&mut self, worker_id: u32, units: u32) {
        let tally = self.workers.entry(worker_id).or_default();
        tally.iterations += 1;
        tally.units_produced += u64::from(units);
    }

    /// Returns `false` for a repeated completion, which must not count twice.
    fn record_completion(&mut self, worker_id: u32, units: u32) -> bool {
        let tally = self.workers.entry(worker_id).or_default();
        if tally.reported_total.is_some() {
            return false;
        }
        tally.reported_total = Some(units);
        true
    }
}

impl fmt::Display for AggregateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "****** PROCUREMENT Summary Report ******")?;
        for (id, tally) in &self.workers {
            writeln!(
                f,
                "Factory #{id}: made a total of {:>6} items in {:>4} iterations",
                tally.units_produced, tally.iterations
            )?;
        }
        writeln!(f, "==============================")?;
        write!(
            f,
            "Grand total parts made = {}   vs order size of   {}",
            self.grand_total(),
            self.order_size
        )
    }
}

/// Places orders with a factory at a known endpoint.
pub struct Procurement<S, R, A> {
    sender: S,
    receiver: R,
    config: ProcurementConfig,
    _peer: PhantomData<fn() -> A>,
}

impl<S, R, A> Procurement<S, R, A>
where
    A: 'static + Send + Copy + Debug + PartialEq,
    S: LinkSender<A, Message>,
    R: LinkReceiver<A, Message>,
{
    pub fn new(sender: S, receiver: R, config: ProcurementConfig) -> Self {
        Self {
            sender,
            receiver,
            config,
            _peer: PhantomData,
        }
    }

    /// Orders `quantity` parts from `endpoint` and collects reports until every
    /// confirmed sub-factory has completed.
    ///
    /// Blocks forever if a completion report is lost, unless
    /// [`ProcurementConfig::report_timeout`] is set. A shortfall is reported
    /// through [`AggregateReport::reconcile`], not as an error.
    pub async fn place_order(
        &mut self,
        quantity: u32,
        endpoint: A,
    ) -> Result<AggregateReport, ProcurementError> {
        let started = Instant::now();
        self.sender
            .send(endpoint, Message::Request {
                order_size: quantity,
            })
            .await?;
        info!(?endpoint, quantity, "sent order request, waiting for confirmation");

        let mut report = loop {
            match self
                .next_from(endpoint, self.config.confirm_timeout, "order confirmation")
                .await?
            {
                Message::Confirmation {
                    order_size,
                    worker_count,
                } => break AggregateReport::confirmed(quantity, order_size, worker_count),
                Message::ProtocolError => return Err(ProcurementError::ProtocolError),
                other => debug!(message = ?other, "ignoring message before confirmation"),
            }
        };
        info!(
            order_size = report.order_size,
            workers = report.worker_count,
            "order confirmed"
        );
        if report.order_size != quantity {
            warn!(
                requested = quantity,
                confirmed = report.order_size,
                "factory confirmed a different order size"
            );
        }

        let mut outstanding = report.worker_count;
        while outstanding > 0 {
            match self
                .next_from(endpoint, self.config.report_timeout, "production reports")
                .await?
            {
                Message::Production {
                    worker_id,
                    units_produced,
                    duration_ms,
                    ..
                } if report.knows(worker_id) => {
                    report.record_production(worker_id, units_produced);
                    info!(worker_id, units_produced, duration_ms, "factory produced parts");
                }
                Message::Completion {
                    worker_id,
                    units_produced,
                } if report.knows(worker_id) => {
                    if report.record_completion(worker_id, units_produced) {
                        outstanding -= 1;
                        info!(worker_id, units_produced, "factory completed its task");
                    } else {
                        debug!(worker_id, "ignoring repeated completion");
                    }
                }
                Message::ProtocolError => {
                    warn!("received PROTOCOL_ERROR, aborting");
                    return Err(ProcurementError::ProtocolError);
                }
                other => warn!(message = ?other, "ignoring unexpected message"),
            }
        }

        report.elapsed = started.elapsed();
        match report.reconcile() {
            Reconciliation::Match => info!("\n{report}"),
            Reconciliation::Mismatch { delivered, ordered } => {
                warn!(delivered, ordered, "\n{report}\norder size mismatch, error in production")
            }
        }
        Ok(report)
    }

    async fn next_from(
        &mut self,
        endpoint: A,
        timeout: Option<Duration>,
        waiting_for: &'static str,
    ) -> Result<Message, ProcurementError> {
        // One deadline per wait; ignored traffic does not push it back.
        let deadline = timeout.map(|limit| Instant::now() + limit);
        loop {
            let received = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, self.receiver.recv())
                    .await
                    .map_err(|_| ProcurementError::Timeout(waiting_for))?,
                None => self.receiver.recv().await,
            };
            match received {
                Ok((from, message)) if from == endpoint => return Ok(message),
                Ok((from, message)) => warn!(?from, ?message, "ignoring message from unknown peer"),
                Err(err) if is_transient(&err) => warn!(%err, "receive failed, still waiting"),
                Err(err) => return Err(err.into()),
            }
        }
    }
}
