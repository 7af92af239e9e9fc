use std::fmt::Debug;
use std::future::pending;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::abstractions::communication::fair_loss_point_to_point_links::{
    FairLossPointToPointLinks, LinkStats,
};
use crate::abstractions::communication::{is_transient, LinkReceiver, LinkSender};
use crate::abstractions::logging::ScopedEventLogger;
use crate::abstractions::Message;
use crate::config::FactoryConfig;
use crate::error::FactoryError;
use crate::factory::coordinator::{Coordinator, Summary};
use crate::factory::order::{Order, OrderCounter};

const EVENT_BUS_LEN: usize = 256;

type Joined = Result<Result<Summary, FactoryError>, JoinError>;

struct ActiveOrder<A> {
    order: Order,
    peer: A,
    counter: Arc<OrderCounter>,
    cancel_token: CancellationToken,
    handle: JoinHandle<Result<Summary, FactoryError>>,
}

impl<A> ActiveOrder<A> {
    /// Every completion report is out; only the join is left.
    fn is_winding_down(&self) -> bool {
        self.counter.unreported() == 0
    }
}

/// Accepts order requests from the link and fulfils them one at a time.
///
/// A request that arrives while an order is in progress is answered with
/// `ProtocolError` and never touches the running order. On cancellation, or
/// when the receive side fails for good, the server stops the running order
/// and sends one `ProtocolError` to the last requester it served.
pub struct FactoryServer<S, R, A> {
    config: FactoryConfig,
    coordinator: Arc<Coordinator<FairLossPointToPointLinks<S>>>,
    receiver: R,
    _peer: PhantomData<fn() -> A>,
}

impl<S, R, A> FactoryServer<S, R, A>
where
    A: 'static + Send + Sync + Copy + Debug + PartialEq,
    S: 'static + LinkSender<A, Message> + Send + Sync,
    R: LinkReceiver<A, Message> + Send + Sync,
{
    pub fn new(config: FactoryConfig, sender: S, receiver: R) -> Result<Self, FactoryError> {
        config.validate()?;
        let link = Arc::new(FairLossPointToPointLinks::new(sender, config.link));
        let coordinator = Arc::new(Coordinator::new(link, config.staffing.clone())?);

        Ok(Self {
            config,
            coordinator,
            receiver,
            _peer: PhantomData,
        })
    }

    pub fn link_stats(&self) -> Arc<LinkStats> {
        self.coordinator.link().stats()
    }

    /// Serves orders until `cancel_token` fires.
    pub async fn serve(self, cancel_token: CancellationToken) -> Result<(), FactoryError> {
        self.run(cancel_token, false).await.map(|_| ())
    }

    /// Serves exactly one order and returns its summary.
    pub async fn serve_one(self, cancel_token: CancellationToken) -> Result<Summary, FactoryError> {
        self.run(cancel_token, true)
            .await?
            .ok_or(FactoryError::Cancelled)
    }

    async fn run(
        mut self,
        cancel_token: CancellationToken,
        once: bool,
    ) -> Result<Option<Summary>, FactoryError> {
        let mut active: Option<ActiveOrder<A>> = None;
        let mut last_peer: Option<A> = None;

        info!(workers = self.config.workers, "waiting for order requests");
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    self.shutdown(active.take(), last_peer).await;
                    return Ok(None);
                }
                joined = Self::join(&mut active) => {
                    active = None;
                    if let Some(outcome) = Self::settle(joined, once) {
                        return outcome;
                    }
                    info!("waiting for order requests");
                }
                received = self.receiver.recv() => match received {
                    Ok((from, message)) => {
                        // The requester may order again as soon as the last
                        // completion reaches it, before the join below lands.
                        if matches!(message, Message::Request { .. })
                            && active.as_ref().is_some_and(ActiveOrder::is_winding_down)
                        {
                            let joined = Self::join(&mut active).await;
                            active = None;
                            if let Some(outcome) = Self::settle(joined, once) {
                                return outcome;
                            }
                        }
                        self.dispatch(from, message, &mut active, &mut last_peer, &cancel_token)
                            .await
                    }
                    Err(err) if is_transient(&err) => warn!(%err, "receive failed"),
                    Err(err) => {
                        error!(%err, "receive side failed");
                        self.shutdown(active.take(), last_peer).await;
                        return Err(err.into());
                    }
                },
            }
        }
    }

    async fn dispatch(
        &self,
        from: A,
        message: Message,
        active: &mut Option<ActiveOrder<A>>,
        last_peer: &mut Option<A>,
        cancel_token: &CancellationToken,
    ) {
        let Message::Request { order_size } = message else {
            debug!(peer = ?from, ?message, "ignoring message");
            return;
        };

        match active.as_ref() {
            // A duplicated request datagram from the requester being served.
            Some(current)
                if current.peer == from && current.order.requested_quantity == order_size =>
            {
                debug!(peer = ?from, "repeating order confirmation");
                self.send(from, self.confirmation(&current.order)).await;
            }
            Some(current) => {
                let violation = FactoryError::ProtocolViolation {
                    active: current.order.requested_quantity,
                    rejected: order_size,
                };
                warn!(peer = ?from, err = %violation, "rejecting order request");
                self.send(from, Message::ProtocolError).await;
            }
            None => {
                *active = Some(self.accept(from, order_size, cancel_token).await);
                *last_peer = Some(from);
            }
        }
    }

    async fn accept(
        &self,
        from: A,
        order_size: u32,
        cancel_token: &CancellationToken,
    ) -> ActiveOrder<A> {
        let order = Order::new(order_size, self.config.workers);
        info!(order_id = %order.id, peer = ?from, order_size, "received order request");

        self.send(from, self.confirmation(&order)).await;
        info!(
            order_id = %order.id,
            workers = order.worker_count,
            "sent order confirmation"
        );

        let order_token = cancel_token.child_token();
        let (events, bus) = broadcast::channel(EVENT_BUS_LEN);
        ScopedEventLogger::new(order.id, bus).start(order_token.clone());

        let counter = Arc::new(OrderCounter::for_order(&order));
        let coordinator = self.coordinator.clone();
        let order_counter = counter.clone();
        let worker_token = order_token.clone();
        let handle = tokio::spawn(async move {
            coordinator
                .fulfill_with(&order, order_counter, from, events, worker_token)
                .await
        });

        ActiveOrder {
            order,
            peer: from,
            counter,
            cancel_token: order_token,
            handle,
        }
    }

    async fn shutdown(&self, active: Option<ActiveOrder<A>>, last_peer: Option<A>) {
        // No report may follow the shutdown notice.
        if let Some(active) = active {
            warn!(order_id = %active.order.id, "abandoning order in progress");
            active.cancel_token.cancel();
            if let Err(err) = active.handle.await {
                error!(order_id = %active.order.id, %err, "order task failed");
            }
        }
        if let Some(peer) = last_peer {
            self.send(peer, Message::ProtocolError).await;
        }
        info!("factory server terminating");
    }

    fn confirmation(&self, order: &Order) -> Message {
        Message::Confirmation {
            order_size: order.requested_quantity,
            worker_count: order.worker_count,
        }
    }

    async fn send(&self, to: A, message: Message) {
        if let Err(err) = self.coordinator.link().send(to, message).await {
            warn!(peer = ?to, ?message, %err, "failed to send");
        }
    }

    async fn join(active: &mut Option<ActiveOrder<A>>) -> Joined {
        match active {
            Some(active) => (&mut active.handle).await,
            None => pending().await,
        }
    }

    /// Logs a finished order. Returns the outcome of `run` when serving once.
    fn settle(joined: Joined, once: bool) -> Option<Result<Option<Summary>, FactoryError>> {
        match joined.map_err(FactoryError::OrderTask).and_then(|fulfilled| fulfilled) {
            Ok(summary) => {
                info!("\n{summary}");
                once.then_some(Ok(Some(summary)))
            }
            Err(err) => {
                error!(%err, "order failed");
                once.then_some(Err(err))
            }
        }
    }
}
