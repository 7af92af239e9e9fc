use std::fmt::Display;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "FACTORY_LOG";

/// Installs the global subscriber. The filter is read from `FACTORY_LOG` and
/// defaults to `info`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Renders every event published on a bus, tagged with the scope it was
/// created for (an order id, a process id).
pub struct ScopedEventLogger<I, E> {
    scope: I,
    event_receiver: Receiver<E>,
}

impl<I, E> ScopedEventLogger<I, E>
where
    I: 'static + Send + Display,
    E: 'static + Send + Display + Clone,
{
    pub fn new(scope: I, event_receiver: Receiver<E>) -> Self {
        Self {
            scope,
            event_receiver,
        }
    }

    /// Runs until the bus closes or `cancel_token` fires.
    pub fn start(mut self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => return,
                    received = self.event_receiver.recv() => match received {
                        Ok(event) => info!(scope = %self.scope, "{event}"),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(scope = %self.scope, skipped, "event logger fell behind")
                        }
                        Err(RecvError::Closed) => return,
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn logger_stops_when_bus_closes() {
        let (sender, receiver) = broadcast::channel::<String>(8);
        let handle = ScopedEventLogger::new("order-1", receiver).start(CancellationToken::new());

        sender.send("made 3 parts".to_string()).unwrap();
        drop(sender);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn logger_stops_on_cancel() {
        let (_sender, receiver) = broadcast::channel::<String>(8);
        let cancel_token = CancellationToken::new();
        let handle = ScopedEventLogger::new(7u32, receiver).start(cancel_token.clone());

        cancel_token.cancel();
        handle.await.unwrap();
    }
}
