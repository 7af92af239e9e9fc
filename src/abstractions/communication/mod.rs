use core::hash::Hash;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

pub mod fair_loss_point_to_point_links;
pub mod udp;

/// Directed, connectionless send: no delivery or ordering guarantee.
pub trait LinkSender<A, M>
where
    A: 'static + Send,
    M: 'static + Send,
{
    fn send(&self, to: A, message: M) -> impl Future<Output = io::Result<()>> + Send;
}

pub trait LinkReceiver<A, M>
where
    A: 'static + Send,
    M: 'static + Send,
{
    // https://stackoverflow.com/questions/78134843/future-cannot-be-sent-between-threads-safely-error
    fn recv(&mut self) -> impl Future<Output = io::Result<(A, M)>> + Send;
}

impl<A, M, L> LinkSender<A, M> for Arc<L>
where
    A: 'static + Send,
    M: 'static + Send,
    L: LinkSender<A, M> + Send + Sync,
{
    fn send(&self, to: A, message: M) -> impl Future<Output = io::Result<()>> + Send {
        (**self).send(to, message)
    }
}

/// Receive errors that say nothing about the link as a whole. ICMP errors,
/// for one, surface on the next receive of a UDP socket.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Replays a fixed sequence of receive results, then waits forever.
#[cfg(test)]
pub(crate) struct ScriptedReceiver<A, M> {
    script: std::collections::VecDeque<io::Result<(A, M)>>,
}

#[cfg(test)]
impl<A, M> ScriptedReceiver<A, M> {
    pub(crate) fn new(script: Vec<io::Result<(A, M)>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[cfg(test)]
impl<A, M> LinkReceiver<A, M> for ScriptedReceiver<A, M>
where
    A: 'static + Send,
    M: 'static + Send,
{
    async fn recv(&mut self) -> io::Result<(A, M)> {
        match self.script.pop_front() {
            Some(next) => next,
            None => std::future::pending().await,
        }
    }
}

pub const LOCAL_QUEUE_LEN: usize = 1024;

type Directory<A, M> = Arc<Mutex<HashMap<A, mpsc::Sender<(A, M)>>>>;

/// Hands out in-memory links between local processes addressed by id.
///
/// Every link created by the same factory can reach every other one.
pub struct LocalProcessFactory<A, M> {
    directory: Directory<A, M>,
}

impl<A, M> LocalProcessFactory<A, M>
where
    A: PartialEq + Eq + Hash + Copy,
{
    pub fn new() -> Self {
        Self {
            directory: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn new_local_process_link(
        &mut self,
        id: A,
    ) -> (LocalProcessSender<A, M>, LocalProcessReceiver<A, M>) {
        let (inner_sender, inner_receiver) = mpsc::channel(LOCAL_QUEUE_LEN);

        self.directory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, inner_sender);

        let sender = LocalProcessSender {
            id,
            directory: self.directory.clone(),
        };
        let receiver = LocalProcessReceiver {
            event_receiver: inner_receiver,
        };

        (sender, receiver)
    }
}

impl<A, M> Default for LocalProcessFactory<A, M>
where
    A: PartialEq + Eq + Hash + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

pub struct LocalProcessSender<A, M> {
    id: A,
    directory: Directory<A, M>,
}

impl<A, M> LocalProcessSender<A, M>
where
    A: Copy,
{
    pub fn id(&self) -> A {
        self.id
    }
}

impl<A, M> LinkSender<A, M> for LocalProcessSender<A, M>
where
    A: 'static + Send + Sync + Eq + Hash + Copy + core::fmt::Debug,
    M: 'static + Send,
{
    async fn send(&self, to: A, message: M) -> io::Result<()> {
        let sender = self
            .directory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&to)
            .cloned();

        // Undeliverable messages vanish, like datagrams.
        match sender.map(|sender| sender.try_send((self.id, message))) {
            Some(Ok(())) => {}
            Some(Err(TrySendError::Full(_))) => trace!(?to, "local queue full, message dropped"),
            Some(Err(TrySendError::Closed(_))) => trace!(?to, "local link closed, message dropped"),
            None => trace!(?to, "no local process, message dropped"),
        }
        Ok(())
    }
}

impl<A, M> Clone for LocalProcessSender<A, M>
where
    A: Copy,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            directory: self.directory.clone(),
        }
    }
}

pub struct LocalProcessReceiver<A, M> {
    event_receiver: mpsc::Receiver<(A, M)>,
}

impl<A, M> LinkReceiver<A, M> for LocalProcessReceiver<A, M>
where
    A: 'static + Send,
    M: 'static + Send,
{
    async fn recv(&mut self) -> io::Result<(A, M)> {
        self.event_receiver.recv().await.ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionAborted, "local link closed")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_links_reach_each_other() {
        let mut factory = LocalProcessFactory::<usize, &'static str>::new();
        let (sender_a, mut receiver_a) = factory.new_local_process_link(0);
        let (sender_b, mut receiver_b) = factory.new_local_process_link(1);

        sender_a.send(1, "ping").await.unwrap();
        assert_eq!(receiver_b.recv().await.unwrap(), (0, "ping"));

        sender_b.send(0, "pong").await.unwrap();
        assert_eq!(receiver_a.recv().await.unwrap(), (1, "pong"));
    }

    #[tokio::test]
    async fn unknown_peer_swallows_message() {
        let mut factory = LocalProcessFactory::<usize, u32>::new();
        let (sender, _receiver) = factory.new_local_process_link(0);

        assert!(sender.send(7, 1).await.is_ok());
    }
}
