//! Datagram links carrying fixed-size [`Message`] records over UDP.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::warn;

use crate::abstractions::codec::{self, RECORD_LEN};
use crate::abstractions::communication::{LinkReceiver, LinkSender};
use crate::abstractions::Message;

// Room for oversized datagrams so they can be truncated to one record.
const RECV_BUF_LEN: usize = RECORD_LEN * 4;

pub struct UdpLink;

impl UdpLink {
    /// Binds one socket and splits it into a send half and a receive half.
    pub async fn bind<T: ToSocketAddrs>(addr: T) -> io::Result<(UdpLinkSender, UdpLinkReceiver)> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        Ok((
            UdpLinkSender {
                socket: socket.clone(),
            },
            UdpLinkReceiver { socket },
        ))
    }
}

#[derive(Clone)]
pub struct UdpLinkSender {
    socket: Arc<UdpSocket>,
}

impl UdpLinkSender {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl LinkSender<SocketAddr, Message> for UdpLinkSender {
    async fn send(&self, to: SocketAddr, message: Message) -> io::Result<()> {
        let buf = codec::encode(&message);
        let written = self.socket.send_to(&buf, to).await?;
        if written != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {written} of {} bytes", buf.len()),
            ));
        }
        Ok(())
    }
}

pub struct UdpLinkReceiver {
    socket: Arc<UdpSocket>,
}

impl UdpLinkReceiver {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl LinkReceiver<SocketAddr, Message> for UdpLinkReceiver {
    /// Waits for the next well-formed record. Malformed datagrams are logged
    /// and discarded.
    async fn recv(&mut self) -> io::Result<(SocketAddr, Message)> {
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            match codec::decode(&buf[..len]) {
                Ok(message) => return Ok((from, message)),
                Err(err) => warn!(%from, len, %err, "discarding datagram"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_cross_a_real_socket() {
        let (_, mut server_rx) = UdpLink::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server_rx.local_addr().unwrap();
        let (client_tx, _) = UdpLink::bind("127.0.0.1:0").await.unwrap();

        client_tx
            .send(server_addr, Message::Request { order_size: 12 })
            .await
            .unwrap();

        let (from, message) = server_rx.recv().await.unwrap();
        assert_eq!(from, client_tx.local_addr().unwrap());
        assert_eq!(message, Message::Request { order_size: 12 });
    }

    #[tokio::test]
    async fn malformed_datagrams_are_skipped() {
        let (_, mut server_rx) = UdpLink::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server_rx.local_addr().unwrap();
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        raw.send_to(&[1, 2, 3], server_addr).await.unwrap();
        raw.send_to(&codec::encode(&Message::ProtocolError), server_addr)
            .await
            .unwrap();

        let (_, message) = server_rx.recv().await.unwrap();
        assert_eq!(message, Message::ProtocolError);
    }
}
