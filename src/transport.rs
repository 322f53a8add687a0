use std::net::SocketAddr;

use log::trace;
use tokio::net::{ToSocketAddrs, UdpSocket};

use crate::error::ChannelError;

/// Largest datagram the receive loop will accept. Generously above the
/// 1280 byte encode ceiling to tolerate chatty peers.
pub const COAP_MTU: usize = 1600;

/// Thin wrapper around one UDP socket. A channel owns its transport
/// exclusively: sends are fire-and-forget, receives block only the
/// channel's dedicated receive loop.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> std::io::Result<UdpTransport> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(UdpTransport { socket })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn send(&self, bytes: &[u8], peer: SocketAddr) -> Result<(), ChannelError> {
        trace!("send {} bytes to {}", bytes.len(), peer);
        self.socket.send_to(bytes, peer).await?;
        Ok(())
    }

    /// Waits for the next datagram. A fatal socket error here means the
    /// channel must be reinitialized.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), ChannelError> {
        let (n, peer) = self.socket.recv_from(buf).await?;
        trace!("recv {} bytes from {}", n, peer);
        Ok((n, peer))
    }
}
