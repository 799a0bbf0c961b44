use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;
use tokio::net::UdpSocket;

use crate::{
    config::{LogicalDevice, SendMode},
    osc,
};

#[derive(Error, Debug)]
pub enum SendError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
}

/// Outbound OSC transmitter. One socket for the lifetime of the
/// service; the addressing mode is fixed at construction. Failures are
/// returned to the caller and never retried here — the next sample
/// that passes the rate limiter retries naturally.
pub(crate) struct OscSender {
    socket: UdpSocket,
    mode: SendMode,
    port: u16,
    base_path: String,
}

impl OscSender {
    pub(crate) async fn new(mode: SendMode, port: u16, base_path: &str) -> Result<Self, SendError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        if mode == SendMode::Broadcast {
            socket.set_broadcast(true)?;
        }
        Ok(Self {
            socket,
            mode,
            port,
            base_path: base_path.to_string(),
        })
    }

    /// Destination and message path for one update. In broadcast mode
    /// every physical device receives the datagram and filters on the
    /// trailing path segment.
    fn route(&self, device: &LogicalDevice, target: IpAddr) -> (SocketAddr, String) {
        match self.mode {
            SendMode::Unicast => (SocketAddr::new(target, self.port), self.base_path.clone()),
            SendMode::Broadcast => (
                SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), self.port),
                format!("{}/{}", self.base_path, device.discovery.to_lowercase()),
            ),
        }
    }

    /// Encodes and transmits a single intensity datagram.
    pub(crate) async fn send(
        &self,
        device: &LogicalDevice,
        target: IpAddr,
        value: f32,
    ) -> Result<(), SendError> {
        let (dest, path) = self.route(device, target);
        let datagram = osc::encode_float(&path, value);
        self.socket.send_to(&datagram, dest).await?;
        Ok(())
    }
}
