//! UDP multicast transport for SSDP probes.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use ocast_core::error::DiscoveryError;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{trace, warn};

use crate::message::{SsdpMessage, SSDP_MULTICAST_ADDR, SSDP_PORT};

const READ_BUFFER_SIZE: usize = 4096;

/// Socket abstraction used to send probes and collect responses.
///
/// Socket-level failures are fatal to the instance and surface as
/// [`DiscoveryError::Socket`]; malformed datagrams are logged and skipped.
pub struct SsdpSocket {
    socket: UdpSocket,
    group: SocketAddr,
}

impl SsdpSocket {
    /// Bind an ephemeral UDP socket for search/response exchanges.
    pub async fn bind() -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        Ok(SsdpSocket {
            socket,
            group: SocketAddr::from((SSDP_MULTICAST_ADDR, SSDP_PORT)),
        })
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, DiscoveryError> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one message as a single datagram to the multicast group.
    pub async fn send(&self, message: &SsdpMessage) -> Result<(), DiscoveryError> {
        self.socket
            .send_to(message.to_string().as_bytes(), self.group)
            .await?;
        Ok(())
    }

    /// Receive and parse datagrams until `read_timeout` elapses.
    ///
    /// Malformed payloads never abort the loop; they are logged at warn and
    /// dropped.
    pub async fn read(&self, read_timeout: Duration) -> Result<Vec<SsdpMessage>, DiscoveryError> {
        let mut result = Vec::new();
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        let deadline = Instant::now() + read_timeout;

        loop {
            match timeout_at(deadline, self.socket.recv_from(&mut buffer)).await {
                // Deadline reached: this read cycle is over.
                Err(_) => break,
                Ok(Err(e)) => return Err(DiscoveryError::Socket(e)),
                Ok(Ok((len, peer))) => {
                    let data = String::from_utf8_lossy(&buffer[..len]);
                    trace!(%peer, "received UDP packet: {}", data.replace('\r', ""));
                    match SsdpMessage::parse(&data) {
                        Ok(message) => result.push(message),
                        Err(e) => warn!("ignoring malformed datagram: {e}"),
                    }
                }
            }
        }
        Ok(result)
    }
}
