//! UDP broadcast-based device discovery.
//!
//! The client broadcasts a [`DiscoveryProbe`] on the discovery port and
//! collects [`DiscoveryReply`] datagrams until the timeout elapses or enough
//! devices have answered. Each reply names the TCP port the device accepts
//! sessions on; the address is taken from the datagram source.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Instant;

use tracing::{debug, instrument};

use super::traits::{DeviceHandle, Discovery, DiscoveryQuery, TransportError};
use crate::protocol::constants::MAX_DATAGRAM_LEN;
use crate::protocol::messages::{DiscoveryProbe, DiscoveryReply};

/// Broadcast prober.
#[derive(Debug, Clone)]
pub struct UdpDiscovery {
    destination: SocketAddr,
}

impl UdpDiscovery {
    /// Probe the LAN broadcast address on `port`.
    pub fn new(port: u16) -> Self {
        Self::with_destination(SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), port))
    }

    /// Probe a specific address instead of broadcasting.
    pub fn with_destination(destination: SocketAddr) -> Self {
        Self { destination }
    }
}

impl Discovery for UdpDiscovery {
    #[instrument(skip(self), fields(destination = %self.destination))]
    fn browse(&self, query: &DiscoveryQuery) -> Result<Vec<DeviceHandle>, TransportError> {
        let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0))?;
        socket.set_broadcast(true)?;

        let probe = serde_json::to_vec(&DiscoveryProbe {
            target: query.target.clone(),
        })
        .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        socket
            .send_to(&probe, self.destination)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        let deadline = Instant::now() + query.timeout;
        let mut found: Vec<DeviceHandle> = Vec::new();
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];

        loop {
            if query.limit.is_some_and(|limit| found.len() >= limit) {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            socket.set_read_timeout(Some(remaining))?;

            let (len, src) = match socket.recv_from(&mut buf) {
                Ok(pair) => pair,
                Err(e) if is_timeout_error(&e) => break,
                Err(e) => return Err(TransportError::ReadFailed(e.to_string())),
            };

            let reply: DiscoveryReply = match serde_json::from_slice(&buf[..len]) {
                Ok(reply) => reply,
                Err(e) => {
                    debug!(%src, error = %e, "Ignoring malformed discovery reply");
                    continue;
                }
            };
            if let Some(handle) = accept_reply(reply, src, query, &found) {
                debug!(device = %handle, "Discovery reply");
                found.push(handle);
            }
        }

        Ok(found)
    }
}

/// Turn a reply into a handle if it matches and is new.
fn accept_reply(
    reply: DiscoveryReply,
    src: SocketAddr,
    query: &DiscoveryQuery,
    found: &[DeviceHandle],
) -> Option<DeviceHandle> {
    if query
        .target
        .as_ref()
        .is_some_and(|target| *target != reply.device_id)
    {
        return None;
    }
    if found.iter().any(|d| d.device_id == reply.device_id) {
        return None;
    }
    let name = if reply.name.is_empty() {
        reply.device_id.clone()
    } else {
        reply.name
    };
    Some(DeviceHandle {
        device_id: reply.device_id,
        name,
        address: SocketAddr::new(src.ip(), reply.port),
    })
}

fn is_timeout_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
