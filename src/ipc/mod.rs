//! One-way, best-effort datagram channel to the daemon.
//!
//! Nothing is ever read back. A lost message is tolerated because the
//! shutdown protocol escalates to a forced kill regardless.

use crate::Result;
use crate::error::IpcError;
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::net::UdpSocket;

pub mod osc;

#[derive(Debug, Clone, PartialEq, Eq, strum::Display, strum::EnumIs)]
pub enum IpcMessage {
    /// Ask the daemon to shut down cleanly
    Quit,
    /// Any other argument-less OSC command
    Osc { address: String },
}

impl IpcMessage {
    pub fn address(&self) -> &str {
        match self {
            IpcMessage::Quit => "/quit",
            IpcMessage::Osc { address } => address,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        osc::encode(self.address())
    }
}

/// A UDP socket connected to `127.0.0.1:<port>`.
#[derive(Debug)]
pub struct IpcChannel {
    socket: UdpSocket,
    port: u16,
}

impl IpcChannel {
    pub async fn connect(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(|source| IpcError::Bind { source })?;
        socket
            .connect(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|source| IpcError::Connect { port, source })?;
        trace!("ipc channel connected to 127.0.0.1:{port}");
        Ok(Self { socket, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Fire-and-forget: one datagram, no acknowledgment, no retry.
    pub async fn send(&self, msg: &IpcMessage) -> Result<()> {
        let bytes = msg.encode()?;
        self.socket
            .send(&bytes)
            .await
            .map_err(|source| IpcError::Send {
                address: msg.address().to_string(),
                port: self.port,
                source,
            })?;
        debug!("sent {} to 127.0.0.1:{}", msg.address(), self.port);
        Ok(())
    }
}
