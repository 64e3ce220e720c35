//! Ephemeral port discovery for the daemon's datagram endpoint.
//!
//! The probe socket is closed before the port is handed out, so nothing is
//! reserved: another process may claim the port before the daemon binds it.
//! Both ends are loopback-only and collisions are rare, so the race is
//! accepted rather than closed with a listening-socket handoff.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

/// Returns a free loopback UDP port, or `0` when the OS could not provide one.
pub fn allocate() -> u16 {
    match probe() {
        Ok(port) => {
            trace!("allocated loopback port {port}");
            port
        }
        Err(e) => {
            debug!("port probe failed: {e}");
            0
        }
    }
}

fn probe() -> std::io::Result<u16> {
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?;
    let port = socket.local_addr()?.port();
    drop(socket);
    Ok(port)
}

/// Source of daemon ports, swappable so supervisors can be driven with a fixed port.
pub trait PortAllocator: Send + Sync {
    /// `0` signals allocation failure.
    fn allocate(&self) -> u16;
}

/// Asks the OS for an ephemeral port.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsPortAllocator;

impl PortAllocator for OsPortAllocator {
    fn allocate(&self) -> u16 {
        allocate()
    }
}

/// Always hands out the same port; `FixedPort(0)` models an exhausted OS.
#[derive(Debug, Clone, Copy)]
pub struct FixedPort(pub u16);

impl PortAllocator for FixedPort {
    fn allocate(&self) -> u16 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_returns_nonzero_port() {
        assert_ne!(allocate(), 0);
    }

    #[test]
    fn test_allocated_port_is_released() {
        let port = allocate();
        assert_ne!(port, 0);
        // The probe socket is closed, so the daemon side can bind it.
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));
        assert!(socket.is_ok(), "port {port} still held: {socket:?}");
    }

    #[test]
    fn test_fixed_port() {
        assert_eq!(FixedPort(54321).allocate(), 54321);
        assert_eq!(FixedPort(0).allocate(), 0);
    }
}
