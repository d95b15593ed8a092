//! Ephemeral TCP port allocation.
//!
//! Ports are picked by binding an ephemeral socket to port 0 and reading back
//! what the OS assigned. The socket is held until [`PortAllocation::release`]
//! so that ports allocated together never collide with each other, and is
//! dropped right before the server binds the port itself. Another process on
//! the host can still grab the port in between; that window is accepted for
//! short-lived localhost fixtures.

use crate::core::error::{Result, TestbedError};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, TcpListener};

/// A port held open by a bound listener until released.
#[derive(Debug)]
pub struct PortReservation {
    port: u16,
    listener: Option<TcpListener>,
}

impl PortReservation {
    /// Bind port 0 and keep the socket open.
    pub fn acquire() -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))
            .map_err(TestbedError::PortAllocationFailed)?;
        let port = listener
            .local_addr()
            .map_err(TestbedError::PortAllocationFailed)?
            .port();
        Ok(Self { port, listener: Some(listener) })
    }

    /// A caller-supplied port. Nothing is bound.
    pub fn fixed(port: u16) -> Self {
        Self { port, listener: None }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_held(&self) -> bool {
        self.listener.is_some()
    }

    /// Close the socket (if any) and hand back the port number.
    pub fn release(mut self) -> u16 {
        self.listener.take();
        self.port
    }
}

/// Allocate a free port and release it immediately.
pub fn free_port() -> Result<u16> {
    Ok(PortReservation::acquire()?.release())
}

/// The three ports one instance listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortTriple {
    /// Thrift client port (`rpc_port`)
    pub client: u16,
    /// Inter-node port (`storage_port`)
    pub storage: u16,
    /// JMX port
    pub management: u16,
}

/// A [`PortTriple`] whose auto-allocated members are still held open.
#[derive(Debug)]
pub struct PortAllocation {
    client: u16,
    storage: PortReservation,
    management: PortReservation,
}

impl PortAllocation {
    /// Reserve the storage port (unless supplied) and the management port.
    ///
    /// The management port is always auto-allocated.
    pub fn allocate(client: u16, storage: Option<u16>) -> Result<Self> {
        let storage = match storage {
            Some(port) => PortReservation::fixed(port),
            None => PortReservation::acquire()?,
        };
        let management = PortReservation::acquire()?;
        Ok(Self { client, storage, management })
    }

    pub fn ports(&self) -> PortTriple {
        PortTriple {
            client: self.client,
            storage: self.storage.port(),
            management: self.management.port(),
        }
    }

    /// Close every held socket so the server can bind the ports.
    pub fn release(self) -> PortTriple {
        let ports = self.ports();
        self.storage.release();
        self.management.release();
        ports
    }
}
