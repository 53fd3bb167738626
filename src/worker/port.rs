use std::net::TcpListener;

use crate::error::Result;

/// Source of local ports for new workers
pub trait PortAllocator: Send + Sync {
    /// A port that is unbound on this host at the instant of return
    ///
    /// Best-effort: the port may be taken before the worker binds it.
    fn allocate(&self) -> Result<u16>;
}

/// Lets the OS pick a free port from the ephemeral range
#[derive(Debug, Clone, Copy, Default)]
pub struct EphemeralPortAllocator;

impl EphemeralPortAllocator {
    pub fn new() -> Self {
        Self
    }
}

impl PortAllocator for EphemeralPortAllocator {
    fn allocate(&self) -> Result<u16> {
        let listener = TcpListener::bind(("0.0.0.0", 0))?;
        let port = listener.local_addr()?.port();
        Ok(port)
    }
}
