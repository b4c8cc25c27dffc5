//! Port reservation
//!
//! A port is reserved by flipping its remote status to occupied and freed by
//! flipping it back. The backend arbitrates races between clients.

use crate::error::Result;

/// Exclusive reservation of a charging port
#[async_trait::async_trait]
pub trait PortLock: Send + Sync {
    /// Mark the port occupied; fails with `PortUnavailable`
    async fn acquire(&self, port_id: i64) -> Result<()>;

    /// Mark the port free; fails with `PortUpdateFailed`
    async fn release(&self, port_id: i64) -> Result<()>;
}
