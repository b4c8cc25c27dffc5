use serde_json::json;

use crate::api::BackendClient;
use crate::error::{ChargeflowError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::models::PortStatus;
use crate::ports::PortLock;

/// Port lock backed by `PATCH /ports/{id}/status`
#[derive(Debug, Clone)]
pub struct HttpPortLock {
    client: BackendClient,
    logger: StructuredLogger,
}

impl HttpPortLock {
    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            logger: get_logger("port_lock"),
        }
    }

    async fn set_status(&self, port_id: i64, status: PortStatus) -> Result<()> {
        self.client
            .patch_ack(
                &format!("/ports/{port_id}/status"),
                &json!({ "status": status.as_str() }),
            )
            .await
    }
}

#[async_trait::async_trait]
impl PortLock for HttpPortLock {
    async fn acquire(&self, port_id: i64) -> Result<()> {
        self.set_status(port_id, PortStatus::Occupied)
            .await
            .map_err(|e| {
                self.logger
                    .warn(&format!("Could not reserve port {port_id}: {e}"));
                ChargeflowError::port_unavailable(port_id, e.detail())
            })?;
        self.logger.info(&format!("Port {port_id} reserved"));
        Ok(())
    }

    async fn release(&self, port_id: i64) -> Result<()> {
        self.set_status(port_id, PortStatus::Free)
            .await
            .map_err(|e| {
                self.logger
                    .error(&format!("Could not free port {port_id}: {e}"));
                ChargeflowError::port_update(port_id, e.detail())
            })?;
        self.logger.info(&format!("Port {port_id} released"));
        Ok(())
    }
}
