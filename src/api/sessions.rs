use crate::api::BackendClient;
use crate::error::{ChargeflowError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::models::{ChargingSession, EndSnapshot, SessionDraft, SessionProgress};
use crate::store::{SessionStore, select_active};

/// Session store backed by the `/sessions` endpoints
#[derive(Debug, Clone)]
pub struct HttpSessionStore {
    client: BackendClient,
    logger: StructuredLogger,
}

impl HttpSessionStore {
    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            logger: get_logger("session_store"),
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for HttpSessionStore {
    async fn create(&self, draft: &SessionDraft) -> Result<ChargingSession> {
        let session: ChargingSession = self
            .client
            .post_json("/sessions", draft)
            .await
            .map_err(|e| ChargeflowError::session_create(e.detail()))?;
        self.logger.info(&format!(
            "Created session {} for vehicle {} on port {}",
            session.id, session.vehicle_id, session.port_id
        ));
        Ok(session)
    }

    async fn finalize(&self, session_id: i64, snapshot: &EndSnapshot) -> Result<ChargingSession> {
        self.client
            .patch_json(&format!("/sessions/{session_id}/stop"), snapshot)
            .await
            .map_err(|e| ChargeflowError::session_finalize(e.detail()))
    }

    async fn sync_progress(&self, session_id: i64, progress: &SessionProgress) -> Result<()> {
        self.client
            .patch_ack(&format!("/sessions/{session_id}/update"), progress)
            .await
            .map_err(|e| ChargeflowError::sync(e.detail()))
    }

    async fn get_active(&self) -> Result<Option<ChargingSession>> {
        let (active, count) = select_active(self.client.list_sessions().await?);
        if count > 1 {
            self.logger.warn(&format!(
                "Backend reports {count} sessions in progress; resuming the newest one"
            ));
        }
        Ok(active)
    }
}
