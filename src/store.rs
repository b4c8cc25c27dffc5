//! Remote persistence of charging sessions

use crate::error::Result;
use crate::models::{ChargingSession, EndSnapshot, SessionDraft, SessionProgress};

/// Backend-side record of charging sessions
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new in-progress session; fails with `SessionCreate`
    async fn create(&self, draft: &SessionDraft) -> Result<ChargingSession>;

    /// Freeze the session as completed; fails with `SessionFinalize`
    async fn finalize(&self, session_id: i64, snapshot: &EndSnapshot) -> Result<ChargingSession>;

    /// Push live progress; failures are reported as `Sync` and are never fatal
    async fn sync_progress(&self, session_id: i64, progress: &SessionProgress) -> Result<()>;

    /// The single in-progress session of the current principal, if any
    async fn get_active(&self) -> Result<Option<ChargingSession>>;
}

/// Pick the session to resume out of a listing
///
/// More than one in-progress record breaks the single-active-session rule;
/// the most recently started one wins.
pub fn select_active(sessions: Vec<ChargingSession>) -> (Option<ChargingSession>, usize) {
    let mut active: Vec<ChargingSession> = sessions.into_iter().filter(ChargingSession::is_active).collect();
    let count = active.len();
    active.sort_by_key(|s| s.start_time);
    (active.pop(), count)
}
