#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use chargeflow::config::ClockConfig;
use chargeflow::error::{ChargeflowError, Result};
use chargeflow::models::{
    ChargingSession, EndSnapshot, PaymentStatus, Port, PortStatus, SessionDraft, SessionProgress,
    SessionStatus, Vehicle,
};
use chargeflow::ports::PortLock;
use chargeflow::store::SessionStore;
use chrono::Utc;

pub fn vehicle(current_kwh: f64) -> Vehicle {
    Vehicle {
        id: 1,
        battery_capacity_kwh: 50.0,
        battery_condition: 0.9,
        current_battery_capacity_kw: current_kwh,
        max_charging_powerkwh: 11.0,
    }
}

pub fn port() -> Port {
    Port {
        id: 2,
        power_kw: 22.0,
        status: PortStatus::Free,
    }
}

pub fn in_progress(id: i64, duration_minutes: Option<u32>) -> ChargingSession {
    ChargingSession {
        id,
        vehicle_id: 1,
        port_id: 2,
        start_time: Utc::now(),
        end_time: None,
        duration_minutes,
        energy_used_kwh: 0.0,
        total_cost: 0.0,
        status: SessionStatus::InProgress,
        payment_status: PaymentStatus::Pending,
    }
}

pub fn clock_settings() -> ClockConfig {
    ClockConfig {
        tick_interval_ms: 1000,
        sync_interval_seconds: 30,
        finalize_retry_delay_ms: 1000,
    }
}

/// In-memory session store recording every call
#[derive(Default)]
pub struct FakeStore {
    pub active: Mutex<Option<ChargingSession>>,
    pub created: Mutex<Vec<SessionDraft>>,
    pub finalized: Mutex<Vec<(i64, EndSnapshot)>>,
    pub synced: Mutex<Vec<(i64, SessionProgress)>>,
    pub fail_create: AtomicBool,
    pub fail_sync: AtomicBool,
    /// Number of upcoming finalize calls that fail
    pub finalize_failures: AtomicUsize,
    pub finalize_delay_ms: AtomicUsize,
    next_id: AtomicI64,
}

impl FakeStore {
    pub fn with_active(session: ChargingSession) -> Self {
        let store = Self::default();
        *store.active.lock().unwrap() = Some(session);
        store
    }

    pub fn finalize_calls(&self) -> usize {
        self.finalized.lock().unwrap().len()
    }

    pub fn sync_calls(&self) -> Vec<SessionProgress> {
        self.synced.lock().unwrap().iter().map(|(_, p)| *p).collect()
    }
}

#[async_trait::async_trait]
impl SessionStore for FakeStore {
    async fn create(&self, draft: &SessionDraft) -> Result<ChargingSession> {
        self.created.lock().unwrap().push(draft.clone());
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ChargeflowError::session_create("backend rejected the session"));
        }
        let session = ChargingSession {
            id: 100 + self.next_id.fetch_add(1, Ordering::SeqCst),
            vehicle_id: draft.vehicle_id,
            port_id: draft.port_id,
            start_time: draft.start_time,
            end_time: None,
            duration_minutes: Some(draft.duration_minutes),
            energy_used_kwh: draft.energy_used_kwh,
            total_cost: draft.total_cost,
            status: draft.status,
            payment_status: PaymentStatus::Pending,
        };
        *self.active.lock().unwrap() = Some(session.clone());
        Ok(session)
    }

    async fn finalize(&self, session_id: i64, snapshot: &EndSnapshot) -> Result<ChargingSession> {
        self.finalized
            .lock()
            .unwrap()
            .push((session_id, snapshot.clone()));
        let delay = self.finalize_delay_ms.load(Ordering::SeqCst) as u64;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let failures = self.finalize_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.finalize_failures.store(failures - 1, Ordering::SeqCst);
            return Err(ChargeflowError::session_finalize("gateway timeout"));
        }

        let mut active = self.active.lock().unwrap();
        let mut session = active
            .take()
            .filter(|s| s.id == session_id)
            .unwrap_or_else(|| in_progress(session_id, None));
        session.end_time = Some(snapshot.end_time);
        session.energy_used_kwh = snapshot.energy_used_kwh;
        session.total_cost = snapshot.total_cost;
        session.status = snapshot.status;
        session.payment_status = snapshot.payment_status;
        Ok(session)
    }

    async fn sync_progress(&self, session_id: i64, progress: &SessionProgress) -> Result<()> {
        self.synced.lock().unwrap().push((session_id, *progress));
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(ChargeflowError::sync("connection reset"));
        }
        Ok(())
    }

    async fn get_active(&self) -> Result<Option<ChargingSession>> {
        Ok(self.active.lock().unwrap().clone())
    }
}

/// Port lock recording acquire/release calls
#[derive(Default)]
pub struct FakePorts {
    pub acquired: Mutex<Vec<i64>>,
    pub released: Mutex<Vec<i64>>,
    pub fail_acquire: AtomicBool,
    pub fail_release: AtomicBool,
}

impl FakePorts {
    pub fn acquired(&self) -> Vec<i64> {
        self.acquired.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<i64> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PortLock for FakePorts {
    async fn acquire(&self, port_id: i64) -> Result<()> {
        self.acquired.lock().unwrap().push(port_id);
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(ChargeflowError::port_unavailable(port_id, "taken"));
        }
        Ok(())
    }

    async fn release(&self, port_id: i64) -> Result<()> {
        self.released.lock().unwrap().push(port_id);
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(ChargeflowError::port_update(port_id, "backend unreachable"));
        }
        Ok(())
    }
}
