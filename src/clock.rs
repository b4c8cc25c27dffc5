//! Live simulation of a running charging session
//!
//! The clock owns exactly one tick task and one sync task per session. The
//! tick task is the only writer of the simulated battery state; the sync task
//! only reads a snapshot and pushes it to the backend. Stopping goes through a
//! single-shot latch so the remote record is finalized at most once, whatever
//! mix of timer expiry, target reached and manual stop races to end it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{OnceCell, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::config::ClockConfig;
use crate::error::{ChargeflowError, Result};
use crate::estimator::{ChargePlan, cost_from_energy, time_from_energy};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::models::{ChargingSession, EndSnapshot, SessionProgress, Vehicle};
use crate::ports::PortLock;
use crate::store::SessionStore;

/// Lifecycle of a clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClockPhase {
    Idle,
    Running,
    /// A stop condition fired; finalize in flight
    Completing,
    Stopped,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    Manual,
    TimerExpired,
    TargetReached,
    BatteryFull,
}

/// Simulated battery and billing state, advanced one second per tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Simulation {
    pub capacity_kwh: f64,
    /// Stored energy when the session started; below zero when a resumed
    /// session has already delivered more than the vehicle record shows
    pub start_capacity_kwh: f64,
    pub current_capacity_kwh: f64,
    pub power_kw: f64,
    pub cost_per_kwh: f64,
    pub remaining_seconds: u64,
    pub target_percentage: Option<f64>,
    pub energy_used_kwh: f64,
    pub total_cost: f64,
    pub ticks: u64,
}

impl Simulation {
    /// Fresh simulation for a newly created session
    pub fn new(vehicle: &Vehicle, plan: &ChargePlan, cost_per_kwh: f64) -> Self {
        let start = vehicle
            .current_battery_capacity_kw
            .min(vehicle.battery_capacity_kwh)
            .max(0.0);
        Self {
            capacity_kwh: vehicle.battery_capacity_kwh,
            start_capacity_kwh: start,
            current_capacity_kwh: start,
            power_kw: plan.power_kw,
            cost_per_kwh,
            remaining_seconds: u64::from(plan.duration_minutes) * 60,
            target_percentage: plan.mode.target_percentage(),
            energy_used_kwh: 0.0,
            total_cost: 0.0,
            ticks: 0,
        }
    }

    /// Rebuild the simulation of a session that kept running while detached
    ///
    /// The vehicle record carries the last synced battery level, so the
    /// session started at that level minus the energy already used. The
    /// recorded energy is never lowered, even if the vehicle record lags
    /// behind it. Without a planned duration the session runs until the
    /// battery is full.
    pub fn resume(
        session: &ChargingSession,
        vehicle: &Vehicle,
        power_kw: f64,
        cost_per_kwh: f64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let capacity = vehicle.battery_capacity_kwh;
        let current = vehicle.current_battery_capacity_kw.min(capacity).max(0.0);
        let energy_used = session.energy_used_kwh.max(0.0);
        let start = current - energy_used;

        let remaining_seconds = match session.duration_minutes {
            Some(minutes) => {
                let end = session.start_time + chrono::Duration::minutes(i64::from(minutes));
                u64::try_from((end - now).num_seconds()).unwrap_or(0)
            }
            None => u64::from(time_from_energy(capacity - current, power_kw)?) * 60,
        };

        Ok(Self {
            capacity_kwh: capacity,
            start_capacity_kwh: start,
            current_capacity_kwh: current,
            power_kw,
            cost_per_kwh,
            remaining_seconds,
            target_percentage: None,
            energy_used_kwh: energy_used,
            total_cost: cost_from_energy(energy_used, cost_per_kwh),
            ticks: 0,
        })
    }

    /// One second of charging
    pub fn advance(&mut self) {
        let next = self.current_capacity_kwh + self.power_kw / 3600.0;
        self.current_capacity_kwh = next.min(self.capacity_kwh).max(self.current_capacity_kwh);
        self.energy_used_kwh = (self.current_capacity_kwh - self.start_capacity_kwh)
            .max(self.energy_used_kwh);
        self.total_cost = cost_from_energy(self.energy_used_kwh, self.cost_per_kwh);
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        self.ticks += 1;
    }

    pub fn battery_percentage(&self) -> f64 {
        self.current_capacity_kwh / self.capacity_kwh * 100.0
    }

    /// First stop condition that holds, if any
    pub fn stop_condition(&self) -> Option<StopReason> {
        let pct = self.battery_percentage();
        if pct >= 100.0 || self.current_capacity_kwh >= self.capacity_kwh {
            return Some(StopReason::BatteryFull);
        }
        if let Some(target) = self.target_percentage
            && pct >= target
        {
            return Some(StopReason::TargetReached);
        }
        if self.remaining_seconds == 0 {
            return Some(StopReason::TimerExpired);
        }
        None
    }

    pub const fn progress(&self) -> SessionProgress {
        SessionProgress {
            energy_used_kwh: self.energy_used_kwh,
            current_battery_level: self.current_capacity_kwh,
            total_cost: self.total_cost,
        }
    }

    pub const fn end_snapshot(&self, end_time: DateTime<Utc>) -> EndSnapshot {
        EndSnapshot::completed(self.energy_used_kwh, self.total_cost, end_time)
    }
}

/// Published view of the clock, refreshed on every tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClockSnapshot {
    pub session_id: i64,
    pub phase: ClockPhase,
    pub current_capacity_kwh: f64,
    pub battery_percentage: f64,
    pub energy_used_kwh: f64,
    pub total_cost: f64,
    pub remaining_seconds: u64,
}

/// Result of settling a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopOutcome {
    /// The finalized remote record
    pub session: ChargingSession,
    pub reason: StopReason,
    /// False when the port stayed marked occupied and needs manual release
    pub port_released: bool,
}

struct ClockState {
    phase: ClockPhase,
    sim: Simulation,
}

struct ClockInner {
    session: ChargingSession,
    state: Mutex<ClockState>,
    store: Arc<dyn SessionStore>,
    ports: Arc<dyn PortLock>,
    settings: ClockConfig,
    snapshot_tx: watch::Sender<ClockSnapshot>,
    outcome: OnceCell<Result<StopOutcome>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    logger: StructuredLogger,
}

/// Handle to the clock of one session; clones share the same clock
#[derive(Clone)]
pub struct SessionClock {
    inner: Arc<ClockInner>,
}

impl std::fmt::Debug for SessionClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClock")
            .field("session_id", &self.inner.session.id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl SessionClock {
    /// Create an idle clock for `session`
    pub fn new(
        session: ChargingSession,
        sim: Simulation,
        store: Arc<dyn SessionStore>,
        ports: Arc<dyn PortLock>,
        settings: ClockConfig,
    ) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("clock")
                .with_session_id(session.id)
                .with_port_id(session.port_id),
        );
        let state = ClockState {
            phase: ClockPhase::Idle,
            sim,
        };
        let (snapshot_tx, _) = watch::channel(snapshot_of(session.id, &state));
        Self {
            inner: Arc::new(ClockInner {
                session,
                state: Mutex::new(state),
                store,
                ports,
                settings,
                snapshot_tx,
                outcome: OnceCell::new(),
                tasks: Mutex::new(Vec::new()),
                logger,
            }),
        }
    }

    pub fn session_id(&self) -> i64 {
        self.inner.session.id
    }

    pub fn session(&self) -> &ChargingSession {
        &self.inner.session
    }

    pub fn phase(&self) -> ClockPhase {
        self.inner.lock_state().phase
    }

    /// Running, or settling after a stop condition
    pub fn is_live(&self) -> bool {
        matches!(self.phase(), ClockPhase::Running | ClockPhase::Completing)
    }

    /// Current simulation values
    pub fn snapshot(&self) -> ClockSnapshot {
        snapshot_of(self.inner.session.id, &self.inner.lock_state())
    }

    /// Receive a snapshot after every tick and phase change
    pub fn subscribe(&self) -> watch::Receiver<ClockSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Idle -> Running; spawns the tick and sync tasks on the current runtime
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.inner.lock_state();
            if state.phase != ClockPhase::Idle {
                return Err(ChargeflowError::validation(
                    "clock",
                    format!("Clock cannot start from {:?}", state.phase),
                ));
            }
            state.phase = ClockPhase::Running;
            self.inner.publish(&state);
        }

        let tick = tokio::spawn(run_ticks(Arc::clone(&self.inner)));
        let sync = tokio::spawn(run_sync(Arc::clone(&self.inner)));
        self.inner.tasks_guard().extend([tick, sync]);

        self.inner.logger.info(&format!(
            "Session clock started: tick every {:?}, sync every {:?}",
            self.inner.settings.tick_interval(),
            self.inner.settings.sync_interval()
        ));
        Ok(())
    }

    /// Settle the session: finalize remotely once, then free the port
    ///
    /// Settling runs on its own task, so dropping this future does not
    /// interrupt it. Every caller, concurrent, late or retrying after a
    /// timeout, receives the same outcome.
    pub async fn stop(&self, reason: StopReason) -> Result<StopOutcome> {
        if let Some(outcome) = self.inner.outcome.get() {
            return outcome.clone();
        }
        let claimed = {
            let mut state = self.inner.lock_state();
            let phase = state.phase;
            match phase {
                ClockPhase::Idle => {
                    return Err(ChargeflowError::validation(
                        "clock",
                        "Clock was never started",
                    ));
                }
                ClockPhase::Stopped if self.inner.outcome.get().is_none() => {
                    return Err(detached());
                }
                ClockPhase::Running => self.inner.claim_stop(&mut state),
                ClockPhase::Completing | ClockPhase::Stopped => false,
            }
        };
        if claimed {
            tokio::spawn(Arc::clone(&self.inner).settle(reason));
        }

        self.wait_stopped().await.unwrap_or_else(|| Err(detached()))
    }

    /// Wait until the clock stops; `None` when it was detached instead
    pub async fn wait_stopped(&self) -> Option<Result<StopOutcome>> {
        let mut rx = self.subscribe();
        loop {
            let stopped = rx.borrow_and_update().phase == ClockPhase::Stopped;
            if stopped || rx.changed().await.is_err() {
                break;
            }
        }
        self.inner.outcome.get().cloned()
    }

    /// Tear down the timers without settling; the session stays in progress remotely
    pub fn cancel(&self) {
        self.inner.abort_timers();
        let mut state = self.inner.lock_state();
        if state.phase == ClockPhase::Running || state.phase == ClockPhase::Idle {
            state.phase = ClockPhase::Stopped;
            self.inner.publish(&state);
            self.inner
                .logger
                .info("Session clock detached; session left in progress");
        }
    }
}

impl ClockInner {
    fn lock_state(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks_guard(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &ClockState) {
        self.snapshot_tx.send_replace(snapshot_of(self.session.id, state));
    }

    /// Running -> Completing; the caller that wins spawns the settle task
    fn claim_stop(&self, state: &mut ClockState) -> bool {
        if state.phase != ClockPhase::Running {
            return false;
        }
        state.phase = ClockPhase::Completing;
        self.publish(state);
        true
    }

    fn abort_timers(&self) {
        for task in self.tasks_guard().drain(..) {
            task.abort();
        }
    }

    /// Store the outcome, then make Stopped visible to waiters
    async fn settle(self: Arc<Self>, reason: StopReason) {
        let outcome = self.finish(reason).await;
        let _ = self.outcome.set(outcome);
        let mut state = self.lock_state();
        state.phase = ClockPhase::Stopped;
        self.publish(&state);
    }

    async fn finish(&self, reason: StopReason) -> Result<StopOutcome> {
        self.abort_timers();

        let end = self.lock_state().sim.end_snapshot(Utc::now());
        self.logger.info(&format!(
            "Stopping session ({reason:?}): {:.3} kWh, cost {:.2}",
            end.energy_used_kwh, end.total_cost
        ));

        let finalized = match self.store.finalize(self.session.id, &end).await {
            Ok(session) => Ok(session),
            Err(first) => {
                self.logger
                    .warn(&format!("Finalize failed, retrying once: {first}"));
                tokio::time::sleep(self.settings.finalize_retry_delay()).await;
                self.store.finalize(self.session.id, &end).await
            }
        };

        let session = match finalized {
            Ok(session) => session,
            Err(e) => {
                self.logger.error(&format!(
                    "Session could not be finalized and stays in progress remotely: {e}"
                ));
                return Err(e);
            }
        };

        let port_released = match self.ports.release(self.session.port_id).await {
            Ok(()) => true,
            Err(e) => {
                self.logger.error(&format!(
                    "Session finalized but port {} is still occupied, needs manual release: {e}",
                    self.session.port_id
                ));
                false
            }
        };

        Ok(StopOutcome {
            session,
            reason,
            port_released,
        })
    }
}

fn detached() -> ChargeflowError {
    ChargeflowError::validation(
        "clock",
        "Clock was detached; resume the session to stop it",
    )
}

fn snapshot_of(session_id: i64, state: &ClockState) -> ClockSnapshot {
    ClockSnapshot {
        session_id,
        phase: state.phase,
        current_capacity_kwh: state.sim.current_capacity_kwh,
        battery_percentage: state.sim.battery_percentage(),
        energy_used_kwh: state.sim.energy_used_kwh,
        total_cost: state.sim.total_cost,
        remaining_seconds: state.sim.remaining_seconds,
    }
}

async fn run_ticks(inner: Arc<ClockInner>) {
    let period = inner.settings.tick_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let trigger = {
            let mut state = inner.lock_state();
            if state.phase != ClockPhase::Running {
                break;
            }
            state.sim.advance();
            inner.publish(&state);
            let condition = state.sim.stop_condition();
            condition.filter(|_| inner.claim_stop(&mut state))
        };

        if let Some(reason) = trigger {
            // Settle on a separate task: settling aborts this one
            tokio::spawn(Arc::clone(&inner).settle(reason));
            break;
        }
    }
}

async fn run_sync(inner: Arc<ClockInner>) {
    let period = inner.settings.sync_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let progress = {
            let state = inner.lock_state();
            if state.phase != ClockPhase::Running {
                break;
            }
            state.sim.progress()
        };

        match inner.store.sync_progress(inner.session.id, &progress).await {
            Ok(()) => inner.logger.debug(&format!(
                "Synced progress: {:.3} kWh, cost {:.2}",
                progress.energy_used_kwh, progress.total_cost
            )),
            Err(e) => inner
                .logger
                .warn(&format!("Progress sync failed, next interval retries: {e}")),
        }
    }
}
