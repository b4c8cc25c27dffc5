//! Charging session orchestration
//!
//! The controller is the only entry point that starts or stops charging. It
//! enforces the single-active-session rule against the backend, reserves the
//! port, creates the remote record and hands the running session over to a
//! [`SessionClock`].

use std::sync::Arc;

use chrono::Utc;

use crate::clock::{SessionClock, Simulation, StopOutcome, StopReason};
use crate::config::{ClockConfig, Config};
use crate::error::{ChargeflowError, Result};
use crate::estimator::{self, ChargePlan};
use crate::logging::{LogContext, StructuredLogger, get_logger, get_logger_with_context};
use crate::models::{
    ChargeMode, ChargingSession, Port, PortStatus, SessionDraft, SessionStatus, Vehicle,
};
use crate::ports::PortLock;
use crate::store::SessionStore;

/// Starts, stops and reattaches charging sessions
pub struct SessionController {
    store: Arc<dyn SessionStore>,
    ports: Arc<dyn PortLock>,
    cost_per_kwh: f64,
    clock_settings: ClockConfig,
    active: Option<SessionClock>,
    logger: StructuredLogger,
}

impl SessionController {
    pub fn new(store: Arc<dyn SessionStore>, ports: Arc<dyn PortLock>, config: &Config) -> Self {
        Self::with_settings(
            store,
            ports,
            config.pricing.cost_per_kwh,
            config.clock.clone(),
        )
    }

    pub fn with_settings(
        store: Arc<dyn SessionStore>,
        ports: Arc<dyn PortLock>,
        cost_per_kwh: f64,
        clock_settings: ClockConfig,
    ) -> Self {
        Self {
            store,
            ports,
            cost_per_kwh,
            clock_settings,
            active: None,
            logger: get_logger("controller"),
        }
    }

    /// Clock of the session this controller is attached to
    pub const fn active_clock(&self) -> Option<&SessionClock> {
        self.active.as_ref()
    }

    /// Plan a charge without touching the backend
    pub fn estimate(&self, vehicle: &Vehicle, port: &Port, mode: ChargeMode) -> Result<ChargePlan> {
        estimator::plan(vehicle, port, mode, self.cost_per_kwh)
    }

    /// Start charging `vehicle` on `port`
    pub async fn start_session(
        &mut self,
        vehicle: &Vehicle,
        port: &Port,
        mode: ChargeMode,
    ) -> Result<SessionClock> {
        if let Some(existing) = self.store.get_active().await? {
            self.logger.warn(&format!(
                "Refusing to start: session {} is still in progress",
                existing.id
            ));
            return Err(ChargeflowError::ActiveSessionExists {
                session_id: existing.id,
            });
        }

        // Full battery and unreachable targets are rejected by the planner
        let plan = self.estimate(vehicle, port, mode)?;
        if port.status != PortStatus::Free {
            return Err(ChargeflowError::port_unavailable(
                port.id,
                format!("Port is {}", port.status.as_str()),
            ));
        }

        self.ports.acquire(port.id).await?;

        let draft = SessionDraft {
            vehicle_id: vehicle.id,
            port_id: port.id,
            start_time: Utc::now(),
            duration_minutes: plan.duration_minutes,
            energy_used_kwh: 0.0,
            total_cost: 0.0,
            status: SessionStatus::InProgress,
        };

        let session = match self.store.create(&draft).await {
            Ok(session) => session,
            Err(original) => {
                self.logger.error(&format!(
                    "Session create failed, freeing port {}: {original}",
                    port.id
                ));
                return Err(match self.ports.release(port.id).await {
                    Ok(()) => original,
                    Err(reset) => {
                        self.logger.error(&format!(
                            "Port {} is left occupied without a session: {reset}",
                            port.id
                        ));
                        ChargeflowError::port_reset(port.id, original, reset)
                    }
                });
            }
        };

        let session_logger = get_logger_with_context(
            LogContext::new("controller")
                .with_session_id(session.id)
                .with_port_id(port.id)
                .with_mode(mode.name()),
        );
        session_logger.info(&format!(
            "Session started: {:.2} kWh planned over {} min at {:.1} kW, est. cost {:.2}",
            plan.energy_kwh,
            plan.duration_minutes,
            plan.power_kw,
            plan.cost
        ));

        let sim = Simulation::new(vehicle, &plan, self.cost_per_kwh);
        let clock = self.attach(session, sim)?;
        Ok(clock)
    }

    /// Stop the attached session and return the finalized record
    ///
    /// The clock stays attached until the stop completes, so a caller that
    /// gives up waiting can call again and join the same settle.
    pub async fn stop_session(&mut self) -> Result<StopOutcome> {
        let Some(clock) = self.active.clone() else {
            return Err(ChargeflowError::validation(
                "session",
                "No active charging session",
            ));
        };
        let outcome = clock.stop(StopReason::Manual).await;
        self.active = None;
        if let Err(e) = &outcome {
            self.logger.error(&format!(
                "Session {} stays in progress remotely: {e}",
                clock.session_id()
            ));
        }
        outcome
    }

    /// Reattach to the session left running by an earlier client
    ///
    /// Returns `None` when the backend has no session in progress.
    pub async fn resume(&mut self, vehicle: &Vehicle, port: &Port) -> Result<Option<SessionClock>> {
        if let Some(clock) = &self.active
            && clock.is_live()
        {
            return Ok(Some(clock.clone()));
        }

        let Some(session) = self.store.get_active().await? else {
            return Ok(None);
        };
        if session.vehicle_id != vehicle.id {
            return Err(ChargeflowError::validation(
                "vehicle",
                format!(
                    "Session {} belongs to vehicle {}, not {}",
                    session.id, session.vehicle_id, vehicle.id
                ),
            ));
        }
        if session.port_id != port.id {
            return Err(ChargeflowError::validation(
                "port",
                format!(
                    "Session {} runs on port {}, not {}",
                    session.id, session.port_id, port.id
                ),
            ));
        }
        vehicle.validate()?;

        let power_kw = estimator::effective_power(port, vehicle);
        let sim = Simulation::resume(&session, vehicle, power_kw, self.cost_per_kwh, Utc::now())?;
        self.logger.info(&format!(
            "Resuming session {}: {:.3} kWh used, {} s remaining",
            session.id, sim.energy_used_kwh, sim.remaining_seconds
        ));
        self.attach(session, sim).map(Some)
    }

    /// Cancel the timers of the attached session; it stays in progress remotely
    pub fn detach(&mut self) {
        if let Some(clock) = self.active.take() {
            clock.cancel();
        }
    }

    fn attach(&mut self, session: ChargingSession, sim: Simulation) -> Result<SessionClock> {
        self.detach();
        let clock = SessionClock::new(
            session,
            sim,
            Arc::clone(&self.store),
            Arc::clone(&self.ports),
            self.clock_settings.clone(),
        );
        clock.start()?;
        self.active = Some(clock.clone());
        Ok(clock)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.detach();
    }
}
