//! # Chargeflow - EV charging session core
//!
//! Client-side engine for electric-vehicle charging sessions: it reserves a
//! port, creates the session on the charging backend, simulates state of
//! charge and accrued cost live, reconciles progress with the backend and
//! settles the session exactly once.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `models`: Vehicles, ports, sessions and charge modes
//! - `estimator`: Pure time/energy/cost conversions
//! - `ports`: Port reservation contract
//! - `store`: Session persistence contract
//! - `api`: HTTP implementations of both contracts
//! - `clock`: Live session simulation with tick and sync timers
//! - `controller`: Start/stop/resume orchestration
//! - `cli`: Command line interface of the `chargeflow` binary

pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod estimator;
pub mod logging;
pub mod models;
pub mod ports;
pub mod store;

// Re-export commonly used types
pub use clock::{ClockPhase, SessionClock, StopOutcome, StopReason};
pub use config::Config;
pub use controller::SessionController;
pub use error::{ChargeflowError, Result};
