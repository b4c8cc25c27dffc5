//! Wire and domain types shared by the charging core
//!
//! Field names follow the backend's JSON contract.

use crate::error::{ChargeflowError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Battery and charging parameters of a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,

    /// Nominal battery capacity (kWh)
    pub battery_capacity_kwh: f64,

    /// Battery health as a fraction 0..=1
    #[serde(default = "default_condition")]
    pub battery_condition: f64,

    /// Energy currently stored (kWh); the backend names it `_kw`
    pub current_battery_capacity_kw: f64,

    /// Highest power the vehicle accepts (kW)
    pub max_charging_powerkwh: f64,
}

const fn default_condition() -> f64 {
    1.0
}

impl Vehicle {
    /// Check the stored-energy invariant
    pub fn validate(&self) -> Result<()> {
        if !self.battery_capacity_kwh.is_finite() || self.battery_capacity_kwh <= 0.0 {
            return Err(ChargeflowError::validation(
                "battery_capacity_kwh",
                "Battery capacity must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.battery_condition) {
            return Err(ChargeflowError::validation(
                "battery_condition",
                "Battery condition must be between 0 and 1",
            ));
        }
        if !(0.0..=self.battery_capacity_kwh).contains(&self.current_battery_capacity_kw) {
            return Err(ChargeflowError::validation(
                "current_battery_capacity_kw",
                "Current battery level must be between 0 and the battery capacity",
            ));
        }
        if !self.max_charging_powerkwh.is_finite() || self.max_charging_powerkwh <= 0.0 {
            return Err(ChargeflowError::validation(
                "max_charging_powerkwh",
                "Maximum charging power must be positive",
            ));
        }
        Ok(())
    }

    /// State of charge in percent
    pub fn battery_percentage(&self) -> f64 {
        self.current_battery_capacity_kw / self.battery_capacity_kwh * 100.0
    }

    /// Energy still fitting into the battery (kWh)
    pub fn headroom_kwh(&self) -> f64 {
        (self.battery_capacity_kwh - self.current_battery_capacity_kw).max(0.0)
    }

    pub fn is_full(&self) -> bool {
        self.battery_percentage() >= 100.0
    }
}

/// Port availability as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortStatus {
    #[serde(rename = "wolny")]
    Free,
    #[serde(rename = "zajety")]
    Occupied,
    #[serde(rename = "offline")]
    Offline,
}

impl PortStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "wolny",
            Self::Occupied => "zajety",
            Self::Offline => "offline",
        }
    }
}

/// A single charging connector of a station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: i64,

    /// Rated power (kW)
    pub power_kw: f64,

    pub status: PortStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

/// Remote charging session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSession {
    pub id: i64,
    pub vehicle_id: i64,
    pub port_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,

    /// Planned duration
    #[serde(default)]
    pub duration_minutes: Option<u32>,

    /// Energy delivered so far (kWh)
    pub energy_used_kwh: f64,

    pub total_cost: f64,
    pub status: SessionStatus,
    pub payment_status: PaymentStatus,
}

impl ChargingSession {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::InProgress
    }
}

/// Body of the session create call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDraft {
    pub vehicle_id: i64,
    pub port_id: i64,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub energy_used_kwh: f64,
    pub total_cost: f64,
    pub status: SessionStatus,
}

/// Periodic progress pushed while a session runs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub energy_used_kwh: f64,

    /// Stored energy of the vehicle (kWh)
    pub current_battery_level: f64,

    pub total_cost: f64,
}

/// Frozen values written when a session completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndSnapshot {
    pub energy_used_kwh: f64,
    pub total_cost: f64,
    pub end_time: DateTime<Utc>,
    pub status: SessionStatus,
    pub payment_status: PaymentStatus,
}

impl EndSnapshot {
    pub const fn completed(energy_used_kwh: f64, total_cost: f64, end_time: DateTime<Utc>) -> Self {
        Self {
            energy_used_kwh,
            total_cost,
            end_time,
            status: SessionStatus::Completed,
            payment_status: PaymentStatus::Pending,
        }
    }
}

/// The control variable a user picked for a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChargeMode {
    /// Charge for a number of minutes
    Time { minutes: u32 },
    /// Charge until the given amount is spent
    Cost { amount: f64 },
    /// Charge until the state of charge reaches `target` percent
    Percentage { target: f64 },
}

impl ChargeMode {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Time { .. } => "time",
            Self::Cost { .. } => "cost",
            Self::Percentage { .. } => "percentage",
        }
    }

    /// Percentage target, only set in percentage mode
    pub const fn target_percentage(&self) -> Option<f64> {
        match self {
            Self::Percentage { target } => Some(*target),
            _ => None,
        }
    }
}

/// Discount code applied at payment time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub code: String,
    pub percentage: f64,
    pub expiration: DateTime<Utc>,
}

impl Discount {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }

    /// Discounted amount; expired codes leave the cost untouched
    pub fn apply(&self, total_cost: f64, now: DateTime<Utc>) -> f64 {
        if self.is_expired(now) {
            return total_cost;
        }
        let pct = self.percentage.clamp(0.0, 100.0);
        crate::estimator::round2(total_cost * (1.0 - pct / 100.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vehicle() -> Vehicle {
        Vehicle {
            id: 1,
            battery_capacity_kwh: 50.0,
            battery_condition: 0.95,
            current_battery_capacity_kw: 10.0,
            max_charging_powerkwh: 11.0,
        }
    }

    #[test]
    fn vehicle_percentage_and_headroom() {
        let v = vehicle();
        assert!((v.battery_percentage() - 20.0).abs() < 1e-9);
        assert!((v.headroom_kwh() - 40.0).abs() < 1e-9);
        assert!(!v.is_full());
        assert!(v.validate().is_ok());
    }

    #[test]
    fn vehicle_rejects_overfull_battery() {
        let mut v = vehicle();
        v.current_battery_capacity_kw = 51.0;
        assert!(matches!(
            v.validate(),
            Err(ChargeflowError::Validation { .. })
        ));
    }

    #[test]
    fn session_parses_backend_shape() {
        let raw = json!({
            "id": 5,
            "vehicle_id": 1,
            "port_id": 2,
            "start_time": "2026-10-17T10:00:00Z",
            "end_time": null,
            "energy_used_kwh": 1.5,
            "total_cost": 15.0,
            "status": "IN_PROGRESS",
            "payment_status": "PENDING"
        });
        let session: ChargingSession = serde_json::from_value(raw).unwrap();
        assert!(session.is_active());
        assert_eq!(session.duration_minutes, None);
        assert_eq!(session.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn port_status_uses_backend_labels() {
        assert_eq!(
            serde_json::to_value(PortStatus::Occupied).unwrap(),
            json!("zajety")
        );
        let free: PortStatus = serde_json::from_value(json!("wolny")).unwrap();
        assert_eq!(free, PortStatus::Free);
    }

    #[test]
    fn discount_applies_until_expiry() {
        let now: DateTime<Utc> = "2026-10-17T10:00:00Z".parse().unwrap();
        let discount = Discount {
            code: "AUTUMN".into(),
            percentage: 15.0,
            expiration: "2026-10-18T00:00:00Z".parse().unwrap(),
        };
        assert!((discount.apply(110.0, now) - 93.5).abs() < 1e-9);

        let later: DateTime<Utc> = "2026-10-19T00:00:00Z".parse().unwrap();
        assert!((discount.apply(110.0, later) - 110.0).abs() < 1e-9);
    }
}
