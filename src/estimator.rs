//! Charge estimation
//!
//! Pure conversions between charging time, delivered energy and cost.
//! Energy is the common unit: whatever the user picks (minutes, money or a
//! target state of charge) is turned into kWh first, and the other two
//! quantities are derived from that.

use crate::error::{ChargeflowError, Result};
use crate::models::{ChargeMode, Port, Vehicle};
use serde::Serialize;

/// Rate per kWh used when no tariff is configured
pub const DEFAULT_COST_PER_KWH: f64 = 10.0;

/// Round to two decimals (currency)
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Lesser of the port rating and what the vehicle accepts (kW)
pub fn effective_power(port: &Port, vehicle: &Vehicle) -> f64 {
    port.power_kw.min(vehicle.max_charging_powerkwh)
}

/// Energy delivered in `minutes` at `power_kw`, capped by the remaining headroom
pub fn energy_from_time(
    power_kw: f64,
    minutes: f64,
    capacity_ceiling_kwh: f64,
    current_energy_kwh: f64,
) -> f64 {
    let headroom = (capacity_ceiling_kwh - current_energy_kwh).max(0.0);
    (power_kw * minutes / 60.0).clamp(0.0, headroom)
}

pub fn cost_from_energy(energy_kwh: f64, cost_per_kwh: f64) -> f64 {
    round2(energy_kwh * cost_per_kwh)
}

/// Minutes needed to deliver `energy_kwh`, rounded up
pub fn time_from_energy(energy_kwh: f64, power_kw: f64) -> Result<u32> {
    if !power_kw.is_finite() || power_kw <= 0.0 {
        return Err(ChargeflowError::validation(
            "power_kw",
            "Charging power must be positive",
        ));
    }
    let minutes = (energy_kwh.max(0.0) / power_kw * 60.0).ceil();
    // Anything beyond u32 minutes is a nonsensical input, not a plan
    if minutes > f64::from(u32::MAX) {
        return Err(ChargeflowError::validation(
            "energy_kwh",
            "Requested energy is out of range",
        ));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(minutes as u32)
}

/// Energy bought by `amount`, capped by the remaining headroom
pub fn energy_from_cost(amount: f64, cost_per_kwh: f64, headroom_kwh: f64) -> Result<f64> {
    if !cost_per_kwh.is_finite() || cost_per_kwh <= 0.0 {
        return Err(ChargeflowError::validation(
            "cost_per_kwh",
            "Rate must be positive",
        ));
    }
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ChargeflowError::validation(
            "cost",
            "Amount must be greater than zero",
        ));
    }
    Ok((amount / cost_per_kwh).min(headroom_kwh.max(0.0)))
}

/// Energy needed to lift the battery from its current level to `target_pct`
pub fn energy_from_percentage_target(vehicle: &Vehicle, target_pct: f64) -> Result<f64> {
    let current_pct = vehicle.battery_percentage();
    if !target_pct.is_finite() || target_pct > 100.0 {
        return Err(ChargeflowError::invalid_target(
            "Target percentage cannot exceed 100%",
        ));
    }
    if target_pct <= current_pct {
        return Err(ChargeflowError::invalid_target(format!(
            "Target {target_pct:.0}% must be above the current battery level {current_pct:.0}%"
        )));
    }
    Ok((target_pct - current_pct) / 100.0 * vehicle.battery_capacity_kwh)
}

/// State of charge reached after adding `energy_kwh`
pub fn percentage_after(vehicle: &Vehicle, energy_kwh: f64) -> f64 {
    ((vehicle.current_battery_capacity_kw + energy_kwh) / vehicle.battery_capacity_kwh * 100.0)
        .min(100.0)
}

/// The three agreeing views of one charge configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChargePlan {
    pub mode: ChargeMode,
    /// Effective power (kW)
    pub power_kw: f64,
    pub energy_kwh: f64,
    pub duration_minutes: u32,
    pub cost: f64,
    /// State of charge at the end of the plan
    pub target_percentage: f64,
}

/// Derive duration, energy and cost for a charge mode
pub fn plan(vehicle: &Vehicle, port: &Port, mode: ChargeMode, cost_per_kwh: f64) -> Result<ChargePlan> {
    vehicle.validate()?;
    if vehicle.is_full() {
        return Err(ChargeflowError::invalid_target("Battery is already full"));
    }
    let power_kw = effective_power(port, vehicle);
    if power_kw <= 0.0 {
        return Err(ChargeflowError::validation(
            "power_kw",
            "Port delivers no power",
        ));
    }

    let headroom = vehicle.headroom_kwh();
    let (energy_kwh, duration_minutes) = match mode {
        ChargeMode::Time { minutes } => {
            if minutes == 0 {
                return Err(ChargeflowError::validation(
                    "minutes",
                    "Duration must be at least one minute",
                ));
            }
            let energy = energy_from_time(
                power_kw,
                f64::from(minutes),
                vehicle.battery_capacity_kwh,
                vehicle.current_battery_capacity_kw,
            );
            (energy, minutes)
        }
        ChargeMode::Cost { amount } => {
            let energy = energy_from_cost(amount, cost_per_kwh, headroom)?;
            (energy, time_from_energy(energy, power_kw)?)
        }
        ChargeMode::Percentage { target } => {
            let energy = energy_from_percentage_target(vehicle, target)?;
            (energy, time_from_energy(energy, power_kw)?)
        }
    };

    let target_percentage = match mode {
        ChargeMode::Percentage { target } => target,
        _ => percentage_after(vehicle, energy_kwh),
    };

    Ok(ChargePlan {
        mode,
        power_kw,
        energy_kwh,
        duration_minutes,
        cost: cost_from_energy(energy_kwh, cost_per_kwh),
        target_percentage,
    })
}
