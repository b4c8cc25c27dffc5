use super::*;
use crate::estimator::DEFAULT_COST_PER_KWH;

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            token: None,
            timeout_seconds: 10,
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            cost_per_kwh: DEFAULT_COST_PER_KWH,
            currency_symbol: "zł".to_string(),
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            sync_interval_seconds: 30,
            finalize_retry_delay_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/chargeflow".to_string(),
            backup_count: 5,
            console_output: true,
            file_output: false,
            json_format: false,
        }
    }
}
