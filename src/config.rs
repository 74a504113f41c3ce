use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub dispatch_queue_size: usize,
    pub event_buffer_size: usize,
    pub response_window_secs: u64,
    pub location_staleness_secs: u64,
    pub max_redispatch_attempts: u32,
    pub redispatch_budget_secs: u64,
    pub store_confirmation_window_secs: u64,
    pub sweep_interval_secs: u64,
    pub currency: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            dispatch_queue_size: 1024,
            event_buffer_size: 1024,
            response_window_secs: 120,
            location_staleness_secs: 90,
            max_redispatch_attempts: 0,
            redispatch_budget_secs: 900,
            store_confirmation_window_secs: 300,
            sweep_interval_secs: 30,
            currency: "USD".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let base = Self::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", base.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(base.log_level),
            dispatch_queue_size: parse_or_default("DISPATCH_QUEUE_SIZE", base.dispatch_queue_size)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", base.event_buffer_size)?,
            response_window_secs: parse_or_default("RESPONSE_WINDOW_SECS", base.response_window_secs)?,
            location_staleness_secs: parse_or_default(
                "LOCATION_STALENESS_SECS",
                base.location_staleness_secs,
            )?,
            max_redispatch_attempts: parse_or_default(
                "MAX_REDISPATCH_ATTEMPTS",
                base.max_redispatch_attempts,
            )?,
            redispatch_budget_secs: parse_or_default(
                "REDISPATCH_BUDGET_SECS",
                base.redispatch_budget_secs,
            )?,
            store_confirmation_window_secs: parse_or_default(
                "STORE_CONFIRMATION_WINDOW_SECS",
                base.store_confirmation_window_secs,
            )?,
            sweep_interval_secs: parse_or_default("SWEEP_INTERVAL_SECS", base.sweep_interval_secs)?,
            currency: env::var("CURRENCY").unwrap_or(base.currency),
        })
    }

    pub fn response_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.response_window_secs as i64)
    }

    pub fn location_staleness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.location_staleness_secs as i64)
    }

    pub fn redispatch_budget(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.redispatch_budget_secs as i64)
    }

    pub fn store_confirmation_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.store_confirmation_window_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
