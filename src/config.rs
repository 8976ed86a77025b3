use std::env;
use std::time::Duration;

use crate::error::AppError;

/// Tunables for matching, claiming, proximity detection and notification.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub radius_m: f64,
    pub candidate_limit: usize,
    pub claim_timeout: Duration,
    pub reconcile_interval: Duration,
    pub pickup_radius_m: f64,
    pub dropoff_radius_m: f64,
    pub store_timeout: Duration,
    pub notify_timeout: Duration,
    pub notify_max_retries: u32,
    pub notify_retry_delay: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            radius_m: 50_000.0,
            candidate_limit: 10,
            claim_timeout: Duration::from_secs(30),
            reconcile_interval: Duration::from_secs(5),
            pickup_radius_m: 50.0,
            dropoff_radius_m: 20.0,
            store_timeout: Duration::from_millis(2_000),
            notify_timeout: Duration::from_millis(3_000),
            notify_max_retries: 3,
            notify_retry_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub notify_webhook_url: Option<String>,
    pub auto_dispatch: bool,
    pub policy: DispatchPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            notify_webhook_url: None,
            auto_dispatch: true,
            policy: DispatchPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = DispatchPolicy::default();

        let policy = DispatchPolicy {
            radius_m: parse_or_default("DISPATCH_RADIUS_METERS", defaults.radius_m)?,
            candidate_limit: parse_or_default("DISPATCH_CANDIDATE_LIMIT", defaults.candidate_limit)?,
            claim_timeout: Duration::from_secs(parse_or_default("CLAIM_TIMEOUT_SECS", 30)?),
            reconcile_interval: Duration::from_secs(parse_or_default("RECONCILE_INTERVAL_SECS", 5)?),
            pickup_radius_m: parse_or_default("PICKUP_RADIUS_METERS", defaults.pickup_radius_m)?,
            dropoff_radius_m: parse_or_default("DROPOFF_RADIUS_METERS", defaults.dropoff_radius_m)?,
            store_timeout: Duration::from_millis(parse_or_default("STORE_TIMEOUT_MS", 2_000)?),
            notify_timeout: Duration::from_millis(parse_or_default("NOTIFY_TIMEOUT_MS", 3_000)?),
            notify_max_retries: parse_or_default("NOTIFY_MAX_RETRIES", defaults.notify_max_retries)?,
            notify_retry_delay: Duration::from_millis(parse_or_default("NOTIFY_RETRY_DELAY_MS", 500)?),
        };

        if policy.candidate_limit == 0 {
            return Err(AppError::Internal(
                "invalid DISPATCH_CANDIDATE_LIMIT: must be > 0".to_string(),
            ));
        }
        if policy.reconcile_interval.is_zero() {
            return Err(AppError::Internal(
                "invalid RECONCILE_INTERVAL_SECS: must be > 0".to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            auto_dispatch: parse_or_default("AUTO_DISPATCH", true)?,
            policy,
        })
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
