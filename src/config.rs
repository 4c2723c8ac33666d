use std::env;

use chrono::{FixedOffset, Offset, Utc};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub reminder_interval_secs: u64,
    pub reminder_batch_size: usize,
    pub push_chunk_size: usize,
    /// Offset used to cut calendar days for stop analytics.
    pub server_utc_offset: FixedOffset,
    pub static_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected json/compact"
                )));
            }
        };

        let offset_minutes: i32 = parse_or_default("SERVER_UTC_OFFSET_MINUTES", 0)?;
        let server_utc_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            AppError::Internal(format!(
                "invalid SERVER_UTC_OFFSET_MINUTES: {offset_minutes} is out of range"
            ))
        })?;

        let push_chunk_size: usize = parse_or_default("PUSH_CHUNK_SIZE", 500)?;
        if push_chunk_size == 0 {
            return Err(AppError::Internal("invalid PUSH_CHUNK_SIZE: must be > 0".to_string()));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            reminder_interval_secs: parse_or_default("REMINDER_INTERVAL_SECS", 60)?,
            reminder_batch_size: parse_or_default("REMINDER_BATCH_SIZE", 200)?,
            push_chunk_size,
            server_utc_offset,
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string()),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            event_buffer_size: 1024,
            reminder_interval_secs: 60,
            reminder_batch_size: 200,
            push_chunk_size: 500,
            server_utc_offset: Utc.fix(),
            static_dir: "static".to_string(),
        }
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
