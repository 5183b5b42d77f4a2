use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use chrono_tz::Tz;

use crate::progression::cefr::clamp_level;
use crate::progression::selection::SelectionConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub database: Option<DatabaseConfig>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        Self {
            host,
            port,
            database: DatabaseConfig::from_env(),
            engine: EngineConfig::from_env(),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    /// `None` when `DATABASE_URL` is unset or blank.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())?;

        Some(Self {
            url,
            max_connections: env_u64("DB_MAX_CONNECTIONS", 10) as u32,
            acquire_timeout_secs: env_u64("DB_ACQUIRE_TIMEOUT_SECS", 5),
        })
    }
}

/// Tunables of the progression engine. Built once at startup and handed to
/// the service; the engine itself never reads the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_numeric_level: f64,
    pub selection: SelectionConfig,
    pub quality_smoothing: f64,
    pub streak_window_weeks: u32,
    pub default_timezone: Tz,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_numeric_level: 1.0,
            selection: SelectionConfig::default(),
            quality_smoothing: 0.2,
            streak_window_weeks: 12,
            default_timezone: Tz::UTC,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let default_timezone = match std::env::var("DEFAULT_TIMEZONE") {
            Ok(raw) => raw.parse::<Tz>().unwrap_or_else(|_| {
                tracing::warn!(timezone = %raw, "unknown DEFAULT_TIMEZONE, using UTC");
                Tz::UTC
            }),
            Err(_) => defaults.default_timezone,
        };

        Self {
            default_numeric_level: clamp_level(env_f64(
                "DEFAULT_NUMERIC_LEVEL",
                defaults.default_numeric_level,
            )),
            selection: SelectionConfig::new(
                env_u64(
                    "SELECTION_RECENT_WINDOW_DAYS",
                    defaults.selection.recent_window_days as u64,
                ),
                env_u64(
                    "SELECTION_RECENT_ATTEMPT_LIMIT",
                    defaults.selection.recent_attempt_limit as u64,
                ),
            ),
            quality_smoothing: env_f64("QUALITY_SMOOTHING", defaults.quality_smoothing)
                .clamp(0.0, 1.0),
            streak_window_weeks: env_u64(
                "STREAK_WINDOW_WEEKS",
                defaults.streak_window_weeks as u64,
            ) as u32,
            default_timezone,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}
