use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;

/// Collector settings
///
/// Loaded from an optional `hikari.toml` and `HIKARI_*` environment variables
/// (e.g. `HIKARI_DATABASE_URL`, `HIKARI_RATE_LIMIT_BURST_SIZE`). Environment
/// wins over the file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub buffer_max_size: usize,
    pub db_retry_interval_seconds: f64,
    pub retention_days: u32,
    pub host: String,
    pub port: u16,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests_per_second: f64,
    pub rate_limit_burst_size: u32,
    pub rate_limit_stale_after_seconds: u64,
    pub log_level: String,
    pub log_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./data/hikari.db".to_string(),
            buffer_max_size: 50_000,
            db_retry_interval_seconds: 10.0,
            retention_days: 30,
            host: "0.0.0.0".to_string(),
            port: 8000,
            rate_limit_enabled: true,
            rate_limit_requests_per_second: 100.0,
            rate_limit_burst_size: 200,
            rate_limit_stale_after_seconds: 3600,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl Settings {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs_f64(self.db_retry_interval_seconds)
    }

    pub fn rate_limit_stale_after(&self) -> Duration {
        Duration::from_secs(self.rate_limit_stale_after_seconds)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

const CONFIG_FILE: &str = "hikari";
const ENV_PREFIX: &str = "HIKARI";

pub fn load_config() -> anyhow::Result<Settings> {
    let config = config::Config::builder()
        .add_source(config::File::with_name(CONFIG_FILE).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()?;

    let settings: Settings = config.try_deserialize()?;
    validate_config(&settings)?;

    Ok(settings)
}

fn check_range<T>(field: &str, value: T, range: RangeInclusive<T>) -> anyhow::Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if !range.contains(&value) {
        anyhow::bail!(
            "{} must be between {} and {}, got {}",
            field,
            range.start(),
            range.end(),
            value
        );
    }
    Ok(())
}

pub fn validate_config(cfg: &Settings) -> anyhow::Result<()> {
    if cfg.database_url.trim().is_empty() {
        anyhow::bail!("database_url cannot be empty");
    }

    check_range("buffer_max_size", cfg.buffer_max_size, 1_000..=1_000_000)?;
    check_range("db_retry_interval_seconds", cfg.db_retry_interval_seconds, 1.0..=300.0)?;
    check_range("retention_days", cfg.retention_days, 1..=365)?;
    check_range("port", cfg.port, 1..=u16::MAX)?;
    check_range(
        "rate_limit_requests_per_second",
        cfg.rate_limit_requests_per_second,
        1.0..=10_000.0,
    )?;
    check_range("rate_limit_burst_size", cfg.rate_limit_burst_size, 10..=10_000)?;

    if cfg.rate_limit_stale_after_seconds == 0 {
        anyhow::bail!("rate_limit_stale_after_seconds must be positive");
    }

    match cfg.log_format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("log_format must be 'text' or 'json', got '{}'", other),
    }

    Ok(())
}
