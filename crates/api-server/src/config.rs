use std::collections::HashMap;
use std::env;
use std::time::Duration;

use analysis_core::Interval;
use anyhow::{Context, Result};
use signal_scheduler::{IntervalSchedule, ScheduleMap};

/// The four intervals the schedulers understand, with their env prefixes
/// and default cron expressions (6-field, UTC).
const SCHEDULED_INTERVALS: [(Interval, &str, &str); 4] = [
    (Interval::Min30, "30M", "0 */30 * * * *"),
    (Interval::Hour1, "1H", "0 0 * * * *"),
    (Interval::Day1, "1D", "0 0 10 * * *"),
    (Interval::Week1, "1W", "0 0 10 * * Fri"),
];

/// Process configuration, resolved once at startup from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub shutdown_timeout: Duration,

    pub vendor_base_url: String,
    pub vendor_rate_limit: usize,
    pub vendor_timeout: Duration,

    pub database_url: String,
    pub default_config_id: Option<String>,
    pub start_date_offset: i64,

    pub bearish_symbols: Vec<String>,
    pub bullish_symbols: Vec<String>,
    pub bearish_schedules: ScheduleMap,
    pub bullish_schedules: ScheduleMap,
    pub bearish_auto_start: bool,
    pub bullish_auto_start: bool,

    pub telegram_bot_token: String,
    pub telegram_chat_id: String,

    pub environment: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            http_port: parse_env("HTTP_PORT", 8080u16)?,
            read_timeout: Duration::from_secs(parse_env("HTTP_READ_TIMEOUT", 15u64)?),
            write_timeout: Duration::from_secs(parse_env("HTTP_WRITE_TIMEOUT", 15u64)?),
            idle_timeout: Duration::from_secs(parse_env("HTTP_IDLE_TIMEOUT", 60u64)?),
            shutdown_timeout: Duration::from_secs(parse_env("HTTP_SHUTDOWN_TIMEOUT", 10u64)?),

            vendor_base_url: env::var("VENDOR_BASE_URL")
                .unwrap_or_else(|_| "https://api.vietstock.vn".to_string()),
            vendor_rate_limit: parse_env("VENDOR_RATE_LIMIT", 120usize)?,
            vendor_timeout: Duration::from_secs(parse_env("VENDOR_TIMEOUT", 30u64)?),

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/market.db?mode=rwc".to_string()),
            default_config_id: env::var("DEFAULT_CONFIG_ID").ok().filter(|s| !s.is_empty()),
            start_date_offset: parse_env("START_DATE_OFFSET", 90i64)?,

            bearish_symbols: symbol_list(&env::var("BEARISH_SYMBOLS").unwrap_or_default()),
            bullish_symbols: symbol_list(&env::var("BULLISH_SYMBOLS").unwrap_or_default()),
            bearish_schedules: schedule_map("BEARISH")?,
            bullish_schedules: schedule_map("BULLISH")?,
            bearish_auto_start: parse_env("BEARISH_CRON_AUTO_START", false)?,
            bullish_auto_start: parse_env("BULLISH_CRON_AUTO_START", false)?,

            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").unwrap_or_default(),

            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        if config.start_date_offset <= 0 {
            anyhow::bail!("START_DATE_OFFSET must be positive");
        }
        if config.vendor_rate_limit == 0 {
            anyhow::bail!("VENDOR_RATE_LIMIT must be positive");
        }
        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {name}='{raw}'")),
        _ => Ok(default),
    }
}

fn symbol_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn schedule_map(prefix: &str) -> Result<ScheduleMap> {
    let mut map = HashMap::new();
    for (interval, tag, default_cron) in SCHEDULED_INTERVALS {
        let enabled = parse_env(&format!("{prefix}_{tag}_ENABLED"), false)?;
        let cron = env::var(format!("{prefix}_{tag}_SCHEDULE"))
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| default_cron.to_string());
        map.insert(interval, IntervalSchedule { enabled, cron });
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_list_normalizes_and_skips_blanks() {
        assert_eq!(
            symbol_list(" vnm, fpt ,,hpg"),
            vec!["VNM".to_string(), "FPT".to_string(), "HPG".to_string()]
        );
        assert!(symbol_list("").is_empty());
    }

    #[test]
    fn defaults_cover_all_four_intervals() {
        let map = schedule_map("TEST_UNSET_PREFIX").unwrap();
        assert_eq!(map.len(), 4);
        assert!(map.values().all(|s| !s.enabled));
        assert!(map.contains_key(&Interval::Min30));
        assert!(map.contains_key(&Interval::Week1));
    }
}
