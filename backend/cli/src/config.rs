use serde::Deserialize;

use flipforge_core::{ScanParams, SchedulerConfig};

/// FlipForge runtime configuration, loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server bind address
    pub bind_address: String,
    /// HTTP server port
    pub port: u16,
    /// Base URL of the marketplace backend API
    pub market_api_url: String,
    /// SQLite run-log path
    pub db_path: String,
    /// Log level
    pub log_level: String,
    /// Start enabled job timers immediately after initialization
    pub autostart: bool,
    /// Optional supplier candidate feed URL
    pub supplier_feed_url: Option<String>,
    /// Which jobs start enabled
    pub jobs: SchedulerConfig,
    /// Initial scan thresholds
    pub scan: ScanParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8090,
            market_api_url: "http://localhost:3000".to_string(),
            db_path: "flipforge.db".to_string(),
            log_level: "info".to_string(),
            autostart: true,
            supplier_feed_url: None,
            jobs: SchedulerConfig::default(),
            scan: ScanParams::default(),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        let scan_defaults = ScanParams::default();
        Self {
            bind_address: std::env::var("FLIPFORGE_BIND")
                .unwrap_or_else(|_| defaults.bind_address.clone()),
            port: std::env::var("FLIPFORGE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            market_api_url: std::env::var("FLIPFORGE_MARKET_API")
                .unwrap_or_else(|_| defaults.market_api_url.clone()),
            db_path: std::env::var("FLIPFORGE_DB").unwrap_or_else(|_| defaults.db_path.clone()),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| defaults.log_level.clone()),
            autostart: env_bool("FLIPFORGE_AUTOSTART", defaults.autostart),
            supplier_feed_url: std::env::var("FLIPFORGE_FEED_URL").ok(),
            jobs: SchedulerConfig {
                scan: env_bool("FLIPFORGE_JOB_SCAN", true),
                listing: env_bool("FLIPFORGE_JOB_LISTING", true),
                fulfillment: env_bool("FLIPFORGE_JOB_FULFILLMENT", true),
                cleanup: env_bool("FLIPFORGE_JOB_CLEANUP", true),
                reset: env_bool("FLIPFORGE_JOB_RESET", true),
                payout: env_bool("FLIPFORGE_JOB_PAYOUT", true),
            },
            scan: ScanParams {
                min_score: env_f64("FLIPFORGE_MIN_SCORE", scan_defaults.min_score),
                min_roi: env_f64("FLIPFORGE_MIN_ROI", scan_defaults.min_roi),
                min_profit: env_f64("FLIPFORGE_MIN_PROFIT", scan_defaults.min_profit),
                max_price: env_f64("FLIPFORGE_MAX_PRICE", scan_defaults.max_price),
                daily_budget: env_f64("FLIPFORGE_DAILY_BUDGET", scan_defaults.daily_budget),
                markup_percent: env_f64("FLIPFORGE_MARKUP_PERCENT", scan_defaults.markup_percent),
                auto_buy: env_bool("FLIPFORGE_AUTO_BUY", scan_defaults.auto_buy),
            },
        }
    }
}
