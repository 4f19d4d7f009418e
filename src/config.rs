// ============================================================================
// CONFIGURATION
// ============================================================================
//
// Lue depuis l'environnement (et .env via dotenv au démarrage).
//
// Variables:
//   - DATABASE_URL         : sqlite://data/trading.db?mode=rwc
//   - HOST / PORT          : 0.0.0.0 / 8000
//   - STRATEGIES_DIR       : dossier des fichiers de stratégie (.json)
//   - MARKET_DATA_URL      : base du screener (https://scanner.tradingview.com)
//   - MARKET_DATA_MARKET   : marché du screener (india)
//   - MARKET_DATA_EXCHANGE : préfixe des tickers (NSE)
//
// ============================================================================

use std::env;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/trading.db?mode=rwc";
pub const DEFAULT_MARKET_DATA_URL: &str = "https://scanner.tradingview.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub strategies_dir: PathBuf,
    pub market_data: MarketDataConfig,
}

#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub market: String,
    pub exchange: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MARKET_DATA_URL.to_string(),
            market: "india".to_string(),
            exchange: "NSE".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Construit la config à partir d'une fonction de lookup (testable sans toucher à l'env)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let port_raw = get("PORT", "8000");
        let port = port_raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidValue {
            key: "PORT",
            value: port_raw.clone(),
        })?;

        let market_defaults = MarketDataConfig::default();

        Ok(Self {
            database_url: get("DATABASE_URL", DEFAULT_DATABASE_URL),
            host: get("HOST", "0.0.0.0"),
            port,
            strategies_dir: PathBuf::from(get("STRATEGIES_DIR", "strategies")),
            market_data: MarketDataConfig {
                base_url: get("MARKET_DATA_URL", &market_defaults.base_url)
                    .trim_end_matches('/')
                    .to_string(),
                market: get("MARKET_DATA_MARKET", &market_defaults.market),
                exchange: get("MARKET_DATA_EXCHANGE", &market_defaults.exchange),
            },
        })
    }
}
