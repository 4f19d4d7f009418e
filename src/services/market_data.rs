// ============================================================================
// DONNÉES DE MARCHÉ
// ============================================================================
//
// Les stratégies ne calculent rien elles-mêmes : elles demandent un "snapshot"
// (dernière valeur de chaque champ) pour une liste de symboles.
//
//   - ScreenerClient   : POST {base_url}/{market}/scan (API du screener TradingView)
//   - StaticMarketData : valeurs fixes (tests, démo hors-ligne)
//
// Format de la requête screener:
//   {"symbols": {"tickers": ["NSE:RELIANCE"], "query": {"types": []}},
//    "columns": ["close", "EMA20"]}
// Réponse:
//   {"totalCount": 1, "data": [{"s": "NSE:RELIANCE", "d": [2501.5, 2480.1]}]}
//
// Points d'attention:
//   - Les suffixes Yahoo (.NS / .BO) sont retirés avant l'appel
//   - Un symbole absent de la réponse est simplement absent du snapshot
//
// ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::config::MarketDataConfig;

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Screener returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Dernières valeurs connues d'un symbole, indexées par nom de champ
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Quote {
    values: HashMap<String, f64>,
}

impl Quote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: f64) -> Self {
        self.values.insert(field.to_string(), value);
        self
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }
}

/// Snapshot indexé par symbole d'origine (celui de la watchlist)
pub type Snapshot = HashMap<String, Quote>;

#[async_trait]
pub trait MarketData: Send + Sync {
    async fn snapshot(&self, symbols: &[String], fields: &[String]) -> Result<Snapshot, MarketDataError>;
}

/// "RELIANCE.NS" -> "NSE:RELIANCE"
pub fn screener_ticker(exchange: &str, symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    let bare = upper
        .strip_suffix(".NS")
        .or_else(|| upper.strip_suffix(".BO"))
        .unwrap_or(upper.as_str());
    format!("{}:{}", exchange, bare)
}

// ========== CLIENT SCREENER ==========

#[derive(Serialize)]
struct ScanRequest<'a> {
    symbols: ScanSymbols,
    columns: &'a [String],
}

#[derive(Serialize)]
struct ScanSymbols {
    tickers: Vec<String>,
    query: ScanQuery,
}

#[derive(Serialize, Default)]
struct ScanQuery {
    types: Vec<String>,
}

#[derive(Deserialize)]
struct ScanResponse {
    #[serde(default)]
    data: Vec<ScanRow>,
}

#[derive(Deserialize)]
struct ScanRow {
    s: String,
    #[serde(default)]
    d: Vec<serde_json::Value>,
}

pub struct ScreenerClient {
    client: reqwest::Client,
    config: MarketDataConfig,
}

impl ScreenerClient {
    pub fn new(config: MarketDataConfig) -> Result<Self, MarketDataError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("swing-backend/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn scan_url(&self) -> String {
        format!("{}/{}/scan", self.config.base_url, self.config.market)
    }
}

#[async_trait]
impl MarketData for ScreenerClient {
    async fn snapshot(&self, symbols: &[String], fields: &[String]) -> Result<Snapshot, MarketDataError> {
        // ticker screener -> symboles d'origine (plusieurs symboles peuvent pointer sur le même ticker)
        let mut by_ticker: HashMap<String, Vec<String>> = HashMap::new();
        for symbol in symbols {
            by_ticker
                .entry(screener_ticker(&self.config.exchange, symbol))
                .or_default()
                .push(symbol.clone());
        }

        let request = ScanRequest {
            symbols: ScanSymbols {
                tickers: by_ticker.keys().cloned().collect(),
                query: ScanQuery::default(),
            },
            columns: fields,
        };

        tracing::debug!(url = %self.scan_url(), tickers = by_ticker.len(), "querying screener");

        let response = self.client.post(self.scan_url()).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let payload: ScanResponse = response.json().await?;
        Ok(snapshot_from_rows(payload.data, fields, &by_ticker))
    }
}

fn snapshot_from_rows(
    rows: Vec<ScanRow>,
    fields: &[String],
    by_ticker: &HashMap<String, Vec<String>>,
) -> Snapshot {
    let mut snapshot = Snapshot::new();

    for row in rows {
        let Some(originals) = by_ticker.get(&row.s) else {
            continue;
        };

        let mut quote = Quote::new();
        for (field, value) in fields.iter().zip(row.d.iter()) {
            if let Some(number) = value.as_f64() {
                quote = quote.with(field, number);
            }
        }

        for original in originals {
            snapshot.insert(original.clone(), quote.clone());
        }
    }

    snapshot
}

// ========== DONNÉES STATIQUES ==========

#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    quotes: Snapshot,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, symbol: &str, quote: Quote) -> Self {
        self.quotes.insert(symbol.to_string(), quote);
        self
    }
}

#[async_trait]
impl MarketData for StaticMarketData {
    async fn snapshot(&self, symbols: &[String], _fields: &[String]) -> Result<Snapshot, MarketDataError> {
        Ok(symbols
            .iter()
            .filter_map(|symbol| {
                self.quotes
                    .get(symbol)
                    .map(|quote| (symbol.clone(), quote.clone()))
            })
            .collect())
    }
}
