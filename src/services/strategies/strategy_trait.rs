use async_trait::async_trait;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::market_data::MarketDataError;

// Colonnes obligatoires de la table renvoyée par analyze()
pub const REQUIRED_COLUMNS: [&str; 5] = ["symbol", "matched", "score", "confidence", "reason"];

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Cannot load strategy file {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Ambiguous(String),

    #[error("Strategy kind '{0}' is already registered")]
    DuplicateKind(String),

    #[error("Invalid parameters for strategy kind '{kind}': {reason}")]
    InvalidParams { kind: String, reason: String },

    #[error(
        "Strategy result is missing required columns: {missing:?}. Required columns are: {:?}",
        REQUIRED_COLUMNS
    )]
    Validation { missing: Vec<String> },

    #[error("Market data error: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Result table error: {0}")]
    Table(#[from] PolarsError),
}

/// Description d'une stratégie, disponible sans lancer d'analyse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    pub script_name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub strategy_type: String,
    pub timeframe: Option<String>,
    pub indicators_used: Vec<String>,
    pub ai_logic: Option<String>,
    pub criteria: Option<String>,
}

//trait = Interface
#[async_trait]
pub trait Strategy: Send + Sync {
    fn descriptor(&self) -> &StrategyDescriptor;

    // Table avec au minimum REQUIRED_COLUMNS ; price / rsi / volume_ratio optionnels
    async fn analyze(&self, symbols: &[String]) -> Result<DataFrame, StrategyError>;
}

/// Une ligne décodée de la table de résultats
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub symbol: String,
    pub matched: bool,
    pub score: f64,
    pub confidence: Option<f64>,
    pub reason: String,
    pub price: Option<f64>,
    pub rsi: Option<f64>,
    pub volume_ratio: Option<f64>,
}

impl ResultRow {
    pub fn new(symbol: &str, matched: bool, score: f64, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            matched,
            score,
            confidence: Some(confidence),
            reason: reason.into(),
            price: None,
            rsi: None,
            volume_ratio: None,
        }
    }

    /// Ligne "pas de verdict" (données manquantes)
    pub fn unmatched(symbol: &str, reason: impl Into<String>) -> Self {
        Self::new(symbol, false, 0.0, 0.0, reason)
    }
}

/// Construit la DataFrame renvoyée par analyze() à partir de lignes typées
pub fn rows_to_frame(rows: &[ResultRow]) -> PolarsResult<DataFrame> {
    let symbols: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
    let matched: Vec<bool> = rows.iter().map(|r| r.matched).collect();
    let scores: Vec<f64> = rows.iter().map(|r| r.score).collect();
    let confidences: Vec<Option<f64>> = rows.iter().map(|r| r.confidence).collect();
    let reasons: Vec<&str> = rows.iter().map(|r| r.reason.as_str()).collect();
    let prices: Vec<Option<f64>> = rows.iter().map(|r| r.price).collect();
    let rsis: Vec<Option<f64>> = rows.iter().map(|r| r.rsi).collect();
    let volume_ratios: Vec<Option<f64>> = rows.iter().map(|r| r.volume_ratio).collect();

    DataFrame::new(vec![
        Column::Series(Series::new("symbol".into(), symbols)),
        Column::Series(Series::new("matched".into(), matched)),
        Column::Series(Series::new("score".into(), scores)),
        Column::Series(Series::new("confidence".into(), confidences)),
        Column::Series(Series::new("reason".into(), reasons)),
        Column::Series(Series::new("price".into(), prices)),
        Column::Series(Series::new("rsi".into(), rsis)),
        Column::Series(Series::new("volume_ratio".into(), volume_ratios)),
    ])
}

/// Vérifie la présence des colonnes obligatoires
pub fn validate_result_table(df: &DataFrame) -> Result<(), StrategyError> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|name| df.get_column_index(name).is_none())
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(StrategyError::Validation { missing })
    }
}

/// Valide puis décode la table. Les lignes sans symbole sont ignorées.
pub fn rows_from_frame(df: &DataFrame) -> Result<Vec<ResultRow>, StrategyError> {
    validate_result_table(df)?;

    let symbols = cast_column(df, "symbol", DataType::String)?;
    let symbols = symbols.str()?;
    let matched = cast_column(df, "matched", DataType::Boolean)?;
    let matched = matched.bool()?;
    let scores = cast_column(df, "score", DataType::Float64)?;
    let scores = scores.f64()?;
    let confidences = cast_column(df, "confidence", DataType::Float64)?;
    let confidences = confidences.f64()?;
    let reasons = cast_column(df, "reason", DataType::String)?;
    let reasons = reasons.str()?;

    let prices = optional_float(df, "price")?;
    let rsis = optional_float(df, "rsi")?;
    let volume_ratios = optional_float(df, "volume_ratio")?;

    let at = |column: &Option<Float64Chunked>, i: usize| column.as_ref().and_then(|c| c.get(i));

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let Some(symbol) = symbols.get(i) else {
            continue;
        };

        rows.push(ResultRow {
            symbol: symbol.to_string(),
            matched: matched.get(i).unwrap_or(false),
            score: scores.get(i).unwrap_or(0.0),
            confidence: confidences.get(i),
            reason: reasons.get(i).unwrap_or_default().to_string(),
            price: at(&prices, i),
            rsi: at(&rsis, i),
            volume_ratio: at(&volume_ratios, i),
        });
    }

    Ok(rows)
}

fn cast_column(df: &DataFrame, name: &str, dtype: DataType) -> PolarsResult<Series> {
    df.column(name)?.as_materialized_series().cast(&dtype)
}

fn optional_float(df: &DataFrame, name: &str) -> PolarsResult<Option<Float64Chunked>> {
    if df.get_column_index(name).is_none() {
        return Ok(None);
    }
    let series = cast_column(df, name, DataType::Float64)?;
    Ok(Some(series.f64()?.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_columns_are_reported() {
        let df = DataFrame::new(vec![
            Column::Series(Series::new("symbol".into(), vec!["TCS"])),
            Column::Series(Series::new("matched".into(), vec![true])),
        ])
        .unwrap();

        match validate_result_table(&df) {
            Err(StrategyError::Validation { missing }) => {
                assert_eq!(missing, vec!["score", "confidence", "reason"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn integer_scores_and_null_flags_are_decoded() {
        let df = DataFrame::new(vec![
            Column::Series(Series::new("symbol".into(), vec!["TCS", "INFY"])),
            Column::Series(Series::new("matched".into(), vec![Some(true), None])),
            Column::Series(Series::new("score".into(), vec![85i32, 30])),
            Column::Series(Series::new("confidence".into(), vec![Some(90.0), None])),
            Column::Series(Series::new("reason".into(), vec!["trend", "flat"])),
            Column::Series(Series::new("price".into(), vec![3200.5, 1500.0])),
        ])
        .unwrap();

        let rows = rows_from_frame(&df).unwrap();
        assert_eq!(rows.len(), 2);

        assert!(rows[0].matched);
        assert_eq!(rows[0].score, 85.0);
        assert_eq!(rows[0].price, Some(3200.5));
        assert_eq!(rows[0].rsi, None);

        assert!(!rows[1].matched);
        assert_eq!(rows[1].confidence, None);
    }

    #[test]
    fn frame_built_from_rows_keeps_optional_columns() {
        let mut row = ResultRow::new("RELIANCE.NS", true, 100.0, 95.0, "UPTREND");
        row.price = Some(2501.25);

        let df = rows_to_frame(&[row.clone(), ResultRow::unmatched("TCS.NS", "Not found")]).unwrap();
        assert_eq!(df.height(), 2);

        let decoded = rows_from_frame(&df).unwrap();
        assert_eq!(decoded[0], row);
        assert_eq!(decoded[1].reason, "Not found");
    }
}
