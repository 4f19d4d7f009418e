//pour les réponses structurées
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use super::{stock, strategy_metadata, watchlist};
use crate::services::strategies::ResultRow;
use crate::services::strategy_service::UpsertAction;

// 1 watchlist (+ ses stocks si demandé)
#[derive(Debug, Serialize)]
pub struct WatchlistResponse {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_date: NaiveDateTime,
    pub updated_date: NaiveDateTime,
    pub stock_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stocks: Option<Vec<stock::Model>>,
}

impl WatchlistResponse {
    pub fn new(watchlist: watchlist::Model, stocks: Vec<stock::Model>, include_stocks: bool) -> Self {
        Self {
            id: watchlist.id,
            name: watchlist.name,
            description: watchlist.description,
            created_date: watchlist.created_date,
            updated_date: watchlist.updated_date,
            stock_count: stocks.len(),
            stocks: include_stocks.then_some(stocks),
        }
    }
}

// Résultat d'un ajout de stocks dans une watchlist (succès partiel)
#[derive(Debug, Serialize)]
pub struct WatchlistStocksAdded<T: Serialize> {
    pub watchlist: String,
    pub added: Vec<String>,
    pub skipped: Vec<String>,
    pub not_found: Vec<T>,
    pub total_stocks: u64,
}

#[derive(Debug, Serialize)]
pub struct StrategyResponse {
    pub id: i32,
    pub script_name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub strategy_type: String,
    pub timeframe: Option<String>,
    pub indicators_used: Vec<String>,
    pub ai_logic: Option<String>,
    pub criteria: Option<String>,
    pub file_path: String,
    pub is_active: bool,
    pub last_scanned: Option<NaiveDateTime>,
}

impl From<strategy_metadata::Model> for StrategyResponse {
    fn from(model: strategy_metadata::Model) -> Self {
        let indicators_used = model.indicators();
        Self {
            id: model.id,
            script_name: model.script_name,
            display_name: model.display_name,
            description: model.description,
            strategy_type: model.strategy_type,
            timeframe: model.timeframe,
            indicators_used,
            ai_logic: model.ai_logic,
            criteria: model.criteria,
            file_path: model.file_path,
            is_active: model.is_active,
            last_scanned: model.last_scanned,
        }
    }
}

// Ligne de strategy_results avec les noms résolus (GET /results/latest)
#[derive(Debug, Serialize)]
pub struct StrategyResultResponse {
    pub id: i32,
    pub strategy: Option<String>,
    pub watchlist: Option<String>,
    pub stock: Option<String>,
    pub matched: bool,
    pub confidence_score: Option<f64>,
    pub trend_score: Option<f64>,
    pub reason: Option<String>,
    pub price: Option<f64>,
    pub rsi: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub execution_date: NaiveDateTime,
    pub execution_time_ms: Option<i64>,
}

// POST /execute
#[derive(Debug, Serialize)]
pub struct StrategyExecutionResult {
    pub strategy_name: String,
    pub watchlist_name: String,
    pub total_stocks: usize,
    pub matched_stocks: usize,
    pub execution_time_ms: i64,
    pub results: Vec<ResultRow>,
}

// POST /execute-multiple : une entrée par stock, puis une par stratégie
#[derive(Debug, Serialize)]
pub struct MultiStrategyExecutionResult {
    pub watchlist_name: String,
    pub total_stocks: usize,
    pub strategy_count: usize,
    pub strategies: BTreeMap<i32, StrategyInfo>,
    pub results: Vec<ConsolidatedStock>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub strategy_type: String,
}

#[derive(Debug, Serialize)]
pub struct ConsolidatedStock {
    pub symbol: String,
    pub strategies: BTreeMap<i32, StrategyVerdict>,
    pub total_matches: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyVerdict {
    pub matched: bool,
    pub score: f64,
    pub confidence: Option<f64>,
    pub reason: String,
}

// ========== REQUÊTES ==========

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStockRequest {
    #[validate(length(min = 1, max = 32, message = "symbol must be 1-32 characters"))]
    pub symbol: String,
    pub name: Option<String>,
    #[serde(default = "default_exchange")]
    #[validate(length(min = 1, max = 16))]
    pub exchange: String,
    pub sector: Option<String>,
}

pub fn default_exchange() -> String {
    "NSE".to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkStocksRequest {
    #[validate(length(min = 1, message = "stocks must not be empty"))]
    pub stocks: Vec<String>,
    #[serde(default = "default_exchange")]
    #[validate(length(min = 1, max = 16))]
    pub exchange: String,
}

#[derive(Debug, Serialize)]
pub struct BulkStocksResponse {
    pub added: Vec<String>,
    pub skipped: Vec<String>,
    pub total_added: usize,
    pub total_skipped: usize,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStockRequest {
    pub name: Option<String>,
    #[validate(length(min = 1, max = 16))]
    pub exchange: Option<String>,
    pub sector: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct StockCounts {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateWatchlistRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateWatchlistRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddStocksByIdRequest {
    #[validate(length(min = 1, message = "stock_ids must not be empty"))]
    pub stock_ids: Vec<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddStocksBySymbolRequest {
    #[validate(length(min = 1, message = "symbols must not be empty"))]
    pub symbols: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct WatchlistStocksResponse {
    pub watchlist: String,
    pub total: usize,
    pub stocks: Vec<stock::Model>,
    pub symbols: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteStrategyRequest {
    pub watchlist_id: i32,
    pub strategy_id: i32,
    #[serde(default = "default_true")]
    pub save_results: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExecuteMultipleRequest {
    pub watchlist_id: i32,
    #[validate(length(min = 1, message = "strategy_ids must not be empty"))]
    pub strategy_ids: Vec<i32>,
    #[serde(default = "default_true")]
    pub save_results: bool,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub strategy: StrategyResponse,
    pub action: UpsertAction,
}

#[derive(Debug, Serialize)]
pub struct SystemStats {
    pub stocks: EntityCounts,
    pub watchlists: EntityCounts,
    pub strategies: EntityCounts,
    pub analysis_history: ResultCounts,
}

#[derive(Debug, Serialize)]
pub struct EntityCounts {
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ResultCounts {
    pub total_executions: u64,
    pub total_matches: u64,
}
