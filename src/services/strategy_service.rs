/*
services/
├─ strategy_service.rs
│  ├─ scan()              ← dossier STRATEGIES_DIR -> table strategy_metadata (upsert)
│  ├─ install_file()      ← upload : staging .tmp, validation, rename, upsert
│  ├─ execute()           ← 1 stratégie x 1 watchlist, erreurs = 500
│  └─ execute_multiple()  ← N stratégies x 1 watchlist, erreurs collectées
│
└─ strategies/
   ├─ strategy_trait.rs   ← contrat Strategy + table de résultats (polars)
   ├─ registry.rs         ← kind -> factory
   ├─ loader.rs           ← lecture des fichiers .json
   └─ defaults/           ← stratégies compilées (ema_alignment, rsi_momentum)
*/
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::dto::{
    ConsolidatedStock, MultiStrategyExecutionResult, StrategyExecutionResult, StrategyInfo,
    StrategyVerdict,
};
use crate::models::stock::{self, normalize_symbol, Entity as Stock};
use crate::models::strategy_metadata::{self, Entity as StrategyMetadata};
use crate::models::strategy_result::{self, Entity as StrategyResult};
use crate::models::watchlist::{self, Entity as Watchlist};
use crate::services::strategies::loader::{self, is_reserved, STRATEGY_EXTENSION};
use crate::services::strategies::{
    rows_from_frame, ResultRow, StrategyContext, StrategyDescriptor, StrategyRegistry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Created,
    Updated,
}

#[derive(Debug, Default, Serialize)]
pub struct ScanReport {
    pub scanned: usize,
    pub added: usize,
    pub updated: usize,
    pub errors: Vec<String>,
    pub total_strategies: u64,
}

/// Sortie brute d'une exécution, avant persistance
struct StrategyRun {
    rows: Vec<ResultRow>,
    execution_time_ms: i64,
}

pub struct StrategyService {
    registry: StrategyRegistry,
    context: StrategyContext,
    strategies_dir: PathBuf,
}

impl StrategyService {
    pub fn new(registry: StrategyRegistry, context: StrategyContext, strategies_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            context,
            strategies_dir: strategies_dir.into(),
        }
    }

    pub fn strategies_dir(&self) -> &Path {
        &self.strategies_dir
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    // ========== SCAN ==========

    pub async fn scan(&self, db: &DatabaseConnection) -> ApiResult<ScanReport> {
        let files = loader::scan_strategy_files(&self.strategies_dir)?;
        let mut report = ScanReport::default();

        for path in files {
            report.scanned += 1;

            let descriptor = match loader::load_metadata(&path, &self.registry) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping strategy file");
                    report.errors.push(format!("{}: {}", loader::script_name_of(&path), e));
                    continue;
                }
            };

            match upsert_metadata(db, &descriptor, &path).await {
                Ok(UpsertAction::Created) => report.added += 1,
                Ok(UpsertAction::Updated) => report.updated += 1,
                Err(e) => report.errors.push(format!("{}: {}", descriptor.script_name, e)),
            }
        }

        report.total_strategies = StrategyMetadata::find()
            .filter(strategy_metadata::Column::IsActive.eq(true))
            .count(db)
            .await?;

        tracing::info!(
            scanned = report.scanned,
            added = report.added,
            updated = report.updated,
            errors = report.errors.len(),
            "strategy scan finished"
        );

        Ok(report)
    }

    // ========== UPLOAD ==========

    /// Écrit le fichier sous un nom temporaire, le valide, puis le renomme.
    /// Un fichier invalide est supprimé sans toucher à une version existante.
    pub async fn install_file(
        &self,
        db: &DatabaseConnection,
        file_name: &str,
        contents: &[u8],
    ) -> ApiResult<(strategy_metadata::Model, UpsertAction)> {
        let file_name = checked_file_name(file_name)?;

        std::fs::create_dir_all(&self.strategies_dir)?;
        let staged = self
            .strategies_dir
            .join(format!(".upload-{}.tmp", Uuid::new_v4()));
        std::fs::write(&staged, contents)?;

        let descriptor = match loader::read_descriptor(&staged, &file_name, &self.registry) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                let _ = std::fs::remove_file(&staged);
                return Err(ApiError::bad_request(format!("Invalid strategy file: {}", e)));
            }
        };

        let target = self.strategies_dir.join(&file_name);
        if let Err(e) = std::fs::rename(&staged, &target) {
            let _ = std::fs::remove_file(&staged);
            return Err(e.into());
        }

        let action = upsert_metadata(db, &descriptor, &target).await?;
        let model = StrategyMetadata::find()
            .filter(strategy_metadata::Column::ScriptName.eq(&descriptor.script_name))
            .one(db)
            .await?
            .ok_or_else(|| ApiError::Internal("Strategy metadata vanished after upsert".to_string()))?;

        tracing::info!(script = %file_name, ?action, "strategy file installed");
        Ok((model, action))
    }

    // ========== EXÉCUTION ==========

    pub async fn execute(
        &self,
        db: &DatabaseConnection,
        watchlist_id: i32,
        strategy_id: i32,
        save_results: bool,
    ) -> ApiResult<StrategyExecutionResult> {
        let watchlist = find_watchlist(db, watchlist_id).await?;

        let strategy = StrategyMetadata::find_by_id(strategy_id)
            .one(db)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| ApiError::bad_request(format!("Strategy {} not found or inactive", strategy_id)))?;

        let symbols = watchlist_symbols(db, watchlist_id).await?;
        if symbols.is_empty() {
            return Err(ApiError::bad_request(format!("Watchlist '{}' has no stocks", watchlist.name)));
        }

        let run = self.run_strategy(&strategy, &symbols).await?;

        if save_results {
            save_results_for(db, strategy.id, watchlist.id, &run).await?;
        }

        let matched_stocks = run.rows.iter().filter(|r| r.matched).count();
        tracing::info!(
            strategy = %strategy.display_name,
            watchlist = %watchlist.name,
            total = symbols.len(),
            matched = matched_stocks,
            elapsed_ms = run.execution_time_ms,
            "strategy executed"
        );

        Ok(StrategyExecutionResult {
            strategy_name: strategy.display_name,
            watchlist_name: watchlist.name,
            total_stocks: symbols.len(),
            matched_stocks,
            execution_time_ms: run.execution_time_ms,
            results: run.rows,
        })
    }

    pub async fn execute_multiple(
        &self,
        db: &DatabaseConnection,
        watchlist_id: i32,
        strategy_ids: &[i32],
        save_results: bool,
    ) -> ApiResult<MultiStrategyExecutionResult> {
        let watchlist = find_watchlist(db, watchlist_id).await?;

        let strategies = StrategyMetadata::find()
            .filter(strategy_metadata::Column::Id.is_in(strategy_ids.iter().copied()))
            .filter(strategy_metadata::Column::IsActive.eq(true))
            .order_by_asc(strategy_metadata::Column::Id)
            .all(db)
            .await?;

        if strategies.is_empty() {
            return Err(ApiError::not_found("No active strategies found for the given ids"));
        }

        let symbols = watchlist_symbols(db, watchlist_id).await?;
        if symbols.is_empty() {
            return Err(ApiError::bad_request(format!("Watchlist '{}' has no stocks", watchlist.name)));
        }

        let mut infos = BTreeMap::new();
        let mut verdicts: BTreeMap<i32, HashMap<String, StrategyVerdict>> = BTreeMap::new();
        let mut errors = Vec::new();

        for strategy in &strategies {
            let outcome = match self.run_strategy(strategy, &symbols).await {
                Ok(run) if save_results => match save_results_for(db, strategy.id, watchlist.id, &run).await {
                    Ok(_) => Ok(run),
                    Err(e) => Err(e),
                },
                other => other,
            };

            match outcome {
                Ok(run) => {
                    infos.insert(
                        strategy.id,
                        StrategyInfo {
                            name: strategy.display_name.clone(),
                            strategy_type: strategy.strategy_type.clone(),
                        },
                    );
                    // symbole en double : la première ligne gagne
                    let mut by_symbol = HashMap::new();
                    for row in run.rows {
                        by_symbol.entry(row.symbol).or_insert(StrategyVerdict {
                            matched: row.matched,
                            score: row.score,
                            confidence: row.confidence,
                            reason: row.reason,
                        });
                    }
                    verdicts.insert(strategy.id, by_symbol);
                }
                Err(e) => {
                    tracing::error!(strategy = %strategy.display_name, error = %e, "strategy failed");
                    errors.push(format!("{}: {}", strategy.display_name, e));
                }
            }
        }

        let results = symbols
            .iter()
            .map(|symbol| {
                let strategies: BTreeMap<i32, StrategyVerdict> = verdicts
                    .iter()
                    .filter_map(|(id, by_symbol)| by_symbol.get(symbol).map(|v| (*id, v.clone())))
                    .collect();
                let total_matches = strategies.values().filter(|v| v.matched).count();
                ConsolidatedStock {
                    symbol: symbol.clone(),
                    strategies,
                    total_matches,
                }
            })
            .collect();

        Ok(MultiStrategyExecutionResult {
            watchlist_name: watchlist.name,
            total_stocks: symbols.len(),
            strategy_count: infos.len(),
            strategies: infos,
            results,
            errors,
        })
    }

    async fn run_strategy(
        &self,
        strategy: &strategy_metadata::Model,
        symbols: &[String],
    ) -> Result<StrategyRun, ApiError> {
        let path = self.strategy_path(strategy);
        let instance = loader::load_strategy(&path, &self.registry, &self.context)?;

        let started = Instant::now();
        let table = instance.analyze(symbols).await?;
        let execution_time_ms = started.elapsed().as_millis() as i64;

        let rows = rows_from_frame(&table)?;
        Ok(StrategyRun { rows, execution_time_ms })
    }

    /// Chemin du fichier : celui enregistré, sinon STRATEGIES_DIR/script_name
    pub fn strategy_path(&self, strategy: &strategy_metadata::Model) -> PathBuf {
        let recorded = PathBuf::from(&strategy.file_path);
        if recorded.is_file() {
            recorded
        } else {
            self.strategies_dir.join(&strategy.script_name)
        }
    }
}

/// Nom de fichier uploadé : extension .json, pas de chemin, pas de nom réservé
fn checked_file_name(raw: &str) -> ApiResult<String> {
    let name = Path::new(raw.trim())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let has_extension = Path::new(&name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(STRATEGY_EXTENSION));

    if name.starts_with('.') || !has_extension {
        return Err(ApiError::bad_request(format!(
            "Only .{} strategy files are accepted",
            STRATEGY_EXTENSION
        )));
    }
    if is_reserved(&name) {
        return Err(ApiError::bad_request(format!("'{}' is a reserved file name", name)));
    }
    Ok(name)
}

pub async fn upsert_metadata<C>(
    db: &C,
    descriptor: &StrategyDescriptor,
    path: &Path,
) -> Result<UpsertAction, sea_orm::DbErr>
where
    C: ConnectionTrait,
{
    let now = Utc::now().naive_utc();
    let indicators = serde_json::to_string(&descriptor.indicators_used).unwrap_or_else(|_| "[]".to_string());
    let file_path = path.display().to_string();

    let existing = StrategyMetadata::find()
        .filter(strategy_metadata::Column::ScriptName.eq(&descriptor.script_name))
        .one(db)
        .await?;

    match existing {
        Some(model) => {
            let mut active = model.into_active_model();
            active.display_name = Set(descriptor.display_name.clone());
            active.description = Set(descriptor.description.clone());
            active.strategy_type = Set(descriptor.strategy_type.clone());
            active.timeframe = Set(descriptor.timeframe.clone());
            active.indicators_used = Set(Some(indicators));
            active.ai_logic = Set(descriptor.ai_logic.clone());
            active.criteria = Set(descriptor.criteria.clone());
            active.file_path = Set(file_path);
            active.last_scanned = Set(Some(now));
            active.update(db).await?;
            Ok(UpsertAction::Updated)
        }
        None => {
            let active = strategy_metadata::ActiveModel {
                script_name: Set(descriptor.script_name.clone()),
                display_name: Set(descriptor.display_name.clone()),
                description: Set(descriptor.description.clone()),
                strategy_type: Set(descriptor.strategy_type.clone()),
                timeframe: Set(descriptor.timeframe.clone()),
                indicators_used: Set(Some(indicators)),
                ai_logic: Set(descriptor.ai_logic.clone()),
                criteria: Set(descriptor.criteria.clone()),
                file_path: Set(file_path),
                is_active: Set(true),
                last_scanned: Set(Some(now)),
                ..Default::default()
            };
            active.insert(db).await?;
            Ok(UpsertAction::Created)
        }
    }
}

async fn find_watchlist(db: &DatabaseConnection, watchlist_id: i32) -> ApiResult<watchlist::Model> {
    Watchlist::find_by_id(watchlist_id)
        .one(db)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Watchlist {} not found", watchlist_id)))
}

/// Symboles de la watchlist, triés
pub async fn watchlist_symbols<C>(db: &C, watchlist_id: i32) -> Result<Vec<String>, sea_orm::DbErr>
where
    C: ConnectionTrait,
{
    let stocks = Stock::find()
        .inner_join(watchlist::Entity)
        .filter(watchlist::Column::Id.eq(watchlist_id))
        .order_by_asc(stock::Column::Symbol)
        .all(db)
        .await?;
    Ok(stocks.into_iter().map(|s| s.symbol).collect())
}

/// Remplace les résultats du couple (stratégie, watchlist) dans une transaction.
/// Les lignes dont le symbole est inconnu sont ignorées.
async fn save_results_for(
    db: &DatabaseConnection,
    strategy_id: i32,
    watchlist_id: i32,
    run: &StrategyRun,
) -> Result<usize, ApiError> {
    let symbols: Vec<String> = run.rows.iter().map(|r| normalize_symbol(&r.symbol)).collect();

    let txn = db.begin().await?;

    strategy_result::Entity::delete_many()
        .filter(strategy_result::Column::StrategyId.eq(strategy_id))
        .filter(strategy_result::Column::WatchlistId.eq(watchlist_id))
        .exec(&txn)
        .await?;

    let stock_ids: HashMap<String, i32> = Stock::find()
        .filter(stock::Column::Symbol.is_in(symbols.iter().cloned()))
        .all(&txn)
        .await?
        .into_iter()
        .map(|s| (s.symbol, s.id))
        .collect();

    let now = Utc::now().naive_utc();
    let models: Vec<strategy_result::ActiveModel> = run
        .rows
        .iter()
        .zip(&symbols)
        .filter_map(|(row, symbol)| {
            let stock_id = *stock_ids.get(symbol)?;
            Some(strategy_result::ActiveModel {
                strategy_id: Set(strategy_id),
                watchlist_id: Set(watchlist_id),
                stock_id: Set(stock_id),
                matched: Set(row.matched),
                confidence_score: Set(row.confidence),
                trend_score: Set(Some(row.score)),
                reason: Set(Some(row.reason.clone())),
                price: Set(row.price),
                rsi: Set(row.rsi),
                volume_ratio: Set(row.volume_ratio),
                execution_date: Set(now),
                execution_time_ms: Set(Some(run.execution_time_ms)),
                ..Default::default()
            })
        })
        .collect();

    let inserted = models.len();
    if !models.is_empty() {
        StrategyResult::insert_many(models).exec(&txn).await?;
    }

    txn.commit().await?;

    if inserted < run.rows.len() {
        tracing::debug!(
            dropped = run.rows.len() - inserted,
            "result rows without a known stock were dropped"
        );
    }
    Ok(inserted)
}
