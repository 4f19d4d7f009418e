use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{delete, get, post, put, web, HttpResponse};
use futures::{StreamExt, TryStreamExt};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::models::dto::{
    ExecuteMultipleRequest, ExecuteStrategyRequest, StrategyResponse, StrategyResultResponse,
    UploadResponse,
};
use crate::models::strategy_metadata::{self, Entity as StrategyMetadata};
use crate::models::strategy_result::{self, Entity as StrategyResult};
use crate::models::{stock, watchlist};
use crate::services::strategy_service::{StrategyService, UpsertAction};

// au-delà, l'upload est refusé
const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

#[derive(Deserialize)]
pub struct StrategyListQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Deserialize)]
pub struct DeleteStrategyQuery {
    #[serde(default)]
    pub delete_file: bool,
}

#[derive(Deserialize)]
pub struct LatestResultsQuery {
    pub strategy_id: Option<i32>,
    pub watchlist_id: Option<i32>,
    #[serde(default)]
    pub matched_only: bool,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    50
}

#[derive(Deserialize)]
pub struct ClearResultsQuery {
    pub strategy_id: Option<i32>,
    pub watchlist_id: Option<i32>,
}

async fn find_strategy(db: &DatabaseConnection, strategy_id: i32) -> ApiResult<strategy_metadata::Model> {
    StrategyMetadata::find_by_id(strategy_id)
        .one(db)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Strategy {} not found", strategy_id)))
}

/// GET /api/strategies?active_only=false
#[get("")]
pub async fn list_strategies(
    db: web::Data<DatabaseConnection>,
    query: web::Query<StrategyListQuery>,
) -> ApiResult<HttpResponse> {
    let mut select = StrategyMetadata::find();
    if query.active_only {
        select = select.filter(strategy_metadata::Column::IsActive.eq(true));
    }

    let strategies: Vec<StrategyResponse> = select
        .order_by_asc(strategy_metadata::Column::DisplayName)
        .all(db.get_ref())
        .await?
        .into_iter()
        .map(StrategyResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(strategies))
}

/// GET /api/strategies/{id}
#[get("/{strategy_id}")]
pub async fn get_strategy(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> ApiResult<HttpResponse> {
    let strategy = find_strategy(db.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(StrategyResponse::from(strategy)))
}

/// POST /api/strategies/scan
#[post("/scan")]
pub async fn scan_strategies(
    db: web::Data<DatabaseConnection>,
    service: web::Data<StrategyService>,
) -> ApiResult<HttpResponse> {
    let report = service.scan(db.get_ref()).await?;
    Ok(HttpResponse::Ok().json(report))
}

/// POST /api/strategies/upload (multipart, champ "file")
#[post("/upload")]
pub async fn upload_strategy(
    db: web::Data<DatabaseConnection>,
    service: web::Data<StrategyService>,
    mut payload: Multipart,
) -> ApiResult<HttpResponse> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(mut field) = payload.try_next().await? {
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let Some(file_name) = file_name else {
            // champ texte : ignoré
            while field.next().await.is_some() {}
            continue;
        };

        let mut contents = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if contents.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(ApiError::bad_request("Strategy file is too large"));
            }
            contents.extend_from_slice(&chunk);
        }
        upload = Some((file_name, contents));
        break;
    }

    let (file_name, contents) =
        upload.ok_or_else(|| ApiError::bad_request("No file provided in multipart payload"))?;

    let (strategy, action) = service.install_file(db.get_ref(), &file_name, &contents).await?;

    let message = match action {
        UpsertAction::Created => format!("Strategy '{}' uploaded", strategy.display_name),
        UpsertAction::Updated => format!("Strategy '{}' updated", strategy.display_name),
    };

    Ok(HttpResponse::Ok().json(UploadResponse {
        message,
        strategy: StrategyResponse::from(strategy),
        action,
    }))
}

/// GET /api/strategies/download/{id}
#[get("/download/{strategy_id}")]
pub async fn download_strategy(
    db: web::Data<DatabaseConnection>,
    service: web::Data<StrategyService>,
    path: web::Path<i32>,
) -> ApiResult<HttpResponse> {
    let strategy = find_strategy(db.get_ref(), path.into_inner()).await?;
    let file_path = service.strategy_path(&strategy);

    let contents = match std::fs::read(&file_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found(format!(
                "Strategy file '{}' not found",
                strategy.script_name
            )));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(strategy.script_name)],
        })
        .body(contents))
}

/// POST /api/strategies/execute
#[post("/execute")]
pub async fn execute_strategy(
    db: web::Data<DatabaseConnection>,
    service: web::Data<StrategyService>,
    body: web::Json<ExecuteStrategyRequest>,
) -> ApiResult<HttpResponse> {
    let request = body.into_inner();
    let result = service
        .execute(db.get_ref(), request.watchlist_id, request.strategy_id, request.save_results)
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

/// POST /api/strategies/execute-multiple
#[post("/execute-multiple")]
pub async fn execute_multiple_strategies(
    db: web::Data<DatabaseConnection>,
    service: web::Data<StrategyService>,
    body: web::Json<ExecuteMultipleRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let request = body.into_inner();
    let result = service
        .execute_multiple(db.get_ref(), request.watchlist_id, &request.strategy_ids, request.save_results)
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

/// GET /api/strategies/results/latest
#[get("/results/latest")]
pub async fn latest_results(
    db: web::Data<DatabaseConnection>,
    query: web::Query<LatestResultsQuery>,
) -> ApiResult<HttpResponse> {
    let mut select = StrategyResult::find();
    if let Some(strategy_id) = query.strategy_id {
        select = select.filter(strategy_result::Column::StrategyId.eq(strategy_id));
    }
    if let Some(watchlist_id) = query.watchlist_id {
        select = select.filter(strategy_result::Column::WatchlistId.eq(watchlist_id));
    }
    if query.matched_only {
        select = select.filter(strategy_result::Column::Matched.eq(true));
    }

    let results = select
        .order_by_desc(strategy_result::Column::ExecutionDate)
        .order_by_desc(strategy_result::Column::Id)
        .limit(query.limit)
        .all(db.get_ref())
        .await?;

    // noms résolus en 3 requêtes, pas une par ligne
    let strategy_ids: HashSet<i32> = results.iter().map(|r| r.strategy_id).collect();
    let watchlist_ids: HashSet<i32> = results.iter().map(|r| r.watchlist_id).collect();
    let stock_ids: HashSet<i32> = results.iter().map(|r| r.stock_id).collect();

    let strategy_names: HashMap<i32, String> = StrategyMetadata::find()
        .filter(strategy_metadata::Column::Id.is_in(strategy_ids))
        .all(db.get_ref())
        .await?
        .into_iter()
        .map(|s| (s.id, s.display_name))
        .collect();
    let watchlist_names: HashMap<i32, String> = watchlist::Entity::find()
        .filter(watchlist::Column::Id.is_in(watchlist_ids))
        .all(db.get_ref())
        .await?
        .into_iter()
        .map(|w| (w.id, w.name))
        .collect();
    let stock_symbols: HashMap<i32, String> = stock::Entity::find()
        .filter(stock::Column::Id.is_in(stock_ids))
        .all(db.get_ref())
        .await?
        .into_iter()
        .map(|s| (s.id, s.symbol))
        .collect();

    let response: Vec<StrategyResultResponse> = results
        .into_iter()
        .map(|r| StrategyResultResponse {
            id: r.id,
            strategy: strategy_names.get(&r.strategy_id).cloned(),
            watchlist: watchlist_names.get(&r.watchlist_id).cloned(),
            stock: stock_symbols.get(&r.stock_id).cloned(),
            matched: r.matched,
            confidence_score: r.confidence_score,
            trend_score: r.trend_score,
            reason: r.reason,
            price: r.price,
            rsi: r.rsi,
            volume_ratio: r.volume_ratio,
            execution_date: r.execution_date,
            execution_time_ms: r.execution_time_ms,
        })
        .collect();

    Ok(HttpResponse::Ok().json(response))
}

/// DELETE /api/strategies/results?strategy_id=&watchlist_id=
#[delete("/results")]
pub async fn clear_results(
    db: web::Data<DatabaseConnection>,
    query: web::Query<ClearResultsQuery>,
) -> ApiResult<HttpResponse> {
    let mut delete = StrategyResult::delete_many();
    if let Some(strategy_id) = query.strategy_id {
        delete = delete.filter(strategy_result::Column::StrategyId.eq(strategy_id));
    }
    if let Some(watchlist_id) = query.watchlist_id {
        delete = delete.filter(strategy_result::Column::WatchlistId.eq(watchlist_id));
    }

    let deleted = delete.exec(db.get_ref()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Deleted {} results", deleted.rows_affected),
        "deleted": deleted.rows_affected,
    })))
}

/// DELETE /api/strategies/{id}?delete_file=false
#[delete("/{strategy_id}")]
pub async fn delete_strategy(
    db: web::Data<DatabaseConnection>,
    service: web::Data<StrategyService>,
    path: web::Path<i32>,
    query: web::Query<DeleteStrategyQuery>,
) -> ApiResult<HttpResponse> {
    let strategy = find_strategy(db.get_ref(), path.into_inner()).await?;
    let file_path = service.strategy_path(&strategy);

    let txn = db.begin().await?;
    StrategyResult::delete_many()
        .filter(strategy_result::Column::StrategyId.eq(strategy.id))
        .exec(&txn)
        .await?;
    StrategyMetadata::delete_by_id(strategy.id).exec(&txn).await?;
    txn.commit().await?;

    let mut file_deleted = false;
    if query.delete_file {
        match std::fs::remove_file(&file_path) {
            Ok(()) => file_deleted = true,
            Err(e) => tracing::warn!(file = %file_path.display(), error = %e, "could not delete strategy file"),
        }
    }

    tracing::info!(strategy = %strategy.display_name, file_deleted, "strategy deleted");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Strategy '{}' deleted", strategy.display_name),
        "file_deleted": file_deleted,
    })))
}

/// PUT /api/strategies/{id}/toggle
#[put("/{strategy_id}/toggle")]
pub async fn toggle_strategy(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> ApiResult<HttpResponse> {
    let strategy = find_strategy(db.get_ref(), path.into_inner()).await?;
    let is_active = !strategy.is_active;

    let mut active = strategy.into_active_model();
    active.is_active = Set(is_active);
    let strategy = active.update(db.get_ref()).await?;

    Ok(HttpResponse::Ok().json(StrategyResponse::from(strategy)))
}

// /results avant /{strategy_id}
pub fn strategies_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/strategies")
            .service(list_strategies)
            .service(scan_strategies)
            .service(upload_strategy)
            .service(download_strategy)
            .service(execute_strategy)
            .service(execute_multiple_strategies)
            .service(latest_results)
            .service(clear_results)
            .service(get_strategy)
            .service(delete_strategy)
            .service(toggle_strategy),
    );
}
