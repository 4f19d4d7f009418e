use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::HashSet;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::models::dto::{
    BulkStocksRequest, BulkStocksResponse, CreateStockRequest, StockCounts, UpdateStockRequest,
};
use crate::models::stock::{self, normalize_symbol, Entity as Stock};
use crate::models::{strategy_result, watchlist_stock};

#[derive(Deserialize)]
pub struct StockListQuery {
    #[serde(default = "default_active_only")]
    pub active_only: bool,
}

fn default_active_only() -> bool {
    true
}

async fn find_by_symbol(db: &DatabaseConnection, symbol: &str) -> ApiResult<Option<stock::Model>> {
    Ok(Stock::find()
        .filter(stock::Column::Symbol.eq(normalize_symbol(symbol)))
        .one(db)
        .await?)
}

async fn find_stock(db: &DatabaseConnection, stock_id: i32) -> ApiResult<stock::Model> {
    Stock::find_by_id(stock_id)
        .one(db)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Stock {} not found", stock_id)))
}

/// Supprime le stock et ses lignes dépendantes (membership + résultats)
async fn delete_stock_cascade(db: &DatabaseConnection, stock_id: i32) -> ApiResult<()> {
    let txn = db.begin().await?;

    watchlist_stock::Entity::delete_many()
        .filter(watchlist_stock::Column::StockId.eq(stock_id))
        .exec(&txn)
        .await?;
    strategy_result::Entity::delete_many()
        .filter(strategy_result::Column::StockId.eq(stock_id))
        .exec(&txn)
        .await?;
    Stock::delete_by_id(stock_id).exec(&txn).await?;

    txn.commit().await?;
    Ok(())
}

/// GET /api/stocks?active_only=true
#[get("")]
pub async fn list_stocks(
    db: web::Data<DatabaseConnection>,
    query: web::Query<StockListQuery>,
) -> ApiResult<HttpResponse> {
    let mut select = Stock::find();
    if query.active_only {
        select = select.filter(stock::Column::IsActive.eq(true));
    }

    let stocks = select
        .order_by_asc(stock::Column::Symbol)
        .all(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(stocks))
}

/// GET /api/stocks/count/total
#[get("/count/total")]
pub async fn count_stocks(db: web::Data<DatabaseConnection>) -> ApiResult<HttpResponse> {
    let total = Stock::find().count(db.get_ref()).await?;
    let active = Stock::find()
        .filter(stock::Column::IsActive.eq(true))
        .count(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(StockCounts {
        total,
        active,
        inactive: total - active,
    }))
}

/// GET /api/stocks/symbol/{symbol} (insensible à la casse)
#[get("/symbol/{symbol}")]
pub async fn get_stock_by_symbol(
    db: web::Data<DatabaseConnection>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let symbol = path.into_inner();
    let stock = find_by_symbol(db.get_ref(), &symbol)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Stock '{}' not found", symbol)))?;

    Ok(HttpResponse::Ok().json(stock))
}

/// GET /api/stocks/{id}
#[get("/{stock_id}")]
pub async fn get_stock(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> ApiResult<HttpResponse> {
    let stock = find_stock(db.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(stock))
}

/// POST /api/stocks
#[post("")]
pub async fn create_stock(
    db: web::Data<DatabaseConnection>,
    body: web::Json<CreateStockRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let request = body.into_inner();

    let symbol = normalize_symbol(&request.symbol);
    if symbol.is_empty() {
        return Err(ApiError::bad_request("Symbol must not be blank"));
    }
    if find_by_symbol(db.get_ref(), &symbol).await?.is_some() {
        return Err(ApiError::conflict(format!("Stock '{}' already exists", symbol)));
    }

    let stock = stock::ActiveModel {
        symbol: Set(symbol),
        name: Set(request.name),
        exchange: Set(request.exchange),
        sector: Set(request.sector),
        added_date: Set(Utc::now().naive_utc()),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db.get_ref())
    .await?;

    tracing::info!(symbol = %stock.symbol, "stock created");
    Ok(HttpResponse::Created().json(stock))
}

/// POST /api/stocks/bulk
/// Chaque symbole atterrit dans exactement un des deux buckets
#[post("/bulk")]
pub async fn create_stocks_bulk(
    db: web::Data<DatabaseConnection>,
    body: web::Json<BulkStocksRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let request = body.into_inner();

    let mut added = Vec::new();
    let mut skipped = Vec::new();
    let mut seen = HashSet::new();
    let now = Utc::now().naive_utc();

    let txn = db.begin().await?;

    for raw in request.stocks {
        let symbol = normalize_symbol(&raw);
        if symbol.is_empty() || !seen.insert(symbol.clone()) {
            skipped.push(symbol);
            continue;
        }

        let exists = Stock::find()
            .filter(stock::Column::Symbol.eq(&symbol))
            .one(&txn)
            .await?
            .is_some();
        if exists {
            skipped.push(symbol);
            continue;
        }

        stock::ActiveModel {
            symbol: Set(symbol.clone()),
            exchange: Set(request.exchange.clone()),
            added_date: Set(now),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        added.push(symbol);
    }

    txn.commit().await?;

    tracing::info!(added = added.len(), skipped = skipped.len(), "bulk stock import");
    Ok(HttpResponse::Created().json(BulkStocksResponse {
        total_added: added.len(),
        total_skipped: skipped.len(),
        added,
        skipped,
    }))
}

/// PUT /api/stocks/{id}
#[put("/{stock_id}")]
pub async fn update_stock(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    body: web::Json<UpdateStockRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let request = body.into_inner();

    let mut stock = find_stock(db.get_ref(), path.into_inner()).await?.into_active_model();
    if let Some(name) = request.name {
        stock.name = Set(Some(name));
    }
    if let Some(exchange) = request.exchange {
        stock.exchange = Set(exchange);
    }
    if let Some(sector) = request.sector {
        stock.sector = Set(Some(sector));
    }
    if let Some(is_active) = request.is_active {
        stock.is_active = Set(is_active);
    }

    let stock = stock.update(db.get_ref()).await?;
    Ok(HttpResponse::Ok().json(stock))
}

/// DELETE /api/stocks/symbol/{symbol}
#[delete("/symbol/{symbol}")]
pub async fn delete_stock_by_symbol(
    db: web::Data<DatabaseConnection>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let symbol = path.into_inner();
    let stock = find_by_symbol(db.get_ref(), &symbol)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Stock '{}' not found", symbol)))?;

    delete_stock_cascade(db.get_ref(), stock.id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Stock '{}' deleted", stock.symbol)
    })))
}

/// DELETE /api/stocks/{id}
#[delete("/{stock_id}")]
pub async fn delete_stock(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> ApiResult<HttpResponse> {
    let stock = find_stock(db.get_ref(), path.into_inner()).await?;

    delete_stock_cascade(db.get_ref(), stock.id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Stock '{}' deleted", stock.symbol)
    })))
}

// les chemins fixes avant /{stock_id}
pub fn stocks_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/stocks")
            .service(list_stocks)
            .service(count_stocks)
            .service(get_stock_by_symbol)
            .service(create_stock)
            .service(create_stocks_bulk)
            .service(delete_stock_by_symbol)
            .service(get_stock)
            .service(update_stock)
            .service(delete_stock),
    );
}
