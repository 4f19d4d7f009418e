use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::models::dto::{
    AddStocksByIdRequest, AddStocksBySymbolRequest, CreateWatchlistRequest, UpdateWatchlistRequest,
    WatchlistResponse, WatchlistStocksAdded, WatchlistStocksResponse,
};
use crate::models::stock::{self, normalize_symbol, Entity as Stock};
use crate::models::watchlist::{self, Entity as Watchlist};
use crate::models::{strategy_result, watchlist_stock};

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_stocks: bool,
}

#[derive(Deserialize)]
pub struct DetailQuery {
    #[serde(default = "default_include_stocks")]
    pub include_stocks: bool,
}

fn default_include_stocks() -> bool {
    true
}

async fn find_watchlist(db: &DatabaseConnection, watchlist_id: i32) -> ApiResult<watchlist::Model> {
    Watchlist::find_by_id(watchlist_id)
        .one(db)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Watchlist {} not found", watchlist_id)))
}

async fn name_taken(db: &DatabaseConnection, name: &str, except_id: Option<i32>) -> ApiResult<bool> {
    let mut select = Watchlist::find().filter(watchlist::Column::Name.eq(name));
    if let Some(id) = except_id {
        select = select.filter(watchlist::Column::Id.ne(id));
    }
    Ok(select.one(db).await?.is_some())
}

async fn stocks_of(db: &DatabaseConnection, watchlist: &watchlist::Model) -> ApiResult<Vec<stock::Model>> {
    Ok(watchlist
        .find_related(Stock)
        .order_by_asc(stock::Column::Symbol)
        .all(db)
        .await?)
}

async fn member_count<C: ConnectionTrait>(db: &C, watchlist_id: i32) -> ApiResult<u64> {
    Ok(watchlist_stock::Entity::find()
        .filter(watchlist_stock::Column::WatchlistId.eq(watchlist_id))
        .count(db)
        .await?)
}

/// Classement par entrée de la requête, dans l'ordre : chaque entrée atterrit
/// dans exactement un bucket. `None` = stock inconnu (ou entrée vide).
/// Renvoie (ajoutés, ignorés, introuvables).
async fn add_members<C: ConnectionTrait, K>(
    db: &C,
    watchlist_id: i32,
    entries: Vec<(K, Option<stock::Model>)>,
) -> ApiResult<(Vec<String>, Vec<String>, Vec<K>)> {
    let mut members: HashSet<i32> = watchlist_stock::Entity::find()
        .filter(watchlist_stock::Column::WatchlistId.eq(watchlist_id))
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.stock_id)
        .collect();

    let now = Utc::now().naive_utc();
    let mut added = Vec::new();
    let mut skipped = Vec::new();
    let mut not_found = Vec::new();

    for (key, stock) in entries {
        let Some(stock) = stock else {
            not_found.push(key);
            continue;
        };
        // déjà membre, ou déjà ajouté plus haut dans la même requête
        if !members.insert(stock.id) {
            skipped.push(stock.symbol);
            continue;
        }
        let membership = watchlist_stock::ActiveModel {
            watchlist_id: Set(watchlist_id),
            stock_id: Set(stock.id),
            added_date: Set(now),
        };
        watchlist_stock::Entity::insert(membership)
            .exec_without_returning(db)
            .await?;
        added.push(stock.symbol);
    }

    Ok((added, skipped, not_found))
}

async fn touch<C: ConnectionTrait>(db: &C, watchlist: watchlist::Model) -> ApiResult<()> {
    let mut active = watchlist.into_active_model();
    active.updated_date = Set(Utc::now().naive_utc());
    active.update(db).await?;
    Ok(())
}

/// GET /api/watchlists?include_stocks=false
#[get("")]
pub async fn list_watchlists(
    db: web::Data<DatabaseConnection>,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    let watchlists = Watchlist::find()
        .order_by_asc(watchlist::Column::Name)
        .all(db.get_ref())
        .await?;

    let mut response = Vec::with_capacity(watchlists.len());
    for watchlist in watchlists {
        let stocks = stocks_of(db.get_ref(), &watchlist).await?;
        response.push(WatchlistResponse::new(watchlist, stocks, query.include_stocks));
    }

    Ok(HttpResponse::Ok().json(response))
}

/// GET /api/watchlists/name/{name}
#[get("/name/{name}")]
pub async fn get_watchlist_by_name(
    db: web::Data<DatabaseConnection>,
    path: web::Path<String>,
    query: web::Query<DetailQuery>,
) -> ApiResult<HttpResponse> {
    let name = path.into_inner();
    let watchlist = Watchlist::find()
        .filter(watchlist::Column::Name.eq(&name))
        .one(db.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Watchlist '{}' not found", name)))?;

    let stocks = stocks_of(db.get_ref(), &watchlist).await?;
    Ok(HttpResponse::Ok().json(WatchlistResponse::new(watchlist, stocks, query.include_stocks)))
}

/// GET /api/watchlists/{id}
#[get("/{watchlist_id}")]
pub async fn get_watchlist(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    query: web::Query<DetailQuery>,
) -> ApiResult<HttpResponse> {
    let watchlist = find_watchlist(db.get_ref(), path.into_inner()).await?;
    let stocks = stocks_of(db.get_ref(), &watchlist).await?;
    Ok(HttpResponse::Ok().json(WatchlistResponse::new(watchlist, stocks, query.include_stocks)))
}

/// POST /api/watchlists
#[post("")]
pub async fn create_watchlist(
    db: web::Data<DatabaseConnection>,
    body: web::Json<CreateWatchlistRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let request = body.into_inner();
    let name = request.name.trim().to_string();

    if name.is_empty() {
        return Err(ApiError::bad_request("Watchlist name must not be blank"));
    }
    if name_taken(db.get_ref(), &name, None).await? {
        return Err(ApiError::conflict(format!("Watchlist '{}' already exists", name)));
    }

    let now = Utc::now().naive_utc();
    let watchlist = watchlist::ActiveModel {
        name: Set(name),
        description: Set(request.description),
        created_date: Set(now),
        updated_date: Set(now),
        ..Default::default()
    }
    .insert(db.get_ref())
    .await?;

    tracing::info!(watchlist = %watchlist.name, "watchlist created");
    Ok(HttpResponse::Created().json(WatchlistResponse::new(watchlist, Vec::new(), true)))
}

/// PUT /api/watchlists/{id}
#[put("/{watchlist_id}")]
pub async fn update_watchlist(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    body: web::Json<UpdateWatchlistRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let request = body.into_inner();
    let watchlist = find_watchlist(db.get_ref(), path.into_inner()).await?;
    let watchlist_id = watchlist.id;

    let mut active = watchlist.into_active_model();
    if let Some(name) = request.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::bad_request("Watchlist name must not be blank"));
        }
        if name_taken(db.get_ref(), &name, Some(watchlist_id)).await? {
            return Err(ApiError::conflict(format!("Watchlist '{}' already exists", name)));
        }
        active.name = Set(name);
    }
    if let Some(description) = request.description {
        active.description = Set(Some(description));
    }
    active.updated_date = Set(Utc::now().naive_utc());

    let watchlist = active.update(db.get_ref()).await?;
    let stocks = stocks_of(db.get_ref(), &watchlist).await?;
    Ok(HttpResponse::Ok().json(WatchlistResponse::new(watchlist, stocks, true)))
}

/// DELETE /api/watchlists/{id}
/// Les stocks restent, seuls les liens et les résultats disparaissent
#[delete("/{watchlist_id}")]
pub async fn delete_watchlist(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> ApiResult<HttpResponse> {
    let watchlist = find_watchlist(db.get_ref(), path.into_inner()).await?;

    let txn = db.begin().await?;
    watchlist_stock::Entity::delete_many()
        .filter(watchlist_stock::Column::WatchlistId.eq(watchlist.id))
        .exec(&txn)
        .await?;
    strategy_result::Entity::delete_many()
        .filter(strategy_result::Column::WatchlistId.eq(watchlist.id))
        .exec(&txn)
        .await?;
    Watchlist::delete_by_id(watchlist.id).exec(&txn).await?;
    txn.commit().await?;

    tracing::info!(watchlist = %watchlist.name, "watchlist deleted");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Watchlist '{}' deleted", watchlist.name)
    })))
}

/// POST /api/watchlists/{id}/stocks
#[post("/{watchlist_id}/stocks")]
pub async fn add_stocks_by_id(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    body: web::Json<AddStocksByIdRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let watchlist = find_watchlist(db.get_ref(), path.into_inner()).await?;
    let requested = body.into_inner().stock_ids;

    let txn = db.begin().await?;

    let found: HashMap<i32, stock::Model> = Stock::find()
        .filter(stock::Column::Id.is_in(requested.iter().copied()))
        .all(&txn)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();
    let entries = requested
        .into_iter()
        .map(|id| (id, found.get(&id).cloned()))
        .collect();

    let (added, skipped, not_found) = add_members(&txn, watchlist.id, entries).await?;
    let total_stocks = member_count(&txn, watchlist.id).await?;
    let name = watchlist.name.clone();
    touch(&txn, watchlist).await?;

    txn.commit().await?;

    Ok(HttpResponse::Ok().json(WatchlistStocksAdded {
        watchlist: name,
        added,
        skipped,
        not_found,
        total_stocks,
    }))
}

/// POST /api/watchlists/{id}/stocks/by-symbol
#[post("/{watchlist_id}/stocks/by-symbol")]
pub async fn add_stocks_by_symbol(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    body: web::Json<AddStocksBySymbolRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let watchlist = find_watchlist(db.get_ref(), path.into_inner()).await?;
    let requested: Vec<String> = body
        .into_inner()
        .symbols
        .iter()
        .map(|s| normalize_symbol(s))
        .collect();

    let txn = db.begin().await?;

    let found: HashMap<String, stock::Model> = Stock::find()
        .filter(stock::Column::Symbol.is_in(requested.iter().filter(|s| !s.is_empty()).cloned()))
        .all(&txn)
        .await?
        .into_iter()
        .map(|s| (s.symbol.clone(), s))
        .collect();
    let entries = requested
        .into_iter()
        .map(|symbol| {
            let stock = found.get(&symbol).cloned();
            (symbol, stock)
        })
        .collect();

    let (added, skipped, not_found) = add_members(&txn, watchlist.id, entries).await?;
    let total_stocks = member_count(&txn, watchlist.id).await?;
    let name = watchlist.name.clone();
    touch(&txn, watchlist).await?;

    txn.commit().await?;

    Ok(HttpResponse::Ok().json(WatchlistStocksAdded {
        watchlist: name,
        added,
        skipped,
        not_found,
        total_stocks,
    }))
}

/// GET /api/watchlists/{id}/stocks
#[get("/{watchlist_id}/stocks")]
pub async fn list_watchlist_stocks(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> ApiResult<HttpResponse> {
    let watchlist = find_watchlist(db.get_ref(), path.into_inner()).await?;
    let stocks = stocks_of(db.get_ref(), &watchlist).await?;
    let symbols = stocks.iter().map(|s| s.symbol.clone()).collect();

    Ok(HttpResponse::Ok().json(WatchlistStocksResponse {
        watchlist: watchlist.name,
        total: stocks.len(),
        stocks,
        symbols,
    }))
}

/// DELETE /api/watchlists/{id}/stocks/{stock_id}
#[delete("/{watchlist_id}/stocks/{stock_id}")]
pub async fn remove_stock(
    db: web::Data<DatabaseConnection>,
    path: web::Path<(i32, i32)>,
) -> ApiResult<HttpResponse> {
    let (watchlist_id, stock_id) = path.into_inner();
    let watchlist = find_watchlist(db.get_ref(), watchlist_id).await?;

    let txn = db.begin().await?;
    let removed = watchlist_stock::Entity::delete_many()
        .filter(watchlist_stock::Column::WatchlistId.eq(watchlist.id))
        .filter(watchlist_stock::Column::StockId.eq(stock_id))
        .exec(&txn)
        .await?;

    if removed.rows_affected == 0 {
        txn.rollback().await?;
        return Err(ApiError::not_found(format!(
            "Stock {} is not in watchlist '{}'",
            stock_id, watchlist.name
        )));
    }

    let name = watchlist.name.clone();
    touch(&txn, watchlist).await?;
    txn.commit().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Stock {} removed from watchlist '{}'", stock_id, name)
    })))
}

#[derive(Serialize)]
struct ClearedResponse {
    message: String,
    removed: u64,
}

/// DELETE /api/watchlists/{id}/stocks
#[delete("/{watchlist_id}/stocks")]
pub async fn clear_watchlist(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> ApiResult<HttpResponse> {
    let watchlist = find_watchlist(db.get_ref(), path.into_inner()).await?;

    let txn = db.begin().await?;
    let removed = watchlist_stock::Entity::delete_many()
        .filter(watchlist_stock::Column::WatchlistId.eq(watchlist.id))
        .exec(&txn)
        .await?;
    let name = watchlist.name.clone();
    touch(&txn, watchlist).await?;
    txn.commit().await?;

    Ok(HttpResponse::Ok().json(ClearedResponse {
        message: format!("All stocks removed from watchlist '{}'", name),
        removed: removed.rows_affected,
    }))
}

pub fn watchlists_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/watchlists")
            .service(list_watchlists)
            .service(get_watchlist_by_name)
            .service(create_watchlist)
            .service(get_watchlist)
            .service(update_watchlist)
            .service(delete_watchlist)
            .service(add_stocks_by_symbol)
            .service(add_stocks_by_id)
            .service(list_watchlist_stocks)
            .service(clear_watchlist)
            .service(remove_stock),
    );
}
