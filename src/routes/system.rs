use actix_web::{get, web, HttpResponse};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};

use crate::error::ApiResult;
use crate::models::dto::{EntityCounts, ResultCounts, SystemStats};
use crate::models::{stock, strategy_metadata, strategy_result, watchlist};

/// GET / : infos du service
#[get("/")]
pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "stats": "/api/stats",
            "stocks": "/api/stocks",
            "watchlists": "/api/watchlists",
            "strategies": "/api/strategies",
        }
    }))
}

/// GET /api/stats
#[get("/stats")]
pub async fn stats(db: web::Data<DatabaseConnection>) -> ApiResult<HttpResponse> {
    let db = db.get_ref();

    let stocks = EntityCounts {
        total: stock::Entity::find().count(db).await?,
        active: Some(
            stock::Entity::find()
                .filter(stock::Column::IsActive.eq(true))
                .count(db)
                .await?,
        ),
    };
    let watchlists = EntityCounts {
        total: watchlist::Entity::find().count(db).await?,
        active: None,
    };
    let strategies = EntityCounts {
        total: strategy_metadata::Entity::find().count(db).await?,
        active: Some(
            strategy_metadata::Entity::find()
                .filter(strategy_metadata::Column::IsActive.eq(true))
                .count(db)
                .await?,
        ),
    };
    let analysis_history = ResultCounts {
        total_executions: strategy_result::Entity::find().count(db).await?,
        total_matches: strategy_result::Entity::find()
            .filter(strategy_result::Column::Matched.eq(true))
            .count(db)
            .await?,
    };

    Ok(HttpResponse::Ok().json(SystemStats {
        stocks,
        watchlists,
        strategies,
        analysis_history,
    }))
}
