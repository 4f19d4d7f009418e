use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::{Logger, NormalizePath};
use actix_web::{web, App, HttpServer};
use tracing_subscriber::EnvFilter;

use swing_backend::config::AppConfig;
use swing_backend::services::market_data::ScreenerClient;
use swing_backend::services::strategies::{StrategyContext, StrategyRegistry};
use swing_backend::services::strategy_service::StrategyService;
use swing_backend::{db, routes};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().map_err(std::io::Error::other)?;

    tracing::info!(url = %config.database_url, "connecting to database");
    let db = db::establish_connection(&config.database_url)
        .await
        .map_err(std::io::Error::other)?;
    tracing::info!("database connected");

    let market_data = ScreenerClient::new(config.market_data.clone()).map_err(std::io::Error::other)?;
    let registry = StrategyRegistry::with_defaults().map_err(std::io::Error::other)?;
    tracing::info!(kinds = ?registry.kinds(), "strategy kinds registered");

    let service = StrategyService::new(
        registry,
        StrategyContext::new(Arc::new(market_data)),
        config.strategies_dir.clone(),
    );

    // scan de démarrage : une erreur ici ne bloque pas le serveur
    match service.scan(&db).await {
        Ok(report) => tracing::info!(
            dir = %config.strategies_dir.display(),
            added = report.added,
            updated = report.updated,
            errors = report.errors.len(),
            "startup strategy scan"
        ),
        Err(e) => tracing::error!(error = %e, "startup strategy scan failed"),
    }

    let service = web::Data::new(service);
    let db = web::Data::new(db);

    tracing::info!(host = %config.host, port = config.port, "starting server");

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .wrap(NormalizePath::trim())
            .app_data(db.clone())
            .app_data(service.clone())
            .configure(routes::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
