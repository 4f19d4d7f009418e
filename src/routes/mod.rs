pub mod health;
pub mod stocks;
pub mod strategies;
pub mod system;
pub mod watchlists;

use actix_web::{error, web, HttpRequest};

use crate::error::ApiError;

/// Erreurs d'extraction (JSON / query / path) -> 400 au format ApiError
fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::bad_request(format!("Invalid JSON body: {}", err)).into()
}

fn query_error(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::bad_request(format!("Invalid query string: {}", err)).into()
}

fn path_error(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::bad_request(format!("Invalid path parameter: {}", err)).into()
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .service(system::root)
        .service(health::health_check)
        .service(
            web::scope("/api")
                .service(system::stats)
                .configure(stocks::stocks_routes)
                .configure(watchlists::watchlists_routes)
                .configure(strategies::strategies_routes),
        );
}
