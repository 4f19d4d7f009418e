use std::path::PathBuf;
use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use async_trait::async_trait;
use polars::prelude::*;
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};
use serde_json::{json, Value};
use uuid::Uuid;

use swing_backend::db;
use swing_backend::models::{stock, strategy_result, watchlist_stock};
use swing_backend::routes;
use swing_backend::services::market_data::{Quote, StaticMarketData};
use swing_backend::services::strategies::{
    Strategy, StrategyContext, StrategyDefinition, StrategyDescriptor, StrategyError, StrategyRegistry,
};
use swing_backend::services::strategy_service::StrategyService;

// ========== STRATÉGIES DE TEST ==========

/// Renvoie une table sans les colonnes score / confidence / reason
struct MissingColumns(StrategyDescriptor);

#[async_trait]
impl Strategy for MissingColumns {
    fn descriptor(&self) -> &StrategyDescriptor {
        &self.0
    }

    async fn analyze(&self, symbols: &[String]) -> Result<DataFrame, StrategyError> {
        let symbols: Vec<&str> = symbols.iter().map(String::as_str).collect();
        let matched = vec![true; symbols.len()];
        Ok(DataFrame::new(vec![
            Column::Series(Series::new("symbol".into(), symbols)),
            Column::Series(Series::new("matched".into(), matched)),
        ])?)
    }
}

struct AlwaysFails(StrategyDescriptor);

#[async_trait]
impl Strategy for AlwaysFails {
    fn descriptor(&self) -> &StrategyDescriptor {
        &self.0
    }

    async fn analyze(&self, _symbols: &[String]) -> Result<DataFrame, StrategyError> {
        Err(StrategyError::Table(PolarsError::ComputeError("screener exploded".into())))
    }
}

/// Table complète. `extra` est ajouté après les symboles demandés,
/// `repeat` réémet chaque symbole une seconde fois (non matché).
struct Echo {
    descriptor: StrategyDescriptor,
    extra: Option<&'static str>,
    repeat: bool,
}

#[async_trait]
impl Strategy for Echo {
    fn descriptor(&self) -> &StrategyDescriptor {
        &self.descriptor
    }

    async fn analyze(&self, symbols: &[String]) -> Result<DataFrame, StrategyError> {
        let mut rows: Vec<(&str, bool)> = symbols.iter().map(|s| (s.as_str(), true)).collect();
        if self.repeat {
            rows.extend(symbols.iter().map(|s| (s.as_str(), false)));
        }
        if let Some(extra) = self.extra {
            rows.push((extra, true));
        }

        let names: Vec<&str> = rows.iter().map(|(s, _)| *s).collect();
        let matched: Vec<bool> = rows.iter().map(|(_, m)| *m).collect();
        let scores: Vec<f64> = matched.iter().map(|m| if *m { 80.0 } else { 10.0 }).collect();
        let reasons: Vec<&str> = matched.iter().map(|m| if *m { "first" } else { "second" }).collect();
        Ok(DataFrame::new(vec![
            Column::Series(Series::new("symbol".into(), names)),
            Column::Series(Series::new("matched".into(), matched)),
            Column::Series(Series::new("score".into(), scores.clone())),
            Column::Series(Series::new("confidence".into(), scores)),
            Column::Series(Series::new("reason".into(), reasons)),
        ])?)
    }
}

fn unknown_symbol_factory(
    definition: &StrategyDefinition,
    _context: &StrategyContext,
) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(Echo {
        descriptor: definition.file_descriptor(),
        extra: Some("GHOST.NS"),
        repeat: false,
    }))
}

fn repeated_symbol_factory(
    definition: &StrategyDefinition,
    _context: &StrategyContext,
) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(Echo {
        descriptor: definition.file_descriptor(),
        extra: None,
        repeat: true,
    }))
}

fn missing_columns_factory(
    definition: &StrategyDefinition,
    _context: &StrategyContext,
) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(MissingColumns(definition.file_descriptor())))
}

fn always_fails_factory(
    definition: &StrategyDefinition,
    _context: &StrategyContext,
) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(AlwaysFails(definition.file_descriptor())))
}

// ========== ENVIRONNEMENT ==========

const PURE_UPTREND: &str = r#"{
    "kind": "ema_alignment",
    "display_name": "Pure Uptrend Filter",
    "timeframe": "Daily",
    "indicators_used": ["EMA20", "EMA50", "EMA200"]
}"#;

struct TestEnv {
    db: DatabaseConnection,
    service: web::Data<StrategyService>,
    dir: PathBuf,
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

impl TestEnv {
    fn write_strategy(&self, name: &str, contents: &str) {
        std::fs::write(self.dir.join(name), contents).unwrap();
    }
}

fn quote(close: f64, ema20: f64, ema50: f64, ema200: f64) -> Quote {
    Quote::new()
        .with("close", close)
        .with("EMA20", ema20)
        .with("EMA50", ema50)
        .with("EMA200", ema200)
}

async fn setup() -> TestEnv {
    let db = db::establish_connection("sqlite::memory:").await.unwrap();

    let dir = std::env::temp_dir().join(format!("strategies-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();

    let market_data = StaticMarketData::new()
        .with_quote("RELIANCE.NS", quote(2500.0, 2450.0, 2400.0, 2300.0))
        .with_quote("TCS.NS", quote(3000.0, 3100.0, 2900.0, 2800.0));

    let mut registry = StrategyRegistry::with_defaults().unwrap();
    registry.register("missing_columns", missing_columns_factory).unwrap();
    registry.register("always_fails", always_fails_factory).unwrap();
    registry.register("unknown_symbol", unknown_symbol_factory).unwrap();
    registry.register("repeated_symbol", repeated_symbol_factory).unwrap();

    let service = StrategyService::new(registry, StrategyContext::new(Arc::new(market_data)), dir.clone());

    TestEnv {
        db,
        service: web::Data::new(service),
        dir,
    }
}

macro_rules! app {
    ($env:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($env.db.clone()))
                .app_data($env.service.clone())
                .configure(routes::configure_routes),
        )
        .await
    };
}

macro_rules! call {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

/// Crée RELIANCE.NS + TCS.NS et une watchlist qui les contient, renvoie son id
macro_rules! seed_watchlist {
    ($app:expr) => {{
        let (status, _) = call!(
            $app,
            test::TestRequest::post()
                .uri("/api/stocks/bulk")
                .set_json(json!({ "stocks": ["reliance.ns", "tcs.ns"] }))
        );
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call!(
            $app,
            test::TestRequest::post()
                .uri("/api/watchlists")
                .set_json(json!({ "name": "Nifty picks" }))
        );
        assert_eq!(status, StatusCode::CREATED);
        let watchlist_id = body["id"].as_i64().unwrap();

        let (status, body) = call!(
            $app,
            test::TestRequest::post()
                .uri(&format!("/api/watchlists/{}/stocks/by-symbol", watchlist_id))
                .set_json(json!({ "symbols": ["RELIANCE.NS", "tcs.ns"] }))
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_stocks"], 2);

        watchlist_id
    }};
}

/// Scan + id de la stratégie par script_name
macro_rules! strategy_id {
    ($app:expr, $script:expr) => {{
        let (status, _) = call!($app, test::TestRequest::post().uri("/api/strategies/scan"));
        assert_eq!(status, StatusCode::OK);

        let (_, list) = call!($app, test::TestRequest::get().uri("/api/strategies"));
        list.as_array()
            .unwrap()
            .iter()
            .find(|s| s["script_name"] == $script)
            .map(|s| s["id"].as_i64().unwrap())
            .unwrap()
    }};
}

fn multipart(file_name: &str, contents: &str) -> test::TestRequest {
    let boundary = "----swing-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: application/json\r\n\r\n{c}\r\n--{b}--\r\n",
        b = boundary,
        f = file_name,
        c = contents
    );
    test::TestRequest::post()
        .uri("/api/strategies/upload")
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        ))
        .set_payload(body)
}

// ========== STOCKS ==========

#[actix_web::test]
async fn duplicate_symbol_is_rejected_case_insensitively() {
    let env = setup().await;
    let app = app!(env);

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/stocks")
            .set_json(json!({ "symbol": "reliance.ns", "name": "Reliance Industries" }))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["symbol"], "RELIANCE.NS");
    assert_eq!(body["exchange"], "NSE");

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/stocks")
            .set_json(json!({ "symbol": "Reliance.NS" }))
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status_code"], 409);
    assert!(body["error"].as_str().unwrap().contains("RELIANCE.NS"));
}

#[actix_web::test]
async fn bulk_add_puts_every_symbol_in_one_bucket() {
    let env = setup().await;
    let app = app!(env);

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/stocks")
            .set_json(json!({ "symbol": "INFY.NS" }))
    );
    assert_eq!(status, StatusCode::CREATED);

    let input = json!({ "stocks": ["tcs.ns", "TCS.NS", "  ", "infy.ns", "wipro.ns"], "exchange": "NSE" });
    let (status, body) = call!(app, test::TestRequest::post().uri("/api/stocks/bulk").set_json(input));
    assert_eq!(status, StatusCode::CREATED);

    assert_eq!(body["added"], json!(["TCS.NS", "WIPRO.NS"]));
    assert_eq!(body["total_added"], 2);
    assert_eq!(body["total_skipped"], 3);

    assert_eq!(body["skipped"], json!(["TCS.NS", "", "INFY.NS"]));

    let (_, counts) = call!(app, test::TestRequest::get().uri("/api/stocks/count/total"));
    assert_eq!(counts, json!({ "total": 3, "active": 3, "inactive": 0 }));
}

#[actix_web::test]
async fn stock_lookup_by_symbol_and_bad_path() {
    let env = setup().await;
    let app = app!(env);

    call!(
        app,
        test::TestRequest::post()
            .uri("/api/stocks")
            .set_json(json!({ "symbol": "HDFCBANK.NS" }))
    );

    let (status, body) = call!(app, test::TestRequest::get().uri("/api/stocks/symbol/hdfcbank.ns"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["symbol"], "HDFCBANK.NS");

    let (status, body) = call!(app, test::TestRequest::get().uri("/api/stocks/not-a-number"));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status_code"], 400);

    let (status, _) = call!(app, test::TestRequest::get().uri("/api/stocks/999"));
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ========== WATCHLISTS ==========

#[actix_web::test]
async fn deleting_a_watchlist_keeps_its_stocks() {
    let env = setup().await;
    let app = app!(env);
    let watchlist_id = seed_watchlist!(app);

    let (status, _) = call!(
        app,
        test::TestRequest::delete().uri(&format!("/api/watchlists/{}", watchlist_id))
    );
    assert_eq!(status, StatusCode::OK);

    assert_eq!(watchlist_stock::Entity::find().count(&env.db).await.unwrap(), 0);
    assert_eq!(stock::Entity::find().count(&env.db).await.unwrap(), 2);

    let (status, _) = call!(
        app,
        test::TestRequest::get().uri(&format!("/api/watchlists/{}", watchlist_id))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn adding_stocks_reports_skipped_and_unknown() {
    let env = setup().await;
    let app = app!(env);
    let watchlist_id = seed_watchlist!(app);

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/watchlists/{}/stocks/by-symbol", watchlist_id))
            .set_json(json!({ "symbols": ["TCS.NS", "UNKNOWN.NS"] }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], json!([]));
    assert_eq!(body["skipped"], json!(["TCS.NS"]));
    assert_eq!(body["not_found"], json!(["UNKNOWN.NS"]));
    assert_eq!(body["total_stocks"], 2);

    let (_, stocks) = call!(
        app,
        test::TestRequest::get().uri(&format!("/api/watchlists/{}/stocks", watchlist_id))
    );
    assert_eq!(stocks["symbols"], json!(["RELIANCE.NS", "TCS.NS"]));

    let (status, _) = call!(
        app,
        test::TestRequest::delete().uri(&format!("/api/watchlists/{}/stocks/9999", watchlist_id))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn every_added_input_lands_in_exactly_one_bucket() {
    let env = setup().await;
    let app = app!(env);
    let watchlist_id = seed_watchlist!(app);
    call!(
        app,
        test::TestRequest::post()
            .uri("/api/stocks")
            .set_json(json!({ "symbol": "INFY.NS" }))
    );

    let symbols = json!(["infy.ns", "INFY.NS", "  ", "tcs.ns", "NOPE.NS"]);
    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/watchlists/{}/stocks/by-symbol", watchlist_id))
            .set_json(json!({ "symbols": symbols }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], json!(["INFY.NS"]));
    assert_eq!(body["skipped"], json!(["INFY.NS", "TCS.NS"]));
    assert_eq!(body["not_found"], json!(["", "NOPE.NS"]));
    assert_eq!(body["total_stocks"], 3);

    let buckets = |body: &Value| {
        ["added", "skipped", "not_found"]
            .iter()
            .map(|k| body[*k].as_array().unwrap().len())
            .sum::<usize>()
    };
    assert_eq!(buckets(&body), 5);

    // par id : RELIANCE (id 1) déjà membre, répété ; 999 inconnu
    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/watchlists/{}/stocks", watchlist_id))
            .set_json(json!({ "stock_ids": [1, 1, 1, 999] }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["skipped"], json!(["RELIANCE.NS", "RELIANCE.NS", "RELIANCE.NS"]));
    assert_eq!(body["not_found"], json!([999]));
    assert_eq!(buckets(&body), 4);
}

#[actix_web::test]
async fn renaming_onto_an_existing_name_conflicts() {
    let env = setup().await;
    let app = app!(env);

    call!(app, test::TestRequest::post().uri("/api/watchlists").set_json(json!({ "name": "Banks" })));
    let (_, it) = call!(app, test::TestRequest::post().uri("/api/watchlists").set_json(json!({ "name": "IT" })));

    let (status, body) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/watchlists/{}", it["id"]))
            .set_json(json!({ "name": "Banks" }))
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status_code"], 409);
}

// ========== STRATÉGIES ==========

#[actix_web::test]
async fn scan_is_idempotent() {
    let env = setup().await;
    env.write_strategy("pure_uptrend.json", PURE_UPTREND);
    env.write_strategy("broken.json", "{ nope");
    env.write_strategy("template.json", PURE_UPTREND);
    let app = app!(env);

    let (status, first) = call!(app, test::TestRequest::post().uri("/api/strategies/scan"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["scanned"], 2);
    assert_eq!(first["added"], 1);
    assert_eq!(first["errors"].as_array().unwrap().len(), 1);
    assert_eq!(first["total_strategies"], 1);

    let (_, second) = call!(app, test::TestRequest::post().uri("/api/strategies/scan"));
    assert_eq!(second["added"], 0);
    assert_eq!(second["updated"], 1);
    assert_eq!(second["total_strategies"], 1);
}

#[actix_web::test]
async fn executing_twice_replaces_previous_results() {
    let env = setup().await;
    env.write_strategy("pure_uptrend.json", PURE_UPTREND);
    let app = app!(env);
    let watchlist_id = seed_watchlist!(app);
    let strategy_id = strategy_id!(app, "pure_uptrend.json");

    let request = json!({ "watchlist_id": watchlist_id, "strategy_id": strategy_id });

    for _ in 0..2 {
        let (status, body) = call!(
            app,
            test::TestRequest::post().uri("/api/strategies/execute").set_json(&request)
        );
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["strategy_name"], "Pure Uptrend Filter");
        assert_eq!(body["total_stocks"], 2);
        assert_eq!(body["matched_stocks"], 1);
    }

    assert_eq!(strategy_result::Entity::find().count(&env.db).await.unwrap(), 2);

    let (_, latest) = call!(
        app,
        test::TestRequest::get().uri("/api/strategies/results/latest?matched_only=true")
    );
    let latest = latest.as_array().unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0]["stock"], "RELIANCE.NS");
    assert_eq!(latest[0]["strategy"], "Pure Uptrend Filter");
    assert_eq!(latest[0]["watchlist"], "Nifty picks");
}

#[actix_web::test]
async fn rows_for_unknown_symbols_are_not_persisted() {
    let env = setup().await;
    env.write_strategy("ghost.json", r#"{"kind": "unknown_symbol", "display_name": "Ghost Rows"}"#);
    let app = app!(env);
    let watchlist_id = seed_watchlist!(app);
    let strategy_id = strategy_id!(app, "ghost.json");

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/strategies/execute")
            .set_json(json!({ "watchlist_id": watchlist_id, "strategy_id": strategy_id }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_stocks"], 2);

    assert_eq!(strategy_result::Entity::find().count(&env.db).await.unwrap(), 2);
    assert_eq!(stock::Entity::find().count(&env.db).await.unwrap(), 2);
}

#[actix_web::test]
async fn repeated_symbol_keeps_the_first_verdict() {
    let env = setup().await;
    env.write_strategy("twice.json", r#"{"kind": "repeated_symbol", "display_name": "Twice"}"#);
    let app = app!(env);
    let watchlist_id = seed_watchlist!(app);
    let strategy_id = strategy_id!(app, "twice.json");

    let (status, body) = call!(
        app,
        test::TestRequest::post().uri("/api/strategies/execute-multiple").set_json(json!({
            "watchlist_id": watchlist_id,
            "strategy_ids": [strategy_id],
            "save_results": false
        }))
    );
    assert_eq!(status, StatusCode::OK);
    for stock in body["results"].as_array().unwrap() {
        let verdict = &stock["strategies"][strategy_id.to_string()];
        assert_eq!(verdict["matched"], true);
        assert_eq!(verdict["reason"], "first");
        assert_eq!(stock["total_matches"], 1);
    }
}

#[actix_web::test]
async fn execution_without_saving_leaves_results_untouched() {
    let env = setup().await;
    env.write_strategy("pure_uptrend.json", PURE_UPTREND);
    let app = app!(env);
    let watchlist_id = seed_watchlist!(app);
    let strategy_id = strategy_id!(app, "pure_uptrend.json");

    let (status, _) = call!(
        app,
        test::TestRequest::post().uri("/api/strategies/execute").set_json(json!({
            "watchlist_id": watchlist_id,
            "strategy_id": strategy_id,
            "save_results": false
        }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(strategy_result::Entity::find().count(&env.db).await.unwrap(), 0);
}

#[actix_web::test]
async fn result_table_missing_columns_is_rejected() {
    let env = setup().await;
    env.write_strategy("broken_output.json", r#"{"kind": "missing_columns", "display_name": "Broken Output"}"#);
    let app = app!(env);
    let watchlist_id = seed_watchlist!(app);
    let strategy_id = strategy_id!(app, "broken_output.json");

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/strategies/execute")
            .set_json(json!({ "watchlist_id": watchlist_id, "strategy_id": strategy_id }))
    );
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("score"));
    assert!(message.contains("reason"));

    assert_eq!(strategy_result::Entity::find().count(&env.db).await.unwrap(), 0);
}

#[actix_web::test]
async fn execution_preconditions() {
    let env = setup().await;
    env.write_strategy("pure_uptrend.json", PURE_UPTREND);
    let app = app!(env);
    let strategy_id = strategy_id!(app, "pure_uptrend.json");

    // watchlist inconnue
    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/strategies/execute")
            .set_json(json!({ "watchlist_id": 42, "strategy_id": strategy_id }))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);

    // watchlist vide
    let (_, empty) = call!(app, test::TestRequest::post().uri("/api/watchlists").set_json(json!({ "name": "Empty" })));
    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/strategies/execute")
            .set_json(json!({ "watchlist_id": empty["id"], "strategy_id": strategy_id }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // stratégie désactivée
    let watchlist_id = seed_watchlist!(app);
    let (_, toggled) = call!(
        app,
        test::TestRequest::put().uri(&format!("/api/strategies/{}/toggle", strategy_id))
    );
    assert_eq!(toggled["is_active"], false);

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/strategies/execute")
            .set_json(json!({ "watchlist_id": watchlist_id, "strategy_id": strategy_id }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn multi_strategy_execution_tolerates_a_failing_strategy() {
    let env = setup().await;
    env.write_strategy("pure_uptrend.json", PURE_UPTREND);
    env.write_strategy("fails.json", r#"{"kind": "always_fails", "display_name": "Always Fails"}"#);
    let app = app!(env);
    let watchlist_id = seed_watchlist!(app);
    let good = strategy_id!(app, "pure_uptrend.json");
    let bad = strategy_id!(app, "fails.json");

    let (status, body) = call!(
        app,
        test::TestRequest::post().uri("/api/strategies/execute-multiple").set_json(json!({
            "watchlist_id": watchlist_id,
            "strategy_ids": [good, bad]
        }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["strategy_count"], 1);
    assert_eq!(body["total_stocks"], 2);
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
    assert!(body["strategies"].get(good.to_string()).is_some());
    assert!(body["strategies"].get(bad.to_string()).is_none());

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["symbol"], "RELIANCE.NS");
    assert_eq!(results[0]["total_matches"], 1);
    assert_eq!(results[1]["total_matches"], 0);

    assert_eq!(strategy_result::Entity::find().count(&env.db).await.unwrap(), 2);
}

#[actix_web::test]
async fn multi_strategy_execution_without_active_strategies_is_not_found() {
    let env = setup().await;
    let app = app!(env);
    let watchlist_id = seed_watchlist!(app);

    let (status, _) = call!(
        app,
        test::TestRequest::post().uri("/api/strategies/execute-multiple").set_json(json!({
            "watchlist_id": watchlist_id,
            "strategy_ids": [1, 2]
        }))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn invalid_upload_keeps_the_existing_file() {
    let env = setup().await;
    env.write_strategy("pure_uptrend.json", PURE_UPTREND);
    let app = app!(env);

    let (status, body) = call!(app, multipart("pure_uptrend.json", "{ definitely not json"));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status_code"], 400);

    let on_disk = std::fs::read_to_string(env.dir.join("pure_uptrend.json")).unwrap();
    assert_eq!(on_disk, PURE_UPTREND);

    let leftovers = std::fs::read_dir(&env.dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);

    let (status, _) = call!(app, multipart("template.json", PURE_UPTREND));
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call!(app, multipart("script.py", PURE_UPTREND));
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn upload_creates_then_updates() {
    let env = setup().await;
    let app = app!(env);

    let (status, body) = call!(app, multipart("uptrend.json", PURE_UPTREND));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "created");
    assert_eq!(body["strategy"]["script_name"], "uptrend.json");
    assert_eq!(body["strategy"]["indicators_used"], json!(["EMA20", "EMA50", "EMA200"]));
    assert!(env.dir.join("uptrend.json").is_file());

    let (status, body) = call!(app, multipart("uptrend.json", PURE_UPTREND));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "updated");

    let strategy_id = body["strategy"]["id"].as_i64().unwrap();
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/strategies/download/{}", strategy_id))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = test::read_body(resp).await;
    assert_eq!(bytes.as_ref(), PURE_UPTREND.as_bytes());
}

#[actix_web::test]
async fn deleting_a_strategy_can_remove_its_file() {
    let env = setup().await;
    env.write_strategy("pure_uptrend.json", PURE_UPTREND);
    let app = app!(env);
    let watchlist_id = seed_watchlist!(app);
    let strategy_id = strategy_id!(app, "pure_uptrend.json");

    call!(
        app,
        test::TestRequest::post()
            .uri("/api/strategies/execute")
            .set_json(json!({ "watchlist_id": watchlist_id, "strategy_id": strategy_id }))
    );

    let (status, body) = call!(
        app,
        test::TestRequest::delete().uri(&format!("/api/strategies/{}?delete_file=true", strategy_id))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file_deleted"], true);
    assert!(!env.dir.join("pure_uptrend.json").exists());
    assert_eq!(strategy_result::Entity::find().count(&env.db).await.unwrap(), 0);
}

// ========== SYSTÈME ==========

#[actix_web::test]
async fn health_and_stats() {
    let env = setup().await;
    let app = app!(env);
    seed_watchlist!(app);

    let (status, body) = call!(app, test::TestRequest::get().uri("/health"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "connected");

    let (status, body) = call!(app, test::TestRequest::get().uri("/api/stats"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stocks"]["total"], 2);
    assert_eq!(body["watchlists"]["total"], 1);
    assert_eq!(body["analysis_history"], json!({ "total_executions": 0, "total_matches": 0 }));
}
