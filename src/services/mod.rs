pub mod market_data;
pub mod strategies;
pub mod strategy_service;
