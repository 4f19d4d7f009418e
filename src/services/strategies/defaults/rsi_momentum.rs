use async_trait::async_trait;
use polars::prelude::DataFrame;
use serde::Deserialize;
use std::sync::Arc;

use crate::services::market_data::{MarketData, Quote};
use crate::services::strategies::loader::StrategyDefinition;
use crate::services::strategies::registry::StrategyContext;
use crate::services::strategies::strategy_trait::{
    rows_to_frame, ResultRow, Strategy, StrategyDescriptor, StrategyError,
};

pub const KIND: &str = "rsi_momentum";

const FIELD_CLOSE: &str = "close";
const FIELD_RSI: &str = "RSI";
const FIELD_VOLUME_RATIO: &str = "relative_volume_10d_calc";

// Répartition du score : zone RSI + confirmation par le volume
const RSI_WEIGHT: f64 = 60.0;
const VOLUME_WEIGHT: f64 = 40.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RsiMomentumParams {
    pub rsi_min: f64,
    pub rsi_max: f64,
    pub min_volume_ratio: f64,
}

impl Default for RsiMomentumParams {
    fn default() -> Self {
        Self {
            rsi_min: 50.0,
            rsi_max: 70.0,
            min_volume_ratio: 1.5,
        }
    }
}

/// RSI dans la zone [rsi_min, rsi_max] ET volume relatif >= min_volume_ratio
pub struct RsiMomentum {
    descriptor: StrategyDescriptor,
    market_data: Arc<dyn MarketData>,
    params: RsiMomentumParams,
}

pub fn factory(
    definition: &StrategyDefinition,
    context: &StrategyContext,
) -> Result<Box<dyn Strategy>, StrategyError> {
    let params: RsiMomentumParams = definition.params()?;

    if params.rsi_min > params.rsi_max || params.min_volume_ratio <= 0.0 {
        return Err(StrategyError::InvalidParams {
            kind: KIND.to_string(),
            reason: format!(
                "expected rsi_min <= rsi_max and min_volume_ratio > 0, got {:?}",
                params
            ),
        });
    }

    Ok(Box::new(RsiMomentum {
        descriptor: definition.file_descriptor(),
        market_data: context.market_data.clone(),
        params,
    }))
}

impl RsiMomentum {
    fn evaluate(&self, symbol: &str, quote: &Quote) -> ResultRow {
        let (Some(rsi), Some(volume_ratio)) = (quote.get(FIELD_RSI), quote.get(FIELD_VOLUME_RATIO)) else {
            return ResultRow::unmatched(symbol, "Invalid data");
        };

        let p = &self.params;
        let rsi_ok = rsi >= p.rsi_min && rsi <= p.rsi_max;
        let volume_ok = volume_ratio >= p.min_volume_ratio;
        let matched = rsi_ok && volume_ok;

        let rsi_part = if rsi_ok { RSI_WEIGHT } else { 0.0 };
        let volume_part = VOLUME_WEIGHT * (volume_ratio / p.min_volume_ratio).clamp(0.0, 1.0);
        let score = (rsi_part + volume_part).round();
        let confidence = if matched { score } else { 100.0 - score };

        let reason = match (rsi_ok, volume_ok) {
            (true, true) => format!("MOMENTUM (RSI {:.1}, volume x{:.2})", rsi, volume_ratio),
            (false, _) => format!("RSI {:.1} outside [{}, {}]", rsi, p.rsi_min, p.rsi_max),
            (true, false) => format!("Volume x{:.2} below x{}", volume_ratio, p.min_volume_ratio),
        };

        let mut row = ResultRow::new(symbol, matched, score, confidence, reason);
        row.price = quote.get(FIELD_CLOSE);
        row.rsi = Some(rsi);
        row.volume_ratio = Some(volume_ratio);
        row
    }
}

#[async_trait]
impl Strategy for RsiMomentum {
    fn descriptor(&self) -> &StrategyDescriptor {
        &self.descriptor
    }

    async fn analyze(&self, symbols: &[String]) -> Result<DataFrame, StrategyError> {
        let fields = [FIELD_CLOSE, FIELD_RSI, FIELD_VOLUME_RATIO].map(String::from);
        let snapshot = self.market_data.snapshot(symbols, &fields).await?;

        let rows: Vec<ResultRow> = symbols
            .iter()
            .map(|symbol| match snapshot.get(symbol) {
                Some(quote) => self.evaluate(symbol, quote),
                None => ResultRow::unmatched(symbol, "Not found"),
            })
            .collect();

        Ok(rows_to_frame(&rows)?)
    }
}
