use async_trait::async_trait;
use polars::prelude::DataFrame;
use serde::Deserialize;
use std::sync::Arc;

use crate::services::market_data::MarketData;
use crate::services::strategies::loader::StrategyDefinition;
use crate::services::strategies::registry::StrategyContext;
use crate::services::strategies::strategy_trait::{
    rows_to_frame, ResultRow, Strategy, StrategyDescriptor, StrategyError,
};

pub const KIND: &str = "ema_alignment";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmaAlignmentParams {
    pub periods: Vec<u32>,
}

impl Default for EmaAlignmentParams {
    fn default() -> Self {
        Self {
            periods: vec![20, 50, 200],
        }
    }
}

/// Tendance "pure" : close > EMA(p1) > EMA(p2) > ... (périodes croissantes)
pub struct EmaAlignment {
    descriptor: StrategyDescriptor,
    market_data: Arc<dyn MarketData>,
    periods: Vec<u32>,
}

pub fn factory(
    definition: &StrategyDefinition,
    context: &StrategyContext,
) -> Result<Box<dyn Strategy>, StrategyError> {
    let params: EmaAlignmentParams = definition.params()?;

    if params.periods.is_empty() {
        return Err(StrategyError::InvalidParams {
            kind: KIND.to_string(),
            reason: "periods must not be empty".to_string(),
        });
    }

    let mut periods = params.periods;
    periods.sort_unstable();
    periods.dedup();

    Ok(Box::new(EmaAlignment {
        descriptor: definition.file_descriptor(),
        market_data: context.market_data.clone(),
        periods,
    }))
}

impl EmaAlignment {
    fn fields(&self) -> Vec<String> {
        let mut fields = vec!["close".to_string()];
        fields.extend(self.periods.iter().map(|p| format!("EMA{}", p)));
        fields
    }

    fn evaluate(&self, symbol: &str, values: &[Option<f64>]) -> ResultRow {
        // values[0] = close, puis une EMA par période
        let Some(chain) = values.iter().copied().collect::<Option<Vec<f64>>>() else {
            return ResultRow::unmatched(symbol, "Invalid data");
        };
        if chain.iter().any(|v| *v <= 0.0) {
            return ResultRow::unmatched(symbol, "Invalid data");
        }

        let links = chain.len() - 1;
        let satisfied = chain.windows(2).filter(|pair| pair[0] > pair[1]).count();
        let is_uptrend = satisfied == links;

        let score = (satisfied as f64 / links as f64 * 100.0).round();
        let confidence = if is_uptrend { 95.0 } else { 10.0 };
        let reason = if is_uptrend {
            "UPTREND".to_string()
        } else {
            format!("NOT UPTREND ({}/{} EMA links aligned)", satisfied, links)
        };

        let mut row = ResultRow::new(symbol, is_uptrend, score, confidence, reason);
        row.price = Some((chain[0] * 100.0).round() / 100.0);
        row
    }
}

#[async_trait]
impl Strategy for EmaAlignment {
    fn descriptor(&self) -> &StrategyDescriptor {
        &self.descriptor
    }

    async fn analyze(&self, symbols: &[String]) -> Result<DataFrame, StrategyError> {
        let fields = self.fields();
        let snapshot = self.market_data.snapshot(symbols, &fields).await?;

        tracing::debug!(
            strategy = KIND,
            requested = symbols.len(),
            received = snapshot.len(),
            "market snapshot received"
        );

        let rows: Vec<ResultRow> = symbols
            .iter()
            .map(|symbol| match snapshot.get(symbol) {
                Some(quote) => {
                    let values: Vec<Option<f64>> = fields.iter().map(|f| quote.get(f)).collect();
                    self.evaluate(symbol, &values)
                }
                None => ResultRow::unmatched(symbol, "Not found"),
            })
            .collect();

        Ok(rows_to_frame(&rows)?)
    }
}
