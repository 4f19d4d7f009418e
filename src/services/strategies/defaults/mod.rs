// Stratégies livrées avec le binaire, référencées par "kind" dans les fichiers .json
pub mod ema_alignment;
pub mod rsi_momentum;

use super::registry::StrategyRegistry;
use super::strategy_trait::StrategyError;

pub fn register_all(registry: &mut StrategyRegistry) -> Result<(), StrategyError> {
    registry.register(ema_alignment::KIND, ema_alignment::factory)?;
    registry.register(rsi_momentum::KIND, rsi_momentum::factory)?;
    Ok(())
}
