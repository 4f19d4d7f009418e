use std::collections::BTreeMap;
use std::sync::Arc;

use super::defaults;
use super::loader::StrategyDefinition;
use super::strategy_trait::{Strategy, StrategyError};
use crate::services::market_data::MarketData;

/// Dépendances partagées passées aux factories
#[derive(Clone)]
pub struct StrategyContext {
    pub market_data: Arc<dyn MarketData>,
}

impl StrategyContext {
    pub fn new(market_data: Arc<dyn MarketData>) -> Self {
        Self { market_data }
    }
}

/// Construit une stratégie à partir de sa définition (fichier .json) et du contexte
pub type StrategyFactory =
    fn(&StrategyDefinition, &StrategyContext) -> Result<Box<dyn Strategy>, StrategyError>;

/// Table kind -> factory, remplie au démarrage
#[derive(Default)]
pub struct StrategyRegistry {
    factories: BTreeMap<String, StrategyFactory>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registre avec toutes les stratégies livrées (defaults/)
    pub fn with_defaults() -> Result<Self, StrategyError> {
        let mut registry = Self::new();
        defaults::register_all(&mut registry)?;
        Ok(registry)
    }

    pub fn register(&mut self, kind: &str, factory: StrategyFactory) -> Result<(), StrategyError> {
        let key = normalize_kind(kind);
        if self.factories.contains_key(&key) {
            return Err(StrategyError::DuplicateKind(key));
        }
        self.factories.insert(key, factory);
        Ok(())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(&normalize_kind(kind))
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn build(
        &self,
        definition: &StrategyDefinition,
        context: &StrategyContext,
    ) -> Result<Box<dyn Strategy>, StrategyError> {
        let factory = self
            .factories
            .get(&normalize_kind(&definition.kind))
            .ok_or_else(|| self.unknown_kind(&definition.kind))?;
        factory(definition, context)
    }

    pub(crate) fn unknown_kind(&self, kind: &str) -> StrategyError {
        StrategyError::NotFound(format!(
            "No strategy implementation registered for kind '{}'. Available kinds: {}",
            kind,
            self.kinds().join(", ")
        ))
    }
}

fn normalize_kind(kind: &str) -> String {
    kind.trim().to_lowercase()
}
