pub mod defaults;
pub mod loader;
pub mod registry;
pub mod strategy_trait;

pub use loader::StrategyDefinition;
pub use registry::{StrategyContext, StrategyFactory, StrategyRegistry};
pub use strategy_trait::{
    rows_from_frame, rows_to_frame, ResultRow, Strategy, StrategyDescriptor, StrategyError,
    REQUIRED_COLUMNS,
};
