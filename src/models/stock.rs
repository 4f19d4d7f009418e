use serde::Serialize;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "stocks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    // toujours stocké en majuscules
    #[sea_orm(unique)]
    pub symbol: String,
    pub name: Option<String>,
    pub exchange: String,
    pub sector: Option<String>,
    pub added_date: DateTime,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::watchlist_stock::Entity")]
    WatchlistStocks,

    #[sea_orm(has_many = "super::strategy_result::Entity")]
    StrategyResults,
}

impl Related<super::watchlist_stock::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WatchlistStocks.def()
    }
}

impl Related<super::strategy_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StrategyResults.def()
    }
}

// Many-to-many : stock -> watchlist_stocks -> watchlists
impl Related<super::watchlist::Entity> for Entity {
    fn to() -> RelationDef {
        super::watchlist_stock::Relation::Watchlist.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::watchlist_stock::Relation::Stock.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Normalise un symbole saisi par l'utilisateur (trim + majuscules)
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
