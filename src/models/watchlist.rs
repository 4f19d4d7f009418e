use serde::Serialize;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "watchlists")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub created_date: DateTime,
    pub updated_date: DateTime,
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

// Many-to-many : watchlist -> watchlist_stocks -> stocks
impl Related<super::stock::Entity> for Entity {
    fn to() -> RelationDef {
        super::watchlist_stock::Relation::Stock.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::watchlist_stock::Relation::Watchlist.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
