use serde::Serialize;
use sea_orm::entity::prelude::*;

// Résultats remplacés (pas ajoutés) à chaque exécution pour un couple (strategy, watchlist)
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "strategy_results")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub strategy_id: i32,
    pub watchlist_id: i32,
    pub stock_id: i32,

    pub matched: bool,
    pub confidence_score: Option<f64>,
    pub trend_score: Option<f64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub reason: Option<String>,

    // données de marché au moment de l'exécution
    pub price: Option<f64>,
    pub rsi: Option<f64>,
    pub volume_ratio: Option<f64>,

    pub execution_date: DateTime,
    pub execution_time_ms: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::strategy_metadata::Entity",
        from = "Column::StrategyId",
        to = "super::strategy_metadata::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Strategy,

    #[sea_orm(
        belongs_to = "super::watchlist::Entity",
        from = "Column::WatchlistId",
        to = "super::watchlist::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Watchlist,

    #[sea_orm(
        belongs_to = "super::stock::Entity",
        from = "Column::StockId",
        to = "super::stock::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Stock,
}

impl Related<super::strategy_metadata::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Strategy.def()
    }
}

impl Related<super::watchlist::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Watchlist.def()
    }
}

impl Related<super::stock::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Stock.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
