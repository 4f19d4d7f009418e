// ============================================================================
// MODÈLE : STRATEGY METADATA
// ============================================================================
//
// Description:
//   Une ligne par fichier de stratégie trouvé dans STRATEGIES_DIR.
//   Alimentée par le scan (démarrage, POST /scan, upload), jamais saisie à la main.
//
// Colonnes:
//   - script_name (UNIQUE) : nom du fichier, ex. "pure_uptrend.json"
//   - indicators_used      : liste JSON sérialisée, ex. '["EMA20","EMA50"]'
//   - file_path            : chemin du fichier sur disque
//   - is_active            : true à l'insertion, modifiable via /toggle
//   - last_scanned         : rafraîchi à chaque scan
//
// Points d'attention:
//   - Le scan met à jour tous les champs SAUF script_name (la clé)
//   - Supprimer une stratégie supprime ses résultats (ON DELETE CASCADE)
//
// ============================================================================

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "strategy_metadata")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub script_name: String,
    pub display_name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub strategy_type: String,
    pub timeframe: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub indicators_used: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub ai_logic: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub criteria: Option<String>,
    pub file_path: String,
    pub is_active: bool,
    pub last_scanned: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::strategy_result::Entity")]
    StrategyResults,
}

impl Related<super::strategy_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StrategyResults.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Désérialise indicators_used ; une valeur absente ou invalide donne une liste vide
    pub fn indicators(&self) -> Vec<String> {
        self.indicators_used
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}
