// ============================================================================
// MODELS - MODULE PRINCIPAL
// ============================================================================
//
// Description:
//   Point d'entrée pour tous les modèles de données.
//   Chaque modèle correspond à une table SQLite avec SeaORM.
//
// Liste des modules:
//   - health : Health check API
//   - stock : Symboles boursiers (RELIANCE.NS, TCS.NS, etc.)
//   - watchlist : Listes de suivi nommées
//   - watchlist_stock : Table de jointure watchlist <-> stock
//   - strategy_metadata : Stratégies découvertes dans le dossier strategies/
//   - strategy_result : Résultats d'exécution (stratégie x watchlist x stock)
//   - dto : Data Transfer Objects pour les réponses API
//
// Points d'attention:
//   - Tous les modèles utilisent SeaORM (pas de SQL brut)
//   - Les tables sont créées au démarrage depuis les entités (db::init_schema)
//   - Les FK sont en ON DELETE CASCADE, mais les routes suppriment aussi
//     explicitement les lignes dépendantes dans la même transaction
//
// ============================================================================

pub mod health;
pub mod stock;
pub mod watchlist;
pub mod watchlist_stock;
pub mod strategy_metadata;
pub mod strategy_result;
pub mod dto;
