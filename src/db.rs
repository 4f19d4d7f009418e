// connexion BD + création du schéma

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
};
use std::path::Path;
use std::time::Duration;

use crate::models::{stock, strategy_metadata, strategy_result, watchlist, watchlist_stock};

pub async fn establish_connection(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    ensure_sqlite_dir(database_url)?;

    let mut options = ConnectOptions::new(database_url.to_owned());
    options
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    // SQLite en mémoire : chaque connexion du pool aurait sa propre base
    if database_url.contains(":memory:") {
        options.max_connections(1).min_connections(1);
    }

    let db = Database::connect(options).await?;
    init_schema(&db).await?;
    Ok(db)
}

/// sqlite://data/trading.db -> crée data/ si besoin (sinon SQLite refuse d'ouvrir le fichier)
fn ensure_sqlite_dir(database_url: &str) -> Result<(), DbErr> {
    let Some(rest) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let file = rest.split('?').next().unwrap_or_default();
    if file.is_empty() || file.contains(":memory:") {
        return Ok(());
    }

    match Path::new(file).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| DbErr::Custom(format!("Cannot create database directory {}: {}", parent.display(), e))),
        _ => Ok(()),
    }
}

/// Crée les tables manquantes. Ordre important : les tables référencées d'abord.
pub async fn init_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, stock::Entity).await?;
    create_table(db, watchlist::Entity).await?;
    create_table(db, strategy_metadata::Entity).await?;
    create_table(db, watchlist_stock::Entity).await?;
    create_table(db, strategy_result::Entity).await?;
    Ok(())
}

async fn create_table<E>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();

    db.execute(backend.build(&statement)).await?;
    Ok(())
}
