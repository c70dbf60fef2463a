use sea_orm::{ConnectionTrait, Database, Statement};
use std::env;

const TABLES: [&str; 4] = [
    "regeneration_jobs",
    "image_files",
    "size_templates",
    "seaql_migrations",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;
    let db = Database::connect(database_url).await?;
    let backend = db.get_database_backend();

    for table in TABLES {
        db.execute(Statement::from_string(
            backend,
            format!("DROP TABLE IF EXISTS \"{}\";", table),
        ))
        .await?;
        tracing::info!(table, "dropped");
    }

    tracing::info!("Database reset successfully; files under UPLOADS_DIR are left untouched");
    Ok(())
}
