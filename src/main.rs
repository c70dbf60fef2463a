use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use catalog_image_kit::config::get_config;
use catalog_image_kit::routes::{create_routes, AppState};
use catalog_image_kit::services::derivatives::DerivativeService;
use catalog_image_kit::services::entity_names::CatalogEntityNames;
use catalog_image_kit::services::storage::LocalStorage;
use catalog_image_kit::services::templates::TemplateService;
use catalog_image_kit::services::worker::Worker;

#[derive(Parser, Debug)]
#[command(version, about = "Image derivative service for the shop catalog")]
struct Args {
    /// Address to listen on (overrides BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,

    /// Serve the API without running the regeneration worker
    #[arg(long)]
    no_worker: bool,

    /// Worker poll interval in milliseconds (overrides WORKER_POLL_INTERVAL_MS)
    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_image_kit=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = get_config();

    let db = Database::connect(&config.database_url).await?;
    Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied");

    let storage = LocalStorage::from_config();
    tokio::fs::create_dir_all(storage.root()).await?;

    let templates = TemplateService::new(db.clone());
    let derivatives = DerivativeService::new(db.clone(), storage, templates.clone());
    let names = Arc::new(CatalogEntityNames::new(db.clone()));
    let worker = Worker::new(db.clone(), derivatives.clone(), templates.clone(), names);

    if args.no_worker {
        tracing::info!("Regeneration worker disabled");
    } else {
        let interval = args
            .poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(config.worker_poll_interval);
        worker.start(interval);
    }

    let app = create_routes(AppState {
        templates,
        derivatives,
        worker: worker.clone(),
    });

    let bind = args.bind.as_deref().unwrap_or(&config.bind_addr);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker.stop();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
