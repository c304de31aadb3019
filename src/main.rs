use anyhow::Result;
use axum::Router;
use bucket_store::{
    config::AppConfig,
    routes, server,
    services::{
        bucket_service::BucketService,
        metadata_store::{MetadataStore, StoreOptions},
        namespace::NamespaceManager,
    },
};
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting bucket-store with config: {:?}", cfg);

    // --- Ensure the SQLite parent directory exists ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    // --- Initialize metadata store ---
    let store = MetadataStore::connect(
        &cfg.database_url,
        &StoreOptions {
            max_connections: cfg.max_connections,
            io_timeout: cfg.io_timeout,
        },
    )
    .await?;

    store.migrate().await?;
    tracing::info!("Database migration complete.");
    if migrate {
        return Ok(()); // exit after migration
    }

    // --- Initialize core service ---
    let namespace = NamespaceManager::new(cfg.lease_ttl);
    let service = BucketService::new(
        store,
        namespace,
        cfg.default_region.clone(),
        cfg.default_owner.clone(),
    );

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(service);

    // --- Start server ---
    server::serve(app, &cfg).await
}
