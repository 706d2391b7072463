//! Export Catalog API Service
//!
//! REST API for products, categories and marketing content

use anyhow::{Context, Result};
use catalog_api::{
    create_router, AppState, AuthSettings, CloudinaryImageStore, Config, DocumentStore,
    ImageStore, LocalImageStore, MemoryStore, RedisStore, UploadGateway, UploadPolicy,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.ensure_directories()?;

    info!("Starting Export Catalog API");
    info!("Environment: {:?}", config.environment);
    info!("Listening on {}", config.api_address());

    // Initialize document storage
    let store: Arc<dyn DocumentStore> = if config.database_url.starts_with("memory://") {
        warn!("Using in-memory document store; data is lost on restart");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(
            RedisStore::new(&config.database_url)
                .await
                .context("Failed to initialize storage")?,
        )
    };

    // Initialize image storage
    let images: Arc<dyn ImageStore> = match &config.cloudinary {
        Some(cloudinary) => {
            info!("Storing images in Cloudinary account {}", cloudinary.cloud_name);
            Arc::new(CloudinaryImageStore::new(cloudinary.clone()))
        }
        None => {
            info!(
                "Storing images in {} (served under {})",
                config.upload_dir.display(),
                config.upload_public_path
            );
            Arc::new(LocalImageStore::new(
                config.upload_dir.clone(),
                config.upload_public_path.clone(),
            ))
        }
    };

    let uploads = UploadGateway::new(
        images,
        UploadPolicy::new(config.max_upload_bytes, config.max_upload_files),
    );

    // Create application state
    let mut state = AppState::new(store, uploads)
        .with_allowed_origins(config.allowed_origins.clone())
        .with_error_details(!config.is_production())
        .with_rate_limit(config.rate_limit);

    match &config.admin {
        Some(admin) => state = state.with_auth(AuthSettings::from(admin)),
        None => warn!("No admin account configured; mutating routes are unauthenticated"),
    }

    // Create router
    let app = create_router(state);

    // Bind and serve
    let addr = config.api_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Export Catalog API running on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
