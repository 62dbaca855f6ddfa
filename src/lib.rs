pub mod api;
pub mod config;
pub mod evaluation;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod seed;
pub mod store;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::api::{api_router, ApiContext};
use crate::config::Settings;
use crate::pipeline::{
    ComponentFactory, MedicationService, PipelineFactory, PipelineService,
    ServiceComponentFactory,
};
use crate::store::{QdrantConnector, StoreConnector, StoreInitializer};

/// Start the extraction service: probe the store, seed it, serve the API.
///
/// Runs until the server stops. Any startup failure is returned as a
/// human-readable message after being logged.
pub async fn run() -> Result<(), String> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let settings = Arc::new(Settings::from_env());

    // The store must answer the count probe before anything is seeded or
    // served; transient connectivity failures are retried, the rest abort.
    let connector = Arc::new(QdrantConnector::new(Arc::clone(&settings)));
    StoreInitializer::new(Arc::clone(&connector) as Arc<dyn StoreConnector>)
        .verify_connection()
        .await
        .map_err(|e| format!("Vector store connection failed: {e}"))?;

    let components = Arc::new(ServiceComponentFactory::with_connector(
        Arc::clone(&settings),
        connector as Arc<dyn StoreConnector>,
    ));
    let medications = Arc::new(MedicationService::new(PipelineService::new(
        PipelineFactory::new(components as Arc<dyn ComponentFactory>),
    )));

    seed::load_initial_data(&medications, &settings.few_shot_path())
        .await
        .map_err(|e| format!("Failed to load initial data: {e}"))?;

    let app = api_router(ApiContext::new(
        Arc::clone(&settings),
        Arc::clone(&medications),
    ));

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind API server on {addr}: {e}"))?;

    tracing::info!(%addr, "API server started");

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("API server error: {e}"))?;

    Ok(())
}
