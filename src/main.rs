//! Main entry point for the Image Dispatch Gateway

use image_dispatch_gateway::{
    api,
    backend::FactoryRegistry,
    capability::CapabilityRegistry,
    config::{LoggingConfig, ProviderCredentials, Settings},
    gateway::Dispatcher,
    AppState,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;
    init_logging(&settings.logging);
    settings.validate()?;

    info!("Starting Image Dispatch Gateway");
    info!(
        "Loaded configuration: server={}:{}",
        settings.server.host, settings.server.port
    );

    let capabilities = Arc::new(CapabilityRegistry::load_from_path(&settings.capabilities.path)?);
    let factories = Arc::new(FactoryRegistry::from_settings(
        &settings,
        ProviderCredentials::from_env(),
    )?);
    info!(
        capabilities = capabilities.len(),
        factories = factories.len(),
        "Initialized provider registries"
    );

    let missing = factories.missing_for(&capabilities);
    if !missing.is_empty() {
        if settings.dispatch.strict_provider_check {
            anyhow::bail!(
                "capability document lists providers without an implementation: {}",
                missing.join(", ")
            );
        }
        warn!(
            providers = %missing.join(", "),
            "Capability document lists providers without an implementation; requests for them will fail"
        );
    }

    let app_state = Arc::new(AppState {
        settings: Arc::new(settings),
        dispatcher: Arc::new(Dispatcher::new(capabilities, factories)),
    });

    // Build the router
    let app = api::routes::create_router(app_state.clone());

    let addr = format!(
        "{}:{}",
        app_state.settings.server.host, app_state.settings.server.port
    );
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}
