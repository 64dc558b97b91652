use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use veriface_core::dnn::DnnFaceDetector;
use veriface_core::{EmbeddingStore, Engine};

mod config;
mod dbus_interface;

use config::Config;
use dbus_interface::VerifaceService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("verifaced starting");
    let config = Config::from_env();

    // The store is load-bearing: refuse to start without it.
    let store = EmbeddingStore::open(&config.db_path)
        .with_context(|| format!("opening embedding store at {}", config.db_path.display()))?;

    // A missing model is a degraded start, not a fatal one: the
    // geometric fallback stages still run.
    let learned = match DnnFaceDetector::load(&config.model_path, config.engine.confidence_floor) {
        Ok(detector) => Some(detector),
        Err(err) => {
            tracing::warn!(
                model = %config.model_path.display(),
                error = %err,
                "learned detector unavailable, starting degraded"
            );
            None
        }
    };
    let degraded = learned.is_none();

    let engine = Arc::new(Engine::new(config.engine, store, learned));
    let service = VerifaceService::new(engine, degraded);

    let _connection = zbus::connection::Builder::session()?
        .name("dev.veriface.Engine1")?
        .serve_at("/dev/veriface/Engine1", service)?
        .build()
        .await
        .context("registering on the session bus")?;

    tracing::info!(degraded, "verifaced ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("verifaced shutting down");

    Ok(())
}
