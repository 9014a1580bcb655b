use anyhow::Result;
use moodlens_advice::AdviceResponder;
use moodlens_core::MoodPredictor;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::{BusKind, Config};
use dbus_interface::{MoodLensService, BUS_NAME, OBJECT_PATH};
use engine::EngineHandle;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        model_dir = %config.models.model_dir.display(),
        bus = ?config.bus,
        "moodlensd starting"
    );

    let engine = EngineHandle::new(MoodPredictor::new(config.models.clone()));

    let warm = engine.clone();
    tokio::spawn(async move {
        match warm.warm_up().await {
            Ok(state) => tracing::info!(%state, "model warm-up finished"),
            Err(e) => tracing::error!(error = %e, "model warm-up task failed"),
        }
    });

    let advice = AdviceResponder::configure(config.gemini.clone());
    let service = MoodLensService::new(engine, advice, config.max_image_bytes);

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(name = BUS_NAME, path = OBJECT_PATH, "moodlensd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("moodlensd shutting down");

    Ok(())
}
