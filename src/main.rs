use std::{sync::Arc, time::Duration};

use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use coursepass::config::Config;
use coursepass::db::{self, AppState};
use coursepass::handlers;
use coursepass::payments::MercadoPagoClient;
use coursepass::sweep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let pool = db::init_db_pool(&config.database_path)?;

    let processor = Arc::new(MercadoPagoClient::new(
        &config.processor_base_url,
        &config.processor_access_token,
    ));

    let state = AppState {
        db: pool.clone(),
        processor,
        webhook_secret: config.webhook_secret.clone(),
        base_url: config.base_url.clone(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(sweep::run_intent_sweep(
        pool.clone(),
        Duration::from_secs(config.sweep_interval_secs),
        shutdown_rx,
    ));

    let app = handlers::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    tracing::info!("listening on {}", config.addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    shutdown_tx.send(true).ok();
    sweeper.await.ok();

    Ok(())
}
