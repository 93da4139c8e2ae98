use std::sync::Arc;

use backend::config::Config;
use backend::crypto::Envelope;
use backend::db::Store;
use backend::state::AppState;
use backend::{api, hub};
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    dotenv::dotenv().ok();
    let config = Config::from_env();

    let store = Store::connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    store.init_schema().await.expect("failed to initialise schema");

    let envelope = Envelope::load_or_generate(&config.rsa_key_path, config.rsa_key_bits)
        .expect("failed to load RSA key");

    let bind_addr = config.bind_addr;
    let sweep_interval = config.timer_check_interval;
    let state = AppState::new(config, store, envelope)
        .await
        .expect("failed to build application state");

    if !sweep_interval.is_zero() {
        hub::spawn_sweep(Arc::clone(&state.hubs), sweep_interval);
    } else {
        tracing::warn!("timeout sweep disabled; relying on client timeout reports");
    }

    let app = api::router(state);
    let listener = TcpListener::bind(bind_addr).await.expect("failed to bind");
    tracing::info!(%bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!(%err, "unable to listen for shutdown signal");
            }
            tracing::info!("shutting down");
        })
        .await
        .expect("server error");
}
