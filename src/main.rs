use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vibe_pilot::automation::{AgentCommand, GhCli, Orchestrator};
use vibe_pilot::config::AppConfig;
use vibe_pilot::server::{AppState, build_router};
use vibe_pilot::store::EventStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vibe_pilot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let store = match EventStore::open(&config.database_path) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(
                path = %config.database_path.display(),
                "failed to open event store: {e}"
            );
            std::process::exit(1);
        }
    };

    // One token for the whole process: ctrl-c aborts an in-flight coding
    // agent invocation as a stage failure and stops the listener.
    let shutdown = CancellationToken::new();

    let agent = Arc::new(AgentCommand::new(config.agent.clone(), shutdown.clone()));
    let publisher = Arc::new(GhCli::new(config.pr_timeout));
    let orchestrator = Orchestrator::new(config.orchestrator.clone(), agent, publisher);

    let bind_addr = config.bind_addr;
    let app_state = AppState::new(config, store, orchestrator);
    let app = build_router(app_state);

    tracing::info!("listening on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .unwrap();
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        return;
    }
    tracing::info!("shutdown requested");
    shutdown.cancel();
}
