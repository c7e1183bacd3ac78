use std::{sync::Arc, time::Duration};
use tokio::time::interval;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backoffice_backend::{
    config::Config, router::build_router, services::user_directory::InMemoryUserDirectory,
    state::AppState,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backoffice_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!(
        jwt_secret = %mask_secret(&config.jwt_secret),
        access_token_ttl_minutes = config.access_token_ttl_minutes,
        session_ttl_hours = config.session_ttl_hours,
        production = config.production,
        bootstrap_users = config.bootstrap_users.len(),
        "Loaded configuration from environment/.env"
    );

    let users = InMemoryUserDirectory::from_bootstrap(&config.bootstrap_users)?;
    if users.is_empty() {
        tracing::warn!("No BOOTSTRAP_USERS configured; every login will be rejected");
    }
    let state = AppState::in_memory(config.clone(), Arc::new(users));

    let sweep_sessions = state.sessions.clone();
    let sweep_every = Duration::from_secs(config.session_sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = interval(sweep_every);
        loop {
            ticker.tick().await;
            let purged = sweep_sessions.sweep_expired().await;
            if purged > 0 {
                let active = sweep_sessions.session_count().await;
                tracing::info!(
                    purged,
                    active,
                    "Swept expired sessions"
                );
            }
        }
    });

    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
