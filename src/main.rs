use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use waitlist_backend::{
    build_router,
    config::{AppConfig, DatabaseBackend},
    newsletter::{BeehiivClient, NewsletterClient, NoopNewsletterClient},
    rate_limit::{RateLimitQuota, RateLimiter},
    repository::{InMemoryWaitlistRepository, PgWaitlistRepository, WaitlistRepository},
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env().context("failed to load application configuration")?;

    let repository: Arc<dyn WaitlistRepository> = match config.database_backend {
        DatabaseBackend::Postgres => {
            info!("database backend: postgres");
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(&config.database_url)
                .await
                .context("failed to connect to PostgreSQL")?;
            Arc::new(PgWaitlistRepository::new(pool))
        }
        DatabaseBackend::Memory => {
            info!("database backend: in-memory (state is lost on restart)");
            Arc::new(InMemoryWaitlistRepository::new())
        }
    };

    repository
        .init()
        .await
        .context("failed to initialize waitlist schema")?;

    let newsletter: Arc<dyn NewsletterClient> = match &config.newsletter_api_key {
        Some(api_key) => {
            info!("newsletter sync: enabled");
            Arc::new(BeehiivClient::new(
                config.newsletter_api_url.clone(),
                config.newsletter_publication_id.clone(),
                api_key.clone(),
            ))
        }
        None => {
            info!("newsletter sync: disabled (NEWSLETTER_API_KEY not set)");
            Arc::new(NoopNewsletterClient)
        }
    };

    let rate_limiter = Arc::new(RateLimiter::new(RateLimitQuota {
        limit: config.rate_limit_max,
        window: config.rate_limit_window,
    }));
    // Guard aborts the sweep task when main returns.
    let _sweeper = rate_limiter.spawn_sweeper(Duration::from_secs(60));

    let app = build_router(AppState::new(repository, newsletter, rate_limiter));

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(address = %addr, "waitlist backend started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("waitlist_backend=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
