//! Agent Admission Service
//!
//! Entry point. Wires the Postgres lock store, admission controller, agent
//! connector client, webhook dispatcher, and background sweeper behind an
//! Axum server.

use admission_service::config::Config;
use admission_service::observability::metrics::init_metrics_recorder;
use admission_service::repositories::PgLockStore;
use admission_service::routes::{self, AppState};
use admission_service::services::{
    AdmissionController, AdmissionPolicy, AgentConnectService, AttachPolicy, EventDispatcher,
    HttpAgentAttacher, RateLimiter,
};
use admission_service::tasks::{start_ticket_sweeper, TicketSweeperConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Statement timeout applied to every database session.
const DB_STATEMENT_TIMEOUT_SECS: u32 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting Agent Admission Service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        admission_min_interval_ms = config.admission_min_interval_ms,
        ticket_max_age_seconds = config.ticket_max_age_seconds,
        in_progress_max_age_seconds = config.in_progress_max_age_seconds,
        attach_max_attempts = config.attach_max_attempts,
        "Configuration loaded successfully"
    );

    if config.webhook_secret.is_none() {
        warn!("WEBHOOK_VERIFY=false; webhook signatures will not be verified");
    }

    // Initialize Prometheus metrics recorder
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    // Initialize database connection pool with query timeout
    info!("Connecting to database...");
    let db_url_with_timeout = add_query_timeout(&config.database_url, DB_STATEMENT_TIMEOUT_SECS);
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_url_with_timeout)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    info!("Database connection established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| {
            error!("Failed to run database migrations: {}", e);
            e
        })?;

    // Build the service graph
    let store = Arc::new(PgLockStore::new(db_pool, config.instance_id.clone()));
    let controller = Arc::new(AdmissionController::new(
        store,
        RateLimiter::new(config.rate_limit_horizon()),
        AdmissionPolicy::from_config(&config),
    ));

    let attacher = HttpAgentAttacher::new(
        config.agent_connector_url.clone(),
        config.attach_timeout(),
    )
    .map_err(|e| {
        error!("Failed to create agent connector client: {}", e);
        e
    })?;

    let connect = Arc::new(AgentConnectService::new(
        controller.clone(),
        Arc::new(attacher),
        AttachPolicy::from_config(&config),
    ));
    let dispatcher = Arc::new(EventDispatcher::new(
        connect.clone(),
        config.default_agent_id.clone(),
    ));

    // Start the background sweeper
    let cancel_token = CancellationToken::new();
    let sweeper_handle = if config.sweep_enabled {
        Some(tokio::spawn(start_ticket_sweeper(
            controller.clone(),
            TicketSweeperConfig::from_config(&config),
            cancel_token.child_token(),
        )))
    } else {
        info!("In-process sweeper disabled; expecting external calls to /internal/sweep");
        None
    };

    let bind_address = config.bind_address.clone();

    let state = Arc::new(AppState {
        config,
        controller,
        connect,
        dispatcher,
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Agent Admission Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown_token = cancel_token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_token.cancel();
        })
        .await?;

    // Stop background tasks even if the server exited on its own
    cancel_token.cancel();
    if let Some(handle) = sweeper_handle {
        if let Err(e) = handle.await {
            warn!("Ticket sweeper task ended abnormally: {}", e);
        }
    }

    info!("Agent Admission Service shutdown complete");

    Ok(())
}

/// Initialize tracing. `LOG_FORMAT=json` switches to JSON output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "admission_service=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    // Graceful shutdown drain period
    let drain_secs: u64 = std::env::var("DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    }
}

/// Adds statement_timeout to the database URL.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}s",
        url, separator, timeout_secs
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_query_timeout() {
        assert_eq!(
            add_query_timeout("postgresql://localhost/admission", 5),
            "postgresql://localhost/admission?options=-c%20statement_timeout%3D5s"
        );
        assert_eq!(
            add_query_timeout("postgresql://localhost/admission?sslmode=require", 5),
            "postgresql://localhost/admission?sslmode=require&options=-c%20statement_timeout%3D5s"
        );
    }
}
