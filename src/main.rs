use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use authgate::auth::AuthService;
use authgate::configuration::get_configuration;
use authgate::rate_limiter::RateLimiter;
use authgate::startup::run;
use authgate::store::{spawn_sweeper, PgAccountStore, PgSessionStore, SessionStore};
use authgate::telemetry::init_telemetry;

fn startup_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = get_configuration().map_err(|e| {
        tracing::error!(error = %e, "Failed to read configuration");
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    tracing::info!("Configuration loaded successfully");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(configuration.application.store_timeout())
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create connection pool");
            startup_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
        })?;
    tracing::info!("Database connection pool created successfully");

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to run migrations");
        startup_error(std::io::ErrorKind::Other, "Migration error")
    })?;

    let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool.clone()));
    let auth = AuthService::new(
        Arc::new(PgAccountStore::new(pool)),
        sessions.clone(),
        &configuration.jwt,
        &configuration.password,
        configuration.application.store_timeout(),
    )
    .map_err(|e| {
        tracing::error!(error = %e, "Invalid authentication settings");
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    let limiter = Arc::new(RateLimiter::from_settings(&configuration.rate_limit));

    let _sweeper = spawn_sweeper(sessions, configuration.application.sweep_interval());

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!(address = %address, "Server listening");

    run(listener, auth, limiter, configuration.application)?.await
}
