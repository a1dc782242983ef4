use adapter::database::connect_database_with;
use anyhow::{Context, Result};
use api::route::v1;
use axum::Router;
use kernel::{
    clock::SystemClock,
    model::{id::UserId, role::Role, user::UserRecord},
};
use registry::AppRegistry;
use shared::config::{AppConfig, StorageConfig};
use shared::env::{which, Environment};
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_logger()?;
    bootstrap().await
}

fn init_logger() -> Result<()> {
    let log_level = match which() {
        Environment::Development => "debug",
        Environment::Production => "info",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| log_level.into());

    let subscriber = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_target(false);

    tracing_subscriber::registry()
        .with(subscriber)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

async fn bootstrap() -> Result<()> {
    let app_config = AppConfig::new()?;

    let registry = match &app_config.storage {
        StorageConfig::Postgres(database) => {
            let pool = connect_database_with(database);
            pool.migrate()
                .await
                .context("Failed to apply database migrations")?;
            AppRegistry::new(pool, &app_config)
        }
        StorageConfig::InMemory { seed_admin } => {
            tracing::warn!("Using the in-memory store; data is lost on shutdown");
            let users = seed_admin
                .iter()
                .map(|email| UserRecord {
                    user_id: UserId::new(),
                    email: email.clone(),
                    display_name: email.clone(),
                    role: Some(Role::Admin.to_string()),
                    is_admin: None,
                    permissions: None,
                })
                .collect();
            AppRegistry::in_memory(
                users,
                Arc::new(SystemClock),
                app_config.review,
                app_config.settings,
            )
        }
    };

    let app = Router::new()
        .merge(v1::routes())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
        .with_state(registry);

    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 8080);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app)
        .await
        .context("Unexpected error happened in server")
        .inspect_err(|e| {
            tracing::error!(
                error.cause_chain = ?e,error.message = %e, "Unexpected error"
            )
        })
}
