//! School messaging reference server.
//!
//! Serves the messaging REST API over the in-memory backend. Useful for
//! local development of clients and for end-to-end tests; conversations and
//! files live only as long as the process.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use school_messaging::adapters::{messaging_router, InMemoryMessagingBackend, MessagingAppState};
use school_messaging::config::{AppConfig, Environment, LogFormat};
use school_messaging::domain::foundation::{EstablishmentId, UserId};
use school_messaging::domain::messaging::{Role, UserSummary};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_level))?;
    match config.server.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    config.validate()?;
    let addr = config.server.socket_addr()?;

    let backend = InMemoryMessagingBackend::new(config.server.public_base_url())
        .with_upload_policy(config.upload.policy());
    if config.server.environment == Environment::Development {
        seed_demo_directory(&backend)?;
        info!("Seeded demo users; authenticate with `Bearer <user id>`");
    }

    let state = MessagingAppState::new(Arc::new(backend));
    let app = messaging_router(state, config.server.request_timeout());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, environment = ?config.server.environment, "Messaging server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Messaging server stopped");
    Ok(())
}

/// One user per role, two establishments.
fn seed_demo_directory(
    backend: &InMemoryMessagingBackend,
) -> Result<(), Box<dyn std::error::Error>> {
    let north = EstablishmentId::new("north-campus")?;
    let south = EstablishmentId::new("south-campus")?;

    let users = [
        ("teacher-ana", "Ana Ruiz", Role::Teacher, vec![north.clone()]),
        ("teacher-ben", "Ben Okafor", Role::Teacher, vec![south.clone()]),
        ("student-carla", "Carla Diaz", Role::Student, vec![north.clone()]),
        ("student-dev", "Dev Patel", Role::Student, vec![south.clone()]),
        ("parent-eli", "Eli Novak", Role::Parent, vec![north.clone()]),
        ("staff-fay", "Fay Moreau", Role::Staff, vec![north.clone(), south.clone()]),
        ("admin-gus", "Gus Lind", Role::Superadmin, vec![north, south]),
    ];
    for (id, name, role, establishments) in users {
        let user = UserSummary::new(
            UserId::new(id)?,
            Some(name.to_string()),
            format!("{}@school.test", id),
            role,
        );
        backend.add_user(user, establishments);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
