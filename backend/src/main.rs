//! Backend entry-point: loads settings, prepares storage and serves the API.

mod server;

use actix_web::cookie::{Key, SameSite};
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use platelist::AppSettings;
use platelist::inbound::http::health::HealthState;
use platelist::outbound::persistence::{DbPool, PoolConfig, run_pending_migrations};
use server::{ServerConfig, create_server};

/// Read the session signing key, or fall back to a throwaway one in debug
/// builds and when explicitly allowed.
fn load_session_key(settings: &AppSettings) -> std::io::Result<Key> {
    let key_path = settings.session_key_file();
    match std::fs::read(&key_path) {
        Ok(bytes) => Ok(Key::derive_from(&bytes)),
        Err(e) => {
            if cfg!(debug_assertions) || settings.session_allow_ephemeral {
                warn!(path = %key_path, error = %e, "using temporary session key (dev only)");
                Ok(Key::generate())
            } else {
                Err(std::io::Error::other(format!(
                    "failed to read session key at {key_path}: {e}"
                )))
            }
        }
    }
}

/// Apply migrations and open the connection pool.
async fn connect_database(database_url: &str) -> std::io::Result<DbPool> {
    let url = database_url.to_owned();
    let applied = tokio::task::spawn_blocking(move || run_pending_migrations(&url))
        .await
        .map_err(|e| std::io::Error::other(format!("migration task failed: {e}")))?
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    info!(applied, "database migrations complete");

    DbPool::new(PoolConfig::new(database_url))
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))
}

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = AppSettings::load_from_iter(std::env::args_os())
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let key = load_session_key(&settings)?;

    let mut config = ServerConfig::new(
        key,
        settings.cookie_secure(),
        SameSite::Lax,
        settings.bind_addr(),
        settings.snapshot_path(),
    )
    .with_refresh(settings.refresh_interval(), settings.refresh_timeout())
    .with_admin_token(settings.admin_token.clone());

    if let Some(database_url) = settings.database_url() {
        config = config.with_db_pool(connect_database(database_url).await?);
    }

    info!(bind_addr = %config.bind_addr(), "starting platelist API");
    let server = create_server(HealthState::new(), config).await?;
    server.run().await
}
