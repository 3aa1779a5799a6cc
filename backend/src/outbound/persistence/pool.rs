//! bb8 pool of `diesel-async` PostgreSQL connections.
//!
//! The record store checks out one connection per operation; a checkout that
//! exceeds the configured timeout surfaces as [`PoolError::Checkout`], which
//! the adapter reports as the store being unavailable.

use std::time::Duration;

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};

/// Failures raised while building or using the pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("failed to check out a database connection: {message}")]
    Checkout { message: String },
    #[error("failed to build the database pool: {message}")]
    Build { message: String },
}

impl PoolError {
    pub fn checkout(message: impl Into<String>) -> Self {
        Self::Checkout {
            message: message.into(),
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }

    /// Human-readable detail without the variant prefix.
    pub fn into_message(self) -> String {
        match self {
            Self::Checkout { message } | Self::Build { message } => message,
        }
    }
}

/// Pool sizing and checkout limits.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use platelist::outbound::persistence::PoolConfig;
///
/// let config = PoolConfig::new("postgres://localhost/platelist")
///     .with_max_size(4)
///     .with_connection_timeout(Duration::from_secs(5));
/// assert_eq!(config.max_size(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    database_url: String,
    max_size: u32,
    min_idle: Option<u32>,
    connection_timeout: Duration,
}

impl PoolConfig {
    /// Defaults: 10 connections, 1 kept idle, 10 second checkout timeout.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_size: 10,
            min_idle: Some(1),
            connection_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_min_idle(mut self, min_idle: Option<u32>) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }
}

/// Cloneable handle to the shared pool.
#[derive(Clone)]
pub struct DbPool {
    inner: Pool<AsyncPgConnection>,
}

impl DbPool {
    /// Build the pool and open the initial idle connections.
    ///
    /// # Errors
    ///
    /// [`PoolError::Build`] when the URL is rejected or the first
    /// connections cannot be established.
    pub async fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(config.database_url);
        let inner = Pool::builder()
            .max_size(config.max_size)
            .min_idle(config.min_idle)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .await
            .map_err(|err| PoolError::build(err.to_string()))?;
        Ok(Self { inner })
    }

    /// Check out a connection, waiting at most the configured timeout.
    ///
    /// # Errors
    ///
    /// [`PoolError::Checkout`] when no connection becomes available in time.
    pub async fn get(&self) -> Result<PooledConnection<'_, AsyncPgConnection>, PoolError> {
        self.inner
            .get()
            .await
            .map_err(|err| PoolError::checkout(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn config_defaults_favour_small_deployments() {
        let config = PoolConfig::new("postgres://localhost/platelist");
        assert_eq!(config.database_url(), "postgres://localhost/platelist");
        assert_eq!(config.max_size(), 10);
        assert_eq!(config.min_idle, Some(1));
        assert_eq!(config.connection_timeout(), Duration::from_secs(10));
    }

    #[rstest]
    fn builders_override_each_limit() {
        let config = PoolConfig::new("postgres://db")
            .with_max_size(3)
            .with_min_idle(None)
            .with_connection_timeout(Duration::from_millis(250));
        assert_eq!(config.max_size(), 3);
        assert_eq!(config.min_idle, None);
        assert_eq!(config.connection_timeout(), Duration::from_millis(250));
    }

    #[rstest]
    #[case(PoolError::checkout("timed out"))]
    #[case(PoolError::build("bad url"))]
    fn into_message_drops_the_variant_prefix(#[case] err: PoolError) {
        let display = err.to_string();
        let message = err.into_message();
        assert!(display.ends_with(&message));
        assert!(!message.contains("database"));
    }
}
