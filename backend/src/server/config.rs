//! HTTP server configuration object and helpers.

use std::net::SocketAddr;
use std::time::Duration;

use actix_web::cookie::{Key, SameSite};
use camino::Utf8PathBuf;
use platelist::outbound::persistence::DbPool;

const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder-style configuration for creating the HTTP server.
pub struct ServerConfig {
    pub(crate) key: Key,
    pub(crate) cookie_secure: bool,
    pub(crate) same_site: SameSite,
    pub(crate) bind_addr: SocketAddr,
    pub(crate) db_pool: Option<DbPool>,
    pub(crate) snapshot_path: Utf8PathBuf,
    pub(crate) refresh_interval: Option<Duration>,
    pub(crate) refresh_timeout: Duration,
    pub(crate) admin_token: Option<String>,
}

impl ServerConfig {
    /// Construct a server configuration from session and binding preferences.
    ///
    /// Records live in memory and periodic refresh is off until the
    /// corresponding builders are called.
    #[must_use]
    pub fn new(
        key: Key,
        cookie_secure: bool,
        same_site: SameSite,
        bind_addr: SocketAddr,
        snapshot_path: Utf8PathBuf,
    ) -> Self {
        Self {
            key,
            cookie_secure,
            same_site,
            bind_addr,
            db_pool: None,
            snapshot_path,
            refresh_interval: None,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            admin_token: None,
        }
    }

    /// Attach a database connection pool.
    ///
    /// When provided, records are read and written through PostgreSQL
    /// instead of the in-memory store.
    #[must_use]
    pub fn with_db_pool(mut self, pool: DbPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    /// Refresh the snapshot every `interval`; `None` leaves only the admin
    /// trigger.
    #[must_use]
    pub fn with_refresh(mut self, interval: Option<Duration>, timeout: Duration) -> Self {
        self.refresh_interval = interval;
        self.refresh_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token;
        self
    }

    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn base() -> ServerConfig {
        ServerConfig::new(
            Key::generate(),
            false,
            SameSite::Lax,
            SocketAddr::from(([127, 0, 0, 1], 0)),
            Utf8PathBuf::from("snapshot.json"),
        )
    }

    #[rstest]
    fn defaults_disable_periodic_refresh_and_admin() {
        let config = base();
        assert!(config.db_pool.is_none());
        assert!(config.refresh_interval.is_none());
        assert_eq!(config.refresh_timeout, DEFAULT_REFRESH_TIMEOUT);
        assert!(config.admin_token.is_none());
        assert_eq!(config.bind_addr().ip().to_string(), "127.0.0.1");
    }

    #[rstest]
    fn builders_override_refresh_and_admin() {
        let config = base()
            .with_refresh(Some(Duration::from_secs(60)), Duration::from_secs(5))
            .with_admin_token(Some("secret".to_owned()));
        assert_eq!(config.refresh_interval, Some(Duration::from_secs(60)));
        assert_eq!(config.refresh_timeout, Duration::from_secs(5));
        assert_eq!(config.admin_token.as_deref(), Some("secret"));
    }
}
