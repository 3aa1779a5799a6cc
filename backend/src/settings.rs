//! Application settings loaded via OrthoConfig.
//!
//! Values layer CLI flags over `PLATELIST_*` environment variables over an
//! optional config file. Unset values fall back to the defaults below.

use std::net::SocketAddr;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;

const DEFAULT_BIND_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 8080);
const DEFAULT_SNAPSHOT_PATH: &str = "var/restaurant_snapshot.json";
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SESSION_KEY_FILE: &str = "/var/run/secrets/session_key";

/// Runtime configuration for the API server.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PLATELIST")]
pub struct AppSettings {
    /// Socket address to listen on.
    pub bind_addr: Option<SocketAddr>,
    /// PostgreSQL URL. Without one, records live in memory.
    pub database_url: Option<String>,
    /// Where the last published snapshot is persisted.
    pub snapshot_path: Option<String>,
    /// Seconds between background refreshes; `0` disables the timer.
    pub refresh_interval_secs: Option<u64>,
    /// Upper bound for one snapshot pull.
    pub refresh_timeout_secs: Option<u64>,
    /// Token for the admin routes. Absent disables them.
    pub admin_token: Option<String>,
    /// File holding the session signing key material.
    pub session_key_file: Option<String>,
    /// Generate a throwaway session key when the key file is unreadable.
    #[ortho_config(default = false)]
    pub session_allow_ephemeral: bool,
    /// Drop the `Secure` flag from session cookies (local HTTP only).
    #[ortho_config(default = false)]
    pub cookie_insecure: bool,
}

impl AppSettings {
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr.unwrap_or(DEFAULT_BIND_ADDR)
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref().filter(|url| !url.trim().is_empty())
    }

    pub fn snapshot_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(
            self.snapshot_path
                .as_deref()
                .unwrap_or(DEFAULT_SNAPSHOT_PATH),
        )
    }

    /// Refresh period, or `None` when periodic refresh is switched off.
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self
            .refresh_interval_secs
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS)
        {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(
            self.refresh_timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_REFRESH_TIMEOUT_SECS),
        )
    }

    pub fn session_key_file(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(
            self.session_key_file
                .as_deref()
                .unwrap_or(DEFAULT_SESSION_KEY_FILE),
        )
    }

    pub fn cookie_secure(&self) -> bool {
        !self.cookie_insecure
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for settings parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 9] = [
        "PLATELIST_BIND_ADDR",
        "PLATELIST_DATABASE_URL",
        "PLATELIST_SNAPSHOT_PATH",
        "PLATELIST_REFRESH_INTERVAL_SECS",
        "PLATELIST_REFRESH_TIMEOUT_SECS",
        "PLATELIST_ADMIN_TOKEN",
        "PLATELIST_SESSION_KEY_FILE",
        "PLATELIST_SESSION_ALLOW_EPHEMERAL",
        "PLATELIST_COOKIE_INSECURE",
    ];

    fn load_from_empty_args() -> AppSettings {
        AppSettings::load_from_iter([OsString::from("platelist")]).expect("config should load")
    }

    fn cleared_except(overrides: &[(&'static str, &str)]) -> Vec<(&'static str, Option<String>)> {
        VARS.iter()
            .map(|name| {
                let value = overrides
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| (*value).to_owned());
                (*name, value)
            })
            .collect()
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env(cleared_except(&[]));

        let settings = load_from_empty_args();
        assert_eq!(settings.bind_addr(), DEFAULT_BIND_ADDR);
        assert!(settings.database_url().is_none());
        assert_eq!(settings.snapshot_path(), Utf8PathBuf::from(DEFAULT_SNAPSHOT_PATH));
        assert_eq!(
            settings.refresh_interval(),
            Some(Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS))
        );
        assert_eq!(
            settings.refresh_timeout(),
            Duration::from_secs(DEFAULT_REFRESH_TIMEOUT_SECS)
        );
        assert!(settings.admin_token.is_none());
        assert!(!settings.session_allow_ephemeral);
        assert!(settings.cookie_secure());
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env(cleared_except(&[
            ("PLATELIST_BIND_ADDR", "127.0.0.1:9090"),
            ("PLATELIST_DATABASE_URL", "postgres://localhost/platelist"),
            ("PLATELIST_SNAPSHOT_PATH", "/tmp/snapshot.json"),
            ("PLATELIST_REFRESH_TIMEOUT_SECS", "5"),
            ("PLATELIST_ADMIN_TOKEN", "hunter2"),
            ("PLATELIST_COOKIE_INSECURE", "true"),
        ]));

        let settings = load_from_empty_args();
        assert_eq!(settings.bind_addr().port(), 9090);
        assert_eq!(
            settings.database_url(),
            Some("postgres://localhost/platelist")
        );
        assert_eq!(settings.snapshot_path(), Utf8PathBuf::from("/tmp/snapshot.json"));
        assert_eq!(settings.refresh_timeout(), Duration::from_secs(5));
        assert_eq!(settings.admin_token.as_deref(), Some("hunter2"));
        assert!(!settings.cookie_secure());
    }

    #[rstest]
    #[case("0", None)]
    #[case("60", Some(Duration::from_secs(60)))]
    fn refresh_interval_zero_disables_timer(
        #[case] raw: &str,
        #[case] expected: Option<Duration>,
    ) {
        let _guard = lock_env(cleared_except(&[("PLATELIST_REFRESH_INTERVAL_SECS", raw)]));

        assert_eq!(load_from_empty_args().refresh_interval(), expected);
    }

    #[rstest]
    fn blank_database_url_means_in_memory() {
        let _guard = lock_env(cleared_except(&[("PLATELIST_DATABASE_URL", "  ")]));

        assert!(load_from_empty_args().database_url().is_none());
    }
}
