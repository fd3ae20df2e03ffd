//! Configuration loading and validation for the password service.
//!
//! Values are read from a JSON file and may be overridden by environment
//! variables prefixed with `ACCIOPASSWORD_`, using `__` to reach nested keys
//! (e.g. `ACCIOPASSWORD_SERVER__ADDRESS=127.0.0.1:8443`). The process exits with
//! a clear error message if any required value is missing or invalid.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Listener and TLS settings. **Required.**
    pub server: ServerConfig,

    /// Counter database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Link to the privacy policy, sent on every response. **Required.**
    pub privacy_policy: String,

    /// Link to the terms of service, sent on every response. **Required.**
    pub terms_of_service: String,

    /// Logging and trace export.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// `host:port` the HTTPS listener binds to. The host may be a name or
    /// empty (all interfaces).
    #[serde(default = "default_address")]
    pub address: String,

    /// Path of the PID file written while the server runs.
    #[serde(default = "default_pid")]
    pub pid: PathBuf,

    /// Seconds in-flight requests get to finish after a shutdown signal.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// Certificate material. **Required.**
    pub tls: TlsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Filesystem path to the PEM-encoded certificate chain.
    pub certificate: PathBuf,

    /// Filesystem path to the PEM-encoded private key.
    pub key: PathBuf,

    /// Minimum protocol version accepted from clients.
    #[serde(default)]
    pub version: TlsVersion,
}

/// Minimum TLS version; selects the server's TLS profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum TlsVersion {
    /// TLS 1.2 and 1.3 ("intermediate").
    #[serde(rename = "1.2", alias = "TLS12")]
    Tls12,
    /// TLS 1.3 only ("modern").
    #[default]
    #[serde(rename = "1.3", alias = "TLS13")]
    Tls13,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx SQLite connection string.
    #[serde(default = "default_dsn")]
    pub dsn: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { dsn: default_dsn() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Tracing log level (e.g. `"info"`, `"debug"`). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP/gRPC collector endpoint. Spans are only exported when set.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:1997".into()
}
fn default_pid() -> PathBuf {
    PathBuf::from("/var/run/acciopassword.pid")
}
fn default_shutdown_grace() -> u64 {
    5
}
fn default_dsn() -> String {
    "sqlite:///var/share/acciopassword/sqlite.db".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from `path` plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, a required value is absent,
    /// or validation fails.
    pub fn load(path: &Path) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json))
            .add_source(
                config::Environment::with_prefix("ACCIOPASSWORD")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Bindable form of `server.address`: an empty host means all interfaces.
    pub fn listen_address(&self) -> String {
        match self.server.address.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.server.address.clone(),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_grace_secs)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_host_port(&self.server.address, "server.address")?;
        ensure_non_empty(
            &self.server.tls.certificate.to_string_lossy(),
            "server.tls.certificate",
        )?;
        ensure_non_empty(&self.server.tls.key.to_string_lossy(), "server.tls.key")?;
        ensure_non_empty(&self.database.dsn, "database.dsn")?;
        ensure_link(&self.privacy_policy, "privacy_policy")?;
        ensure_link(&self.terms_of_service, "terms_of_service")?;

        if self.server.shutdown_grace_secs == 0 {
            anyhow::bail!("server.shutdown_grace_secs must be > 0");
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

fn ensure_host_port(value: &str, name: &str) -> Result<()> {
    let Some((host, port)) = value.rsplit_once(':') else {
        anyhow::bail!("{name} {value:?} must be in host:port form");
    };
    if host.contains(char::is_whitespace) {
        anyhow::bail!("{name} {value:?} has an invalid host");
    }
    port.parse::<u16>()
        .with_context(|| format!("{name} {value:?} has an invalid port"))?;
    Ok(())
}

fn ensure_link(value: &str, name: &str) -> Result<()> {
    ensure_non_empty(value, name)?;
    url::Url::parse(value).with_context(|| format!("{name} is not a valid URL"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> Config {
        Config {
            server: ServerConfig {
                address: default_address(),
                pid: default_pid(),
                shutdown_grace_secs: default_shutdown_grace(),
                tls: TlsConfig {
                    certificate: "/etc/acciopassword/cert.pem".into(),
                    key: "/etc/acciopassword/key.pem".into(),
                    version: TlsVersion::default(),
                },
            },
            database: DatabaseConfig::default(),
            privacy_policy: "https://example.com/privacy".into(),
            terms_of_service: "https://example.com/terms".into(),
            telemetry: TelemetryConfig::default(),
        }
    }

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_address(), "0.0.0.0:1997");
        assert_eq!(default_shutdown_grace(), 5);
        assert_eq!(default_log_level(), "info");
        assert!(default_dsn().starts_with("sqlite://"));
        assert_eq!(TlsVersion::default(), TlsVersion::Tls13);
    }

    #[test]
    fn validate_accepts_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_address() {
        for address in ["localhost", "localhost:http", "127.0.0.1:70000", "my host:1997"] {
            let mut cfg = valid();
            cfg.server.address = address.into();
            assert!(cfg.validate().is_err(), "{address}");
        }
    }

    #[test]
    fn host_names_and_empty_hosts_are_accepted() {
        let mut cfg = valid();
        cfg.server.address = "localhost:1997".into();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.listen_address(), "localhost:1997");

        cfg.server.address = ":1997".into();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.listen_address(), "0.0.0.0:1997");

        cfg.server.address = "[::1]:1997".into();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.listen_address(), "[::1]:1997");
    }

    #[test]
    fn validate_rejects_missing_key_path() {
        let mut cfg = valid();
        cfg.server.tls.key = PathBuf::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_malformed_policy_link() {
        let mut cfg = valid();
        cfg.terms_of_service = "not a url".into();
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.privacy_policy = "  ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_grace() {
        let mut cfg = valid();
        cfg.server.shutdown_grace_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_reads_json_and_applies_defaults() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "server": {{
                    "address": "127.0.0.1:8443",
                    "tls": {{ "certificate": "cert.pem", "key": "key.pem", "version": "1.2" }}
                }},
                "privacy_policy": "https://example.com/privacy",
                "terms_of_service": "https://example.com/terms"
            }}"#
        )
        .unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.listen_address(), "127.0.0.1:8443");
        assert_eq!(cfg.server.tls.version, TlsVersion::Tls12);
        assert_eq!(cfg.server.shutdown_grace_secs, 5);
        assert_eq!(cfg.database.dsn, default_dsn());
        assert!(cfg.telemetry.otlp_endpoint.is_none());
    }

    #[test]
    fn load_rejects_missing_tls_section() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{ "server": {{}}, "privacy_policy": "https://a.example", "terms_of_service": "https://b.example" }}"#
        )
        .unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn tls_version_accepts_aliases() {
        let v: TlsVersion = serde_json::from_str(r#""TLS12""#).unwrap();
        assert_eq!(v, TlsVersion::Tls12);
        let v: TlsVersion = serde_json::from_str(r#""1.3""#).unwrap();
        assert_eq!(v, TlsVersion::Tls13);
        assert!(serde_json::from_str::<TlsVersion>(r#""1.1""#).is_err());
    }
}
