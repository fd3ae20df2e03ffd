//! TLS setup using rustls with the `ring` provider.
//!
//! Two profiles are offered, chosen by the configured minimum version:
//! "modern" accepts TLS 1.3 only, "intermediate" accepts TLS 1.2 and 1.3
//! with rustls' default forward-secret AEAD suites.

use std::{io::BufReader, path::PathBuf, sync::Arc};

use rustls::ServerConfig;
use thiserror::Error;

use crate::config::{TlsConfig, TlsVersion};

/// Errors that prevent the TLS listener from being configured.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TLS certificate chain: {0}")]
    Certificate(#[source] std::io::Error),

    #[error("no certificate found in PEM data")]
    NoCertificates,

    #[error("failed to read TLS private key: {0}")]
    Key(#[source] std::io::Error),

    #[error("no private key found in PEM data")]
    MissingKey,

    #[error("rustls rejected the configuration: {0}")]
    Rejected(#[from] rustls::Error),
}

/// Read the certificate and key named by `tls` and build the server config.
///
/// # Errors
///
/// Returns [`TlsError`] if either file is unreadable or the material is invalid.
pub fn load(tls: &TlsConfig) -> Result<Arc<ServerConfig>, TlsError> {
    let read = |path: &PathBuf| {
        std::fs::read(path).map_err(|source| TlsError::Read {
            path: path.clone(),
            source,
        })
    };
    build_server_config(&read(&tls.certificate)?, &read(&tls.key)?, tls.version)
}

/// Build a [`rustls::ServerConfig`] from PEM-encoded certificate and private key bytes.
///
/// # Errors
///
/// Returns an error if the certificate or key cannot be parsed, or if rustls
/// rejects the configuration.
pub fn build_server_config(
    cert_pem: &[u8],
    key_pem: &[u8],
    version: TlsVersion,
) -> Result<Arc<ServerConfig>, TlsError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsError::Certificate)?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates);
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem))
        .map_err(TlsError::Key)?
        .ok_or(TlsError::MissingKey)?;

    let versions: &[&'static rustls::SupportedProtocolVersion] = match version {
        TlsVersion::Tls13 => &[&rustls::version::TLS13],
        TlsVersion::Tls12 => &[&rustls::version::TLS13, &rustls::version::TLS12],
    };

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_protocol_versions(versions)?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}
