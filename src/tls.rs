use std::fs::File;
use std::io::{self, BufReader};
use std::sync::Arc;

use pgwire::tokio::tokio_rustls::rustls::{self, ServerConfig};
use pgwire::tokio::TlsAcceptor;
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("both SLOTGUARD_TLS_CERT and SLOTGUARD_TLS_KEY must be set, or neither")]
    Incomplete,
    #[error("reading {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("no private key found in {0}")]
    NoKey(String),
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// TLS acceptor for the configured certificate pair, or `None` when TLS is
/// not configured.
pub fn load_tls_acceptor(config: &Config) -> Result<Option<TlsAcceptor>, TlsError> {
    let (cert_path, key_path) = match (config.tls_cert.as_deref(), config.tls_key.as_deref()) {
        (None, None) => return Ok(None),
        (Some(c), Some(k)) => (c, k),
        _ => return Err(TlsError::Incomplete),
    };

    let read_err = |path: &str| {
        let path = path.to_string();
        move |source| TlsError::Read { path, source }
    };

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(
        File::open(cert_path).map_err(read_err(cert_path))?,
    ))
    .collect::<Result<_, _>>()
    .map_err(read_err(cert_path))?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.to_string()));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(
        File::open(key_path).map_err(read_err(key_path))?,
    ))
    .map_err(read_err(key_path))?
    .ok_or_else(|| TlsError::NoKey(key_path.to_string()))?;

    let mut server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    server_config.alpn_protocols = vec![b"postgresql".to_vec()];

    Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
}
