//! TLS material for the secure listener.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::error::StartupError;

/// Build a TLS acceptor from a PEM certificate chain and private key.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, StartupError> {
    info!(cert = %cert_path.display(), key = %key_path.display(), "Loading TLS certificate and key");
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| StartupError::TlsMaterial(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| StartupError::TlsMaterial(e.to_string()))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Loads TLS certificates from a PEM file.
fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, StartupError> {
    let file = File::open(path).map_err(|e| {
        StartupError::TlsMaterial(format!(
            "failed to open certificate file '{}': {}",
            path.display(),
            e
        ))
    })?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StartupError::TlsMaterial(format!("invalid certificate PEM: {e}")))?;
    if certs.is_empty() {
        return Err(StartupError::TlsMaterial(format!(
            "no certificates found in '{}'",
            path.display()
        )));
    }
    Ok(certs)
}

/// Loads a private key from a PEM file.
fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, StartupError> {
    let file = File::open(path).map_err(|e| {
        StartupError::TlsMaterial(format!(
            "failed to open private key file '{}': {}",
            path.display(),
            e
        ))
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| StartupError::TlsMaterial(format!("invalid private key PEM: {e}")))?
        .ok_or_else(|| {
            StartupError::TlsMaterial(format!("no private key found in '{}'", path.display()))
        })
}
