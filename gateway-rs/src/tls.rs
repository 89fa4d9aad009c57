//! TLS configuration and certificate loading
//!
//! The external listener terminates TLS with a certificate/key pair from
//! disk. Upstream connections are verified against the internal CA bundle.

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use crate::error::{GatewayError, Result};

/// TLS manager for the external listener
pub struct TlsManager {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl TlsManager {
    /// Create a new TLS manager
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// Build a TLS acceptor from the certificate and key files
    pub fn build_acceptor(&self) -> Result<TlsAcceptor> {
        let server_config = self.build_server_config()?;
        Ok(TlsAcceptor::from(Arc::new(server_config)))
    }

    fn build_server_config(&self) -> Result<ServerConfig> {
        info!(
            "Loading TLS certificate from {} and {}",
            self.cert_path.display(),
            self.key_path.display()
        );

        let certs = load_certs(&self.cert_path)?;
        let key = load_private_key(&self.key_path)?;

        let mut config = ServerConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()
            .map_err(|e| GatewayError::Tls(format!("TLS config error: {}", e)))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| GatewayError::Tls(format!("TLS config error: {}", e)))?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(config)
    }
}

/// Client configuration for upstream connections.
///
/// Without a CA bundle the root store is empty and every https upstream
/// fails verification.
pub fn upstream_client_config(ca_path: Option<&Path>) -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    match ca_path {
        Some(path) => {
            for cert in load_certs(path)? {
                roots.add(cert).map_err(|e| {
                    GatewayError::Tls(format!("Invalid CA certificate in {}: {}", path.display(), e))
                })?;
            }
            info!("Loaded {} upstream CA certificate(s) from {}", roots.len(), path.display());
        }
        None => warn!("No upstream CA bundle configured, https upstreams cannot be verified"),
    }

    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| GatewayError::Tls(format!("TLS config error: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(config)
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        GatewayError::Tls(format!("Failed to open certificate file {}: {}", path.display(), e))
    })?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GatewayError::Tls(format!("Failed to read certificates: {}", e)))?;

    if certs.is_empty() {
        return Err(GatewayError::Tls(format!(
            "No certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| {
        GatewayError::Tls(format!("Failed to open key file {}: {}", path.display(), e))
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| GatewayError::Tls(format!("Failed to read private key: {}", e)))?
        .ok_or_else(|| GatewayError::Tls(format!("No private key found in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn pem_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn self_signed() -> (NamedTempFile, NamedTempFile) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        (
            pem_file(&cert.cert.pem()),
            pem_file(&cert.key_pair.serialize_pem()),
        )
    }

    #[test]
    fn test_build_acceptor() {
        let (cert, key) = self_signed();
        let manager = TlsManager::new(cert.path(), key.path());
        assert!(manager.build_acceptor().is_ok());
    }

    #[test]
    fn test_missing_certificate_file() {
        let (_, key) = self_signed();
        let manager = TlsManager::new("/nonexistent/api.cert", key.path());
        assert!(matches!(manager.build_acceptor(), Err(GatewayError::Tls(_))));
    }

    #[test]
    fn test_key_file_without_key() {
        let (cert, _) = self_signed();
        let manager = TlsManager::new(cert.path(), cert.path());
        assert!(manager.build_acceptor().is_err());
    }

    #[test]
    fn test_empty_certificate_file() {
        let empty = pem_file("");
        assert!(load_certs(empty.path()).is_err());
    }

    #[test]
    fn test_upstream_client_config_with_ca() {
        let (cert, _) = self_signed();
        assert!(upstream_client_config(Some(cert.path())).is_ok());
    }

    #[test]
    fn test_upstream_client_config_without_ca() {
        assert!(upstream_client_config(None).is_ok());
    }
}
