//! PEM loading for the QUIC endpoints.

use std::path::Path;
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::CsiError;

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, CsiError> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .map_err(|e| CsiError::TransportError(format!("read {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(CsiError::TransportError(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Build the server TLS config from a PEM certificate chain and private key.
pub fn load_server_tls(cert: &Path, key: &Path) -> Result<rustls::ServerConfig, CsiError> {
    let chain = read_certs(cert)?;
    let key = PrivateKeyDer::from_pem_file(key)
        .map_err(|e| CsiError::TransportError(format!("read {}: {e}", key.display())))?;

    rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(|e| CsiError::TransportError(format!("invalid server certificate: {e}")))
}

/// Build a client TLS config trusting the CA certificates in `ca`.
pub fn load_client_tls(ca: &Path) -> Result<rustls::ClientConfig, CsiError> {
    let mut roots = RootCertStore::empty();
    for cert in read_certs(ca)? {
        roots
            .add(cert)
            .map_err(|e| CsiError::TransportError(format!("invalid CA certificate: {e}")))?;
    }
    Ok(rustls::ClientConfig::builder()
        .with_root_certificates(Arc::new(roots))
        .with_no_client_auth())
}
