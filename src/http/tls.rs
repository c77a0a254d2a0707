//! TLS acceptor construction from PEM files.

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

use crate::types::{Error, Result, TlsOptions};

/// Build an acceptor from a certificate chain and private key.
pub fn acceptor(options: &TlsOptions) -> Result<TlsAcceptor> {
    let certs = load_certs(&options.cert_path)?;
    let key = load_key(&options.key_path)?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::tls(format!("invalid certificate/key pair: {}", e)))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| Error::tls(format!("cannot open {}: {}", path.display(), e)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::tls(format!("bad certificate in {}: {}", path.display(), e)))?;
    if certs.is_empty() {
        return Err(Error::tls(format!("no certificates in {}", path.display())));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::tls(format!("bad private key in {}: {}", path.display(), e)))?
        .ok_or_else(|| Error::tls(format!("no private key in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_files() {
        let Err(err) = acceptor(&TlsOptions {
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
        }) else {
            panic!("acceptor built from missing files");
        };
        assert!(matches!(err, Error::Tls(msg) if msg.contains("cannot open")));
    }

    #[test]
    fn test_empty_certificate_file() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        writeln!(cert, "not a pem file").unwrap();

        let err = load_certs(cert.path()).unwrap_err();
        assert!(matches!(err, Error::Tls(msg) if msg.contains("no certificates")));
    }

    #[test]
    fn test_missing_private_key() {
        let key = tempfile::NamedTempFile::new().unwrap();

        let err = load_key(key.path()).unwrap_err();
        assert!(matches!(err, Error::Tls(msg) if msg.contains("no private key")));
    }
}
