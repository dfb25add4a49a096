use std::{fs, io, path::Path, sync::Arc};

use anyhow::{Context, anyhow};
use rustls::{
    ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer},
};
use serde::{Deserialize, Serialize};
use tokio_rustls::TlsAcceptor;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to the TLS certificate chain in PEM format.
    pub cert_path: String,
    /// Path to the TLS private key in PEM format.
    pub key_path: String,
}

/// Build a TLS acceptor advertising `h2` and `http/1.1`.
pub fn load_tls_acceptor(config: &TlsConfig) -> anyhow::Result<TlsAcceptor> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let certs = load_certs(&config.cert_path)?;
    let key = load_private_key(&config.key_path)?;

    let mut server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid certificate or key")?;

    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn open(path: &str) -> anyhow::Result<io::BufReader<fs::File>> {
    let file = fs::File::open(Path::new(path)).with_context(|| format!("failed to open {path}"))?;
    Ok(io::BufReader::new(file))
}

fn load_certs(path: &str) -> anyhow::Result<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse certificates in {path}"))?;

    if certs.is_empty() {
        return Err(anyhow!("no certificates found in {path}"));
    }
    Ok(certs)
}

fn load_private_key(path: &str) -> anyhow::Result<PrivateKeyDer<'static>> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .with_context(|| format!("failed to parse private key in {path}"))?
        .ok_or_else(|| anyhow!("no private key found in {path}"))
}
