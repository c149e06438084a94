//! Registry transport: a client-certificate TLS connection carrying
//! 4-byte length-prefixed frames, one request/response exchange at a time.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::config::TlsSettings;
use crate::registry::types::{Request, Response};

/// Upper bound on a single frame. The registry's responses are small; a
/// larger frame means a corrupt stream.
const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Length prefix is a big-endian u32 counting the whole frame, prefix
/// included.
const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS configuration error: {0}")]
    Tls(String),
    #[error("malformed frame: {0}")]
    BadFrame(String),
    #[error("transport is not connected")]
    NotConnected,
    #[error("wire encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The session layer talks to the registry through this seam so tests can
/// substitute a scripted transport.
#[async_trait]
pub trait RegistryTransport: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;
    async fn exchange(&mut self, request: &Request) -> Result<Response, TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
    fn is_connected(&self) -> bool;
}

/// Production transport: TLS with a client certificate over TCP.
pub struct TlsTransport {
    host: String,
    port: u16,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    stream: Option<TlsStream<TcpStream>>,
}

impl std::fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

impl TlsTransport {
    pub fn new(host: &str, port: u16, tls: &TlsSettings) -> Result<Self, TransportError> {
        let certs = load_certs(Path::new(&tls.certificate_path))?;
        let key = load_private_key(
            Path::new(&tls.private_key_path),
            tls.key_passphrase.as_deref(),
        )?;
        let roots = load_root_store(Path::new(&tls.ca_certificate_path))?;

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(|e| TransportError::Tls(format!("client certificate rejected: {e}")))?;

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| TransportError::Tls(format!("invalid registry hostname {host}: {e}")))?;

        Ok(Self {
            host: host.to_string(),
            port,
            server_name,
            connector: TlsConnector::from(Arc::new(config)),
            stream: None,
        })
    }

    async fn write_frame(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let total = payload.len() + FRAME_HEADER_LEN;
        if total > MAX_FRAME_SIZE {
            return Err(TransportError::BadFrame(format!(
                "outgoing frame of {total} bytes exceeds limit"
            )));
        }
        stream.write_all(&(total as u32).to_be_bytes()).await?;
        stream.write_all(payload).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<BytesMut, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let mut header = [0u8; FRAME_HEADER_LEN];
        stream.read_exact(&mut header).await?;
        let total = u32::from_be_bytes(header) as usize;
        if total <= FRAME_HEADER_LEN || total > MAX_FRAME_SIZE {
            return Err(TransportError::BadFrame(format!(
                "frame length {total} outside accepted bounds"
            )));
        }
        let mut payload = BytesMut::zeroed(total - FRAME_HEADER_LEN);
        stream.read_exact(&mut payload).await?;
        Ok(payload)
    }
}

#[async_trait]
impl RegistryTransport for TlsTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
        tcp.set_nodelay(true)?;
        let stream = self
            .connector
            .connect(self.server_name.clone(), tcp)
            .await?;
        tracing::debug!(host = %self.host, port = %self.port, "registry transport connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn exchange(&mut self, request: &Request) -> Result<Response, TransportError> {
        let payload = serde_json::to_vec(request)?;
        if let Err(err) = self.write_frame(&payload).await {
            self.stream = None;
            return Err(err);
        }
        let frame = match self.read_frame().await {
            Ok(frame) => frame,
            Err(err) => {
                self.stream = None;
                return Err(err);
            }
        };
        let response: Response = serde_json::from_slice(frame.chunk())?;
        if response.transaction_id != request.transaction_id {
            // A mismatched transaction id means the stream is desynchronized
            // and nothing further on it can be trusted.
            self.stream = None;
            return Err(TransportError::BadFrame(format!(
                "response transaction {} does not answer request {}",
                response.transaction_id, request.transaction_id
            )));
        }
        Ok(response)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await.ok();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Load certificates from a PEM file.
fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let file = File::open(path)
        .map_err(|e| TransportError::Tls(format!("failed to open certificate file {path:?}: {e}")))?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransportError::Tls(format!("failed to parse certificates: {e}")))?;

    if certs.is_empty() {
        return Err(TransportError::Tls(format!(
            "no certificates found in {path:?}"
        )));
    }

    Ok(certs)
}

fn load_root_store(path: &Path) -> Result<RootCertStore, TransportError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .map_err(|e| TransportError::Tls(format!("invalid CA certificate: {e}")))?;
    }
    Ok(roots)
}

/// Load a private key from a PEM file. Registry-issued keys arrive
/// passphrase-encrypted; those go through openssl for decryption and are
/// re-encoded as PKCS#8 for rustls.
fn load_private_key(
    path: &Path,
    passphrase: Option<&str>,
) -> Result<PrivateKeyDer<'static>, TransportError> {
    if let Some(passphrase) = passphrase {
        let pem = std::fs::read(path)
            .map_err(|e| TransportError::Tls(format!("failed to open key file {path:?}: {e}")))?;
        let pkey =
            openssl::pkey::PKey::private_key_from_pem_passphrase(&pem, passphrase.as_bytes())
                .map_err(|e| TransportError::Tls(format!("failed to decrypt private key: {e}")))?;
        let der = pkey
            .private_key_to_pkcs8()
            .map_err(|e| TransportError::Tls(format!("failed to re-encode private key: {e}")))?;
        return Ok(PrivateKeyDer::Pkcs8(der.into()));
    }

    let file = File::open(path)
        .map_err(|e| TransportError::Tls(format!("failed to open key file {path:?}: {e}")))?;
    let mut reader = BufReader::new(file);

    loop {
        match rustls_pemfile::read_one(&mut reader)
            .map_err(|e| TransportError::Tls(format!("failed to parse key file: {e}")))?
        {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(PrivateKeyDer::Pkcs1(key)),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(PrivateKeyDer::Pkcs8(key)),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(PrivateKeyDer::Sec1(key)),
            None => break,
            _ => continue,
        }
    }

    Err(TransportError::Tls(format!(
        "no private key found in {path:?}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_certs_file_not_found() {
        let result = load_certs(Path::new("/nonexistent/client.crt"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("failed to open certificate file"));
    }

    #[test]
    fn load_private_key_file_not_found() {
        let result = load_private_key(Path::new("/nonexistent/client.key"), None);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("failed to open key file"));
    }

    #[test]
    fn frame_bounds_reject_oversize_lengths() {
        // Anything claiming more than MAX_FRAME_SIZE or less than the header
        // is a desynchronized stream, not a real frame.
        assert!(MAX_FRAME_SIZE > FRAME_HEADER_LEN);
    }
}
