//! TCP and TLS stream setup shared by the IRC and XMPP clients.

use std::sync::Arc;

use rustls::pki_types::ServerName;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// A bidirectional byte stream, plain or encrypted.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// Type-erased connection used once negotiation is done.
pub type BoxedIo = Box<dyn Io>;

/// Errors while opening a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The address is not `host:port`.
    #[error("invalid server address `{0}`, expected host:port")]
    InvalidAddress(String),
    /// The host cannot be used as a TLS server name.
    #[error("invalid TLS server name `{0}`")]
    InvalidServerName(String),
    /// The TLS client could not be configured.
    #[error("TLS configuration failed: {0}")]
    Tls(#[from] rustls::Error),
    /// Socket or handshake error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Split `host:port` into its parts. Brackets around IPv6 hosts are removed.
///
/// # Errors
///
/// Returns [`TransportError::InvalidAddress`] when the port is missing or not a number.
pub fn split_host_port(addr: &str) -> Result<(&str, u16), TransportError> {
    let invalid = || TransportError::InvalidAddress(addr.to_owned());
    let (host, port) = addr.trim().rsplit_once(':').ok_or_else(invalid)?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }
    Ok((host, port))
}

/// Open a plain TCP connection.
///
/// # Errors
///
/// Returns an error for a malformed address or a failed connect.
pub async fn connect_tcp(addr: &str) -> Result<TcpStream, TransportError> {
    let (host, port) = split_host_port(addr)?;
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Run a TLS client handshake over an established stream.
///
/// Certificates are checked against the Mozilla root set for `server_name`.
///
/// # Errors
///
/// Returns an error if the name is unusable or the handshake fails.
pub async fn upgrade_tls<S>(stream: S, server_name: &str) -> Result<TlsStream<S>, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let name = ServerName::try_from(server_name.to_owned())
        .map_err(|_| TransportError::InvalidServerName(server_name.to_owned()))?;
    let tls = tls_connector()?.connect(name, stream).await?;
    Ok(tls)
}

/// Connect to `addr`, wrapping the socket in TLS when `use_tls` is set.
///
/// # Errors
///
/// Returns an error if the connection or the TLS handshake fails.
pub async fn connect(addr: &str, use_tls: bool) -> Result<BoxedIo, TransportError> {
    let tcp = connect_tcp(addr).await?;
    if !use_tls {
        return Ok(Box::new(tcp));
    }
    let (host, _) = split_host_port(addr)?;
    let tls = upgrade_tls(tcp, host).await?;
    Ok(Box::new(tls))
}

fn tls_connector() -> Result<TlsConnector, TransportError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}
