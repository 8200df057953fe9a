//! Transport abstraction — any byte-oriented link to the server.
//!
//! Concrete implementations:
//! - plain TCP socket ([`TcpTransport`])
//! - TLS over TCP via rustls ([`TlsTransport`])
//!
//! The session engine is generic over [`Transport`], so tests drive it
//! with scripted in-memory links and embedded hosts can wrap their own
//! socket stacks without touching the engine.
//!
//! `recv` is non-blocking: `Ok(0)` means "no data right now", a closed
//! peer is an explicit [`TransportError::Closed`]. `send` never raises on
//! a closed peer mid-write; it reports the failure through its `Result`.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use log::{debug, info};
use rustls::pki_types::ServerName;

use crate::error::TransportError;

/// Byte-oriented, connection-based transport.
pub trait Transport: Send {
    /// Establish the link, tearing down any previous one first.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Write as many bytes as the link accepts. `Ok(0)` = would block.
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read available bytes. `Ok(0)` = nothing pending (would block).
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Drop the link. Safe to call when already disconnected.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

fn map_write(e: std::io::Error) -> Result<usize, TransportError> {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::Interrupted => Ok(0),
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
            Err(TransportError::Closed)
        }
        _ => Err(TransportError::Io(e)),
    }
}

// ── Plain TCP ────────────────────────────────────────────────

/// Non-blocking TCP client link.
pub struct TcpTransport {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            stream: None,
        }
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.disconnect();
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(|_| TransportError::Unreachable(format!("{}:{}", self.host, self.port)))?;
        stream.set_nodelay(true).ok();
        stream.set_nonblocking(true)?;
        info!("tcp: connected to {}:{}", self.host, self.port);
        self.stream = Some(stream);
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        match stream.write(data) {
            Ok(n) => Ok(n),
            Err(e) => map_write(e),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        match stream.read(buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(0),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("tcp: link closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

// ── TLS over TCP ─────────────────────────────────────────────

/// Root store covering the public SUPLA cloud endpoints. Hosts talking to
/// private servers supply their own `ClientConfig` instead.
pub fn default_tls_config() -> Arc<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

struct TlsLink {
    conn: rustls::ClientConnection,
    sock: TcpStream,
}

/// TLS client link. The handshake completes inside `connect`; afterwards
/// the socket runs non-blocking like the plain transport.
pub struct TlsTransport {
    host: String,
    port: u16,
    config: Arc<rustls::ClientConfig>,
    link: Option<TlsLink>,
}

impl TlsTransport {
    pub fn new(host: impl Into<String>, port: u16, config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            host: host.into(),
            port,
            config,
            link: None,
        }
    }

    /// Flush rustls' pending TLS records to the socket.
    fn write_tls_out(link: &mut TlsLink) -> Result<(), TransportError> {
        while link.conn.wants_write() {
            match link.conn.write_tls(&mut link.sock) {
                Ok(_) => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    break;
                }
                Err(e) => return map_write(e).map(|_| ()),
            }
        }
        Ok(())
    }
}

impl Transport for TlsTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.disconnect();

        let sock = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(|_| TransportError::Unreachable(format!("{}:{}", self.host, self.port)))?;
        sock.set_nodelay(true).ok();

        let name = ServerName::try_from(self.host.clone())
            .map_err(|_| TransportError::Unreachable(self.host.clone()))?;
        let mut conn = rustls::ClientConnection::new(self.config.clone(), name)?;

        // Drive the handshake on the still-blocking socket.
        let mut sock_ref = &sock;
        while conn.is_handshaking() {
            conn.complete_io(&mut sock_ref).map_err(|e| {
                if e.kind() == ErrorKind::InvalidData {
                    TransportError::Tls(rustls::Error::General(e.to_string()))
                } else {
                    TransportError::Io(e)
                }
            })?;
        }
        sock.set_nonblocking(true)?;
        info!("tls: connected to {}:{}", self.host, self.port);
        self.link = Some(TlsLink { conn, sock });
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let link = self.link.as_mut().ok_or(TransportError::NotConnected)?;
        let n = match link.conn.writer().write(data) {
            Ok(n) => n,
            Err(e) => return map_write(e),
        };
        Self::write_tls_out(link)?;
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let link = self.link.as_mut().ok_or(TransportError::NotConnected)?;

        loop {
            match link.conn.read_tls(&mut link.sock) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(_) => {
                    link.conn.process_new_packets()?;
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    break;
                }
                Err(e) => return Err(TransportError::Io(e)),
            }
        }

        match link.conn.reader().read(buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.conn.send_close_notify();
            let _ = link.conn.write_tls(&mut link.sock);
            debug!("tls: link closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}

// ── Null transport ───────────────────────────────────────────

/// Discards all writes and never produces data. Default placeholder until
/// a real link is configured; also handy in tests.
pub struct NullTransport;

impl Transport for NullTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        Ok(data.len())
    }

    fn recv(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok(0)
    }

    fn disconnect(&mut self) {}

    fn is_connected(&self) -> bool {
        true
    }
}
