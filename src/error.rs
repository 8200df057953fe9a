//! Unified error types for the SUPLA client library.
//!
//! A single public [`Error`] enum that every subsystem converts into,
//! keeping the facade's return types uniform. Transport and codec failures
//! carry their own sub-enums because the session engine recovers from them
//! locally (reconnect with back-off) while the facade surfaces the rest to
//! the caller unchanged.

use thiserror::Error;

/// Library-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Every fallible public operation funnels into this type.
#[derive(Debug, Error)]
pub enum Error {
    /// A required input was missing, empty or out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A typed setter or action emit was used on the wrong channel type,
    /// or a channel's type and options disagree.
    #[error("channel conflict: {0}")]
    ChannelConflict(&'static str),

    /// The configured auth key is all zeroes.
    #[error("auth key not set")]
    AuthKeyError,

    /// The configured GUID is all zeroes.
    #[error("GUID not set")]
    GuidError,

    /// The device already owns the protocol maximum number of channels.
    #[error("channel max count reached")]
    ChannelMax,

    /// The operation needs a configuration that has not been supplied yet.
    #[error("device not configured")]
    NotConfigured,

    /// The operation is not valid in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A transport operation failed. The session engine treats this as
    /// connection loss and schedules a reconnect.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The SRPC stream is corrupt beyond resynchronisation.
    #[error("codec: {0}")]
    Codec(&'static str),
}

/// Errors raised by [`Transport`](crate::transport::Transport) adapters.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the server (resolve/connect failure).
    #[error("cannot connect to {0}")]
    Unreachable(String),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// Operation attempted on a link that is not connected.
    #[error("not connected")]
    NotConnected,

    /// Underlying socket I/O error.
    #[error("socket I/O: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or session error.
    #[error("TLS: {0}")]
    Tls(#[from] rustls::Error),
}
