use std::fmt::Debug;

use thiserror::Error;

use crate::protocol::hub_protocol::ProtocolError;

/// Errors that can occur while negotiating, establishing or driving a SignalR connection.
#[derive(Error, Debug)]
pub enum SignalRError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The server answered with a status other than `200 OK`.
    #[error("{method} {url} -> {status}")]
    UnexpectedStatus {
        method: String,
        url: String,
        status: String,
    },

    #[error("The HTTP response failed to deserialize: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_websockets::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("The connection is closed")]
    ConnectionClosed,

    #[error("Message of {size} bytes exceeds the maximum receive message size of {maximum} bytes")]
    MessageTooLarge { size: usize, maximum: usize },

    /// The hub connection was aborted while the operation was in flight.
    #[error("The operation was cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SignalRError {
    /// Returns `true` when the error was caused by aborting the hub connection
    /// rather than by a failing transport.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SignalRError::Cancelled)
    }
}

/// A failed send. Carries the message that was attempted so the caller can log or correlate it.
#[derive(Error, Debug)]
#[error("Failed to send {message:?}: {source}")]
pub struct SendError<T: Debug> {
    pub message: T,
    #[source]
    pub source: SignalRError,
}

impl<T: Debug> SendError<T> {
    pub fn into_inner(self) -> (T, SignalRError) {
        (self.message, self.source)
    }
}
