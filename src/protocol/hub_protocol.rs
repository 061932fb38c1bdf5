use futures::future::BoxFuture;
use thiserror::Error;

use crate::communication::{write_all, Connection};
use crate::error::SignalRError;

use super::messages::HubMessage;

/// Errors that can occur while encoding or decoding hub messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message has no integer type field")]
    MissingMessageType,

    #[error("Unexpected message type: {0}")]
    UnexpectedMessageType(u64),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[cfg(feature = "messagepack")]
    #[error("MessagePack error: {0}")]
    MessagePack(String),
}

/// Protocol selection for the SignalR hub connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubProtocolKind {
    Json,
    #[cfg(feature = "messagepack")]
    MessagePack,
}

impl HubProtocolKind {
    /// Returns the protocol name string used in the handshake.
    pub fn protocol_name(&self) -> &'static str {
        match self {
            HubProtocolKind::Json => "json",
            #[cfg(feature = "messagepack")]
            HubProtocolKind::MessagePack => "messagepack",
        }
    }

    /// Returns the transfer format expected in negotiation.
    pub fn transfer_format(&self) -> &'static str {
        match self {
            HubProtocolKind::Json => "Text",
            #[cfg(feature = "messagepack")]
            HubProtocolKind::MessagePack => "Binary",
        }
    }
}

impl Default for HubProtocolKind {
    fn default() -> Self {
        HubProtocolKind::Json
    }
}

/// Serializes and deserializes hub messages one at a time.
pub trait HubProtocol: Send + Sync {
    fn kind(&self) -> HubProtocolKind;

    /// Parses one message from the front of `buffer`.
    ///
    /// Returns `Ok(None)` and leaves the buffer untouched when it does not yet
    /// hold a complete message. On success the consumed bytes are removed.
    fn read_message(&self, buffer: &mut Vec<u8>) -> Result<Option<HubMessage>, ProtocolError>;

    /// Encodes one message, including its framing.
    fn encode_message(&self, message: &HubMessage) -> Result<Vec<u8>, ProtocolError>;

    /// Encodes `message` and writes the whole frame to `connection`.
    fn write_message<'a>(
        &'a self,
        message: &'a HubMessage,
        connection: &'a dyn Connection,
    ) -> BoxFuture<'a, Result<(), SignalRError>> {
        Box::pin(async move {
            let payload = self.encode_message(message)?;
            write_all(connection, &payload).await
        })
    }
}
