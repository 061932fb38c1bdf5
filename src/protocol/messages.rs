use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_repr::{Deserialize_repr, Serialize_repr};

use super::hub_protocol::ProtocolError;

/// Integer discriminant carried in the `type` field of every hub message.
#[derive(Serialize_repr, Deserialize_repr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Invocation = 1,
    StreamItem = 2,
    Completion = 3,
    StreamInvocation = 4,
    CancelInvocation = 5,
    Ping = 6,
    Close = 7,
}

impl TryFrom<u64> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Invocation),
            2 => Ok(MessageType::StreamItem),
            3 => Ok(MessageType::Completion),
            4 => Ok(MessageType::StreamInvocation),
            5 => Ok(MessageType::CancelInvocation),
            6 => Ok(MessageType::Ping),
            7 => Ok(MessageType::Close),
            other => Err(ProtocolError::UnexpectedMessageType(other)),
        }
    }
}

/// Invocation of a hub method. Outbound invocations built by the hub
/// connection are send-only and carry no `invocationId`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvocationMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    pub target: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_ids: Option<Vec<String>>,
}

impl InvocationMessage {
    pub fn send_only(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        InvocationMessage {
            message_type: MessageType::Invocation,
            invocation_id: None,
            target: target.into(),
            arguments,
            stream_ids: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamInvocationMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub invocation_id: String,
    pub target: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_ids: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamItemMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub invocation_id: String,
    pub item: Value,
}

impl StreamItemMessage {
    pub fn new(invocation_id: impl Into<String>, item: Value) -> Self {
        StreamItemMessage {
            message_type: MessageType::StreamItem,
            invocation_id: invocation_id.into(),
            item,
        }
    }
}

/// Completion of an invocation. `result` and `error` are mutually exclusive in practice.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub invocation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionMessage {
    pub fn new(invocation_id: impl Into<String>, result: Option<Value>, error: Option<String>) -> Self {
        CompletionMessage {
            message_type: MessageType::Completion,
            invocation_id: invocation_id.into(),
            result,
            error,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelInvocationMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub invocation_id: String,
}

impl CancelInvocationMessage {
    pub fn new(invocation_id: impl Into<String>) -> Self {
        CancelInvocationMessage {
            message_type: MessageType::CancelInvocation,
            invocation_id: invocation_id.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PingMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
}

impl PingMessage {
    pub fn new() -> Self {
        PingMessage { message_type: MessageType::Ping }
    }
}

impl Default for PingMessage {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloseMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub allow_reconnect: bool,
}

impl CloseMessage {
    pub fn new(error: Option<String>, allow_reconnect: bool) -> Self {
        CloseMessage {
            message_type: MessageType::Close,
            error,
            allow_reconnect,
        }
    }
}

/// Any hub message exchanged after the transport is established.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum HubMessage {
    Invocation(InvocationMessage),
    StreamItem(StreamItemMessage),
    Completion(CompletionMessage),
    StreamInvocation(StreamInvocationMessage),
    CancelInvocation(CancelInvocationMessage),
    Ping(PingMessage),
    Close(CloseMessage),
}

impl HubMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            HubMessage::Invocation(m) => m.message_type,
            HubMessage::StreamItem(m) => m.message_type,
            HubMessage::Completion(m) => m.message_type,
            HubMessage::StreamInvocation(m) => m.message_type,
            HubMessage::CancelInvocation(m) => m.message_type,
            HubMessage::Ping(m) => m.message_type,
            HubMessage::Close(m) => m.message_type,
        }
    }

    /// Decodes a message from its JSON object form, dispatching on the `type` field.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let raw_type = value
            .get("type")
            .and_then(Value::as_u64)
            .ok_or(ProtocolError::MissingMessageType)?;

        let message = match MessageType::try_from(raw_type)? {
            MessageType::Invocation => HubMessage::Invocation(serde_json::from_value(value)?),
            MessageType::StreamItem => HubMessage::StreamItem(serde_json::from_value(value)?),
            MessageType::Completion => HubMessage::Completion(serde_json::from_value(value)?),
            MessageType::StreamInvocation => HubMessage::StreamInvocation(serde_json::from_value(value)?),
            MessageType::CancelInvocation => HubMessage::CancelInvocation(serde_json::from_value(value)?),
            MessageType::Ping => HubMessage::Ping(serde_json::from_value(value)?),
            MessageType::Close => HubMessage::Close(serde_json::from_value(value)?),
        };

        Ok(message)
    }
}

impl From<InvocationMessage> for HubMessage {
    fn from(message: InvocationMessage) -> Self {
        HubMessage::Invocation(message)
    }
}

impl From<StreamItemMessage> for HubMessage {
    fn from(message: StreamItemMessage) -> Self {
        HubMessage::StreamItem(message)
    }
}

impl From<CompletionMessage> for HubMessage {
    fn from(message: CompletionMessage) -> Self {
        HubMessage::Completion(message)
    }
}

impl From<StreamInvocationMessage> for HubMessage {
    fn from(message: StreamInvocationMessage) -> Self {
        HubMessage::StreamInvocation(message)
    }
}

impl From<CancelInvocationMessage> for HubMessage {
    fn from(message: CancelInvocationMessage) -> Self {
        HubMessage::CancelInvocation(message)
    }
}

impl From<PingMessage> for HubMessage {
    fn from(message: PingMessage) -> Self {
        HubMessage::Ping(message)
    }
}

impl From<CloseMessage> for HubMessage {
    fn from(message: CloseMessage) -> Self {
        HubMessage::Close(message)
    }
}
