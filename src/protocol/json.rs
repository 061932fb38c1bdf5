use log::debug;
use serde_json::Value;

use super::hub_protocol::{HubProtocol, HubProtocolKind, ProtocolError};
use super::messages::HubMessage;

/// Terminates every JSON hub message on the wire.
pub const RECORD_SEPARATOR: u8 = 0x1e;

/// The text hub protocol: one UTF-8 JSON object per record-separator terminated frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHubProtocol;

impl JsonHubProtocol {
    pub fn new() -> Self {
        JsonHubProtocol
    }
}

impl HubProtocol for JsonHubProtocol {
    fn kind(&self) -> HubProtocolKind {
        HubProtocolKind::Json
    }

    fn read_message(&self, buffer: &mut Vec<u8>) -> Result<Option<HubMessage>, ProtocolError> {
        let Some(end) = buffer.iter().position(|b| *b == RECORD_SEPARATOR) else {
            return Ok(None);
        };

        let frame: Vec<u8> = buffer.drain(..=end).collect();
        let value: Value = serde_json::from_slice(&frame[..end])?;
        let message = HubMessage::from_value(value)?;
        debug!("Parsed {:?} message ({} bytes)", message.message_type(), end);

        Ok(Some(message))
    }

    fn encode_message(&self, message: &HubMessage) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = serde_json::to_vec(message)?;
        payload.push(RECORD_SEPARATOR);

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::messages::{CloseMessage, MessageType, PingMessage};

    #[test]
    fn test_incomplete_frame_leaves_buffer_untouched() {
        let protocol = JsonHubProtocol::new();
        let mut buffer = br#"{"type":6"#.to_vec();

        assert!(protocol.read_message(&mut buffer).unwrap().is_none());
        assert_eq!(buffer, br#"{"type":6"#.to_vec());
    }

    #[test]
    fn test_reads_one_message_and_keeps_the_rest() {
        let protocol = JsonHubProtocol::new();
        let mut buffer = b"{\"type\":6}\x1e{\"type\":7,\"error\":\"x\"".to_vec();

        let message = protocol.read_message(&mut buffer).unwrap().unwrap();
        assert_eq!(message, HubMessage::Ping(PingMessage::new()));
        assert_eq!(buffer, b"{\"type\":7,\"error\":\"x\"".to_vec());
    }

    #[test]
    fn test_close_encoding() {
        let protocol = JsonHubProtocol::new();
        let close = HubMessage::from(CloseMessage::new(Some("boom".to_string()), true));

        let bytes = protocol.encode_message(&close).unwrap();
        assert_eq!(*bytes.last().unwrap(), RECORD_SEPARATOR);

        let value: Value = serde_json::from_slice(&bytes[..bytes.len() - 1]).unwrap();
        assert_eq!(value, json!({"type": 7, "error": "boom", "allowReconnect": true}));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let protocol = JsonHubProtocol::new();
        let mut buffer = b"{\"type\":42}\x1e".to_vec();

        let error = protocol.read_message(&mut buffer).unwrap_err();
        assert!(matches!(error, ProtocolError::UnexpectedMessageType(42)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_completion_with_error() {
        let protocol = JsonHubProtocol::new();
        let mut buffer = b"{\"type\":3,\"invocationId\":\"7\",\"error\":\"failed\"}\x1e".to_vec();

        match protocol.read_message(&mut buffer).unwrap().unwrap() {
            HubMessage::Completion(completion) => {
                assert_eq!(completion.message_type, MessageType::Completion);
                assert_eq!(completion.invocation_id, "7");
                assert_eq!(completion.result, None);
                assert_eq!(completion.error.as_deref(), Some("failed"));
            }
            other => panic!("Unexpected message {:?}", other),
        }
    }
}
