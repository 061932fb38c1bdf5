use std::fmt::Display;
use std::io::Cursor;

use base64::Engine;

use super::hub_protocol::{HubProtocol, HubProtocolKind, ProtocolError};
use super::messages::{
    CancelInvocationMessage, CloseMessage, CompletionMessage, HubMessage, InvocationMessage, MessageType,
    PingMessage, StreamInvocationMessage, StreamItemMessage,
};

const RESULT_KIND_ERROR: u64 = 1;
const RESULT_KIND_VOID: u64 = 2;
const RESULT_KIND_NON_VOID: u64 = 3;

fn mp_error(error: impl Display) -> ProtocolError {
    ProtocolError::MessagePack(error.to_string())
}

// ── VarInt Framing ──────────────────────────────────────────────────────

/// Encode a length as a VarInt (LEB128-style, MSB continuation bit).
pub fn encode_varint(mut value: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
    buf
}

/// Decode a VarInt from the front of a byte slice. Returns (value, bytes_consumed),
/// or `None` when the slice ends before the VarInt does.
pub fn decode_varint(data: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let mut result: usize = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        if i >= 5 {
            return Err(ProtocolError::InvalidFrame("VarInt too long".to_string()));
        }
        result |= ((byte & 0x7F) as usize) << shift;
        if byte & 0x80 == 0 {
            return Ok(Some((result, i + 1)));
        }
        shift += 7;
    }
    Ok(None)
}

/// Frame a MessagePack message with VarInt length prefix.
pub fn frame_message(payload: &[u8]) -> Vec<u8> {
    let mut framed = encode_varint(payload.len());
    framed.extend_from_slice(payload);
    framed
}

// ── Outbound Encoding ───────────────────────────────────────────────────

fn write_empty_headers(buf: &mut Vec<u8>) -> Result<(), ProtocolError> {
    rmp::encode::write_map_len(buf, 0).map_err(mp_error)?;
    Ok(())
}

fn write_optional_str(buf: &mut Vec<u8>, value: Option<&str>) -> Result<(), ProtocolError> {
    match value {
        Some(s) => rmp::encode::write_str(buf, s).map_err(mp_error)?,
        None => rmp::encode::write_nil(buf).map_err(mp_error)?,
    }
    Ok(())
}

fn write_json_value(buf: &mut Vec<u8>, value: &serde_json::Value) -> Result<(), ProtocolError> {
    rmpv::encode::write_value(buf, &json_value_to_msgpack(value)).map_err(mp_error)
}

/// Encode an Invocation (type 1) or StreamInvocation (type 4).
/// Layout: [Type, Headers, InvocationId?, Target, Arguments, StreamIds]
/// Always writes 6 elements to match the .NET SignalR MessagePack protocol.
fn encode_invocation(
    buf: &mut Vec<u8>,
    msg_type: MessageType,
    invocation_id: Option<&str>,
    target: &str,
    arguments: &[serde_json::Value],
    stream_ids: Option<&[String]>,
) -> Result<(), ProtocolError> {
    rmp::encode::write_array_len(buf, 6).map_err(mp_error)?;
    rmp::encode::write_uint(buf, msg_type as u64).map_err(mp_error)?;
    write_empty_headers(buf)?;
    write_optional_str(buf, invocation_id)?;
    rmp::encode::write_str(buf, target).map_err(mp_error)?;

    let arguments = arguments.iter().map(json_value_to_msgpack).collect();
    rmpv::encode::write_value(buf, &rmpv::Value::Array(arguments)).map_err(mp_error)?;

    let ids = stream_ids.unwrap_or(&[]);
    rmp::encode::write_array_len(buf, ids.len() as u32).map_err(mp_error)?;
    for id in ids {
        rmp::encode::write_str(buf, id).map_err(mp_error)?;
    }

    Ok(())
}

fn encode_payload(message: &HubMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();

    match message {
        HubMessage::Invocation(m) => encode_invocation(
            &mut buf,
            m.message_type,
            m.invocation_id.as_deref(),
            &m.target,
            &m.arguments,
            m.stream_ids.as_deref(),
        )?,
        HubMessage::StreamInvocation(m) => encode_invocation(
            &mut buf,
            m.message_type,
            Some(&m.invocation_id),
            &m.target,
            &m.arguments,
            m.stream_ids.as_deref(),
        )?,
        // [2, Headers, InvocationId, Item]
        HubMessage::StreamItem(m) => {
            rmp::encode::write_array_len(&mut buf, 4).map_err(mp_error)?;
            rmp::encode::write_uint(&mut buf, m.message_type as u64).map_err(mp_error)?;
            write_empty_headers(&mut buf)?;
            rmp::encode::write_str(&mut buf, &m.invocation_id).map_err(mp_error)?;
            write_json_value(&mut buf, &m.item)?;
        }
        // [3, Headers, InvocationId, ResultKind, Result?]
        HubMessage::Completion(m) => {
            let len = if m.error.is_some() || m.result.is_some() { 5 } else { 4 };
            rmp::encode::write_array_len(&mut buf, len).map_err(mp_error)?;
            rmp::encode::write_uint(&mut buf, m.message_type as u64).map_err(mp_error)?;
            write_empty_headers(&mut buf)?;
            rmp::encode::write_str(&mut buf, &m.invocation_id).map_err(mp_error)?;
            match (&m.error, &m.result) {
                (Some(error), _) => {
                    rmp::encode::write_uint(&mut buf, RESULT_KIND_ERROR).map_err(mp_error)?;
                    rmp::encode::write_str(&mut buf, error).map_err(mp_error)?;
                }
                (None, Some(result)) => {
                    rmp::encode::write_uint(&mut buf, RESULT_KIND_NON_VOID).map_err(mp_error)?;
                    write_json_value(&mut buf, result)?;
                }
                (None, None) => {
                    rmp::encode::write_uint(&mut buf, RESULT_KIND_VOID).map_err(mp_error)?;
                }
            }
        }
        // [5, Headers, InvocationId]
        HubMessage::CancelInvocation(m) => {
            rmp::encode::write_array_len(&mut buf, 3).map_err(mp_error)?;
            rmp::encode::write_uint(&mut buf, m.message_type as u64).map_err(mp_error)?;
            write_empty_headers(&mut buf)?;
            rmp::encode::write_str(&mut buf, &m.invocation_id).map_err(mp_error)?;
        }
        // Ping is always exactly: fixarray(1) + fixint(6) = 0x91 0x06
        HubMessage::Ping(_) => buf.extend_from_slice(&[0x91, 0x06]),
        // [7, Error?, AllowReconnect]
        HubMessage::Close(m) => {
            rmp::encode::write_array_len(&mut buf, 3).map_err(mp_error)?;
            rmp::encode::write_uint(&mut buf, m.message_type as u64).map_err(mp_error)?;
            write_optional_str(&mut buf, m.error.as_deref())?;
            rmp::encode::write_bool(&mut buf, m.allow_reconnect).map_err(mp_error)?;
        }
    }

    Ok(buf)
}

// ── Inbound Decoding ────────────────────────────────────────────────────

/// Parse a full MessagePack message into an rmpv::Value array.
pub fn parse_msgpack_message(data: &[u8]) -> Result<Vec<rmpv::Value>, ProtocolError> {
    let value = rmpv::decode::read_value(&mut Cursor::new(data)).map_err(mp_error)?;

    match value {
        rmpv::Value::Array(items) => Ok(items),
        _ => Err(ProtocolError::InvalidFrame("MessagePack message is not an array".to_string())),
    }
}

fn item<'a>(items: &'a [rmpv::Value], index: usize, what: &str) -> Result<&'a rmpv::Value, ProtocolError> {
    items
        .get(index)
        .ok_or_else(|| ProtocolError::InvalidFrame(format!("Missing {} at position {}", what, index)))
}

fn string_at(items: &[rmpv::Value], index: usize, what: &str) -> Result<String, ProtocolError> {
    item(items, index, what)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::InvalidFrame(format!("Invalid {}", what)))
}

fn optional_string_at(items: &[rmpv::Value], index: usize) -> Option<String> {
    items.get(index).and_then(|v| v.as_str()).map(str::to_string)
}

fn arguments_at(items: &[rmpv::Value], index: usize) -> Result<Vec<serde_json::Value>, ProtocolError> {
    match item(items, index, "arguments")? {
        rmpv::Value::Array(args) => Ok(args.iter().map(msgpack_value_to_json).collect()),
        _ => Err(ProtocolError::InvalidFrame("Invalid arguments".to_string())),
    }
}

fn stream_ids_at(items: &[rmpv::Value], index: usize) -> Option<Vec<String>> {
    match items.get(index) {
        Some(rmpv::Value::Array(ids)) if !ids.is_empty() => {
            Some(ids.iter().filter_map(|id| id.as_str().map(str::to_string)).collect())
        }
        _ => None,
    }
}

fn decode_items(items: &[rmpv::Value]) -> Result<HubMessage, ProtocolError> {
    let raw_type = item(items, 0, "message type")?
        .as_u64()
        .ok_or(ProtocolError::MissingMessageType)?;
    let msg_type = MessageType::try_from(raw_type)?;

    let message = match msg_type {
        // [1, Headers, InvocationId?, Target, Arguments, StreamIds?]
        MessageType::Invocation => HubMessage::Invocation(InvocationMessage {
            message_type: msg_type,
            invocation_id: optional_string_at(items, 2),
            target: string_at(items, 3, "target")?,
            arguments: arguments_at(items, 4)?,
            stream_ids: stream_ids_at(items, 5),
        }),
        MessageType::StreamInvocation => HubMessage::StreamInvocation(StreamInvocationMessage {
            message_type: msg_type,
            invocation_id: string_at(items, 2, "invocation id")?,
            target: string_at(items, 3, "target")?,
            arguments: arguments_at(items, 4)?,
            stream_ids: stream_ids_at(items, 5),
        }),
        MessageType::StreamItem => HubMessage::StreamItem(StreamItemMessage {
            message_type: msg_type,
            invocation_id: string_at(items, 2, "invocation id")?,
            item: msgpack_value_to_json(item(items, 3, "item")?),
        }),
        MessageType::Completion => {
            let invocation_id = string_at(items, 2, "invocation id")?;
            let result_kind = item(items, 3, "result kind")?
                .as_u64()
                .ok_or_else(|| ProtocolError::InvalidFrame("Invalid ResultKind".to_string()))?;
            let payload = items.get(4);

            let (result, error) = match result_kind {
                RESULT_KIND_ERROR => {
                    let error = payload
                        .and_then(|v| v.as_str())
                        .unwrap_or("Unknown error")
                        .to_string();
                    (None, Some(error))
                }
                RESULT_KIND_VOID => (None, None),
                RESULT_KIND_NON_VOID => (payload.map(msgpack_value_to_json), None),
                other => return Err(ProtocolError::InvalidFrame(format!("Unknown ResultKind: {}", other))),
            };

            HubMessage::Completion(CompletionMessage { message_type: msg_type, invocation_id, result, error })
        }
        MessageType::CancelInvocation => HubMessage::CancelInvocation(CancelInvocationMessage {
            message_type: msg_type,
            invocation_id: string_at(items, 2, "invocation id")?,
        }),
        MessageType::Ping => HubMessage::Ping(PingMessage::new()),
        // [7, Error?, AllowReconnect?]
        MessageType::Close => HubMessage::Close(CloseMessage {
            message_type: msg_type,
            error: optional_string_at(items, 1),
            allow_reconnect: items.get(2).and_then(|v| v.as_bool()).unwrap_or(false),
        }),
    };

    Ok(message)
}

// ── Value Conversion ────────────────────────────────────────────────────

/// Convert a serde_json::Value to an rmpv::Value.
pub fn json_value_to_msgpack(value: &serde_json::Value) -> rmpv::Value {
    match value {
        serde_json::Value::Null => rmpv::Value::Nil,
        serde_json::Value::Bool(b) => rmpv::Value::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                rmpv::Value::Integer(rmpv::Integer::from(i))
            } else if let Some(u) = n.as_u64() {
                rmpv::Value::Integer(rmpv::Integer::from(u))
            } else if let Some(f) = n.as_f64() {
                rmpv::Value::F64(f)
            } else {
                rmpv::Value::Nil
            }
        }
        serde_json::Value::String(s) => rmpv::Value::String(rmpv::Utf8String::from(s.as_str())),
        serde_json::Value::Array(arr) => rmpv::Value::Array(arr.iter().map(json_value_to_msgpack).collect()),
        serde_json::Value::Object(obj) => rmpv::Value::Map(
            obj.iter()
                .map(|(k, v)| (rmpv::Value::String(rmpv::Utf8String::from(k.as_str())), json_value_to_msgpack(v)))
                .collect(),
        ),
    }
}

/// Convert an rmpv::Value to a serde_json::Value. Binary becomes a base64 string.
pub fn msgpack_value_to_json(value: &rmpv::Value) -> serde_json::Value {
    match value {
        rmpv::Value::Nil => serde_json::Value::Null,
        rmpv::Value::Boolean(b) => serde_json::Value::Bool(*b),
        rmpv::Value::Integer(i) => {
            if let Some(v) = i.as_i64() {
                serde_json::Value::Number(serde_json::Number::from(v))
            } else if let Some(v) = i.as_u64() {
                serde_json::Value::Number(serde_json::Number::from(v))
            } else {
                serde_json::Value::Null
            }
        }
        rmpv::Value::F32(f) => serde_json::Number::from_f64(*f as f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        rmpv::Value::F64(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        rmpv::Value::String(s) => serde_json::Value::String(s.as_str().unwrap_or("").to_string()),
        rmpv::Value::Binary(b) => serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b)),
        rmpv::Value::Array(arr) => serde_json::Value::Array(arr.iter().map(msgpack_value_to_json).collect()),
        rmpv::Value::Map(entries) => {
            let obj: serde_json::Map<String, serde_json::Value> = entries
                .iter()
                .filter_map(|(k, v)| k.as_str().map(|key| (key.to_string(), msgpack_value_to_json(v))))
                .collect();
            serde_json::Value::Object(obj)
        }
        rmpv::Value::Ext(_, _) => serde_json::Value::Null,
    }
}

/// The binary hub protocol: VarInt length-prefixed MessagePack arrays.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackHubProtocol;

impl MessagePackHubProtocol {
    pub fn new() -> Self {
        MessagePackHubProtocol
    }
}

impl HubProtocol for MessagePackHubProtocol {
    fn kind(&self) -> HubProtocolKind {
        HubProtocolKind::MessagePack
    }

    fn read_message(&self, buffer: &mut Vec<u8>) -> Result<Option<HubMessage>, ProtocolError> {
        let Some((len, prefix)) = decode_varint(buffer)? else {
            return Ok(None);
        };
        if buffer.len() < prefix + len {
            return Ok(None);
        }

        let frame: Vec<u8> = buffer.drain(..prefix + len).collect();
        let items = parse_msgpack_message(&frame[prefix..])?;

        decode_items(&items).map(Some)
    }

    fn encode_message(&self, message: &HubMessage) -> Result<Vec<u8>, ProtocolError> {
        encode_payload(message).map(|payload| frame_message(&payload))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_varint_known_values() {
        assert_eq!(encode_varint(53), vec![0x35]);
        assert_eq!(encode_varint(5248), vec![0x80, 0x29]);
        assert_eq!(decode_varint(&[0x80, 0x29]).unwrap(), Some((5248, 2)));
    }

    #[test]
    fn test_varint_incomplete() {
        assert_eq!(decode_varint(&[0x80]).unwrap(), None);
        assert_eq!(decode_varint(&[]).unwrap(), None);
        assert!(decode_varint(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]).is_err());
    }

    #[test]
    fn test_ping_encoding() {
        let protocol = MessagePackHubProtocol::new();
        let bytes = protocol.encode_message(&HubMessage::Ping(PingMessage::new())).unwrap();
        assert_eq!(bytes, vec![0x02, 0x91, 0x06]);
    }

    #[test]
    fn test_partial_frame_waits_for_more_data() {
        let protocol = MessagePackHubProtocol::new();
        let invocation = HubMessage::from(InvocationMessage::send_only("Foo", vec![json!(1), json!("a")]));
        let bytes = protocol.encode_message(&invocation).unwrap();

        let mut buffer = bytes[..bytes.len() - 1].to_vec();
        assert!(protocol.read_message(&mut buffer).unwrap().is_none());
        assert_eq!(buffer.len(), bytes.len() - 1);

        buffer.push(bytes[bytes.len() - 1]);
        let decoded = protocol.read_message(&mut buffer).unwrap().unwrap();
        assert_eq!(decoded, invocation);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_completion_result_kinds() {
        let protocol = MessagePackHubProtocol::new();

        for completion in [
            CompletionMessage::new("1", Some(json!({"text": "test", "number": 5})), None),
            CompletionMessage::new("2", None, Some("failed".to_string())),
            CompletionMessage::new("3", None, None),
        ] {
            let message = HubMessage::from(completion);
            let mut buffer = protocol.encode_message(&message).unwrap();
            assert_eq!(protocol.read_message(&mut buffer).unwrap().unwrap(), message);
        }
    }

    #[test]
    fn test_close_layout() {
        let protocol = MessagePackHubProtocol::new();
        let bytes = protocol
            .encode_message(&HubMessage::from(CloseMessage::new(Some("boom".to_string()), true)))
            .unwrap();

        let items = parse_msgpack_message(&bytes[1..]).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_u64(), Some(7));
        assert_eq!(items[1].as_str(), Some("boom"));
        assert_eq!(items[2].as_bool(), Some(true));
    }

    #[test]
    fn test_json_msgpack_value_roundtrip() {
        let json = json!({
            "name": "test",
            "number": 42,
            "flag": true,
            "nested": {"inner": [1, 2, 3]},
            "nothing": null
        });

        let msgpack = json_value_to_msgpack(&json);
        let back = msgpack_value_to_json(&msgpack);
        assert_eq!(json, back);
    }
}
