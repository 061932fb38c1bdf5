use std::sync::Arc;

use log::info;
use serde_json::json;

use crate::hub::{HubConnection, DEFAULT_MAXIMUM_RECEIVE_MESSAGE_SIZE};
use crate::protocol::hub_protocol::{HubProtocol, HubProtocolKind};
use crate::protocol::messages::{CompletionMessage, HubMessage, InvocationMessage, MessageType};
use crate::protocol::msgpack::MessagePackHubProtocol;
use crate::tests::ScriptedConnection;

fn hub(connection: Arc<ScriptedConnection>) -> HubConnection {
    HubConnection::new(connection, Arc::new(MessagePackHubProtocol::new()), DEFAULT_MAXIMUM_RECEIVE_MESSAGE_SIZE)
}

#[test_log::test(tokio::test)]
async fn test_msgpack_send_writes_binary_frames() {
    let connection = Arc::new(ScriptedConnection::new("c", vec![]));
    let hub = hub(connection.clone());

    hub.send_invocation("PushEntity", vec![json!({"text": "push1", "number": 100})]).await.unwrap();
    hub.ping().await.unwrap();

    let protocol = MessagePackHubProtocol::new();
    assert_eq!(protocol.kind(), HubProtocolKind::MessagePack);
    assert_eq!(protocol.kind().transfer_format(), "Binary");

    let mut written = connection.written();
    assert!(written.ends_with(&[0x02, 0x91, 0x06]));

    match protocol.read_message(&mut written).unwrap() {
        Some(HubMessage::Invocation(invocation)) => {
            info!("Decoded invocation {:?}", invocation);
            assert_eq!(invocation.target, "PushEntity");
            assert_eq!(invocation.invocation_id, None);
            assert_eq!(invocation.arguments, vec![json!({"text": "push1", "number": 100})]);
        }
        other => panic!("Unexpected message {:?}", other),
    }
    assert_eq!(protocol.read_message(&mut written).unwrap().map(|m| m.message_type()), Some(MessageType::Ping));
    assert!(written.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_msgpack_receive_across_reads() {
    let protocol = MessagePackHubProtocol::new();
    let mut stream = protocol
        .encode_message(&HubMessage::from(InvocationMessage::send_only("Notify", vec![json!("hello")])))
        .unwrap();
    stream.extend(
        protocol
            .encode_message(&HubMessage::from(CompletionMessage::new("7", Some(json!(500)), None)))
            .unwrap(),
    );
    let (first, second) = stream.split_at(5);

    let hub = hub(Arc::new(ScriptedConnection::new("c", vec![first, second])));

    match hub.receive().await.unwrap() {
        HubMessage::Invocation(invocation) => assert_eq!(invocation.arguments, vec![json!("hello")]),
        other => panic!("Unexpected message {:?}", other),
    }
    match hub.receive().await.unwrap() {
        HubMessage::Completion(completion) => {
            assert_eq!(completion.invocation_id, "7");
            assert_eq!(completion.result, Some(json!(500)));
        }
        other => panic!("Unexpected message {:?}", other),
    }
}
