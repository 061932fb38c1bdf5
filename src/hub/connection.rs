use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::communication::Connection;
use crate::error::{SendError, SignalRError};
use crate::protocol::hub_protocol::HubProtocol;
use crate::protocol::messages::{
    CancelInvocationMessage, CloseMessage, CompletionMessage, HubMessage, InvocationMessage, PingMessage,
    StreamItemMessage,
};

/// Default upper bound for a single transport read and for a buffered, incomplete message.
pub const DEFAULT_MAXIMUM_RECEIVE_MESSAGE_SIZE: usize = 32 * 1024;

/// Caller-owned per-connection values. No internal semantics.
pub type Items = HashMap<String, Box<dyn Any + Send + Sync>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HubConnectionState {
    Idle = 0,
    Connected = 1,
    Closed = 2,
    Aborted = 3,
}

impl HubConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => HubConnectionState::Idle,
            1 => HubConnectionState::Connected,
            2 => HubConnectionState::Closed,
            _ => HubConnectionState::Aborted,
        }
    }
}

/// Bytes received but not yet parsed, plus the scratch buffer transport reads land in.
struct ReceiveState {
    buffer: Vec<u8>,
    scratch: Vec<u8>,
}

/// A hub session over one established [`Connection`] and one [`HubProtocol`].
///
/// `receive` runs on the caller's task and races every transport read against the
/// cancellation scope. Dropping a pending `receive` drops its read; bytes already
/// received stay buffered for the next call.
///
/// Sends run as their own task so a frame is never cut half-way. When
/// [`HubConnection::abort`] wins the race, the task is still joined before the call
/// returns [`SignalRError::Cancelled`].
///
/// `receive` calls are serialized. Sends are not serialized against each other.
pub struct HubConnection {
    connection: Arc<dyn Connection>,
    protocol: Arc<dyn HubProtocol>,
    maximum_receive_message_size: usize,
    state: AtomicU8,
    items: Items,
    cancellation: CancellationToken,
    receive_state: Mutex<ReceiveState>,
}

impl HubConnection {
    pub fn new(
        connection: Arc<dyn Connection>,
        protocol: Arc<dyn HubProtocol>,
        maximum_receive_message_size: usize,
    ) -> Self {
        let maximum_receive_message_size = maximum_receive_message_size.max(1);

        HubConnection {
            connection,
            protocol,
            maximum_receive_message_size,
            state: AtomicU8::new(HubConnectionState::Idle as u8),
            items: Items::new(),
            cancellation: CancellationToken::new(),
            receive_state: Mutex::new(ReceiveState {
                buffer: Vec::new(),
                scratch: vec![0u8; maximum_receive_message_size],
            }),
        }
    }

    /// Moves an idle connection to `Connected`. Only the first of concurrent calls succeeds;
    /// a closed or aborted connection stays where it is.
    pub fn start(&self) -> bool {
        let started = self
            .state
            .compare_exchange(
                HubConnectionState::Idle as u8,
                HubConnectionState::Connected as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if started {
            info!("Hub connection {} started", self.connection_id());
        }
        started
    }

    pub fn is_connected(&self) -> bool {
        self.state() == HubConnectionState::Connected
    }

    pub fn state(&self) -> HubConnectionState {
        HubConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn connection_id(&self) -> &str {
        self.connection.connection_id()
    }

    pub fn items(&self) -> &Items {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut Items {
        &mut self.items
    }

    /// The cancellation scope governing in-flight operations. Cancelled by [`HubConnection::abort`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Cancels every in-flight `receive` and send, and marks the connection aborted.
    pub fn abort(&self) {
        info!("Aborting hub connection {}", self.connection_id());
        self.cancellation.cancel();
        self.state.store(HubConnectionState::Aborted as u8, Ordering::Release);
    }

    /// Marks the connection closed and sends a close message to the peer.
    ///
    /// The cancellation scope is left untouched: a pending `receive` keeps waiting.
    pub async fn close(&self, error: impl Into<String>) -> Result<CloseMessage, SendError<CloseMessage>> {
        _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
            (state != HubConnectionState::Aborted as u8).then_some(HubConnectionState::Closed as u8)
        });

        let error = error.into();
        let message = CloseMessage::new((!error.is_empty()).then_some(error), true);
        info!("Closing hub connection {}", self.connection_id());

        self.send(message).await
    }

    /// Waits for the next complete hub message.
    ///
    /// Bytes left over after the message stay buffered for the next call. The future is
    /// cancel safe: dropping it loses no message.
    pub async fn receive(&self) -> Result<HubMessage, SignalRError> {
        let mut guard = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => return Err(SignalRError::Cancelled),
            guard = self.receive_state.lock() => guard,
        };
        let state = &mut *guard;

        loop {
            if self.cancellation.is_cancelled() {
                return Err(SignalRError::Cancelled);
            }

            if let Some(message) = self.protocol.read_message(&mut state.buffer)? {
                return Ok(message);
            }

            if state.buffer.len() >= self.maximum_receive_message_size {
                let size = state.buffer.len();
                state.buffer.clear();
                return Err(SignalRError::MessageTooLarge { size, maximum: self.maximum_receive_message_size });
            }

            let read = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => return Err(SignalRError::Cancelled),
                read = self.connection.read(&mut state.scratch) => read?,
            };
            if read == 0 {
                return Err(SignalRError::ConnectionClosed);
            }

            state.buffer.extend_from_slice(&state.scratch[..read]);
        }
    }

    /// Sends a send-only invocation of `target`.
    pub async fn send_invocation(
        &self,
        target: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Result<InvocationMessage, SendError<InvocationMessage>> {
        self.send(InvocationMessage::send_only(target, arguments)).await
    }

    pub async fn stream_item(
        &self,
        invocation_id: impl Into<String>,
        item: Value,
    ) -> Result<StreamItemMessage, SendError<StreamItemMessage>> {
        self.send(StreamItemMessage::new(invocation_id, item)).await
    }

    pub async fn completion(
        &self,
        invocation_id: impl Into<String>,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<CompletionMessage, SendError<CompletionMessage>> {
        self.send(CompletionMessage::new(invocation_id, result, error)).await
    }

    pub async fn cancel_invocation(
        &self,
        invocation_id: impl Into<String>,
    ) -> Result<CancelInvocationMessage, SendError<CancelInvocationMessage>> {
        self.send(CancelInvocationMessage::new(invocation_id)).await
    }

    pub async fn ping(&self) -> Result<PingMessage, SendError<PingMessage>> {
        self.send(PingMessage::new()).await
    }

    async fn send<T>(&self, message: T) -> Result<T, SendError<T>>
    where
        T: Into<HubMessage> + Clone + Debug,
    {
        match self.write_message(message.clone().into()).await {
            Ok(()) => Ok(message),
            Err(source) => Err(SendError { message, source }),
        }
    }

    async fn write_message(&self, message: HubMessage) -> Result<(), SignalRError> {
        let connection = self.connection.clone();
        let protocol = self.protocol.clone();

        // a write is never interrupted half-way; abort or a dropped caller only stops waiting for it
        let attempt = tokio::spawn(async move {
            debug!("Writing {:?} message to {}", message.message_type(), connection.connection_id());
            protocol.write_message(&message, connection.as_ref()).await
        });

        self.join(attempt).await
    }

    /// Races `attempt` against the cancellation scope, joining it in both cases.
    async fn join<T>(&self, mut attempt: JoinHandle<Result<T, SignalRError>>) -> Result<T, SignalRError> {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => {
                if let Err(e) = (&mut attempt).await {
                    warn!("Abandoned operation on {} failed: {}", self.connection_id(), e);
                }
                Err(SignalRError::Cancelled)
            }
            result = &mut attempt => result?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::json::JsonHubProtocol;
    use crate::tests::ScriptedConnection;

    #[test_log::test(tokio::test)]
    async fn test_read_scratch_is_reused_across_receives() {
        let connection = Arc::new(ScriptedConnection::new("c", vec![b"{\"type\":6}\x1e", b"{\"type\":6}\x1e"]));
        let hub = HubConnection::new(connection, Arc::new(JsonHubProtocol::new()), 64);
        let scratch = hub.receive_state.lock().await.scratch.as_ptr();

        hub.receive().await.unwrap();
        hub.receive().await.unwrap();

        let state = hub.receive_state.lock().await;
        assert_eq!(state.scratch.as_ptr(), scratch);
        assert_eq!(state.scratch.len(), 64);
        assert!(state.buffer.is_empty());
    }
}
