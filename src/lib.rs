//! Client-side transport and session layer for SignalR hubs.
//!
//! [`HttpConnection`] negotiates with a hub endpoint and establishes the best transport the
//! server offers (WebSockets, then Server-Sent Events). [`HubConnection`] frames hub messages
//! over that transport with a [`HubProtocol`] and exposes a cancellable receive plus typed
//! senders.
//!
//! ```ignore
//! let connection = HttpConnection::connect_with("https://localhost:5001/chat", |c| {
//!     c.authenticate_bearer("token".to_string());
//! }).await?.expect("no supported transport");
//!
//! let hub = HubConnection::new(connection, Arc::new(JsonHubProtocol::new()), DEFAULT_MAXIMUM_RECEIVE_MESSAGE_SIZE);
//! hub.start();
//! hub.send_invocation("Send", vec![json!("hello")]).await?;
//! let message = hub.receive().await?;
//! ```

mod client;
mod communication;
mod error;
mod hub;
mod protocol;
#[cfg(test)]
mod tests;

pub use client::{ConnectionConfiguration, HttpConnection};
pub use communication::http_client::{EhttpClient, HeaderProvider, HttpDoer, HttpResponse, QueryStringProvider, ResponseBody};
pub use communication::negotiate::negotiate;
pub use communication::sse::SseConnection;
pub use communication::transport::{establish, Transport};
pub use communication::websocket::{TokioWebSocketDialer, WebSocketConnection, WebSocketDialer};
pub use communication::{write_all, Connection};
pub use error::{SendError, SignalRError};
pub use hub::{HubConnection, HubConnectionState, Items, DEFAULT_MAXIMUM_RECEIVE_MESSAGE_SIZE};
pub use protocol::hub_protocol::{HubProtocol, HubProtocolKind, ProtocolError};
pub use protocol::json::{JsonHubProtocol, RECORD_SEPARATOR};
pub use protocol::messages::{
    CancelInvocationMessage, CloseMessage, CompletionMessage, HubMessage, InvocationMessage, MessageType,
    PingMessage, StreamInvocationMessage, StreamItemMessage,
};
#[cfg(feature = "messagepack")]
pub use protocol::msgpack::MessagePackHubProtocol;
pub use protocol::negotiate::{AvailableTransport, NegotiateResponse};
