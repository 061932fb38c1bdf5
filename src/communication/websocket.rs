use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{SplitSink, SplitStream};
use futures::{FutureExt, SinkExt, StreamExt};
use http::{HeaderMap, Uri};
use log::{debug, info};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_native_tls::native_tls::TlsConnector;
use tokio_websockets::{ClientBuilder, MaybeTlsStream, Message, WebSocketStream};
use url::Url;

use crate::error::SignalRError;
use crate::protocol::hub_protocol::{HubProtocolKind, ProtocolError};

use super::Connection;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens a WebSocket to `url` sending `headers` with the upgrade request.
pub trait WebSocketDialer: Send + Sync {
    fn dial(
        &self,
        url: Url,
        headers: HeaderMap,
        connection_id: String,
    ) -> BoxFuture<'static, Result<Arc<dyn Connection>, SignalRError>>;
}

/// Default [`WebSocketDialer`] over `tokio-websockets`, using native TLS for `wss` endpoints.
///
/// Frames are sent as text or binary according to the transfer format of `protocol_kind`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioWebSocketDialer {
    protocol_kind: HubProtocolKind,
}

impl TokioWebSocketDialer {
    pub fn new(protocol_kind: HubProtocolKind) -> Self {
        TokioWebSocketDialer { protocol_kind }
    }

    async fn connect_to_server(url: Url, headers: HeaderMap) -> Result<Socket, SignalRError> {
        let endpoint: Uri = url
            .as_str()
            .parse()
            .map_err(|e: http::uri::InvalidUri| SignalRError::Http(e.into()))?;
        info!("Connecting to endpoint {}", endpoint);

        let mut builder = ClientBuilder::from_uri(endpoint.clone());
        for (name, value) in headers.iter() {
            builder = builder.add_header(name.clone(), value.clone())?;
        }

        let (socket, _) = if Some("wss") == endpoint.scheme_str() {
            info!("Connection to secure endpoint...");
            let connector = TlsConnector::new().map_err(|e| SignalRError::Tls(e.to_string()))?;
            let connector = tokio_websockets::Connector::NativeTls(connector.into());
            builder.connector(&connector).connect().await?
        } else {
            info!("Connection to plain endpoint...");
            builder.connect().await?
        };

        Ok(socket)
    }
}

impl WebSocketDialer for TokioWebSocketDialer {
    fn dial(
        &self,
        url: Url,
        headers: HeaderMap,
        connection_id: String,
    ) -> BoxFuture<'static, Result<Arc<dyn Connection>, SignalRError>> {
        let protocol_kind = self.protocol_kind;

        async move {
            let socket = TokioWebSocketDialer::connect_to_server(url, headers).await?;
            let connection: Arc<dyn Connection> =
                Arc::new(WebSocketConnection::new(connection_id, socket, protocol_kind));
            Ok(connection)
        }
        .boxed()
    }
}

struct WebSocketReader {
    stream: SplitStream<Socket>,
    pending: Vec<u8>,
}

/// A [`Connection`] over one WebSocket. Frame payloads are exposed as a byte stream.
pub struct WebSocketConnection {
    connection_id: String,
    protocol_kind: HubProtocolKind,
    sink: Mutex<SplitSink<Socket, Message>>,
    reader: Mutex<WebSocketReader>,
}

impl WebSocketConnection {
    pub fn new(connection_id: String, socket: Socket, protocol_kind: HubProtocolKind) -> Self {
        let (sink, stream) = socket.split();

        WebSocketConnection {
            connection_id,
            protocol_kind,
            sink: Mutex::new(sink),
            reader: Mutex::new(WebSocketReader { stream, pending: Vec::new() }),
        }
    }

    async fn read_into(&self, buffer: &mut [u8]) -> Result<usize, SignalRError> {
        let mut guard = self.reader.lock().await;
        let reader = &mut *guard;

        while reader.pending.is_empty() {
            match reader.stream.next().await {
                Some(Ok(message)) if message.is_text() || message.is_binary() => {
                    reader.pending.extend_from_slice(message.as_payload());
                }
                Some(Ok(message)) if message.is_close() => {
                    info!("WebSocket {} closed by the server", self.connection_id);
                    return Err(SignalRError::ConnectionClosed);
                }
                // ping and pong frames are answered by the socket itself
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Err(SignalRError::ConnectionClosed),
            }
        }

        let count = buffer.len().min(reader.pending.len());
        buffer[..count].copy_from_slice(&reader.pending[..count]);
        reader.pending.drain(..count);

        Ok(count)
    }

    async fn write_frame(&self, data: &[u8]) -> Result<usize, SignalRError> {
        let message = frame(self.protocol_kind, data)?;
        debug!("Sending {} bytes over WebSocket {}", data.len(), self.connection_id);

        self.sink.lock().await.send(message).await?;

        Ok(data.len())
    }
}

impl Connection for WebSocketConnection {
    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    fn read<'a>(&'a self, buffer: &'a mut [u8]) -> BoxFuture<'a, Result<usize, SignalRError>> {
        self.read_into(buffer).boxed()
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<usize, SignalRError>> {
        self.write_frame(data).boxed()
    }
}

/// Wraps `data` in a text frame for text protocols and a binary frame otherwise.
fn frame(protocol_kind: HubProtocolKind, data: &[u8]) -> Result<Message, SignalRError> {
    match protocol_kind.transfer_format() {
        "Text" => {
            let text = std::str::from_utf8(data).map_err(|e| ProtocolError::InvalidFrame(e.to_string()))?;
            Ok(Message::text(text.to_string()))
        }
        _ => Ok(Message::binary(data.to_vec())),
    }
}
