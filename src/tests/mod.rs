#[cfg(feature = "messagepack")]
mod tests_msgpack;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use http::{HeaderMap, Method, Request, StatusCode};
use url::Url;

use crate::communication::http_client::{HttpDoer, HttpResponse};
use crate::communication::websocket::WebSocketDialer;
use crate::communication::Connection;
use crate::error::SignalRError;

/// Serves scripted chunks, one per read, then blocks forever. Records every write.
pub(crate) struct ScriptedConnection {
    id: String,
    chunks: Mutex<VecDeque<Result<Vec<u8>, SignalRError>>>,
    written: Mutex<Vec<u8>>,
}

impl ScriptedConnection {
    pub fn new(id: &str, chunks: Vec<&[u8]>) -> Self {
        ScriptedConnection {
            id: id.to_string(),
            chunks: Mutex::new(chunks.into_iter().map(|c| Ok(c.to_vec())).collect()),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(id: &str, error: SignalRError) -> Self {
        let connection = ScriptedConnection::new(id, vec![]);
        connection.chunks.lock().unwrap().push_back(Err(error));
        connection
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    /// Queues another chunk for a later read.
    pub fn push(&self, chunk: &[u8]) {
        self.chunks.lock().unwrap().push_back(Ok(chunk.to_vec()));
    }
}

impl Connection for ScriptedConnection {
    fn connection_id(&self) -> &str {
        &self.id
    }

    fn read<'a>(&'a self, buffer: &'a mut [u8]) -> BoxFuture<'a, Result<usize, SignalRError>> {
        let mut chunks = self.chunks.lock().unwrap();

        match chunks.pop_front() {
            Some(Ok(chunk)) => {
                let count = buffer.len().min(chunk.len());
                buffer[..count].copy_from_slice(&chunk[..count]);
                if count < chunk.len() {
                    chunks.push_front(Ok(chunk[count..].to_vec()));
                }
                future::ready(Ok(count)).boxed()
            }
            Some(Err(e)) => future::ready(Err(e)).boxed(),
            None => future::pending().boxed(),
        }
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<usize, SignalRError>> {
        self.written.lock().unwrap().extend_from_slice(data);
        future::ready(Ok(data.len())).boxed()
    }
}

/// Delivers one chunk once `ready_at` has passed, then blocks forever.
pub(crate) struct DelayedConnection {
    ready_at: Instant,
    chunk: Mutex<Option<Vec<u8>>>,
}

impl DelayedConnection {
    pub fn new(delay: Duration, chunk: &[u8]) -> Self {
        DelayedConnection {
            ready_at: Instant::now() + delay,
            chunk: Mutex::new(Some(chunk.to_vec())),
        }
    }
}

impl Connection for DelayedConnection {
    fn connection_id(&self) -> &str {
        "delayed"
    }

    fn read<'a>(&'a self, buffer: &'a mut [u8]) -> BoxFuture<'a, Result<usize, SignalRError>> {
        async move {
            tokio::time::sleep_until(self.ready_at).await;

            let chunk = self.chunk.lock().unwrap().take();
            match chunk {
                Some(chunk) => {
                    buffer[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => future::pending().await,
            }
        }
        .boxed()
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<usize, SignalRError>> {
        future::ready(Ok(data.len())).boxed()
    }
}

/// Takes a while to write, then records that the write finished.
pub(crate) struct SlowWriteConnection {
    pub delay: Duration,
    pub finished: AtomicBool,
}

impl Connection for SlowWriteConnection {
    fn connection_id(&self) -> &str {
        "slow"
    }

    fn read<'a>(&'a self, _buffer: &'a mut [u8]) -> BoxFuture<'a, Result<usize, SignalRError>> {
        future::pending().boxed()
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<usize, SignalRError>> {
        async move {
            tokio::time::sleep(self.delay).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(data.len())
        }
        .boxed()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Answers requests from a queue of canned responses, recording each request.
#[derive(Default)]
pub(crate) struct MockHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, SignalRError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockHttpClient {
    pub fn respond(self, response: Result<HttpResponse, SignalRError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn respond_json(self, status: StatusCode, body: &str) -> Self {
        self.respond(Ok(HttpResponse::from_bytes(status, body.as_bytes().to_vec())))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpDoer for MockHttpClient {
    fn execute(&self, request: Request<Vec<u8>>) -> BoxFuture<'static, Result<HttpResponse, SignalRError>> {
        let (parts, body) = request.into_parts();
        self.requests.lock().unwrap().push(RecordedRequest {
            method: parts.method,
            uri: parts.uri.to_string(),
            headers: parts.headers,
            body,
        });

        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SignalRError::Request("no scripted response".to_string())));

        future::ready(response).boxed()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Dial {
    pub url: Url,
    pub headers: HeaderMap,
    pub connection_id: String,
}

/// Records dial attempts and hands out scripted connections.
#[derive(Default)]
pub(crate) struct RecordingDialer {
    dials: Mutex<Vec<Dial>>,
}

impl RecordingDialer {
    pub fn dials(&self) -> Vec<Dial> {
        self.dials.lock().unwrap().clone()
    }
}

impl WebSocketDialer for RecordingDialer {
    fn dial(
        &self,
        url: Url,
        headers: HeaderMap,
        connection_id: String,
    ) -> BoxFuture<'static, Result<Arc<dyn Connection>, SignalRError>> {
        self.dials.lock().unwrap().push(Dial { url, headers, connection_id: connection_id.clone() });

        let connection: Arc<dyn Connection> = Arc::new(ScriptedConnection::new(&connection_id, vec![]));
        future::ready(Ok(connection)).boxed()
    }
}

/// Value of query parameter `key` in `url`.
pub(crate) fn query_parameter(url: &Url, key: &str) -> Option<String> {
    url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
}
