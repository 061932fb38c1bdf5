use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};

use futures::channel::{mpsc, oneshot};
use futures::future::{self, BoxFuture};
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use http::{HeaderMap, Request, StatusCode};
use log::debug;

use crate::error::SignalRError;

/// Streamed response body. Dropping it closes the underlying response.
pub type ResponseBody = BoxStream<'static, Result<Vec<u8>, SignalRError>>;

/// Supplies request headers. Invoked once per request so tokens can be refreshed.
pub type HeaderProvider = Arc<dyn Fn() -> HeaderMap + Send + Sync>;

/// Supplies the raw query string of the negotiate request. Invoked once per request.
pub type QueryStringProvider = Arc<dyn Fn() -> String + Send + Sync>;

pub struct HttpResponse {
    pub status: StatusCode,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: ResponseBody) -> Self {
        HttpResponse { status, body }
    }

    /// A response whose whole body is already in memory.
    pub fn from_bytes(status: StatusCode, bytes: Vec<u8>) -> Self {
        HttpResponse::new(status, futures::stream::iter(vec![Ok(bytes)]).boxed())
    }

    /// Drains the body into memory.
    pub async fn bytes(mut self) -> Result<Vec<u8>, SignalRError> {
        let mut data = Vec::new();
        while let Some(chunk) = self.body.next().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(data)
    }
}

/// Performs one HTTP round trip. The response head is returned as soon as it arrives;
/// the body keeps streaming.
pub trait HttpDoer: Send + Sync {
    fn execute(&self, request: Request<Vec<u8>>) -> BoxFuture<'static, Result<HttpResponse, SignalRError>>;
}

/// Default [`HttpDoer`] backed by `ehttp` streaming fetch.
#[derive(Debug, Clone, Copy, Default)]
pub struct EhttpClient;

impl EhttpClient {
    pub fn new() -> Self {
        EhttpClient
    }

    fn convert(request: Request<Vec<u8>>) -> Result<ehttp::Request, SignalRError> {
        let (parts, body) = request.into_parts();

        let mut outgoing = ehttp::Request::get(parts.uri.to_string());
        outgoing.method = parts.method.to_string();
        outgoing.body = body;

        for (name, value) in parts.headers.iter() {
            let value = value
                .to_str()
                .map_err(|e| SignalRError::InvalidHeader(format!("{}: {}", name, e)))?;
            outgoing.headers.insert(name.as_str(), value);
        }

        Ok(outgoing)
    }
}

impl HttpDoer for EhttpClient {
    fn execute(&self, request: Request<Vec<u8>>) -> BoxFuture<'static, Result<HttpResponse, SignalRError>> {
        let outgoing = match EhttpClient::convert(request) {
            Ok(outgoing) => outgoing,
            Err(e) => return future::ready(Err(e)).boxed(),
        };
        debug!("{} {}", outgoing.method, outgoing.url);

        let (head_sender, head_receiver) = oneshot::channel::<Result<StatusCode, SignalRError>>();
        let (chunk_sender, chunk_receiver) = mpsc::unbounded::<Result<Vec<u8>, SignalRError>>();
        let head_sender = Mutex::new(Some(head_sender));

        ehttp::streaming::fetch(outgoing, move |part| {
            let pending_head = head_sender.lock().ok().and_then(|mut guard| guard.take());

            match part {
                Ok(ehttp::streaming::Part::Response(response)) => {
                    if let Some(sender) = pending_head {
                        let status = StatusCode::from_u16(response.status)
                            .map_err(|e| SignalRError::Request(e.to_string()));
                        _ = sender.send(status);
                    }
                    ControlFlow::Continue(())
                }
                Ok(ehttp::streaming::Part::Chunk(chunk)) => {
                    // an empty chunk marks the end of the body
                    if chunk.is_empty() || chunk_sender.unbounded_send(Ok(chunk)).is_err() {
                        chunk_sender.close_channel();
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                }
                Err(error) => {
                    match pending_head {
                        Some(sender) => _ = sender.send(Err(SignalRError::Request(error))),
                        None => _ = chunk_sender.unbounded_send(Err(SignalRError::Request(error))),
                    }
                    chunk_sender.close_channel();
                    ControlFlow::Break(())
                }
            }
        });

        async move {
            let status = head_receiver
                .await
                .map_err(|_| SignalRError::Request("The request is cancelled.".to_string()))??;

            Ok(HttpResponse::new(status, chunk_receiver.boxed()))
        }
        .boxed()
    }
}
