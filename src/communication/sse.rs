use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use http::{Method, Request, StatusCode};
use log::{debug, info};
use tokio::sync::Mutex;
use url::Url;

use crate::error::SignalRError;

use super::http_client::{HeaderProvider, HttpDoer, ResponseBody};
use super::Connection;

const DATA_FIELD: &[u8] = b"data:";

/// Incremental `text/event-stream` parser. Only `data` fields are kept; each
/// completed event contributes its data lines joined by `\n`.
#[derive(Default)]
pub(crate) struct EventStreamParser {
    line: Vec<u8>,
    data: Vec<u8>,
    has_data: bool,
}

impl EventStreamParser {
    /// Feeds a chunk of the body, appending the data of every completed event to `events`.
    pub(crate) fn feed(&mut self, chunk: &[u8], events: &mut Vec<u8>) {
        for &byte in chunk {
            if byte != b'\n' {
                self.line.push(byte);
                continue;
            }

            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }

            if self.line.is_empty() {
                if self.has_data {
                    events.append(&mut self.data);
                    self.has_data = false;
                }
            } else if let Some(value) = self.line.strip_prefix(DATA_FIELD) {
                let value = value.strip_prefix(b" ").unwrap_or(value);
                if self.has_data {
                    self.data.push(b'\n');
                }
                self.data.extend_from_slice(value);
                self.has_data = true;
            }

            self.line.clear();
        }
    }
}

struct SseReader {
    body: ResponseBody,
    parser: EventStreamParser,
    pending: Vec<u8>,
}

/// A [`Connection`] over Server-Sent Events: reads come from the event stream,
/// writes are POSTed to the connection URL.
pub struct SseConnection {
    connection_id: String,
    url: Url,
    http_client: Arc<dyn HttpDoer>,
    headers: Option<HeaderProvider>,
    reader: Mutex<SseReader>,
}

impl SseConnection {
    pub fn new(
        connection_id: String,
        url: Url,
        body: ResponseBody,
        http_client: Arc<dyn HttpDoer>,
        headers: Option<HeaderProvider>,
    ) -> Self {
        SseConnection {
            connection_id,
            url,
            http_client,
            headers,
            reader: Mutex::new(SseReader {
                body,
                parser: EventStreamParser::default(),
                pending: Vec::new(),
            }),
        }
    }

    async fn read_into(&self, buffer: &mut [u8]) -> Result<usize, SignalRError> {
        let mut guard = self.reader.lock().await;
        let reader = &mut *guard;

        while reader.pending.is_empty() {
            match reader.body.next().await {
                Some(chunk) => reader.parser.feed(&chunk?, &mut reader.pending),
                None => {
                    info!("Event stream of connection {} ended", self.connection_id);
                    return Err(SignalRError::ConnectionClosed);
                }
            }
        }

        let count = buffer.len().min(reader.pending.len());
        buffer[..count].copy_from_slice(&reader.pending[..count]);
        reader.pending.drain(..count);

        Ok(count)
    }

    async fn post(&self, data: &[u8]) -> Result<usize, SignalRError> {
        let mut request = Request::builder().method(Method::POST).uri(self.url.as_str());
        if let (Some(provider), Some(request_headers)) = (&self.headers, request.headers_mut()) {
            request_headers.extend(provider());
        }
        let request = request.body(data.to_vec())?;
        debug!("Posting {} bytes to {}", data.len(), self.url);

        let response = self.http_client.execute(request).await?;
        if response.status != StatusCode::OK {
            return Err(SignalRError::UnexpectedStatus {
                method: Method::POST.to_string(),
                url: self.url.to_string(),
                status: response.status.to_string(),
            });
        }

        Ok(data.len())
    }
}

impl Connection for SseConnection {
    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    fn read<'a>(&'a self, buffer: &'a mut [u8]) -> BoxFuture<'a, Result<usize, SignalRError>> {
        self.read_into(buffer).boxed()
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<usize, SignalRError>> {
        self.post(data).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_split_across_chunks() {
        let mut parser = EventStreamParser::default();
        let mut events = Vec::new();

        parser.feed(b"data: {\"type\":6}", &mut events);
        assert!(events.is_empty());

        parser.feed(b"\x1e\r\n\r\n: comment\n\ndata: a\ndata: b\n", &mut events);
        assert_eq!(events, b"{\"type\":6}\x1e".to_vec());

        parser.feed(b"\n", &mut events);
        assert_eq!(events, b"{\"type\":6}\x1ea\nb".to_vec());
    }
}
