use std::sync::Arc;

use http::header::{ACCEPT, AUTHORIZATION};
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use log::{info, warn};
use url::Url;

use crate::error::SignalRError;
use crate::protocol::negotiate::{NegotiateResponse, SERVER_SENT_EVENTS_TRANSPORT, WEB_SOCKET_TRANSPORT};

use super::http_client::{HeaderProvider, HttpDoer};
use super::sse::SseConnection;
use super::websocket::WebSocketDialer;
use super::Connection;

const BEARER_PREFIX: &str = "Bearer ";
const EVENT_STREAM: &str = "text/event-stream";

/// Transports this client can establish, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    WebSockets,
    ServerSentEvents,
}

impl Transport {
    pub fn name(&self) -> &'static str {
        match self {
            Transport::WebSockets => WEB_SOCKET_TRANSPORT,
            Transport::ServerSentEvents => SERVER_SENT_EVENTS_TRANSPORT,
        }
    }

    /// Picks the preferred transport among those the server advertised.
    pub fn select(negotiation: &NegotiateResponse) -> Option<Transport> {
        [Transport::WebSockets, Transport::ServerSentEvents]
            .into_iter()
            .find(|transport| negotiation.supports(transport.name()))
    }
}

/// `address` with `id` set to the negotiated routing id.
pub(crate) fn connection_url(address: &str, negotiation: &NegotiateResponse) -> Result<Url, SignalRError> {
    let mut url = Url::parse(address)?;
    set_query_parameter(&mut url, "id", negotiation.routing_id());
    Ok(url)
}

fn set_query_parameter(url: &mut Url, key: &str, value: &str) {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut().clear().extend_pairs(retained).append_pair(key, value);
}

/// Rewrites an `http(s)` connection URL into the matching `ws(s)` URL.
pub(crate) fn websocket_url(url: &Url) -> Result<Url, SignalRError> {
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };

    // rebuilt from the serialized form, `Url::set_scheme` rejects some scheme changes
    let rest = &url.as_str()[url.scheme().len()..];
    Ok(Url::parse(&format!("{}{}", scheme, rest))?)
}

/// Removes an `Authorization: Bearer <token>` header and returns the bare token.
pub(crate) fn take_bearer_token(headers: &mut HeaderMap) -> Option<String> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::to_string)?;

    headers.remove(AUTHORIZATION);
    Some(token)
}

/// Establishes the best transport the server advertised.
///
/// WebSockets win over Server-Sent Events. Only one transport is attempted. When the
/// server offers neither, `Ok(None)` is returned: the caller must treat that as
/// "negotiation found nothing usable".
pub async fn establish(
    address: &str,
    negotiation: &NegotiateResponse,
    http_client: Arc<dyn HttpDoer>,
    dialer: &dyn WebSocketDialer,
    headers: Option<HeaderProvider>,
) -> Result<Option<Arc<dyn Connection>>, SignalRError> {
    let url = connection_url(address, negotiation)?;

    match Transport::select(negotiation) {
        Some(Transport::WebSockets) => {
            let mut ws_url = websocket_url(&url)?;

            let mut request_headers = headers.as_ref().map(|provider| provider()).unwrap_or_default();
            if let Some(token) = take_bearer_token(&mut request_headers) {
                set_query_parameter(&mut ws_url, "access_token", &token);
            }

            info!("Selected {} transport, dialing {}", WEB_SOCKET_TRANSPORT, ws_url);
            let connection = dialer
                .dial(ws_url, request_headers, negotiation.connection_id.clone())
                .await?;

            Ok(Some(connection))
        }
        Some(Transport::ServerSentEvents) => {
            info!("Selected {} transport, opening {}", SERVER_SENT_EVENTS_TRANSPORT, url);

            let mut request = Request::builder().method(Method::GET).uri(url.as_str());
            if let Some(request_headers) = request.headers_mut() {
                if let Some(provider) = &headers {
                    request_headers.extend(provider());
                }
                request_headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM));
            }
            let request = request.body(Vec::new())?;

            let response = http_client.execute(request).await?;
            if response.status != StatusCode::OK {
                return Err(SignalRError::UnexpectedStatus {
                    method: Method::GET.to_string(),
                    url: url.to_string(),
                    status: response.status.to_string(),
                });
            }

            let connection: Arc<dyn Connection> = Arc::new(SseConnection::new(
                negotiation.connection_id.clone(),
                url,
                response.body,
                http_client,
                headers,
            ));

            Ok(Some(connection))
        }
        None => {
            warn!("The negotiation concluded no supported transport for connection {}", negotiation.connection_id);
            Ok(None)
        }
    }
}
