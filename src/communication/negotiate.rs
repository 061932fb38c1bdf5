use http::{Method, Request, StatusCode};
use log::{debug, info};
use url::Url;

use crate::error::SignalRError;
use crate::protocol::negotiate::NegotiateResponse;

use super::http_client::{HeaderProvider, HttpDoer, QueryStringProvider};

/// Builds `{address}/negotiate`, with the query string replaced by `query_string` when given.
pub(crate) fn negotiate_url(address: &str, query_string: Option<&QueryStringProvider>) -> Result<Url, SignalRError> {
    let mut url = Url::parse(&format!("{}/negotiate", address.trim_end_matches('/')))?;

    if let Some(provider) = query_string {
        let query = provider();
        url.set_query(if query.is_empty() { None } else { Some(query.as_str()) });
    }

    Ok(url)
}

/// Performs the `POST {address}/negotiate` handshake and decodes the server's capabilities.
///
/// Both providers are resolved at call time. Any status other than `200 OK` fails with
/// [`SignalRError::UnexpectedStatus`]. The response body is dropped, and so closed, on every path.
/// Dropping the returned future cancels the request.
pub async fn negotiate(
    address: &str,
    http_client: &dyn HttpDoer,
    headers: Option<&HeaderProvider>,
    query_string: Option<&QueryStringProvider>,
) -> Result<NegotiateResponse, SignalRError> {
    let url = negotiate_url(address, query_string)?;
    info!("Negotiating with {}", url);

    let mut request = Request::builder().method(Method::POST).uri(url.as_str());
    if let Some(provider) = headers {
        if let Some(request_headers) = request.headers_mut() {
            request_headers.extend(provider());
        }
    }
    let request = request.body(Vec::new())?;

    let response = http_client.execute(request).await?;

    if response.status != StatusCode::OK {
        return Err(SignalRError::UnexpectedStatus {
            method: Method::POST.to_string(),
            url: url.to_string(),
            status: response.status.to_string(),
        });
    }

    let body = response.bytes().await?;
    let negotiation = serde_json::from_slice::<NegotiateResponse>(&body)?;
    debug!(
        "Negotiated connection {} with transports {:?}",
        negotiation.connection_id,
        negotiation.available_transports.iter().map(|t| t.transport.as_str()).collect::<Vec<_>>()
    );

    Ok(negotiation)
}
