use serde::Deserialize;

pub(crate) const WEB_SOCKET_TRANSPORT: &str = "WebSockets";
pub(crate) const SERVER_SENT_EVENTS_TRANSPORT: &str = "ServerSentEvents";

/// One transport advertised by the server together with the transfer formats it accepts.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    pub transport: String,
    #[serde(default)]
    pub transfer_formats: Vec<String>,
}

/// Body of the `POST {address}/negotiate` response.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub connection_token: Option<String>,
    #[serde(default)]
    pub negotiate_version: u32,
    #[serde(default)]
    pub available_transports: Vec<AvailableTransport>,
}

impl NegotiateResponse {
    /// The value sent as the `id` query parameter: the connection token when the
    /// server issued one, the connection id otherwise.
    pub fn routing_id(&self) -> &str {
        match self.connection_token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => &self.connection_id,
        }
    }

    /// Transfer formats advertised for `transport`, or `None` if the server does not offer it.
    pub fn transfer_formats(&self, transport: &str) -> Option<&[String]> {
        self.available_transports
            .iter()
            .find(|t| t.transport == transport)
            .map(|t| t.transfer_formats.as_slice())
    }

    pub fn supports(&self, transport: &str) -> bool {
        self.transfer_formats(transport).is_some()
    }
}
