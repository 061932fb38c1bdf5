use std::sync::Arc;

use base64::{engine::general_purpose, Engine};
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};

use crate::communication::http_client::{EhttpClient, HeaderProvider, HttpDoer, QueryStringProvider};
use crate::communication::websocket::{TokioWebSocketDialer, WebSocketDialer};
use crate::error::SignalRError;
use crate::protocol::hub_protocol::HubProtocolKind;

#[derive(Clone)]
pub(crate) enum Authentication {
    None,
    Basic {
        user: String,
        password: Option<String>,
    },
    Bearer {
        token: String,
    },
}

/// Options for negotiating and establishing an HTTP-based connection.
pub struct ConnectionConfiguration {
    _http_client: Arc<dyn HttpDoer>,
    _websocket_dialer: Option<Arc<dyn WebSocketDialer>>,
    _protocol_kind: HubProtocolKind,
    _headers: Option<HeaderProvider>,
    _query_string: Option<QueryStringProvider>,
    _authentication: Authentication,
}

impl Default for ConnectionConfiguration {
    fn default() -> Self {
        ConnectionConfiguration::new()
    }
}

impl ConnectionConfiguration {
    pub(crate) fn new() -> Self {
        ConnectionConfiguration {
            _http_client: Arc::new(EhttpClient::new()),
            _websocket_dialer: None,
            _protocol_kind: HubProtocolKind::default(),
            _headers: None,
            _query_string: None,
            _authentication: Authentication::None,
        }
    }

    /// Sets the HTTP client used for the negotiate request and the Server-Sent Events transport.
    ///
    /// # Arguments
    ///
    /// * `client` - Any [`HttpDoer`]. Defaults to an `ehttp` based client.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let connection = HttpConnection::connect_with("https://localhost:5001/chat", |c| {
    ///     c.with_http_client(Arc::new(MyHttpClient::default()));
    /// }).await?;
    /// ```
    pub fn with_http_client(&mut self, client: Arc<dyn HttpDoer>) -> &ConnectionConfiguration {
        self._http_client = client;

        self
    }

    /// Sets the dialer used to open WebSocket connections.
    pub fn with_websocket_dialer(&mut self, dialer: Arc<dyn WebSocketDialer>) -> &ConnectionConfiguration {
        self._websocket_dialer = Some(dialer);

        self
    }

    /// Tells the default WebSocket dialer that the hub speaks MessagePack, so frames go out
    /// as binary. JSON, sent as text frames, is the default.
    #[cfg(feature = "messagepack")]
    pub fn with_messagepack_protocol(&mut self) -> &ConnectionConfiguration {
        self._protocol_kind = HubProtocolKind::MessagePack;

        self
    }

    /// Sets the function providing request headers for HTTP and WebSocket requests.
    ///
    /// The function is called for every request, so it may hand out refreshed tokens.
    /// An `Authorization: Bearer <token>` header is moved into the `access_token` query
    /// parameter when the WebSocket transport is used.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let connection = HttpConnection::connect_with("https://localhost:5001/chat", |c| {
    ///     c.with_headers(|| {
    ///         let mut headers = HeaderMap::new();
    ///         headers.insert("x-tenant", HeaderValue::from_static("blue"));
    ///         headers
    ///     });
    /// }).await?;
    /// ```
    pub fn with_headers<Provider: Fn() -> HeaderMap + Send + Sync + 'static>(&mut self, headers: Provider) -> &ConnectionConfiguration {
        self._headers = Some(Arc::new(headers));

        self
    }

    /// Sets the function providing the raw query string of the negotiate request.
    pub fn with_query_string<Provider: Fn() -> String + Send + Sync + 'static>(&mut self, query_string: Provider) -> &ConnectionConfiguration {
        self._query_string = Some(Arc::new(query_string));

        self
    }

    /// Configures the connection to use basic authentication.
    ///
    /// # Arguments
    ///
    /// * `user` - A `String` specifying the username for authentication.
    /// * `password` - An `Option<String>` specifying the password for authentication. If `None`, no password is used.
    pub fn authenticate_basic(&mut self, user: String, password: Option<String>) -> &ConnectionConfiguration {
        self._authentication = Authentication::Basic { user, password };

        self
    }

    /// Configures the connection to use bearer token authentication.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let connection = HttpConnection::connect_with("https://localhost:5001/chat", |c| {
    ///     c.authenticate_bearer("your_bearer_token".to_string());
    /// }).await?;
    /// ```
    pub fn authenticate_bearer(&mut self, token: String) -> &ConnectionConfiguration {
        self._authentication = Authentication::Bearer { token };

        self
    }

    pub(crate) fn get_http_client(&self) -> Arc<dyn HttpDoer> {
        self._http_client.clone()
    }

    pub(crate) fn get_protocol_kind(&self) -> HubProtocolKind {
        self._protocol_kind
    }

    pub(crate) fn get_websocket_dialer(&self) -> Arc<dyn WebSocketDialer> {
        match &self._websocket_dialer {
            Some(dialer) => dialer.clone(),
            None => Arc::new(TokioWebSocketDialer::new(self.get_protocol_kind())),
        }
    }

    pub(crate) fn get_query_string(&self) -> Option<QueryStringProvider> {
        self._query_string.clone()
    }

    /// The effective header provider: the configured one, plus the authentication header.
    pub(crate) fn get_header_provider(&self) -> Result<Option<HeaderProvider>, SignalRError> {
        let authorization = match &self._authentication {
            Authentication::None => return Ok(self._headers.clone()),
            Authentication::Basic { user, password } => ConnectionConfiguration::basic_auth(user, password.as_deref()),
            Authentication::Bearer { token } => format!("Bearer {}", token),
        };
        let authorization = HeaderValue::from_str(&authorization)
            .map_err(|e| SignalRError::InvalidHeader(format!("{}: {}", AUTHORIZATION, e)))?;

        let headers = self._headers.clone();
        let provider: HeaderProvider = Arc::new(move || {
            let mut map = headers.as_ref().map(|provider| provider()).unwrap_or_default();
            map.insert(AUTHORIZATION, authorization.clone());
            map
        });

        Ok(Some(provider))
    }

    fn basic_auth(username: &str, password: Option<&str>) -> String {
        let mut ret = String::new();
        general_purpose::STANDARD.encode_string(format!("{}:{}", username, password.unwrap_or("")), &mut ret);

        format!("Basic {}", &ret)
    }
}
