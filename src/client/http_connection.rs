use std::sync::Arc;

use log::info;

use crate::communication::negotiate::negotiate;
use crate::communication::transport::establish;
use crate::communication::Connection;
use crate::error::SignalRError;

use super::ConnectionConfiguration;

/// Entry point turning an HTTP endpoint into a [`Connection`].
pub struct HttpConnection;

impl HttpConnection {
    /// Negotiates with `address` and establishes the best transport, using the default configuration.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(connection))` - The established transport.
    /// * `Ok(None)` - The server advertised no transport this client supports.
    /// * `Err(SignalRError)` - Negotiation or transport establishment failed.
    pub async fn connect(address: &str) -> Result<Option<Arc<dyn Connection>>, SignalRError> {
        HttpConnection::connect_with(address, |_| {}).await
    }

    /// Negotiates with `address` and establishes the best transport.
    ///
    /// Dropping the returned future cancels the negotiation; it has no effect on a
    /// connection that was already handed out.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let connection = HttpConnection::connect_with("https://localhost:5001/chat", |c| {
    ///     c.authenticate_bearer("token".to_string());
    ///     c.with_query_string(|| "tenant=blue".to_string());
    /// }).await?;
    /// ```
    pub async fn connect_with(
        address: &str,
        options: impl FnOnce(&mut ConnectionConfiguration),
    ) -> Result<Option<Arc<dyn Connection>>, SignalRError> {
        let mut configuration = ConnectionConfiguration::new();
        options(&mut configuration);

        let http_client = configuration.get_http_client();
        let headers = configuration.get_header_provider()?;
        let query_string = configuration.get_query_string();

        let negotiation = negotiate(address, http_client.as_ref(), headers.as_ref(), query_string.as_ref()).await?;
        let connection = establish(
            address,
            &negotiation,
            http_client,
            configuration.get_websocket_dialer().as_ref(),
            headers,
        )
        .await?;

        if let Some(connection) = &connection {
            info!("Connection {} established", connection.connection_id());
        }

        Ok(connection)
    }
}
