pub mod http_client;
pub mod negotiate;
pub mod sse;
pub mod transport;
pub mod websocket;

use futures::future::BoxFuture;

use crate::error::SignalRError;

/// A bidirectional byte stream over one established transport.
///
/// Reads are not aligned with hub message boundaries: a single read may return part of a
/// message or several messages. A read returning `Ok(0)` means the peer closed the stream.
pub trait Connection: Send + Sync {
    /// The id the connection is correlated by (the negotiated connection id, not the token).
    fn connection_id(&self) -> &str;

    fn read<'a>(&'a self, buffer: &'a mut [u8]) -> BoxFuture<'a, Result<usize, SignalRError>>;

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<usize, SignalRError>>;
}

/// Writes the whole of `data`, retrying on short writes.
pub async fn write_all(connection: &dyn Connection, mut data: &[u8]) -> Result<(), SignalRError> {
    while !data.is_empty() {
        let written = connection.write(data).await?;
        if written == 0 {
            return Err(SignalRError::ConnectionClosed);
        }
        data = &data[written..];
    }

    Ok(())
}
