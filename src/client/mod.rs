mod configuration;
mod http_connection;

pub use configuration::ConnectionConfiguration;
pub use http_connection::HttpConnection;
