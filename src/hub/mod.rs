mod connection;

pub use connection::{HubConnection, HubConnectionState, Items, DEFAULT_MAXIMUM_RECEIVE_MESSAGE_SIZE};
