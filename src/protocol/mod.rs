pub mod negotiate;
pub mod messages;
pub mod hub_protocol;
pub mod json;
#[cfg(feature = "messagepack")]
pub mod msgpack;
