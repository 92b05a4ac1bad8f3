// sprinkly-api: Async Rust client for the OpenSprinkler HTTP API and MQTT push channel

pub mod client;
pub mod error;
pub mod push;
pub mod result_code;
pub mod transport;

pub use client::{SprinklerClient, Verb};
pub use error::Error;
pub use push::{PushConfig, PushEvent, PushHandle, PushMessage, ReconnectConfig};
pub use result_code::ResultCode;
pub use transport::TransportConfig;
