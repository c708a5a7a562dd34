//! Gateway wire formats and transports

pub mod gateway;

pub use gateway::{ChatCompletionBody, HttpTransport};
