pub mod client;
pub mod error;
pub mod model;
pub mod types;

pub use client::{AnthropicClient, MessageSender, complete};
pub use error::AnthropicError;
pub use model::resolve_model;
pub use types::{MessagesRequest, MessagesResponse};
