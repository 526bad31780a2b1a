pub mod openrouter;

use async_trait::async_trait;

use crate::error::CompletionResult;
use crate::state::Message;

pub use openrouter::{build_messages, interpret_response, ApiMessage, OpenRouterClient};

/// Something that turns a conversation into the next assistant reply.
///
/// The conversation view-model only talks to this trait, so the HTTP client
/// can be swapped for a scripted one in tests.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Sends `user_text` with the recent `history` and returns the reply text.
    async fn send_message(&self, user_text: &str, history: &[Message]) -> CompletionResult<String>;
}
