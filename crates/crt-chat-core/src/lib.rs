pub mod ai;
pub mod config;
pub mod conversation;
pub mod error;
pub mod state;

// Re-export main types for convenience
pub use ai::{CompletionService, OpenRouterClient};
pub use config::Config;
pub use conversation::{Conversation, PendingReply, Phase};
pub use error::{CompletionError, CompletionResult};
pub use state::{Message, Role, WELCOME_ID};
