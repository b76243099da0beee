//! Conversation model and system prompt policy.

mod models;
mod prompts;

pub use models::{ConversationMessage, Role, context_window, user_message_count};
pub use prompts::{ConversationConfig, PromptPolicy, PromptTier};
