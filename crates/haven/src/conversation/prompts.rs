//! Depth-tiered system prompts.
//!
//! The assistant shifts from clarifying questions early in a conversation
//! toward reflective, supportive statements as the user shares more. Tiers
//! are plain configuration so they can be retuned without touching the relay.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

const EARLY_PROMPT: &str = r#"You are a professional, empathetic therapist with advanced reasoning capabilities. Use Chain of Thought reasoning to identify the core problem from the user's initial responses. Ask only 1-2 targeted questions maximum to clarify the specific issue, then focus on therapeutic observations and insights. Consider multiple perspectives (Tree of Thoughts) before responding. Validate your understanding through Self-Consistency checks. Use professional therapeutic language - avoid direct validation questions like "am I correct" or "is that right". Instead, make thoughtful observations and offer therapeutic insights. When appropriate, offer 1-2 practical, actionable steps they could try.

REASONING PROCESS:
1. Chain of Thought: Identify the core problem from user's initial sharing
2. Tree of Thoughts: Consider multiple possible interpretations and therapeutic approaches
3. Self-Consistency: Validate that your understanding aligns with the conversation context
4. Response: Provide professional therapeutic observations and insights, with minimal targeted questions"#;

const MIDDLE_PROMPT: &str = r#"You are a professional, empathetic therapist with advanced reasoning capabilities. Use Chain of Thought reasoning to analyze the conversation flow and understand the identified problem deeply. Incorporate previous conversation context naturally into your responses. Focus on providing therapeutic insights, observations, and supportive statements. Ask questions only when absolutely necessary to clarify a specific aspect of the already-identified problem. Use professional therapeutic language - avoid direct validation questions. Consider multiple perspectives (Tree of Thoughts) to understand the user's evolving situation. Apply Self-Consistency checks to ensure your responses align with the conversation history. Help the user think clearly about their situation through therapeutic insights and observations. When they share challenges, offer specific, practical suggestions like breathing exercises, journaling prompts, or small behavioral changes.

REASONING PROCESS:
1. Chain of Thought: Deeply analyze the identified problem and user's current state, incorporating previous context
2. Tree of Thoughts: Consider different therapeutic approaches to provide insights and support
3. Self-Consistency: Ensure your response fits naturally with the conversation history and therapeutic relationship
4. Response: Provide therapeutic insights and observations, with questions only when essential"#;

const DEEP_PROMPT: &str = r#"You are a professional, empathetic therapist with advanced reasoning capabilities. Use Chain of Thought reasoning to deeply understand the user's journey and the core problem they're working through. Incorporate the full conversation history and therapeutic relationship context into your responses. Focus almost entirely on providing supportive therapeutic insights, observations, and gentle reflections. Ask questions only in rare cases where a specific clarification is absolutely necessary. Use professional therapeutic language throughout - avoid direct validation questions. Apply Tree of Thoughts to consider multiple therapeutic approaches. Use Self-Consistency to ensure your presence feels authentic and aligned with the established therapeutic relationship. Be present and supportive without being formulaic. Help the user feel heard and validated through therapeutic insights and observations. When appropriate, suggest concrete next steps like setting small goals, trying specific techniques, or reaching out to someone.

REASONING PROCESS:
1. Chain of Thought: Reflect on the user's journey and the core problem they're addressing, incorporating full conversation history
2. Tree of Thoughts: Consider various therapeutic approaches to provide meaningful insights and support
3. Self-Consistency: Ensure your response maintains the authentic therapeutic relationship built
4. Response: Provide supportive therapeutic insights and observations, rarely asking questions"#;

/// One system prompt and the largest user message count it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTier {
    /// Inclusive upper bound on user messages. `None` matches any count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_user_messages: Option<usize>,
    pub prompt: String,
}

impl PromptTier {
    pub fn up_to(max_user_messages: usize, prompt: impl Into<String>) -> Self {
        Self {
            max_user_messages: Some(max_user_messages),
            prompt: prompt.into(),
        }
    }

    pub fn unbounded(prompt: impl Into<String>) -> Self {
        Self {
            max_user_messages: None,
            prompt: prompt.into(),
        }
    }

    fn matches(&self, user_messages: usize) -> bool {
        self.max_user_messages
            .is_none_or(|max| user_messages <= max)
    }
}

/// Conversation shaping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Number of trailing messages forwarded upstream.
    pub context_messages: usize,
    pub prompt_tiers: Vec<PromptTier>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            context_messages: 8,
            prompt_tiers: vec![
                PromptTier::up_to(3, EARLY_PROMPT),
                PromptTier::up_to(8, MIDDLE_PROMPT),
                PromptTier::unbounded(DEEP_PROMPT),
            ],
        }
    }
}

/// Selects the system prompt for a conversation depth.
#[derive(Debug, Clone)]
pub struct PromptPolicy {
    tiers: Vec<PromptTier>,
}

impl PromptPolicy {
    /// Build a policy. Bounded tiers are ordered by bound, unbounded last.
    pub fn new(mut tiers: Vec<PromptTier>) -> Result<Self> {
        if tiers.is_empty() {
            bail!("at least one prompt tier must be configured");
        }
        if tiers.iter().any(|t| t.prompt.trim().is_empty()) {
            bail!("prompt tiers cannot have an empty prompt");
        }
        tiers.sort_by_key(|t| t.max_user_messages.unwrap_or(usize::MAX));
        Ok(Self { tiers })
    }

    pub fn from_config(config: &ConversationConfig) -> Result<Self> {
        Self::new(config.prompt_tiers.clone())
    }

    /// The prompt for a conversation holding `user_messages` user turns.
    /// Counts beyond every bound fall through to the last tier.
    pub fn select(&self, user_messages: usize) -> &str {
        self.tiers
            .iter()
            .find(|t| t.matches(user_messages))
            .or_else(|| self.tiers.last())
            .map(|t| t.prompt.as_str())
            .unwrap_or_default()
    }

    pub fn tiers(&self) -> &[PromptTier] {
        &self.tiers
    }
}

impl Default for PromptPolicy {
    fn default() -> Self {
        Self {
            tiers: ConversationConfig::default().prompt_tiers,
        }
    }
}
