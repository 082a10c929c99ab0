//! Normalized vendor output, shared by the orchestrator and the gateway.
//!
//! Replaces the original's three-optional-field `ChatMessage{Content,
//! ReasoningContent,FinishReason}` struct (see `browser/chat_handler.go`)
//! with an enum — exactly one variant is ever meaningful per instance, which
//! the original only achieved by convention.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedMessage {
    Content(String),
    Reasoning(String),
    Finish,
}
