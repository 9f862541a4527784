//! LLM-powered SQL drafting support
//!
//! This crate holds everything that talks to, or interprets, a language model.
//! It has no database dependencies - execution and validation stay in
//! `cdw-sqlgen`.
//!
//! ## Backend Selection
//!
//! Set `AGENT_BACKEND` environment variable:
//! - `deepseek` (default): DeepSeek reasoner, OpenAI-compatible API
//! - `anthropic`: Anthropic Claude API
//! - `openai`: OpenAI API

// LLM client abstraction
pub mod anthropic_client;
pub mod backend;
pub mod client_factory;
pub mod llm_client;
pub mod openai_client;

// Conversation and response parsing
pub mod conversation;
pub mod directives;
pub mod extraction;

// Re-exports for convenience
pub use backend::AgentBackend;
pub use client_factory::{create_llm_client_with, LlmSettings};
pub use conversation::{ChatMessage, Conversation, Role};
pub use directives::{DirectiveParser, FunctionTagParser, ParsedDirectives, RepairDirective};
pub use extraction::extract_sql_blocks;
pub use llm_client::{LlmClient, LlmReply};
