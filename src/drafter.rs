//! Drafter
//!
//! Turns one input record into SQL fragments with a single model call. The
//! record goes in as the next user turn, the raw response is kept as the
//! assistant turn whether or not anything could be extracted from it.

use std::sync::Arc;

use async_trait::async_trait;
use cdw_agentic::{extract_sql_blocks, Conversation, LlmClient};
use tracing::{debug, info, warn};

use crate::fragment_store::FragmentStore;
use crate::input::InputRecord;

/// System prompt used when no prompt file is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("prompts/sql_drafting.md");

/// What one record contributed to the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftOutcome {
    pub step_ids: Vec<String>,
    /// Extracted blocks the store refused (duplicate id, marker in body)
    pub rejected: usize,
    pub llm_error: Option<String>,
}

impl DraftOutcome {
    /// The record produced no fragment; the run continues degraded
    pub fn is_soft_failure(&self) -> bool {
        self.step_ids.is_empty()
    }
}

#[async_trait]
pub trait Drafter: Send + Sync {
    async fn draft(
        &self,
        record: &InputRecord,
        conversation: &mut Conversation,
        store: &mut FragmentStore,
    ) -> DraftOutcome;
}

/// Step id of the `block`-th fragment drafted for record `position`
pub fn step_id_for(position: usize, block: usize) -> String {
    if block == 0 {
        position.to_string()
    } else {
        format!("{}.{}", position, block)
    }
}

/// Append extracted blocks under the record's step ids
pub fn append_blocks(
    position: usize,
    blocks: &[String],
    store: &mut FragmentStore,
) -> DraftOutcome {
    let mut outcome = DraftOutcome::default();
    for (index, body) in blocks.iter().enumerate() {
        let step_id = step_id_for(position, index);
        match store.append(&step_id, body) {
            Ok(()) => outcome.step_ids.push(step_id),
            Err(e) => {
                warn!(step_id = %step_id, error = %e, "drafted block rejected by fragment store");
                outcome.rejected += 1;
            }
        }
    }
    outcome
}

/// Drafter backed by a language model
pub struct LlmDrafter {
    client: Arc<dyn LlmClient>,
}

impl LlmDrafter {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Drafter for LlmDrafter {
    async fn draft(
        &self,
        record: &InputRecord,
        conversation: &mut Conversation,
        store: &mut FragmentStore,
    ) -> DraftOutcome {
        conversation.push_user(record.prompt());

        let reply = match self.client.complete(conversation.messages()).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    position = record.position,
                    error = %e,
                    "model call failed while drafting; record skipped"
                );
                return DraftOutcome {
                    llm_error: Some(e.to_string()),
                    ..DraftOutcome::default()
                };
            }
        };
        if let Some(reasoning) = &reply.reasoning {
            debug!(position = record.position, reasoning = %reasoning, "model reasoning");
        }

        let blocks = extract_sql_blocks(&reply.content);
        let outcome = append_blocks(record.position, &blocks, store);
        conversation.push_assistant(reply.content);

        if blocks.is_empty() {
            warn!(
                position = record.position,
                "no SQL block found in model response; record contributes no fragment"
            );
        } else {
            info!(
                position = record.position,
                steps = ?outcome.step_ids,
                "record drafted"
            );
        }
        outcome
    }
}
