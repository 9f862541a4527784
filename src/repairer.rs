//! Repairer
//!
//! One model call over the full conversation, whose most recent user turn is
//! the latest failure. Edit directives in the response replace whole fragment
//! bodies; anything that cannot be applied is skipped and logged.

use std::sync::Arc;

use async_trait::async_trait;
use cdw_agentic::{Conversation, DirectiveParser, FunctionTagParser, LlmClient};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::fragment_store::FragmentStore;

/// Effect of one repair attempt on the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairOutcome {
    /// Step ids whose body was replaced, in directive order
    pub applied: Vec<String>,
    /// Well-formed directives that could not be applied (unknown step, bad body)
    pub skipped: usize,
    /// Candidates the parser could not read
    pub malformed: usize,
    pub llm_error: Option<String>,
}

impl RepairOutcome {
    pub fn changed_store(&self) -> bool {
        !self.applied.is_empty()
    }
}

#[async_trait]
pub trait Repairer: Send + Sync {
    /// Propose and apply edits. Never fails: an unusable response leaves the
    /// store as it was and the attempt is still counted by the caller.
    async fn repair(&self, conversation: &mut Conversation, store: &mut FragmentStore)
        -> RepairOutcome;
}

/// Apply parsed directives to `store`
pub fn apply_directives(
    parser: &dyn DirectiveParser,
    response: &str,
    store: &mut FragmentStore,
) -> RepairOutcome {
    let parsed = parser.parse(response);
    let mut outcome = RepairOutcome {
        malformed: parsed.malformed,
        ..RepairOutcome::default()
    };

    if parsed.malformed > 0 {
        warn!(
            malformed = parsed.malformed,
            "skipped malformed repair directives"
        );
    }

    for directive in parsed.directives {
        match store.replace(&directive.target_step_id, &directive.new_body) {
            Ok(()) => {
                debug!(step_id = %directive.target_step_id, "fragment replaced");
                outcome.applied.push(directive.target_step_id);
            }
            Err(StoreError::StepNotFound { step_id }) => {
                warn!(step_id = %step_id, "repair directive names an unknown step; skipped");
                outcome.skipped += 1;
            }
            Err(e) => {
                warn!(step_id = %directive.target_step_id, error = %e, "repair directive rejected");
                outcome.skipped += 1;
            }
        }
    }

    if outcome.applied.is_empty() {
        warn!("repair response contained no applicable edits; store unchanged");
    }
    outcome
}

/// Repairer backed by a language model
pub struct LlmRepairer {
    client: Arc<dyn LlmClient>,
    parser: Box<dyn DirectiveParser>,
}

impl LlmRepairer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            parser: Box::new(FunctionTagParser),
        }
    }

    /// Swap the directive matching strategy
    pub fn with_parser(mut self, parser: Box<dyn DirectiveParser>) -> Self {
        self.parser = parser;
        self
    }
}

#[async_trait]
impl Repairer for LlmRepairer {
    async fn repair(
        &self,
        conversation: &mut Conversation,
        store: &mut FragmentStore,
    ) -> RepairOutcome {
        let reply = match self.client.complete(conversation.messages()).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "model call failed while repairing; attempt consumed");
                return RepairOutcome {
                    llm_error: Some(e.to_string()),
                    ..RepairOutcome::default()
                };
            }
        };
        if let Some(reasoning) = &reply.reasoning {
            debug!(reasoning = %reasoning, "model reasoning");
        }

        let outcome = apply_directives(self.parser.as_ref(), &reply.content, store);
        conversation.push_assistant(reply.content);
        info!(
            applied = ?outcome.applied,
            skipped = outcome.skipped,
            malformed = outcome.malformed,
            "repair applied"
        );
        outcome
    }
}
