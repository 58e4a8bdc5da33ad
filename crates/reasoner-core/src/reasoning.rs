//! Reasoning Loop
//!
//! The step state machine. Each step asks the model for its single next
//! reasoning step, dispatches any tool calls in the order received, and
//! checks the reply for a completion phrase:
//!
//! ```text
//! RUNNING ─┬─> AWAIT_MODEL ─> DISPATCH_TOOLS* ─> CHECK_TERMINATION ─┬─> DONE
//!          │        ^                                               │
//!          │        └──────────────── step += 1 ────────────────────┘
//!          └─> BUDGET_EXCEEDED ─> FORCED_FINAL ─> DONE
//! ```
//!
//! The budget check runs before a step is issued, so with `max_steps = n` it
//! trips when the counter reaches `n + 1`.

use crate::dispatcher::ToolDispatcher;
use crate::error::Result;
use crate::message::{Conversation, Message, ToolCallRequest};
use crate::prompt::{FORCED_FINAL_PROMPT, STEP_PROMPT, budget_notice};
use crate::provider::{
    AssistantReply, CompletionProvider, CompletionRequest, GenerationOptions, ToolChoice,
};
use crate::termination::TerminationPolicy;
use crate::tool::{ToolContext, ToolRegistry, ToolSpec};

/// How the loop ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopOutcome {
    /// A completion phrase was seen at step `steps`
    Completed { steps: u32 },

    /// The budget tripped with the counter at `steps` (= max + 1) and a
    /// forced final answer was already requested
    BudgetExceeded { steps: u32, answer: Option<String> },
}

impl LoopOutcome {
    /// Value of the step counter when the loop stopped
    pub const fn steps(&self) -> u32 {
        match self {
            Self::Completed { steps } | Self::BudgetExceeded { steps, .. } => *steps,
        }
    }
}

/// One session's step loop over a fixed catalog
pub struct ReasoningLoop<'a> {
    provider: &'a dyn CompletionProvider,
    options: &'a GenerationOptions,
    tools: &'a ToolRegistry,
    catalog: Vec<ToolSpec>,
    policy: &'a TerminationPolicy,
    max_steps: Option<u32>,
}

impl<'a> ReasoningLoop<'a> {
    pub fn new(
        provider: &'a dyn CompletionProvider,
        options: &'a GenerationOptions,
        tools: &'a ToolRegistry,
        policy: &'a TerminationPolicy,
        max_steps: Option<u32>,
    ) -> Self {
        Self {
            provider,
            options,
            tools,
            catalog: tools.specs(),
            policy,
            // zero means no budget
            max_steps: max_steps.filter(|max| *max > 0),
        }
    }

    /// Catalog advertised on every request
    pub fn catalog(&self) -> &[ToolSpec] {
        &self.catalog
    }

    /// Run steps until a completion phrase appears or the budget trips
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        ctx: &ToolContext<'_>,
    ) -> Result<LoopOutcome> {
        let dispatcher = ToolDispatcher::new(self.tools);
        let mut step: u32 = 1;

        tracing::info!(max_steps = ?self.max_steps, tools = self.catalog.len(), "Starting reasoning loop");

        loop {
            if let Some(max) = self.max_steps.filter(|max| step > *max) {
                tracing::warn!(step, max_steps = max, "Maximum reasoning steps reached, forcing completion");
                conversation.push(Message::system(budget_notice(max)))?;
                let answer = self
                    .final_answer(conversation, ctx, FORCED_FINAL_PROMPT)
                    .await?;
                return Ok(LoopOutcome::BudgetExceeded { steps: step, answer });
            }

            tracing::debug!(step, "Requesting next reasoning step");
            conversation.push(Message::user(STEP_PROMPT))?;

            let reply = self.request(conversation, ctx, ToolChoice::Auto).await?;
            let content = reply.content.clone();
            let calls = reply.tool_calls.clone();
            conversation.push(reply.into())?;

            if let Some(text) = &content {
                tracing::debug!(step, content = %text, "Assistant step");
            }

            if !calls.is_empty() {
                self.dispatch_all(&dispatcher, &calls, conversation, ctx)
                    .await?;
            }

            if content.as_deref().is_some_and(|c| self.policy.is_complete(c)) {
                tracing::info!(steps = step, "Reasoning loop complete");
                return Ok(LoopOutcome::Completed { steps: step });
            }

            step += 1;
        }
    }

    /// Append `prompt`, request a tool-free reply, append it and return its text.
    ///
    /// Tool calls in a reply to a tool-free request are dropped.
    pub async fn final_answer(
        &self,
        conversation: &mut Conversation,
        ctx: &ToolContext<'_>,
        prompt: &str,
    ) -> Result<Option<String>> {
        conversation.push(Message::user(prompt))?;

        let mut reply = self.request(conversation, ctx, ToolChoice::None).await?;
        if reply.has_tool_calls() {
            tracing::warn!(
                dropped = reply.tool_calls.len(),
                "Model requested tools in a tool-free final answer; ignoring them"
            );
            reply.tool_calls.clear();
        }

        let answer = reply.content.clone();
        conversation.push(reply.into())?;
        Ok(answer)
    }

    async fn request(
        &self,
        conversation: &Conversation,
        ctx: &ToolContext<'_>,
        tool_choice: ToolChoice,
    ) -> Result<AssistantReply> {
        let request = CompletionRequest {
            messages: conversation.messages(),
            tools: &self.catalog,
            tool_choice,
            options: self.options,
        };
        self.provider.complete(ctx.endpoint, request).await
    }

    /// Dispatch calls in order. Every call gets one tool message; corrective
    /// system messages for failures follow the step's tool messages.
    async fn dispatch_all(
        &self,
        dispatcher: &ToolDispatcher<'_>,
        calls: &[ToolCallRequest],
        conversation: &mut Conversation,
        ctx: &ToolContext<'_>,
    ) -> Result<()> {
        let mut corrections = Vec::new();

        for call in calls {
            let outcome = dispatcher.dispatch(call, ctx).await;
            conversation.push(Message::tool(&call.id, outcome.tool_content()))?;
            if let Some(correction) = outcome.corrective_message(&call.function_name) {
                corrections.push(correction);
            }
        }

        for correction in corrections {
            conversation.push(correction)?;
        }
        Ok(())
    }
}
