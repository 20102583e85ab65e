//! Agent runtime: the conversational "brain" of kopi.
//!
//! A turn runs a bounded loop:
//! 1. **Guardrails** (`guardrails`) reject malformed input before any remote call
//! 2. **Reasoning** (`llm`, `reasoning`, `prompt`) asks the engine for a direct
//!    answer or exactly one tool request
//! 3. **Tool execution** (`tools`) validates the payload and runs the tool
//! 4. **Synthesis** feeds the tool result back for a final natural-language answer
//!
//! The engine never gets a second tool call in the same turn. Tool failures are
//! contained and turned into polite replies; only bad input and an unreachable
//! engine surface as errors.

pub mod assembly;
pub mod guardrails;
pub mod llm;
pub mod outlets;
pub mod prompt;
pub mod reasoning;
pub mod retrieval;
pub mod runtime;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use assembly::{AssemblyError, Assistant};
pub use guardrails::{Denial, GuardrailDecision, GuardrailPolicy};
pub use llm::{ChatMessage, ChatRole, HttpLlmClient, LlmClient, LlmError};
pub use outlets::{OutletDirectory, SqlGuard};
pub use reasoning::{parse_reply, ReasoningReply};
pub use retrieval::{Answer, Embedder, HashingEmbedder, ProductKnowledgeBase, QuestionAnswerer};
pub use runtime::{AgentRuntime, RuntimeSettings, TurnReport, TurnState};
pub use tools::ToolRegistry;
