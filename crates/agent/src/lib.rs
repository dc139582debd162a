//! Turn engine for the fleet chat assistant.
//!
//! Every inbound utterance runs the same constrained loop:
//! 1. **Classification** (`llm`, `prompt`) - the decision oracle maps prompt,
//!    bounded history and the utterance to a raw decision.
//! 2. **Contract validation** (`contract`) - raw oracle output becomes a
//!    well-formed `Decision` or the fallback decision.
//! 3. **Guardrails** (`guardrails`) - tool/intent coupling and tool policy.
//! 4. **Dispatch** (`tools`, `fleet`) - at most one validated tool call.
//! 5. **Enhancement** (`enhancer`) - the tool result becomes UI components.
//! 6. **Persistence** (`conversation`) - the finished turn is appended.
//!
//! `runtime::AgentRuntime` owns the loop. The oracle is strictly a
//! translator: it never executes anything, and nothing it returns reaches a
//! tool without passing the contract, the guardrails and argument checks.

pub mod contract;
pub mod conversation;
pub mod enhancer;
pub mod fleet;
pub mod guardrails;
pub mod llm;
pub mod prompt;
pub mod runtime;
pub mod tools;

pub use runtime::{AgentRuntime, RuntimeSettings, TurnRequest, TurnResponse};
