//! Food assistant orchestration.
//!
//! A turn flows through the components in this order:
//!
//! 1. **Context** — the (user, session) conversation, seeded from memory
//! 2. **Plan** — the model picks tools; a keyword rule engine backs it up
//! 3. **Dispatch** — the registry runs the plan's tools, failures isolated
//! 4. **Enrich** — each outcome becomes a display envelope
//! 5. **Synthesize** — the model writes the reply
//! 6. **Remember** — preferences are learned and the turn is stored
//!
//! In streaming mode the same turn is reported as a four-stage thinking
//! chain, validated by a small state machine.

pub mod agent;
pub mod context_store;
pub mod enricher;
pub mod memory_bridge;
pub mod planner;
pub mod stream_event;
pub mod synthesizer;
pub mod thinking;

#[cfg(test)]
mod test_helpers;

pub use agent::{FoodAgent, TurnRequest, TurnResponse};
pub use context_store::{ContextStore, SharedContext};
pub use enricher::enrich;
pub use memory_bridge::{MemoryBridge, extract_preferences};
pub use planner::{Planner, PlanningError};
pub use stream_event::{Stage, StepStatus, ThinkingEvent, ToolReport, TurnSummary};
pub use synthesizer::{APOLOGY, Persona, Synthesizer};
pub use thinking::{ChainError, ChainState, ThinkingChain};
