//! Core logic including the agent loop, tool dispatch and the model
//! client.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod conversation;
mod model_client;
pub mod tool;

pub use agent::{
    Agent, AgentBuilder, AgentStage, DEFAULT_RECURSION_LIMIT,
    DEFAULT_SYSTEM_PROMPT, STEP_LIMIT_MESSAGE, TranscriptSource,
    format_system_prompt, route_model_output,
};
pub use model_client::{ModelClient, ModelClientResponse, RetryPolicy};
