//! Provider-neutral types for talking to chat models.
//!
//! The agent core only ever sees the types in this crate: a request made
//! of role-tagged messages and tool definitions, and a streamed response
//! made of text deltas, tool-invocation requests and a finish reason.
//! Concrete providers (an OpenAI-compatible HTTP client, a scripted fake
//! for tests) live in their own crates and implement [`ModelProvider`].
//!
//! Types here carry no behavior beyond small accessors; they are the
//! contract the providers must adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
