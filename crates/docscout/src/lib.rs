//! A documentation assistant that answers questions about a local
//! workspace of markdown documents.
//!
//! A [`Session`] indexes the workspace on the first message, then lets the
//! model explore it with a small set of read-only tools until it comes up
//! with an answer. The crate includes a CLI tool for using in the terminal,
//! and you can also use it as a library.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
pub mod indexer;
mod session;
pub mod tools;
mod workspace;

pub use config::{
    ConfigError, IndexerOptions, WorkspaceContext, WorkspaceContextBuilder,
};
pub use session::{Session, SessionBuilder};

/// Re-exports of [`docscout_core`] crate.
pub mod core {
    pub use docscout_core::*;
}
