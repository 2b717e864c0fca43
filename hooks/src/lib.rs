//! Short-lived hook processes the agent invokes at lifecycle points.
//!
//! Every hook follows the same shape: parse one JSON document from
//! stdin, resolve this session's chat metadata (self-healing when it is
//! missing), render a chat message, and — for blocking prompts —
//! rendezvous with the listener through a response file. Hooks never
//! block the agent: every failure path is a quiet exit 0, leaving the
//! agent's own terminal prompt as the fallback.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod askuser;
pub mod cli;
pub mod context;
pub mod format;
pub mod notification;
pub mod permission;
pub mod posttool;
pub mod respond;
pub mod stop;

pub use cli::Cli;
pub use cli::HookCommand;
pub use context::HookContext;
