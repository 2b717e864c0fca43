//! Per-session PTY supervisor.
//!
//! One wrapper process owns one agent session: it spawns the agent
//! under a PTY, proxies the user's terminal, publishes terminal output
//! to the line log and the on-disk buffer files, owns the session's
//! control socket for remote input injection, registers the session
//! with the registry, and keeps the chat thread attached across
//! agent-side session-identity changes (`/compact`, `/resume`).

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod bridge;
pub mod cli;
pub mod control;
pub mod files;
pub mod pty;
pub mod session;
pub mod term;

pub use cli::Cli;
pub use session::run_main;
