//! Process-wide session registry: the persistent session table, the
//! Unix-socket RPC server that fronts it, and the chat-side channel /
//! thread bootstrap performed on behalf of new sessions.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod channels;
pub mod client;
pub mod daemon;
pub mod db;
pub mod error;
pub mod server;

pub use client::RegistryClient;
pub use db::RegistryDb;
pub use db::SessionUpdate;
pub use error::RegistryError;
pub use error::Result;
pub use server::RegistryServer;
