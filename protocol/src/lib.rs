//! Wire types shared across the slackline processes: the session
//! model, the registry RPC protocol, the hook stdin/stdout contracts,
//! the on-disk response-file schemas and the interactive-component
//! naming scheme.
//!
//! This crate deliberately has no I/O. Every process links it; only the
//! registry, wrapper, listener and hooks move the bytes.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod hook_io;
pub mod interact;
pub mod registry_rpc;
pub mod response_file;
pub mod session;

pub use registry_rpc::RegistryRequest;
pub use registry_rpc::RegistryResponse;
pub use session::DmSubscription;
pub use session::InteractionMode;
pub use session::SessionRecord;
pub use session::SessionStatus;
