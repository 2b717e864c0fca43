//! The chat event listener: a single long-lived process that receives
//! workspace events (messages, reactions, button clicks, thread
//! replies), resolves the target session through the registry, and
//! forwards inputs to that session's control socket.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod dm;
pub mod events;
pub mod handlers;
pub mod respond;
pub mod routing;
pub mod run;

pub use events::ChatEvent;
pub use handlers::Listener;
pub use routing::Router;
pub use routing::SendMode;
