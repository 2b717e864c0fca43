//! Chat-provider capability layer: a minimal Slack Web API client, the
//! Block Kit fragments the workspace renders, and a Socket Mode client
//! for the event stream.
//!
//! Only the capabilities the routing substrate consumes are wrapped:
//! post/update/delete a message, add a reaction, fetch one message,
//! list/join/create channels, open a DM, and subscribe to events.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod blocks;
pub mod client;
pub mod socket_mode;

pub use blocks::Block;
pub use blocks::ButtonElement;
pub use blocks::Text;
pub use client::PostedMessage;
pub use client::SlackClient;
pub use client::SlackError;
pub use socket_mode::SocketEvent;
pub use socket_mode::run_socket_mode;
