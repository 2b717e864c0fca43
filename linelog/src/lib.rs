//! Terminal-line intelligence shared by the wrapper and the hooks:
//! ANSI stripping, the bounded line log with session-change detection,
//! the back-parser that recovers permission prompts from cleaned lines,
//! and buffer-file session discovery.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod ansi;
pub mod discovery;
pub mod logger;
pub mod prompt;

pub use ansi::strip_ansi;
pub use logger::LineLogger;
pub use prompt::PermissionPrompt;
pub use prompt::PromptOption;
pub use prompt::parse_permission_prompt;
