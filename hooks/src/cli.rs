use clap::Parser;
use clap::Subcommand;

/// Agent lifecycle hooks. The agent pipes one JSON event document to
/// stdin; a blocking hook prints one JSON decision document to stdout.
/// Exit status is always 0.
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: HookCommand,
}

#[derive(Debug, Subcommand, Clone, Copy, PartialEq, Eq)]
pub enum HookCommand {
    /// Blocking permission prompt (tool-about-to-run).
    Permission,
    /// Blocking structured question prompt.
    AskUser,
    /// Tool-finished: live task-list updates.
    ToolUse,
    /// Non-blocking permission card on agent notifications.
    Notification,
    /// Response-complete: post the latest assistant reply.
    Stop,
}
