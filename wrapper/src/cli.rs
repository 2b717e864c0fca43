use clap::Parser;

/// Run the agent under a chat-connected PTY wrapper.
///
/// Everything after `--` is passed to the agent binary untouched.
#[derive(Debug, Parser, Default, Clone)]
#[clap(author, version)]
pub struct Cli {
    /// Project name shown in the session thread header. Defaults to
    /// the working directory's file name.
    #[arg(long)]
    pub project: Option<String>,

    /// Terminal label shown in the session thread header.
    #[arg(long)]
    pub terminal: Option<String>,

    /// Post top-level messages into this channel instead of creating a
    /// thread in the default channel.
    #[arg(long)]
    pub channel: Option<String>,

    /// Route permission prompts to a separate channel.
    #[arg(long)]
    pub permissions_channel: Option<String>,

    /// Chat user id that initiated this session.
    #[arg(long)]
    pub user: Option<String>,

    /// Free-form description shown under the thread header.
    #[arg(long)]
    pub description: Option<String>,

    /// Arguments forwarded to the agent binary.
    #[arg(trailing_var_arg = true)]
    pub agent_args: Vec<String>,
}
