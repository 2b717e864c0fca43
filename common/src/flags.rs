use std::time::Duration;

use env_flags::env_flags;

env_flags! {
    /// Bot User OAuth token. Without it the registry still tracks
    /// sessions; everything chat-facing is skipped.
    pub SLACK_BOT_TOKEN: Option<&str> = None;

    /// App-level token used by the listener's event subscription.
    pub SLACK_APP_TOKEN: Option<&str> = None;

    /// Default channel that session threads are created in.
    pub SLACK_CHANNEL: &str = "claude-sessions";

    /// Agent binary the wrapper spawns under the PTY.
    pub CLAUDE_BIN: &str = "claude";

    /// How long a blocking prompt hook waits for a chat response before
    /// handing control back to the agent's own terminal prompt.
    pub PERMISSION_TIMEOUT: Duration = Duration::from_secs(300), |value| {
        value.parse().map(Duration::from_secs)
    };
}
