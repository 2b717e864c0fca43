//! Hook entry point. Reads one JSON event document from stdin,
//! dispatches on the subcommand, prints at most one JSON decision
//! document on stdout, and exits 0 no matter what happened — a
//! non-zero exit would be interpreted by the agent as a control
//! signal.

use std::io::Read;
use std::io::Write;

use clap::Parser;
use tracing::debug;
use tracing::warn;

use slackline_hooks::Cli;
use slackline_hooks::HookCommand;
use slackline_hooks::HookContext;
use slackline_hooks::askuser;
use slackline_hooks::notification;
use slackline_hooks::permission;
use slackline_hooks::posttool;
use slackline_hooks::stop;
use slackline_protocol::hook_io::HookInput;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run(cli.command);
    std::process::exit(0);
}

fn run(command: HookCommand) {
    let mut raw = String::new();
    if std::io::stdin().read_to_string(&mut raw).is_err() {
        warn!("could not read stdin");
        return;
    }
    let input = match HookInput::from_json(&raw) {
        Ok(input) => input,
        Err(e) => {
            warn!("failed to parse hook input: {e}");
            return;
        }
    };
    debug!(
        "hook {:?} for session {}",
        command,
        input.short_session_id()
    );

    let Some(ctx) = HookContext::prepare(input) else {
        debug!("no routable session, passing through");
        return;
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!("could not start runtime: {e}");
            return;
        }
    };

    let stdout_json = runtime.block_on(async {
        match command {
            HookCommand::Permission => permission::run(&ctx).await,
            HookCommand::AskUser => askuser::run(&ctx).await,
            HookCommand::ToolUse => {
                posttool::run(&ctx).await;
                None
            }
            HookCommand::Notification => {
                notification::run(&ctx).await;
                None
            }
            HookCommand::Stop => {
                stop::run(&ctx).await;
                None
            }
        }
    });

    if let Some(json) = stdout_json {
        let mut stdout = std::io::stdout();
        let _ = writeln!(stdout, "{json}");
        let _ = stdout.flush();
    }
}
