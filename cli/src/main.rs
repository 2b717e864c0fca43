use clap::Parser;

use slackline_listener::run::Cli as ListenerCli;
use slackline_registry::daemon::Cli as RegistryCli;
use slackline_wrapper::Cli as WrapperCli;

/// slackline CLI
///
/// If no subcommand is specified, options are forwarded to the session
/// wrapper.
#[derive(Debug, Parser)]
#[clap(
    author,
    version,
    // If a sub-command is given, ignore requirements of the default args.
    subcommand_negates_reqs = true
)]
struct MultitoolCli {
    #[clap(flatten)]
    wrapper: WrapperCli,

    #[clap(subcommand)]
    subcommand: Option<Subcommand>,
}

#[derive(Debug, clap::Subcommand)]
enum Subcommand {
    /// Run the session registry daemon.
    #[clap(visible_alias = "r")]
    Registry(RegistryCli),

    /// Run the chat event listener.
    #[clap(visible_alias = "l")]
    Listener(ListenerCli),

    /// Run the agent under the PTY wrapper (the default).
    #[clap(visible_alias = "w")]
    Wrapper(WrapperCli),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = MultitoolCli::parse();
    let runtime = tokio::runtime::Runtime::new()?;

    match cli.subcommand {
        Some(Subcommand::Registry(registry_cli)) => {
            runtime.block_on(slackline_registry::daemon::run_main(registry_cli))
        }
        Some(Subcommand::Listener(listener_cli)) => {
            runtime.block_on(slackline_listener::run::run_main(listener_cli))
        }
        Some(Subcommand::Wrapper(wrapper_cli)) => {
            let code = runtime.block_on(slackline_wrapper::run_main(wrapper_cli))?;
            std::process::exit(code);
        }
        None => {
            let code = runtime.block_on(slackline_wrapper::run_main(cli.wrapper))?;
            std::process::exit(code);
        }
    }
}
