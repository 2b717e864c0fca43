use clap::Parser;

use slackline_wrapper::Cli;
use slackline_wrapper::run_main;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    let exit_code = runtime.block_on(run_main(cli))?;
    std::process::exit(exit_code);
}
