use clap::Parser;
use dtq_cli::cli::Cli;
use dtq_cli::{commands, logging};
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = commands::dispatch(cli.command).await {
		error!(target = "dtq", error = format!("{err:#}"), "command failed");
		std::process::exit(1);
	}
}
