use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "dtq")]
#[command(about = "Exercise the durable task session layer from the command line")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Replay an NDJSON script of batches through orchestration sessions
	///
	/// Each script line is `{"delayMs":..,"instanceId":..,"messages":[{"id":..,"visibleInMs":..,"event":{..}}]}`.
	/// Results are printed as NDJSON records (`appended`, `fetched`, `ended`).
	#[command(alias = "sim")]
	Simulate {
		/// Script file (NDJSON)
		script: PathBuf,

		/// Session settings file (JSON)
		#[arg(long, value_name = "FILE")]
		config: Option<PathBuf>,

		/// Override the extended session idle timeout
		#[arg(long, value_name = "MS")]
		idle_timeout_ms: Option<u64>,
	},

	/// Validate a settings file and print the effective settings
	CheckConfig {
		/// Session settings file (JSON)
		path: PathBuf,
	},
}
