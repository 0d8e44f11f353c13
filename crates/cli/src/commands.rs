//! Command implementations for the `dtq` binary.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use dtq_runtime::SessionSettings;
use tracing::info;

use crate::cli::Commands;
use crate::{script, simulate};

pub async fn dispatch(command: Commands) -> anyhow::Result<()> {
	match command {
		Commands::Simulate {
			script: script_path,
			config,
			idle_timeout_ms,
		} => {
			let settings = resolve_settings(config.as_deref(), idle_timeout_ms)?;
			let steps = script::load(&script_path).with_context(|| format!("loading script {}", script_path.display()))?;
			info!(target = "dtq", steps = steps.len(), idle_ms = settings.extended_session_idle_timeout_ms, "starting simulation");

			let records = simulate::run(steps, settings).await?;
			let mut stdout = std::io::stdout().lock();
			for record in &records {
				serde_json::to_writer(&mut stdout, record)?;
				writeln!(stdout)?;
			}
			Ok(())
		}
		Commands::CheckConfig { path } => {
			let settings = SessionSettings::load(&path).with_context(|| format!("loading settings {}", path.display()))?;
			println!("{}", serde_json::to_string_pretty(&settings)?);
			Ok(())
		}
	}
}

fn resolve_settings(config: Option<&Path>, idle_timeout_ms: Option<u64>) -> anyhow::Result<SessionSettings> {
	let mut settings = match config {
		Some(path) => SessionSettings::load(path).with_context(|| format!("loading settings {}", path.display()))?,
		None => SessionSettings::default(),
	};
	if let Some(idle) = idle_timeout_ms {
		settings.extended_session_idle_timeout_ms = idle;
	}
	settings.validate()?;
	Ok(settings)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn override_applies_on_top_of_defaults() {
		let settings = resolve_settings(None, Some(25)).unwrap();
		assert_eq!(settings.extended_session_idle_timeout_ms, 25);
	}

	#[test]
	fn zero_override_is_rejected() {
		assert!(resolve_settings(None, Some(0)).is_err());
	}
}
