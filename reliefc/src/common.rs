//! Shared CLI plumbing: loading a `relief::Parameters` config file and
//! wiring the Ctrl+C handler into a [`relief::CancellationToken`].
//!
//! The config file search order is grounded on the closest sibling
//! example doing the same end-to-end job; the Ctrl+C -> cancellation
//! token wiring is grounded on the teacher's
//! `geoc::common::for_tile_in_output`, generalized from "exit the
//! process on a second Ctrl+C" to "cancel the in-flight pipeline run".

use std::path::PathBuf;

use relief::{CancellationToken, Parameters};

fn config_search_paths() -> Vec<PathBuf> {
	let mut paths = vec![PathBuf::from("relief.toml"), PathBuf::from(".relief.toml")];

	if let Some(config_dir) = dirs::config_dir() {
		paths.push(config_dir.join("relief").join("config.toml"));
	}
	if let Some(home) = dirs::home_dir() {
		paths.push(home.join(".relief.toml"));
	}

	paths
}

/// Loads parameters from the first config file found on the search path,
/// falling back to defaults (not an error — a missing config file is
/// normal, unlike a malformed one).
pub fn load_parameters(explicit: Option<&PathBuf>) -> anyhow::Result<Parameters> {
	let candidates: Vec<PathBuf> = match explicit {
		Some(path) => vec![path.clone()],
		None => config_search_paths(),
	};

	for path in candidates {
		if path.exists() {
			let contents = std::fs::read_to_string(&path)?;
			let params: Parameters = toml::from_str(&contents)?;
			params.validate()?;
			log::info!("loaded parameters from {}", path.display());
			return Ok(params);
		}
	}

	let params = Parameters::default();
	params.validate()?;
	Ok(params)
}

/// Installs a Ctrl+C handler that cancels `token` on the first press and
/// exits the process immediately on the second.
pub fn install_cancel_handler(token: CancellationToken) {
	let handler_token = token.clone();
	let mut pressed_once = false;
	let _ = ctrlc::set_handler(move || {
		if pressed_once {
			std::process::exit(1);
		}
		eprintln!("\ncancelling, press Ctrl+C again to exit immediately");
		pressed_once = true;
		handler_token.cancel();
	});
}
