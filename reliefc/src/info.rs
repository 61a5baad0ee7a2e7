//! `reliefc info`: summarize a feature-set file without running the
//! pipeline.

use std::path::PathBuf;

use clap::Args;

use crate::input::FeatureSet;

#[derive(Args)]
/// Print a summary of a feature-set file.
pub struct Info {
	input: PathBuf,
}

pub fn info(info: Info) -> anyhow::Result<()> {
	let set = FeatureSet::load(&info.input)?;

	println!("Features");
	println!("  Buildings: {}", set.buildings.len());
	println!("  Roads: {}", set.roads.len());
	println!("  Water polygons: {}", set.water.len());
	println!("  Green polygons: {}", set.green.len());
	println!("  POIs: {}", set.pois.len());

	let bridge_count = set.roads.iter().filter(|r| r.bridge).count();
	if bridge_count > 0 {
		println!("  Tagged bridges: {bridge_count}");
	}

	Ok(())
}
