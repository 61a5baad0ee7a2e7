//! `reliefc compose`: run the full pipeline against a feature-set file and
//! an elevation source, writing the result as a single-color STL for a
//! quick look. STL export is a minimal demonstrative boundary, not a core
//! responsibility (spec §6): a real caller would keep materials apart via
//! 3MF instead of flattening them here.

use std::path::PathBuf;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use relief::{
	error::Stage,
	height_field::{ElevationSampler, SyntheticSampler},
	CancellationToken, GeoBounds, PipelineInput,
};

use crate::{common, input::FeatureSet};

#[derive(Args)]
/// Compose a scene from a feature-set file and elevation source.
pub struct Compose {
	/// Path to the feature-set JSON document.
	input: PathBuf,
	/// Path to write the resulting STL mesh.
	output: PathBuf,

	#[arg(long)]
	min_lat: f64,
	#[arg(long)]
	min_lon: f64,
	#[arg(long)]
	max_lat: f64,
	#[arg(long)]
	max_lon: f64,

	/// Constant elevation in meters, used when no raster DEM is available.
	#[arg(long, default_value_t = 0.0)]
	flat_elevation_m: f64,

	/// Path to a DEM raster (requires the `raster` feature).
	#[cfg(feature = "raster")]
	#[arg(long)]
	dem: Option<PathBuf>,

	/// Optional parameters file; otherwise the normal search path applies.
	#[arg(long)]
	config: Option<PathBuf>,
}

pub fn compose(args: Compose) -> anyhow::Result<()> {
	let params = common::load_parameters(args.config.as_ref())?;
	let set = FeatureSet::load(&args.input)?;

	let bounds = GeoBounds {
		min_lat: args.min_lat,
		min_lon: args.min_lon,
		max_lat: args.max_lat,
		max_lon: args.max_lon,
	};

	let buildings = FeatureSet::into_buildings(set.buildings);
	let roads = FeatureSet::into_roads(set.roads);
	let water = FeatureSet::into_water(set.water);
	let green = FeatureSet::into_green(set.green);
	let pois = FeatureSet::into_pois(set.pois);

	let token = CancellationToken::new();
	common::install_cancel_handler(token.clone());

	let bar = ProgressBar::new(100);
	bar.set_style(ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}").unwrap_or_else(|_| ProgressStyle::default_bar()));
	let progress = |pct: u8, stage: Stage| {
		bar.set_position(pct as u64);
		bar.set_message(stage.to_string());
	};

	let flat = args.flat_elevation_m;
	let constant_sampler = SyntheticSampler(move |_, _| flat);

	#[cfg(feature = "raster")]
	let loaded_raster = args.dem.as_ref().map(|path| relief::raster::RasterSampler::load(path)).transpose()?;
	#[cfg(feature = "raster")]
	let sampler: &dyn ElevationSampler = loaded_raster.as_ref().map(|r| r as &dyn ElevationSampler).unwrap_or(&constant_sampler);
	#[cfg(not(feature = "raster"))]
	let sampler: &dyn ElevationSampler = &constant_sampler;

	let pipeline_input = PipelineInput {
		bounds,
		sampler,
		buildings,
		roads,
		water,
		green,
		pois,
	};

	let output = relief::run(&pipeline_input, &params, &token, Some(&progress))?;
	bar.finish_with_message("done");

	for warning in &output.warnings {
		log::warn!("{warning}");
	}

	write_stl(&output.scene, &args.output)?;
	println!(
		"wrote {} ({} vertices, {} faces, {} fragments)",
		args.output.display(),
		output.scene.vertex_count(),
		output.scene.face_count(),
		output.scene.fragments.len()
	);

	Ok(())
}

fn write_stl(scene: &relief::Scene, path: &PathBuf) -> anyhow::Result<()> {
	let mut triangles = Vec::new();
	for fragment in &scene.fragments {
		for face in &fragment.faces {
			let v = [fragment.vertices[face[0] as usize], fragment.vertices[face[1] as usize], fragment.vertices[face[2] as usize]];
			let e1 = v[1] - v[0];
			let e2 = v[2] - v[0];
			let normal = e1.cross(e2).normalize_or_zero();
			triangles.push(stl_io::Triangle {
				normal: stl_io::Normal::new([normal.x as f32, normal.y as f32, normal.z as f32]),
				vertices: [
					stl_io::Vertex::new([v[0].x as f32, v[0].y as f32, v[0].z as f32]),
					stl_io::Vertex::new([v[1].x as f32, v[1].y as f32, v[1].z as f32]),
					stl_io::Vertex::new([v[2].x as f32, v[2].y as f32, v[2].z as f32]),
				],
			});
		}
	}

	let mut file = std::fs::File::create(path)?;
	stl_io::write_stl(&mut file, triangles.iter())?;
	Ok(())
}
