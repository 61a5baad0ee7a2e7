//! Pipeline orchestration (spec §5): sequences §4.1-§4.9 for one world
//! region, checking cancellation at stage boundaries and reporting
//! progress. Grounded on the teacher's `for_tile_in_output`
//! cancellation pattern, generalized from "one `Arc<AtomicBool>` per CLI
//! invocation" to "one token per pipeline run".

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use geo::{polygon, Polygon, TriangulateEarcut};

use crate::{
	anchor::{GeoBounds, GlobalCenter},
	assembler::{self, AssemblerParams},
	config::Parameters,
	error::{FeatureWarning, PipelineError, Stage},
	features::{process_buildings, process_green, process_poi, process_roads, process_water, LineFeature, Poi, PolygonFeature},
	height_field::{ElevationSampler, HeightField},
	mesh::Scene,
	provider::TerrainProvider,
	solidify::{self, SolidifyParams},
};

/// Checked at the start of every stage and between features inside
/// §4.4-§4.8 (spec §5). Cloning shares the same underlying flag.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::Release);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::Acquire)
	}

	fn check(&self, stage: Stage) -> Result<(), PipelineError> {
		if self.is_cancelled() {
			Err(PipelineError::Cancelled { stage })
		} else {
			Ok(())
		}
	}
}

/// Invoked after §4.1, §4.2, §4.4, §4.5, §4.6, §4.7, §4.8, §4.9 with a
/// percentage and stage name (spec §5).
pub type ProgressCallback<'a> = dyn Fn(u8, Stage) + Send + Sync + 'a;

/// Every input a pipeline run needs, in projected-metric coordinates
/// (spec §6).
pub struct PipelineInput<'a> {
	pub bounds: GeoBounds,
	pub sampler: &'a dyn ElevationSampler,
	pub buildings: Vec<PolygonFeature>,
	pub roads: Vec<LineFeature>,
	pub water: Vec<PolygonFeature>,
	pub green: Vec<PolygonFeature>,
	pub pois: Vec<Poi>,
}

/// The result of a completed (possibly partial) run: a best-effort scene
/// plus every non-fatal warning collected along the way (spec §7).
pub struct PipelineOutput {
	pub scene: Scene,
	pub warnings: Vec<FeatureWarning>,
}

fn report(progress: Option<&ProgressCallback>, pct: u8, stage: Stage) {
	if let Some(cb) = progress {
		cb(pct, stage);
	}
}

fn extent_polygon(field: &HeightField) -> Polygon<f64> {
	polygon![
		(x: field.min_x, y: field.min_y),
		(x: field.max_x, y: field.min_y),
		(x: field.max_x, y: field.max_y),
		(x: field.min_x, y: field.max_y),
	]
}

/// Runs the full composition pipeline for one world region (spec §4, §5).
pub fn run(input: &PipelineInput, params: &Parameters, cancellation: &CancellationToken, progress: Option<&ProgressCallback>) -> Result<PipelineOutput, PipelineError> {
	params.validate()?;
	let mut warnings = Vec::new();

	cancellation.check(Stage::CoordinateFrame)?;
	let anchor = GlobalCenter::new(input.bounds)?;
	let local_bounds = anchor.local_bounds(input.bounds)?;

	cancellation.check(Stage::HeightField)?;
	let mut field = HeightField::build(local_bounds, &params.to_build_params(), &anchor, input.sampler)?;

	if params.flatten.buildings {
		field.flatten(&input.buildings, 0.5);
	}
	if params.flatten.roads {
		let road_polys: Vec<PolygonFeature> = road_footprints(&input.roads, params);
		field.flatten(&road_polys, params.flatten.road_quantile);
	}

	// Snapshot before depression: the water processor and the bridge base
	// leveling in road.rs both need the pre-depression ground (spec §4.5
	// step 5, §4.6), not `HeightField`'s own internal `original_z` (which
	// only captures state as of the *first* depress call, not the state
	// before flatten).
	let original_field = field.clone();

	field.depress(&input.water, params.water.depth_m, params.water.surface_quantile);
	report(progress, 15, Stage::HeightField);

	cancellation.check(Stage::Solidifier)?;
	let solidify_params = SolidifyParams {
		base_thickness_m: params.base_thickness_mm / 1000.0,
		subdivision_levels: params.subdivision_levels,
	};
	let base = solidify::solidify(&field, &solidify_params)?;
	report(progress, 30, Stage::Solidifier);

	let provider = TerrainProvider::new(&field);
	let original_provider = TerrainProvider::new(&original_field);
	let extent = extent_polygon(&field);
	let center = ((field.min_x + field.max_x) * 0.5, (field.min_y + field.max_y) * 0.5);

	let mut fragments = Vec::new();
	fragments.push(base);

	cancellation.check(Stage::Roads)?;
	let (road_fragments, road_warnings) = process_roads(&input.roads, &input.water, &original_provider, &provider, &params.to_road_params());
	fragments.extend(road_fragments);
	warnings.extend(road_warnings);
	report(progress, 45, Stage::Roads);

	cancellation.check(Stage::Buildings)?;
	let (building_fragments, building_warnings) = process_buildings(&input.buildings, &provider, &params.to_building_params());
	fragments.extend(building_fragments);
	warnings.extend(building_warnings);
	report(progress, 58, Stage::Buildings);

	cancellation.check(Stage::Water)?;
	let (water_fragments, water_warnings) = process_water(&input.water, &extent, &original_provider, &provider, &params.to_water_params());
	fragments.extend(water_fragments);
	warnings.extend(water_warnings);
	report(progress, 70, Stage::Water);

	cancellation.check(Stage::Green)?;
	let (green_fragments, green_warnings) = process_green(&input.green, &extent, &provider, &params.to_green_params());
	fragments.extend(green_fragments);
	warnings.extend(green_warnings);
	report(progress, 82, Stage::Green);

	cancellation.check(Stage::Poi)?;
	let poi_fragments = process_poi(&input.pois, center, &provider, &params.to_poi_params());
	fragments.extend(poi_fragments);
	report(progress, 92, Stage::Poi);

	cancellation.check(Stage::Assembler)?;
	let scene = assembler::assemble(fragments, &AssemblerParams { model_size_mm: params.model_size_mm });
	report(progress, 100, Stage::Assembler);

	for warning in &warnings {
		warning.log();
	}

	Ok(PipelineOutput { scene, warnings })
}

/// Buffers every road centerline to its default width so `flatten.roads`
/// can rasterize them the same way building/water polygons do.
fn road_footprints(roads: &[LineFeature], params: &Parameters) -> Vec<PolygonFeature> {
	use crate::features::FeatureMaterial;

	roads
		.iter()
		.filter_map(|road| {
			let half_width = road.road_class.default_width_m() * params.road.width_multiplier * 0.5;
			let polygon = geo_buf::buffer_linestring(&road.line, half_width)?;
			// earcut validity check: a degenerate buffer triangulates to nothing.
			if polygon.earcut_triangles_raw().triangle_indices.is_empty() {
				return None;
			}
			Some(PolygonFeature::new(road.id.clone(), polygon, FeatureMaterial::Road))
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::height_field::SyntheticSampler;

	fn bounds() -> GeoBounds {
		GeoBounds {
			min_lat: 0.0,
			min_lon: 0.0,
			max_lat: 0.01,
			max_lon: 0.01,
		}
	}

	#[test]
	fn empty_input_produces_base_only_scene() {
		let sampler = SyntheticSampler(|_, _| 10.0);
		let input = PipelineInput {
			bounds: bounds(),
			sampler: &sampler,
			buildings: Vec::new(),
			roads: Vec::new(),
			water: Vec::new(),
			green: Vec::new(),
			pois: Vec::new(),
		};
		let params = Parameters::default();
		let token = CancellationToken::new();
		let output = run(&input, &params, &token, None).unwrap();
		assert_eq!(output.scene.fragments.len(), 1);
		assert!(output.warnings.is_empty());
	}

	#[test]
	fn pre_cancelled_token_aborts_immediately() {
		let sampler = SyntheticSampler(|_, _| 10.0);
		let input = PipelineInput {
			bounds: bounds(),
			sampler: &sampler,
			buildings: Vec::new(),
			roads: Vec::new(),
			water: Vec::new(),
			green: Vec::new(),
			pois: Vec::new(),
		};
		let params = Parameters::default();
		let token = CancellationToken::new();
		token.cancel();
		let result = run(&input, &params, &token, None);
		assert!(matches!(result, Err(PipelineError::Cancelled { .. })));
	}

	#[test]
	fn progress_callback_reaches_100_percent() {
		let sampler = SyntheticSampler(|_, _| 10.0);
		let input = PipelineInput {
			bounds: bounds(),
			sampler: &sampler,
			buildings: Vec::new(),
			roads: Vec::new(),
			water: Vec::new(),
			green: Vec::new(),
			pois: Vec::new(),
		};
		let params = Parameters::default();
		let token = CancellationToken::new();
		let last = std::sync::atomic::AtomicU8::new(0);
		let cb = |pct: u8, _stage: Stage| {
			last.store(pct, Ordering::Relaxed);
		};
		run(&input, &params, &token, Some(&cb)).unwrap();
		assert_eq!(last.load(Ordering::Relaxed), 100);
	}
}
