//! The road and bridge processor (spec §4.5).

use geo::{BooleanOps, EuclideanLength, Intersects, MultiPolygon, Polygon, TriangulateEarcut};
use rayon::prelude::*;

use crate::{
	error::{FeatureWarning, Stage},
	features::{LineFeature, PolygonFeature},
	mesh::{Material, MeshFragment},
	provider::TerrainProvider,
	units::Vec3,
};

/// The road-class vocabulary driving default widths and bridge heights
/// (spec §4.5).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RoadClass {
	Motorway,
	Primary,
	Secondary,
	Residential,
	Path,
	Suspension,
	Arch,
	Beam,
}

impl RoadClass {
	pub(crate) fn default_width_m(self) -> f64 {
		match self {
			RoadClass::Motorway => 12.0,
			RoadClass::Primary => 9.0,
			RoadClass::Secondary => 7.0,
			RoadClass::Residential => 5.0,
			RoadClass::Path => 2.0,
			RoadClass::Suspension | RoadClass::Arch | RoadClass::Beam => 8.0,
		}
	}

	fn bridge_height_m(self) -> f64 {
		match self {
			RoadClass::Suspension => 5.0,
			RoadClass::Arch => 4.0,
			RoadClass::Beam => 3.0,
			_ => 3.0,
		}
	}
}

/// Parameters for [`process_roads`] (spec §4.5, §6).
#[derive(Debug, Clone)]
pub struct RoadParams {
	pub width_multiplier: f64,
	pub height_mm: f64,
	pub embed_mm: f64,
	pub color: Option<[u8; 3]>,
}

impl Default for RoadParams {
	fn default() -> Self {
		Self {
			width_multiplier: 1.0,
			height_mm: 1.0,
			embed_mm: 0.3,
			color: None,
		}
	}
}

const CLEARANCE_MIN_M: f64 = 0.02;
const SUPPORT_SPACING_M: f64 = 20.0;
const SUPPORT_FOOTPRINT_M: f64 = 0.6;

fn buffer_line(line: &geo::LineString<f64>, half_width: f64) -> Option<Polygon<f64>> {
	use geo_buf::buffer_linestring;
	buffer_linestring(line, half_width)
}

fn is_bridge(feature: &LineFeature, footprint: &Polygon<f64>, water: &[PolygonFeature]) -> bool {
	use geo::Area;
	if feature.bridge_tag {
		return true;
	}
	water.iter().any(|w| footprint.intersects(&w.polygon) && w.polygon.unsigned_area() > 1.0)
}

fn extrude_footprint(footprint: &Polygon<f64>, height: f64) -> Option<(Vec<Vec3>, Vec<[u32; 3]>)> {
	let triangulation = footprint.earcut_triangles_raw();
	if triangulation.triangle_indices.is_empty() {
		return None;
	}
	let ring: Vec<(f64, f64)> = triangulation.vertices.chunks_exact(2).map(|c| (c[0], c[1])).collect();
	let n = ring.len();
	if n < 3 {
		return None;
	}

	let mut vertices = Vec::with_capacity(n * 2);
	for &(x, y) in &ring {
		vertices.push(Vec3::new(x, y, 0.0));
	}
	for &(x, y) in &ring {
		vertices.push(Vec3::new(x, y, height));
	}

	let mut faces = Vec::new();
	for tri in triangulation.triangle_indices.chunks_exact(3) {
		faces.push([tri[0] as u32, tri[2] as u32, tri[1] as u32]);
	}
	for tri in triangulation.triangle_indices.chunks_exact(3) {
		faces.push([tri[0] as u32 + n as u32, tri[1] as u32 + n as u32, tri[2] as u32 + n as u32]);
	}
	for k in 0..n {
		let a = k as u32;
		let b = ((k + 1) % n) as u32;
		let ta = a + n as u32;
		let tb = b + n as u32;
		faces.push([a, b, tb]);
		faces.push([a, tb, ta]);
	}

	Some((vertices, faces))
}

/// Rectangular prism, material-tagged as the bridge's (spec §4.5 step 6).
fn support_prism(center: (f64, f64), top_z: f64, bottom_z: f64, material: Material, id: String) -> MeshFragment {
	let half = SUPPORT_FOOTPRINT_M * 0.5;
	let (cx, cy) = center;
	let corners = [(-half, -half), (half, -half), (half, half), (-half, half)];

	let mut vertices = Vec::with_capacity(8);
	for &(dx, dy) in &corners {
		vertices.push(Vec3::new(cx + dx, cy + dy, bottom_z));
	}
	for &(dx, dy) in &corners {
		vertices.push(Vec3::new(cx + dx, cy + dy, top_z));
	}

	let faces = vec![
		[0u32, 2, 1],
		[0, 3, 2],
		[4, 5, 6],
		[4, 6, 7],
		[0, 1, 5],
		[0, 5, 4],
		[1, 2, 6],
		[1, 6, 5],
		[2, 3, 7],
		[2, 7, 6],
		[3, 0, 4],
		[3, 4, 7],
	];

	let mut fragment = MeshFragment::new(material, id);
	fragment.vertices = vertices;
	fragment.faces = faces;
	fragment
}

/// Buffers one centerline to its class width and classifies it as a bridge
/// or a ground-level road (spec §4.5 step 1). Buffering and classification
/// are per-feature and independent of every other feature, so this runs
/// under `par_iter` in [`process_roads`]; the union step that follows is
/// not.
fn buffer_and_classify(feature: &LineFeature, water: &[PolygonFeature], params: &RoadParams) -> Result<(Polygon<f64>, bool), FeatureWarning> {
	let half_width = feature.road_class.default_width_m() * params.width_multiplier * 0.5;
	let Some(footprint) = buffer_line(&feature.line, half_width) else {
		return Err(FeatureWarning::InternalGeometryFailure {
			stage: Stage::Roads,
			feature_id: feature.id.clone(),
			reason: "buffering centerline produced no polygon".into(),
		});
	};
	let bridge = is_bridge(feature, &footprint, water);
	Ok((footprint, bridge))
}

/// Extrudes and drapes one polygon of the unioned `P_road` layer directly
/// onto the ground, with the same adaptive-embed rule §4.5 step 4 applies
/// per feature (now applied per unioned component instead, since the union
/// has no single owning feature to consult).
fn extrude_and_drape_ground(footprint: &Polygon<f64>, id: String, provider: &TerrainProvider, params: &RoadParams) -> Result<MeshFragment, FeatureWarning> {
	let height = params.height_mm / 1000.0;
	let embed = params.embed_mm / 1000.0;

	let Some((vertices, faces)) = extrude_footprint(footprint, height) else {
		return Err(FeatureWarning::InternalGeometryFailure {
			stage: Stage::Roads,
			feature_id: id,
			reason: "triangulation of unioned road footprint failed".into(),
		});
	};

	let mut fragment = MeshFragment::new(Material::Road, id);
	fragment.vertices = vertices;
	fragment.faces = faces;

	let ground_samples: Vec<f64> = fragment.vertices.iter().map(|v| provider.z_at(v.x, v.y)).collect();
	let footprint_min = ground_samples.iter().cloned().fold(f64::INFINITY, f64::min);
	let footprint_max = ground_samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
	let slope = footprint_max - footprint_min;
	let embed_eff = if slope > 2.0 * embed { embed * 0.5 } else { embed };

	for v in &mut fragment.vertices {
		let g = provider.z_at(v.x, v.y);
		v.z = (g + v.z - embed_eff).max(g + CLEARANCE_MIN_M);
	}

	Ok(fragment)
}

/// Extrudes a bridge deck for one feature, levels its base against the
/// pre-depression ground, and places its supports (spec §4.5 steps 5-6).
/// Bridges stay per-feature rather than joining the unioned `P_road` layer:
/// each is a distinct elevated span with its own support line.
fn process_bridge(
	feature: &LineFeature, footprint: &Polygon<f64>, original_provider: &TerrainProvider, provider: &TerrainProvider, params: &RoadParams,
) -> Result<(MeshFragment, Vec<MeshFragment>), FeatureWarning> {
	let height = params.height_mm / 1000.0;

	let Some((vertices, faces)) = extrude_footprint(footprint, height) else {
		return Err(FeatureWarning::InternalGeometryFailure {
			stage: Stage::Roads,
			feature_id: feature.id.clone(),
			reason: "triangulation of road footprint failed".into(),
		});
	};

	let mut fragment = MeshFragment::new(Material::Bridge, feature.id.clone());
	fragment.vertices = vertices;
	fragment.faces = faces;

	let original_samples: Vec<f64> = fragment.vertices.iter().map(|v| original_provider.z_at(v.x, v.y)).collect();
	let w_med = median(&original_samples.iter().map(|&z| z - 0.2).collect::<Vec<_>>());
	let ground_samples: Vec<f64> = fragment.vertices.iter().map(|v| provider.z_at(v.x, v.y)).collect();
	let ground_med = median(&ground_samples);
	let class_height = feature.road_class.bridge_height_m();
	let base = (w_med + class_height.max(3.0)).max(ground_med + class_height);

	fragment.translate_z(base);

	let mut along: Vec<(f64, f64, f64)> = Vec::new();
	let total_len = feature.line.euclidean_length();
	if total_len > 0.0 {
		let steps = (total_len / SUPPORT_SPACING_M).ceil().max(1.0) as usize;
		for k in 0..=steps {
			let target = (k as f64 / steps as f64) * total_len;
			if let Some(point) = point_at_length(&feature.line, target) {
				along.push(point);
			}
		}
	}

	let mut supports = Vec::new();
	for (x, y, _z) in along {
		let ground = original_provider.z_at(x, y);
		let bottom = ground.min(w_med - 0.5);
		supports.push(support_prism((x, y), base, bottom, Material::Bridge, format!("{}-support", feature.id)));
	}

	Ok((fragment, supports))
}

fn median(values: &[f64]) -> f64 {
	if values.is_empty() {
		return 0.0;
	}
	let mut sorted = values.to_vec();
	sorted.sort_by(|a, b| a.total_cmp(b));
	let mid = sorted.len() / 2;
	if sorted.len() % 2 == 0 {
		(sorted[mid - 1] + sorted[mid]) * 0.5
	} else {
		sorted[mid]
	}
}

fn point_at_length(line: &geo::LineString<f64>, target: f64) -> Option<(f64, f64, f64)> {
	let coords: Vec<_> = line.coords().collect();
	if coords.is_empty() {
		return None;
	}
	if coords.len() == 1 {
		return Some((coords[0].x, coords[0].y, 0.0));
	}

	let mut accumulated = 0.0;
	for pair in coords.windows(2) {
		let seg_len = ((pair[1].x - pair[0].x).powi(2) + (pair[1].y - pair[0].y).powi(2)).sqrt();
		if accumulated + seg_len >= target || seg_len == 0.0 {
			let t = if seg_len > 0.0 { (target - accumulated) / seg_len } else { 0.0 };
			let t = t.clamp(0.0, 1.0);
			let x = pair[0].x + t * (pair[1].x - pair[0].x);
			let y = pair[0].y + t * (pair[1].y - pair[0].y);
			return Some((x, y, 0.0));
		}
		accumulated += seg_len;
	}
	let last = coords.last()?;
	Some((last.x, last.y, 0.0))
}

/// Unions road footprints into a single `P_road` layer (spec §4.5 step 1),
/// so overlapping or intersecting segments (junctions, parallel lanes)
/// extrude as one clean surface rather than z-fighting, overlapping decks.
fn union_footprints(footprints: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
	footprints.into_iter().fold(MultiPolygon::new(Vec::new()), |acc, p| acc.union(&MultiPolygon::new(vec![p])))
}

/// Processes every road centerline (spec §5: concurrent buffering and
/// classification across features; the union in step 1 is a barrier, since
/// it is inherently cross-feature, followed by independent per-polygon
/// extrusion/draping for ground roads and per-feature handling for bridges).
pub fn process_roads(
	features: &[LineFeature], water: &[PolygonFeature], original_provider: &TerrainProvider, provider: &TerrainProvider, params: &RoadParams,
) -> (Vec<MeshFragment>, Vec<FeatureWarning>) {
	let classified: Vec<_> = features.par_iter().map(|f| (f, buffer_and_classify(f, water, params))).collect();

	let mut warnings = Vec::new();
	let mut ground_footprints = Vec::new();
	let mut bridge_entries = Vec::new();
	for (feature, result) in classified {
		match result {
			Ok((footprint, true)) => bridge_entries.push((feature, footprint)),
			Ok((footprint, false)) => ground_footprints.push(footprint),
			Err(warning) => warnings.push(warning),
		}
	}

	let mut fragments = Vec::new();

	if !ground_footprints.is_empty() {
		let unioned = union_footprints(ground_footprints);
		for (i, polygon) in unioned.0.iter().enumerate() {
			match extrude_and_drape_ground(polygon, format!("road-union-{i}"), provider, params) {
				Ok(mut fragment) => {
					if let Some(color) = params.color {
						fragment = fragment.with_color(color);
					}
					fragments.push(fragment);
				}
				Err(warning) => warnings.push(warning),
			}
		}
	}

	let bridge_results: Vec<_> = bridge_entries.par_iter().map(|(feature, footprint)| process_bridge(feature, footprint, original_provider, provider, params)).collect();
	for result in bridge_results {
		match result {
			Ok((deck, supports)) => {
				let mut deck = deck;
				if let Some(color) = params.color {
					deck = deck.with_color(color);
				}
				fragments.push(deck);
				fragments.extend(supports);
			}
			Err(warning) => warnings.push(warning),
		}
	}

	(fragments, warnings)
}

#[cfg(test)]
mod tests {
	use geo::line_string;

	use super::*;
	use crate::{
		anchor::{GeoBounds, GlobalCenter},
		height_field::{BuildParams, HeightField, SyntheticSampler},
	};

	fn flat_field() -> HeightField {
		let anchor = GlobalCenter::new(GeoBounds {
			min_lat: 0.0,
			min_lon: 0.0,
			max_lat: 0.1,
			max_lon: 0.1,
		})
		.unwrap();
		let sampler = SyntheticSampler(|_, _| 20.0);
		let params = BuildParams {
			resolution: 64,
			smoothing_sigma: None,
			..Default::default()
		};
		HeightField::build((0.0, 0.0, 500.0, 500.0), &params, &anchor, &sampler).unwrap()
	}

	#[test]
	fn non_bridge_road_drapes_above_ground() {
		let field = flat_field();
		let provider = TerrainProvider::new(&field);
		let line = line_string![(x: 50.0, y: 50.0), (x: 150.0, y: 50.0)];
		let feature = LineFeature::new("r1", line, RoadClass::Residential);
		let params = RoadParams::default();
		let (footprint, bridge) = buffer_and_classify(&feature, &[], &params).unwrap();
		assert!(!bridge);
		let fragment = extrude_and_drape_ground(&footprint, "r1".into(), &provider, &params).unwrap();
		let (min, _) = fragment.bounds().unwrap();
		assert!(min.z >= 20.0 + CLEARANCE_MIN_M - 1e-9);
	}

	#[test]
	fn tagged_bridge_gets_supports() {
		let field = flat_field();
		let provider = TerrainProvider::new(&field);
		let line = line_string![(x: 50.0, y: 50.0), (x: 150.0, y: 50.0)];
		let feature = LineFeature::new("r2", line, RoadClass::Beam).as_bridge();
		let params = RoadParams::default();
		let (footprint, bridge) = buffer_and_classify(&feature, &[], &params).unwrap();
		assert!(bridge);
		let (_fragment, supports) = process_bridge(&feature, &footprint, &provider, &provider, &params).unwrap();
		assert!(!supports.is_empty());
	}

	#[test]
	fn overlapping_roads_union_into_one_footprint() {
		let field = flat_field();
		let provider = TerrainProvider::new(&field);
		let a = LineFeature::new("r3", line_string![(x: 50.0, y: 50.0), (x: 150.0, y: 50.0)], RoadClass::Residential);
		let b = LineFeature::new("r4", line_string![(x: 100.0, y: 0.0), (x: 100.0, y: 100.0)], RoadClass::Residential);
		let params = RoadParams::default();
		let (fragments, warnings) = process_roads(&[a, b], &[], &provider, &provider, &params);
		assert!(warnings.is_empty());
		assert_eq!(fragments.len(), 1);
	}

	#[test]
	fn median_of_odd_and_even() {
		assert_eq!(median(&[1.0, 2.0, 3.0]), 2.0);
		assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
	}
}
