//! The building processor (spec §4.4).

use geo::{Area, BoundingRect, TriangulateEarcut};
use rayon::prelude::*;

use crate::{
	error::{FeatureWarning, Stage},
	features::{PolygonFeature, Tags},
	mesh::{Material, MeshFragment},
	provider::TerrainProvider,
	units::Vec3,
};

/// Parameters for [`process_buildings`] (spec §4.4, §6).
#[derive(Debug, Clone)]
pub struct BuildingParams {
	pub min_height_m: f64,
	pub height_multiplier: f64,
	pub foundation_mm: f64,
	pub embed_mm: f64,
	pub safety_margin_m: f64,
	pub color: Option<[u8; 3]>,
}

impl Default for BuildingParams {
	fn default() -> Self {
		Self {
			min_height_m: 2.5,
			height_multiplier: 1.0,
			foundation_mm: 0.0,
			embed_mm: 0.0,
			safety_margin_m: 0.01,
			color: None,
		}
	}
}

/// Resolves a building's height from tags (spec §4.4 step 1).
fn resolve_height(tags: &Tags, explicit_height_m: Option<f64>, params: &BuildingParams) -> f64 {
	let tag_f64 = |key: &str| tags.get(key).and_then(|v| v.parse::<f64>().ok());

	let base = explicit_height_m.or_else(|| tag_f64("height")).unwrap_or_else(|| {
		let levels = tag_f64("building:levels").unwrap_or(1.0);
		let roof = tag_f64("roof:height").unwrap_or_else(|| tag_f64("roof:levels").unwrap_or(0.0) * 1.5);
		levels * 3.0 + roof
	});

	base.max(params.min_height_m) * params.height_multiplier
}

/// Samples the ground under a polygon: boundary points plus an interior
/// grid sized by area (spec §4.4 step 2).
fn sample_ground(polygon: &geo::Polygon<f64>, provider: &TerrainProvider) -> Vec<f64> {
	use geo::CoordsIter;

	let area = polygon.unsigned_area();
	let grid_n = if area < 100.0 {
		1
	} else if area < 1000.0 {
		3
	} else {
		5
	};

	let mut samples: Vec<f64> = polygon
		.exterior_coords_iter()
		.map(|c| provider.z_at(c.x, c.y))
		.collect();

	let Some(rect) = polygon.bounding_rect() else {
		return samples;
	};
	if grid_n == 1 {
		let cx = (rect.min().x + rect.max().x) * 0.5;
		let cy = (rect.min().y + rect.max().y) * 0.5;
		samples.push(provider.z_at(cx, cy));
	} else {
		for gi in 0..grid_n {
			for gj in 0..grid_n {
				let fx = (gi as f64 + 0.5) / grid_n as f64;
				let fy = (gj as f64 + 0.5) / grid_n as f64;
				let x = rect.min().x + fx * (rect.max().x - rect.min().x);
				let y = rect.min().y + fy * (rect.max().y - rect.min().y);
				samples.push(provider.z_at(x, y));
			}
		}
	}

	samples
}

fn extrude(polygon: &geo::Polygon<f64>, height: f64) -> Option<(Vec<Vec3>, Vec<[u32; 3]>)> {
	let triangulation = polygon.earcut_triangles_raw();
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
	// Bottom cap, reversed winding (outward normal -Z).
	for tri in triangulation.triangle_indices.chunks_exact(3) {
		faces.push([tri[0] as u32, tri[2] as u32, tri[1] as u32]);
	}
	// Top cap.
	for tri in triangulation.triangle_indices.chunks_exact(3) {
		faces.push([tri[0] as u32 + n as u32, tri[1] as u32 + n as u32, tri[2] as u32 + n as u32]);
	}
	// Side walls, one quad per boundary edge of the outer ring.
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

/// Processes one building polygon into a mesh fragment, or a warning if it
/// is degenerate (spec §4.4).
fn process_one(feature: &PolygonFeature, provider: &TerrainProvider, params: &BuildingParams) -> Result<MeshFragment, FeatureWarning> {
	if feature.polygon.unsigned_area() <= f64::EPSILON {
		return Err(FeatureWarning::DegenerateFeature {
			stage: Stage::Buildings,
			feature_id: feature.id.clone(),
			reason: "polygon area is zero or negative".into(),
		});
	}

	let height = resolve_height(&feature.tags, feature.height_m, params);
	let samples = sample_ground(&feature.polygon, provider);
	let g_min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
	if !g_min.is_finite() {
		return Err(FeatureWarning::DegenerateFeature {
			stage: Stage::Buildings,
			feature_id: feature.id.clone(),
			reason: "no valid ground samples under footprint".into(),
		});
	}

	let base_z = if params.embed_mm > 0.0 {
		g_min - params.embed_mm / 1000.0
	} else {
		g_min + params.safety_margin_m
	};
	let translate_z = base_z - params.foundation_mm / 1000.0;

	let Some((vertices, faces)) = extrude(&feature.polygon, height) else {
		return Err(FeatureWarning::InternalGeometryFailure {
			stage: Stage::Buildings,
			feature_id: feature.id.clone(),
			reason: "triangulation of footprint failed".into(),
		});
	};

	let mut fragment = MeshFragment::new(Material::Building, feature.id.clone());
	fragment.vertices = vertices;
	fragment.faces = faces;
	fragment.translate_z(translate_z);

	below_ground_correction(&mut fragment, provider);

	if let Some(color) = params.color {
		fragment = fragment.with_color(color);
	}
	Ok(fragment)
}

/// Two-pass below-ground correction (spec §4.4 step 5): lifts the whole
/// mesh uniformly if any bottom vertex sits below its local ground.
fn below_ground_correction(fragment: &mut MeshFragment, provider: &TerrainProvider) {
	let Some((min, max)) = fragment.bounds() else { return };
	let extent = (max.z - min.z).max(1e-9);
	let threshold_z = min.z + extent * 0.2;

	let deficit_for = |predicate: &dyn Fn(f64) -> bool, fragment: &MeshFragment| -> f64 {
		fragment
			.vertices
			.iter()
			.filter(|v| predicate(v.z))
			.map(|v| {
				let ground = provider.z_at(v.x, v.y);
				(ground - 0.05) - v.z
			})
			.fold(0.0, f64::max)
	};

	// Bottom-20% pass.
	let deficit = deficit_for(&|z| z <= threshold_z, fragment);
	if deficit > 0.0 {
		fragment.translate_z(deficit);
	}

	// Full pass.
	let deficit = deficit_for(&|_| true, fragment);
	if deficit > 0.0 {
		fragment.translate_z(deficit);
	}
}

/// Processes every building polygon (spec §5: concurrent across features,
/// each owning a disjoint slice of output; order is input-stable).
pub fn process_buildings(features: &[PolygonFeature], provider: &TerrainProvider, params: &BuildingParams) -> (Vec<MeshFragment>, Vec<FeatureWarning>) {
	let results: Vec<_> = features.par_iter().map(|f| process_one(f, provider, params)).collect();

	let mut fragments = Vec::new();
	let mut warnings = Vec::new();
	for result in results {
		match result {
			Ok(fragment) => fragments.push(fragment),
			Err(warning) => warnings.push(warning),
		}
	}
	(fragments, warnings)
}

#[cfg(test)]
mod tests {
	use geo::polygon;

	use super::*;
	use crate::{
		anchor::{GeoBounds, GlobalCenter},
		features::FeatureMaterial,
		height_field::{BuildParams, HeightField, SyntheticSampler},
	};

	fn flat_provider_field() -> HeightField {
		let anchor = GlobalCenter::new(GeoBounds {
			min_lat: 0.0,
			min_lon: 0.0,
			max_lat: 0.1,
			max_lon: 0.1,
		})
		.unwrap();
		let sampler = SyntheticSampler(|_, _| 50.0);
		let params = BuildParams {
			resolution: 64,
			smoothing_sigma: None,
			..Default::default()
		};
		HeightField::build((0.0, 0.0, 500.0, 500.0), &params, &anchor, &sampler).unwrap()
	}

	#[test]
	fn resolves_height_from_levels_tag() {
		let mut tags = Tags::new();
		tags.insert("building:levels".into(), "4".into());
		let params = BuildingParams::default();
		let height = resolve_height(&tags, None, &params);
		assert!((height - 12.0).abs() < 1e-9);
	}

	#[test]
	fn explicit_height_overrides_levels() {
		let mut tags = Tags::new();
		tags.insert("building:levels".into(), "4".into());
		let params = BuildingParams::default();
		let height = resolve_height(&tags, Some(7.5), &params);
		assert!((height - 7.5).abs() < 1e-9);
	}

	#[test]
	fn building_sits_on_top_of_flat_ground() {
		let field = flat_provider_field();
		let provider = TerrainProvider::new(&field);
		let poly = polygon![
			(x: 10.0, y: 10.0),
			(x: 20.0, y: 10.0),
			(x: 20.0, y: 20.0),
			(x: 10.0, y: 20.0),
		];
		let feature = PolygonFeature::new("b1", poly, FeatureMaterial::Building).with_height_m(10.0);
		let params = BuildingParams::default();
		let fragment = process_one(&feature, &provider, &params).unwrap();
		let (min, _) = fragment.bounds().unwrap();
		assert!((min.z - (50.0 + params.safety_margin_m)).abs() < 1e-6);
	}

	#[test]
	fn degenerate_polygon_is_warned_not_fatal() {
		let field = flat_provider_field();
		let provider = TerrainProvider::new(&field);
		let poly = polygon![(x: 0.0, y: 0.0), (x: 0.0, y: 0.0), (x: 0.0, y: 0.0),];
		let feature = PolygonFeature::new("b2", poly, FeatureMaterial::Building);
		let params = BuildingParams::default();
		assert!(process_one(&feature, &provider, &params).is_err());
	}
}
