//! The water surface processor (spec §4.6).

use geo::{BooleanOps, MultiPolygon, Polygon, TriangulateEarcut};
use rayon::prelude::*;

use crate::{
	error::{FeatureWarning, Stage},
	features::PolygonFeature,
	mesh::{Material, MeshFragment},
	provider::TerrainProvider,
	units::Vec3,
};

/// Parameters for [`process_water`] (spec §4.6, §6).
#[derive(Debug, Clone)]
pub struct WaterParams {
	pub thickness_m: f64,
	pub protrusion_m: f64,
	pub color: Option<[u8; 3]>,
}

impl Default for WaterParams {
	fn default() -> Self {
		Self {
			thickness_m: 0.5,
			protrusion_m: 0.0,
			color: None,
		}
	}
}

fn clip_to_extent(polygon: &Polygon<f64>, extent: &Polygon<f64>) -> Option<Polygon<f64>> {
	let clipped = MultiPolygon::new(vec![polygon.clone()]).intersection(&MultiPolygon::new(vec![extent.clone()]));
	clipped.0.into_iter().next()
}

fn extrude(polygon: &Polygon<f64>, thickness: f64) -> Option<(Vec<Vec3>, Vec<[u32; 3]>, Vec<f64>)> {
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
	let mut local_z = Vec::with_capacity(n * 2);
	for &(x, y) in &ring {
		vertices.push(Vec3::new(x, y, 0.0));
		local_z.push(0.0);
	}
	for &(x, y) in &ring {
		vertices.push(Vec3::new(x, y, thickness));
		local_z.push(thickness);
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

	Some((vertices, faces, local_z))
}

fn process_one(
	feature: &PolygonFeature, extent: &Polygon<f64>, original_provider: &TerrainProvider, provider: &TerrainProvider, params: &WaterParams,
) -> Result<MeshFragment, FeatureWarning> {
	let Some(clipped) = clip_to_extent(&feature.polygon, extent) else {
		return Err(FeatureWarning::DegenerateFeature {
			stage: Stage::Water,
			feature_id: feature.id.clone(),
			reason: "polygon does not intersect the terrain extent".into(),
		});
	};

	let Some((mut vertices, faces, local_z)) = extrude(&clipped, params.thickness_m) else {
		return Err(FeatureWarning::InternalGeometryFailure {
			stage: Stage::Water,
			feature_id: feature.id.clone(),
			reason: "triangulation of water footprint failed".into(),
		});
	};

	for (v, &z_local) in vertices.iter_mut().zip(local_z.iter()) {
		let g_orig = original_provider.z_at(v.x, v.y);
		let g_depr = provider.z_at(v.x, v.y);
		let surface = (g_depr + params.protrusion_m).min(g_orig - 0.02);

		v.z = if z_local >= params.thickness_m - 1e-9 {
			surface
		} else if z_local <= 1e-9 {
			surface - params.thickness_m
		} else {
			surface - (params.thickness_m - z_local)
		};
	}

	let mut fragment = MeshFragment::new(Material::Water, feature.id.clone());
	fragment.vertices = vertices;
	fragment.faces = faces;
	if let Some(color) = params.color {
		fragment = fragment.with_color(color);
	}
	Ok(fragment)
}

/// Processes every water polygon. Water meshes are never subdivided (spec
/// §4.6 step 4), so the per-vertex surface rule above stays the only
/// source of Z for these fragments.
pub fn process_water(
	features: &[PolygonFeature], extent: &Polygon<f64>, original_provider: &TerrainProvider, provider: &TerrainProvider, params: &WaterParams,
) -> (Vec<MeshFragment>, Vec<FeatureWarning>) {
	let results: Vec<_> = features.par_iter().map(|f| process_one(f, extent, original_provider, provider, params)).collect();

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
		height_field::{BuildParams, HeightField, SyntheticSampler},
	};

	fn field_with_ground(z: f64) -> HeightField {
		let anchor = GlobalCenter::new(GeoBounds {
			min_lat: 0.0,
			min_lon: 0.0,
			max_lat: 0.1,
			max_lon: 0.1,
		})
		.unwrap();
		let sampler = SyntheticSampler(move |_, _| z);
		let params = BuildParams {
			resolution: 64,
			smoothing_sigma: None,
			..Default::default()
		};
		HeightField::build((0.0, 0.0, 500.0, 500.0), &params, &anchor, &sampler).unwrap()
	}

	#[test]
	fn water_top_never_exceeds_original_ground() {
		let field = field_with_ground(10.0);
		let provider = TerrainProvider::new(&field);
		let extent = polygon![(x: 0.0, y: 0.0), (x: 500.0, y: 0.0), (x: 500.0, y: 500.0), (x: 0.0, y: 500.0)];
		let poly = polygon![(x: 50.0, y: 50.0), (x: 150.0, y: 50.0), (x: 150.0, y: 150.0), (x: 50.0, y: 150.0)];
		let feature = PolygonFeature::new("w1", poly, crate::features::FeatureMaterial::Water);
		let params = WaterParams::default();
		let fragment = process_one(&feature, &extent, &provider, &provider, &params).unwrap();
		let (_, max) = fragment.bounds().unwrap();
		assert!(max.z <= 10.0 - 0.02 + 1e-9);
	}
}
