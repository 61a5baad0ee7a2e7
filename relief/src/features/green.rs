//! The green-area processor (spec §4.7).

use geo::{BooleanOps, MultiPolygon, Polygon, TriangulateEarcut};
use rayon::prelude::*;

use crate::{
	error::{FeatureWarning, Stage},
	features::PolygonFeature,
	mesh::{Material, MeshFragment},
	provider::TerrainProvider,
	units::Vec3,
};

/// Parameters for [`process_green`] (spec §4.7, §6).
#[derive(Debug, Clone)]
pub struct GreenParams {
	pub height_m: f64,
	pub embed_m: f64,
	pub color: Option<[u8; 3]>,
}

impl Default for GreenParams {
	fn default() -> Self {
		Self {
			height_m: 0.003,
			embed_m: 0.0005,
			color: None,
		}
	}
}

fn clip_to_extent(polygon: &Polygon<f64>, extent: &Polygon<f64>) -> Option<Polygon<f64>> {
	let clipped = MultiPolygon::new(vec![polygon.clone()]).intersection(&MultiPolygon::new(vec![extent.clone()]));
	clipped.0.into_iter().next()
}

fn extrude(polygon: &Polygon<f64>, height: f64) -> Option<(Vec<Vec3>, Vec<[u32; 3]>)> {
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

fn process_one(feature: &PolygonFeature, extent: &Polygon<f64>, provider: &TerrainProvider, params: &GreenParams) -> Result<MeshFragment, FeatureWarning> {
	let Some(clipped) = clip_to_extent(&feature.polygon, extent) else {
		return Err(FeatureWarning::DegenerateFeature {
			stage: Stage::Green,
			feature_id: feature.id.clone(),
			reason: "polygon does not intersect the terrain extent".into(),
		});
	};

	let Some((mut vertices, faces)) = extrude(&clipped, params.height_m) else {
		return Err(FeatureWarning::InternalGeometryFailure {
			stage: Stage::Green,
			feature_id: feature.id.clone(),
			reason: "triangulation of green footprint failed".into(),
		});
	};

	for v in &mut vertices {
		let ground = provider.z_at(v.x, v.y);
		v.z = ground + v.z - params.embed_m;
	}

	let mut fragment = MeshFragment::new(Material::Green, feature.id.clone());
	fragment.vertices = vertices;
	fragment.faces = faces;
	if let Some(color) = params.color {
		fragment = fragment.with_color(color);
	}
	Ok(fragment)
}

/// Processes every green/park polygon (spec §5: concurrent, disjoint output).
pub fn process_green(features: &[PolygonFeature], extent: &Polygon<f64>, provider: &TerrainProvider, params: &GreenParams) -> (Vec<MeshFragment>, Vec<FeatureWarning>) {
	let results: Vec<_> = features.par_iter().map(|f| process_one(f, extent, provider, params)).collect();

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

	#[test]
	fn green_patch_follows_ground_plus_embed() {
		let anchor = GlobalCenter::new(GeoBounds {
			min_lat: 0.0,
			min_lon: 0.0,
			max_lat: 0.1,
			max_lon: 0.1,
		})
		.unwrap();
		let sampler = SyntheticSampler(|_, _| 5.0);
		let params = BuildParams {
			resolution: 64,
			smoothing_sigma: None,
			..Default::default()
		};
		let field = HeightField::build((0.0, 0.0, 500.0, 500.0), &params, &anchor, &sampler).unwrap();
		let provider = TerrainProvider::new(&field);
		let extent = polygon![(x: 0.0, y: 0.0), (x: 500.0, y: 0.0), (x: 500.0, y: 500.0), (x: 0.0, y: 500.0)];
		let poly = polygon![(x: 50.0, y: 50.0), (x: 150.0, y: 50.0), (x: 150.0, y: 150.0), (x: 50.0, y: 150.0)];
		let feature = PolygonFeature::new("g1", poly, crate::features::FeatureMaterial::Green);
		let gp = GreenParams::default();
		let fragment = process_one(&feature, &extent, &provider, &gp).unwrap();
		let (min, _) = fragment.bounds().unwrap();
		assert!((min.z - (5.0 - gp.embed_m)).abs() < 1e-6);
	}
}
