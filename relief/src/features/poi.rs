//! The POI processor (spec §4.8).

use crate::{
	features::Tags,
	mesh::{Material, MeshFragment},
	provider::TerrainProvider,
	units::Vec3,
};

/// A point-of-interest input (spec §3, §4.8).
#[derive(Debug, Clone)]
pub struct Poi {
	pub id: String,
	pub x: f64,
	pub y: f64,
	pub tags: Tags,
	/// Lower values sort first when the point count exceeds `n_max`.
	pub class_priority: i32,
}

impl Poi {
	pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
		Self {
			id: id.into(),
			x,
			y,
			tags: Tags::new(),
			class_priority: 0,
		}
	}

	pub fn with_class_priority(mut self, priority: i32) -> Self {
		self.class_priority = priority;
		self
	}
}

/// Parameters for [`process_poi`] (spec §4.8, §6).
#[derive(Debug, Clone)]
pub struct PoiParams {
	pub height_m: f64,
	pub embed_m: f64,
	pub n_max: usize,
	pub footprint_m: f64,
	pub color: Option<[u8; 3]>,
}

impl Default for PoiParams {
	fn default() -> Self {
		Self {
			height_m: 0.004,
			embed_m: 0.0005,
			n_max: 600,
			footprint_m: 0.002,
			color: None,
		}
	}
}

/// Selects the points to keep when `points.len() > n_max`: class priority
/// first, then distance from the extent center, both deterministic (spec
/// §4.8).
fn select(points: &[Poi], n_max: usize, center: (f64, f64)) -> Vec<usize> {
	if points.len() <= n_max {
		return (0..points.len()).collect();
	}

	let mut indices: Vec<usize> = (0..points.len()).collect();
	indices.sort_by(|&a, &b| {
		let pa = &points[a];
		let pb = &points[b];
		pa.class_priority.cmp(&pb.class_priority).then_with(|| {
			let da = (pa.x - center.0).powi(2) + (pa.y - center.1).powi(2);
			let db = (pb.x - center.0).powi(2) + (pb.y - center.1).powi(2);
			da.total_cmp(&db)
		})
	});
	indices.truncate(n_max);
	indices.sort_unstable();
	indices
}

fn prism(poi: &Poi, provider: &TerrainProvider, params: &PoiParams) -> MeshFragment {
	let half = params.footprint_m * 0.5;
	let ground = provider.z_at(poi.x, poi.y);
	let center_z = ground + params.height_m / 2.0 - params.embed_m;
	let bottom_z = center_z - params.height_m / 2.0;
	let top_z = center_z + params.height_m / 2.0;

	let corners = [(-half, -half), (half, -half), (half, half), (-half, half)];
	let mut vertices = Vec::with_capacity(8);
	for &(dx, dy) in &corners {
		vertices.push(Vec3::new(poi.x + dx, poi.y + dy, bottom_z));
	}
	for &(dx, dy) in &corners {
		vertices.push(Vec3::new(poi.x + dx, poi.y + dy, top_z));
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

	let mut fragment = MeshFragment::new(Material::Poi, poi.id.clone());
	fragment.vertices = vertices;
	fragment.faces = faces;
	if let Some(color) = params.color {
		fragment = fragment.with_color(color);
	}
	fragment
}

/// Processes every POI point, capping the count deterministically (spec
/// §4.8, §5: input-stable ordering).
pub fn process_poi(points: &[Poi], extent_center: (f64, f64), provider: &TerrainProvider, params: &PoiParams) -> Vec<MeshFragment> {
	let kept = select(points, params.n_max, extent_center);
	kept.into_iter().map(|idx| prism(&points[idx], provider, params)).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		anchor::{GeoBounds, GlobalCenter},
		height_field::{BuildParams, HeightField, SyntheticSampler},
	};

	fn flat_provider() -> (HeightField, GlobalCenter) {
		let anchor = GlobalCenter::new(GeoBounds {
			min_lat: 0.0,
			min_lon: 0.0,
			max_lat: 0.1,
			max_lon: 0.1,
		})
		.unwrap();
		let sampler = SyntheticSampler(|_, _| 3.0);
		let params = BuildParams {
			resolution: 64,
			smoothing_sigma: None,
			..Default::default()
		};
		let field = HeightField::build((0.0, 0.0, 500.0, 500.0), &params, &anchor, &sampler).unwrap();
		(field, anchor)
	}

	#[test]
	fn under_cap_keeps_all_points() {
		let points = vec![Poi::new("p1", 10.0, 10.0), Poi::new("p2", 20.0, 20.0)];
		let kept = select(&points, 600, (0.0, 0.0));
		assert_eq!(kept.len(), 2);
	}

	#[test]
	fn over_cap_prefers_priority_then_distance() {
		let points = vec![
			Poi::new("near", 1.0, 0.0).with_class_priority(0),
			Poi::new("far", 100.0, 0.0).with_class_priority(0),
			Poi::new("low-priority", 0.5, 0.0).with_class_priority(5),
		];
		let kept = select(&points, 2, (0.0, 0.0));
		let ids: Vec<&str> = kept.iter().map(|&i| points[i].id.as_str()).collect();
		assert!(ids.contains(&"near"));
		assert!(ids.contains(&"far"));
		assert!(!ids.contains(&"low-priority"));
	}

	#[test]
	fn prism_is_centered_on_ground_minus_embed() {
		let (field, _anchor) = flat_provider();
		let provider = TerrainProvider::new(&field);
		let poi = Poi::new("p1", 50.0, 50.0);
		let params = PoiParams::default();
		let fragment = prism(&poi, &provider, &params);
		let (min, max) = fragment.bounds().unwrap();
		let center_z = (min.z + max.z) * 0.5;
		assert!((center_z - (3.0 + params.height_m / 2.0 - params.embed_m)).abs() < 1e-6);
	}
}
