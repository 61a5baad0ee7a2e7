//! The terrain solidifier (spec §4.2): turns the height field into a
//! watertight triangular solid — top surface, flat bottom, side skirts.

use crate::{
	error::{PipelineError, Stage},
	height_field::HeightField,
	mesh::{Material, MeshFragment},
	units::Vec3,
};

/// Parameters for [`solidify`] (spec §4.2, §6).
pub struct SolidifyParams {
	pub base_thickness_m: f64,
	/// 1→4 triangle subdivision levels, clamped to `[0, 2]`. New vertices
	/// are linearly interpolated on edges only — elevation is never
	/// re-sampled, to avoid diverging from the provider (spec §4.2, §9).
	pub subdivision_levels: u8,
}

impl Default for SolidifyParams {
	fn default() -> Self {
		Self {
			base_thickness_m: 0.002,
			subdivision_levels: 0,
		}
	}
}

/// Builds the watertight terrain solid, re-welding once if the first pass
/// doesn't come out watertight and failing with [`PipelineError::NonWatertightBase`]
/// if it still doesn't (spec §4.2).
pub fn solidify(field: &HeightField, params: &SolidifyParams) -> Result<MeshFragment, PipelineError> {
	let nx = field.nx;
	let ny = field.ny;
	let top_count = nx * ny;

	let min_z = field.z.iter().cloned().fold(f64::INFINITY, f64::min);
	let bottom_z = min_z - params.base_thickness_m;

	let mut vertices = Vec::with_capacity(top_count * 2);
	for j in 0..ny {
		for i in 0..nx {
			vertices.push(Vec3::new(field.node_x(i), field.node_y(j), field.z[field.index(i, j)]));
		}
	}
	// Bottom layer mirrors the top layer's XY so side-skirt indexing lines up.
	for j in 0..ny {
		for i in 0..nx {
			vertices.push(Vec3::new(field.node_x(i), field.node_y(j), bottom_z));
		}
	}

	let top_index = |i: usize, j: usize| -> u32 { (j * nx + i) as u32 };
	let bottom_index = |i: usize, j: usize| -> u32 { (top_count + j * nx + i) as u32 };

	let mut faces = Vec::new();

	// Top surface: the fixed cell triangulation rule (spec §4.1), CCW when
	// viewed from +Z.
	for j in 0..ny - 1 {
		for i in 0..nx - 1 {
			let v00 = top_index(i, j);
			let v10 = top_index(i + 1, j);
			let v01 = top_index(i, j + 1);
			let v11 = top_index(i + 1, j + 1);
			faces.push([v00, v10, v01]);
			faces.push([v01, v10, v11]);
		}
	}

	// Bottom surface: the same rule, reversed winding so the normal faces -Z.
	for j in 0..ny - 1 {
		for i in 0..nx - 1 {
			let v00 = bottom_index(i, j);
			let v10 = bottom_index(i + 1, j);
			let v01 = bottom_index(i, j + 1);
			let v11 = bottom_index(i + 1, j + 1);
			faces.push([v00, v01, v10]);
			faces.push([v01, v11, v10]);
		}
	}

	// Side skirts along the four boundary chains, wound outward.
	for j in 0..ny - 1 {
		// i = 0 (outward normal -X).
		let t0 = top_index(0, j);
		let t1 = top_index(0, j + 1);
		let b0 = bottom_index(0, j);
		let b1 = bottom_index(0, j + 1);
		faces.push([t0, b0, b1]);
		faces.push([t0, b1, t1]);

		// i = nx-1 (outward normal +X).
		let t0 = top_index(nx - 1, j);
		let t1 = top_index(nx - 1, j + 1);
		let b0 = bottom_index(nx - 1, j);
		let b1 = bottom_index(nx - 1, j + 1);
		faces.push([t0, b1, b0]);
		faces.push([t0, t1, b1]);
	}
	for i in 0..nx - 1 {
		// j = 0 (outward normal -Y).
		let t0 = top_index(i, 0);
		let t1 = top_index(i + 1, 0);
		let b0 = bottom_index(i, 0);
		let b1 = bottom_index(i + 1, 0);
		faces.push([t0, t1, b1]);
		faces.push([t0, b1, b0]);

		// j = ny-1 (outward normal +Y).
		let t0 = top_index(i, ny - 1);
		let t1 = top_index(i + 1, ny - 1);
		let b0 = bottom_index(i, ny - 1);
		let b1 = bottom_index(i + 1, ny - 1);
		faces.push([t0, b0, b1]);
		faces.push([t0, b1, t1]);
	}

	let mut fragment = MeshFragment::new(Material::Base, "terrain-base");
	fragment.vertices = vertices;
	fragment.faces = faces;

	for _ in 0..params.subdivision_levels.min(2) {
		subdivide(&mut fragment);
	}

	weld(&mut fragment);
	if !fragment.is_watertight() {
		weld(&mut fragment);
	}
	if !fragment.is_watertight() {
		return Err(PipelineError::NonWatertightBase { stage: Stage::Solidifier });
	}

	Ok(fragment)
}

/// 1→4 subdivision: each triangle gets a vertex at the midpoint of each
/// edge (linearly interpolated, never re-sampled) and splits into four.
fn subdivide(fragment: &mut MeshFragment) {
	let mut midpoints: std::collections::HashMap<(u32, u32), u32> = std::collections::HashMap::new();
	let mut new_faces = Vec::with_capacity(fragment.faces.len() * 4);

	let mut midpoint_of = |a: u32, b: u32, vertices: &mut Vec<Vec3>| -> u32 {
		let key = if a < b { (a, b) } else { (b, a) };
		*midpoints.entry(key).or_insert_with(|| {
			let mid = (vertices[a as usize] + vertices[b as usize]) * 0.5;
			vertices.push(mid);
			(vertices.len() - 1) as u32
		})
	};

	for face in fragment.faces.clone() {
		let [a, b, c] = face;
		let ab = midpoint_of(a, b, &mut fragment.vertices);
		let bc = midpoint_of(b, c, &mut fragment.vertices);
		let ca = midpoint_of(c, a, &mut fragment.vertices);
		new_faces.push([a, ab, ca]);
		new_faces.push([ab, b, bc]);
		new_faces.push([ca, bc, c]);
		new_faces.push([ab, bc, ca]);
	}

	fragment.faces = new_faces;
}

/// Vertex welding with tolerance relative to the bounding-box diagonal
/// (spec §4.2, §9).
fn weld(fragment: &mut MeshFragment) {
	let Some((min, max)) = fragment.bounds() else { return };
	let diagonal = (max - min).length();
	let tolerance = diagonal * 1e-6;
	if tolerance <= 0.0 {
		return;
	}

	let grid = (1.0 / tolerance).max(1.0);
	let key_of = |v: Vec3| -> (i64, i64, i64) {
		(
			(v.x * grid).round() as i64,
			(v.y * grid).round() as i64,
			(v.z * grid).round() as i64,
		)
	};

	let mut remap = vec![0u32; fragment.vertices.len()];
	let mut unique_vertices = Vec::with_capacity(fragment.vertices.len());
	let mut seen: std::collections::HashMap<(i64, i64, i64), u32> = std::collections::HashMap::new();

	for (idx, &v) in fragment.vertices.iter().enumerate() {
		let key = key_of(v);
		let new_idx = *seen.entry(key).or_insert_with(|| {
			unique_vertices.push(v);
			(unique_vertices.len() - 1) as u32
		});
		remap[idx] = new_idx;
	}

	fragment.vertices = unique_vertices;
	for face in &mut fragment.faces {
		for idx in face.iter_mut() {
			*idx = remap[*idx as usize];
		}
	}
	fragment.faces.retain(|f| f[0] != f[1] && f[1] != f[2] && f[0] != f[2]);
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{anchor::GeoBounds, height_field::{BuildParams, HeightField, SyntheticSampler}};

	fn flat_field(size: f64, resolution: u32) -> HeightField {
		let anchor = crate::anchor::GlobalCenter::new(GeoBounds {
			min_lat: 0.0,
			min_lon: 0.0,
			max_lat: 0.1,
			max_lon: 0.1,
		})
		.unwrap();
		let sampler = SyntheticSampler(|_, _| 100.0);
		let params = BuildParams {
			resolution,
			smoothing_sigma: None,
			..Default::default()
		};
		HeightField::build((0.0, 0.0, size, size), &params, &anchor, &sampler).unwrap()
	}

	#[test]
	fn flat_terrain_is_watertight() {
		let field = flat_field(1000.0, 32);
		let solid = solidify(&field, &SolidifyParams::default()).unwrap();
		assert!(solid.is_watertight());
	}

	#[test]
	fn flat_terrain_has_expected_bounds() {
		let field = flat_field(1000.0, 32);
		let params = SolidifyParams {
			base_thickness_m: 0.002,
			subdivision_levels: 0,
		};
		let solid = solidify(&field, &params).unwrap();
		let (min, max) = solid.bounds().unwrap();
		assert!((max.z - 100.0).abs() < 1e-9);
		assert!((min.z - (100.0 - 0.002)).abs() < 1e-9);
	}

	#[test]
	fn subdivision_keeps_mesh_watertight() {
		let field = flat_field(1000.0, 16);
		let params = SolidifyParams {
			base_thickness_m: 0.002,
			subdivision_levels: 2,
		};
		let solid = solidify(&field, &params).unwrap();
		assert!(solid.is_watertight());
	}
}
