//! The scene assembler (spec §4.9): centers, scales, and colors every
//! fragment emitted by §4.2-§4.8 into the final printable coordinate system.

use crate::mesh::{MeshFragment, Scene};

/// Parameters for [`assemble`] (spec §4.9, §6).
#[derive(Debug, Clone, Copy)]
pub struct AssemblerParams {
	pub model_size_mm: f64,
}

impl Default for AssemblerParams {
	fn default() -> Self {
		Self { model_size_mm: 150.0 }
	}
}

/// Concatenates, recenters, and scales every fragment (spec §4.9). Welding
/// across fragments of different materials never happens here or anywhere
/// downstream: scaling and translation are applied per-vertex in place.
pub fn assemble(fragments: Vec<MeshFragment>, params: &AssemblerParams) -> Scene {
	let mut scene = Scene::new();
	scene.extend(fragments);

	let Some((min, max)) = scene.bounds() else {
		return scene;
	};

	let centroid_x = (min.x + max.x) * 0.5;
	let centroid_y = (min.y + max.y) * 0.5;

	for fragment in &mut scene.fragments {
		for v in &mut fragment.vertices {
			v.x -= centroid_x;
			v.y -= centroid_y;
		}
	}

	let extent_x = max.x - min.x;
	let extent_y = max.y - min.y;
	let avg_xy = (extent_x + extent_y) * 0.5;
	let scale = if avg_xy > 0.0 { params.model_size_mm / avg_xy } else { 1.0 };

	for fragment in &mut scene.fragments {
		for v in &mut fragment.vertices {
			*v *= scale;
		}
	}

	let Some((min, _max)) = scene.bounds() else {
		return scene;
	};
	let z_shift = -min.z;
	for fragment in &mut scene.fragments {
		fragment.translate_z(z_shift);
	}

	for fragment in &mut scene.fragments {
		if fragment.color.is_none() {
			fragment.color = Some(fragment.material.default_color());
		}
	}

	scene
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{mesh::Material, units::Vec3};

	fn cube(material: Material, offset: f64) -> MeshFragment {
		let mut m = MeshFragment::new(material, "cube");
		m.vertices = vec![
			Vec3::new(offset, offset, 0.0),
			Vec3::new(offset + 10.0, offset, 0.0),
			Vec3::new(offset + 10.0, offset + 10.0, 0.0),
			Vec3::new(offset, offset + 10.0, 0.0),
			Vec3::new(offset, offset, 10.0),
			Vec3::new(offset + 10.0, offset, 10.0),
			Vec3::new(offset + 10.0, offset + 10.0, 10.0),
			Vec3::new(offset, offset + 10.0, 10.0),
		];
		m.faces = vec![
			[0, 2, 1],
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
		m
	}

	#[test]
	fn min_z_is_zero_after_assembly() {
		let scene = assemble(vec![cube(Material::Base, 0.0)], &AssemblerParams::default());
		let (min, _) = scene.bounds().unwrap();
		assert!(min.z.abs() < 1e-9);
	}

	#[test]
	fn missing_colors_get_material_default() {
		let scene = assemble(vec![cube(Material::Water, 0.0)], &AssemblerParams::default());
		assert_eq!(scene.fragments[0].color, Some(Material::Water.default_color()));
	}

	#[test]
	fn explicit_color_is_preserved() {
		let mut fragment = cube(Material::Building, 0.0);
		fragment.color = Some([1, 2, 3]);
		let scene = assemble(vec![fragment], &AssemblerParams::default());
		assert_eq!(scene.fragments[0].color, Some([1, 2, 3]));
	}

	#[test]
	fn xy_extent_matches_model_size_after_scaling() {
		let scene = assemble(vec![cube(Material::Base, 0.0)], &AssemblerParams { model_size_mm: 100.0 });
		let (min, max) = scene.bounds().unwrap();
		let avg_xy = ((max.x - min.x) + (max.y - min.y)) * 0.5;
		assert!((avg_xy - 100.0).abs() < 1e-6);
	}
}
