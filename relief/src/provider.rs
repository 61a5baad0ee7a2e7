//! The terrain provider (spec §4.3): a triangle-exact elevation query, a
//! non-owning view over [`HeightField`] that every downstream placer uses
//! so results agree bit-for-bit with the solidified terrain's top surface.

use crate::{height_field::HeightField, units::barycentric_height};

/// A lightweight, read-only view over a [`HeightField`]'s axes and current
/// `Z` buffer. Safe for concurrent reads from multiple features (spec §5).
pub struct TerrainProvider<'a> {
	field: &'a HeightField,
}

impl<'a> TerrainProvider<'a> {
	pub fn new(field: &'a HeightField) -> Self {
		Self { field }
	}

	/// Binary search for the cell index `i` such that `node_x(i) <= x <
	/// node_x(i+1)`, clamped to the grid.
	fn locate_axis(&self, value: f64, min: f64, step: f64, count: usize) -> (usize, f64) {
		let raw = (value - min) / step;
		let clamped = raw.clamp(0.0, (count - 1) as f64);
		let i = (clamped.floor() as usize).min(count - 2);
		let frac = (clamped - i as f64).clamp(0.0, 1.0);
		(i, frac)
	}

	/// Elevation at `(x, y)`, clamped to the field extent and interpolated
	/// with the exact same triangulation rule the terrain solid uses
	/// (spec §4.1, §4.3).
	pub fn z_at(&self, x: f64, y: f64) -> f64 {
		let f = self.field;
		let (i, dx) = self.locate_axis(x, f.min_x, f.dx, f.nx);
		let (j, dy) = self.locate_axis(y, f.min_y, f.dy, f.ny);

		let z00 = f.z[f.index(i, j)];
		let z10 = f.z[f.index(i + 1, j)];
		let z01 = f.z[f.index(i, j + 1)];
		let z11 = f.z[f.index(i + 1, j + 1)];

		barycentric_height(dx, dy, z00, z10, z01, z11)
	}

	pub fn z_at_batch(&self, points: &[(f64, f64)]) -> Vec<f64> {
		points.iter().map(|&(x, y)| self.z_at(x, y)).collect()
	}

	pub fn field(&self) -> &HeightField {
		self.field
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{anchor::GeoBounds, height_field::BuildParams};

	#[test]
	fn provider_agrees_with_node_values_at_nodes() {
		let anchor = crate::anchor::GlobalCenter::new(GeoBounds {
			min_lat: 0.0,
			min_lon: 0.0,
			max_lat: 0.1,
			max_lon: 0.1,
		})
		.unwrap();
		let sampler = crate::height_field::SyntheticSampler(|lat, lon| lat * 1000.0 + lon);
		let params = BuildParams {
			resolution: 64,
			smoothing_sigma: None,
			..Default::default()
		};
		let field = crate::height_field::HeightField::build((0.0, 0.0, 500.0, 500.0), &params, &anchor, &sampler).unwrap();
		let provider = TerrainProvider::new(&field);

		for j in 0..field.ny {
			for i in 0..field.nx {
				let x = field.node_x(i);
				let y = field.node_y(j);
				let expected = field.z[field.index(i, j)];
				assert!((provider.z_at(x, y) - expected).abs() < 1e-9);
			}
		}
	}

	#[test]
	fn provider_clamps_outside_extent() {
		let anchor = crate::anchor::GlobalCenter::new(GeoBounds {
			min_lat: 0.0,
			min_lon: 0.0,
			max_lat: 0.1,
			max_lon: 0.1,
		})
		.unwrap();
		let sampler = crate::height_field::SyntheticSampler(|_, _| 42.0);
		let params = BuildParams {
			resolution: 32,
			smoothing_sigma: None,
			..Default::default()
		};
		let field = crate::height_field::HeightField::build((0.0, 0.0, 100.0, 100.0), &params, &anchor, &sampler).unwrap();
		let provider = TerrainProvider::new(&field);

		assert!((provider.z_at(-1000.0, -1000.0) - 42.0).abs() < 1e-9);
		assert!((provider.z_at(1_000_000.0, 1_000_000.0) - 42.0).abs() < 1e-9);
	}
}
