//! Shared numeric aliases and small geometry helpers used across every stage.
//!
//! Everything in the pipeline after projection lives in local, metric,
//! double-precision coordinates, so a single `Vec2`/`Vec3` alias is used
//! throughout instead of re-deriving vector math per module.

pub use glam::{DVec2 as Vec2, DVec3 as Vec3};

/// Linear interpolation quantile (the "R-7" / numpy-default definition),
/// computed on an exact copy of the input samples.
///
/// `q` is clamped to `[0, 1]`. An empty slice returns `0.0`; callers are
/// expected to only call this on non-empty cell sets (an empty
/// rasterization is a no-op at the call site, per spec).
pub fn quantile(samples: &[f64], q: f64) -> f64 {
	if samples.is_empty() {
		return 0.0;
	}
	let q = q.clamp(0.0, 1.0);
	let mut sorted = samples.to_vec();
	sorted.sort_by(|a, b| a.total_cmp(b));

	if sorted.len() == 1 {
		return sorted[0];
	}

	let pos = q * (sorted.len() - 1) as f64;
	let lo = pos.floor() as usize;
	let hi = pos.ceil() as usize;
	if lo == hi {
		sorted[lo]
	} else {
		let frac = pos - lo as f64;
		sorted[lo] * (1.0 - frac) + sorted[hi] * frac
	}
}

/// The fixed per-cell triangulation rule (spec §4.1): for a quad with
/// corners `(i,j)`, `(i,j+1)`, `(i+1,j)`, `(i+1,j+1)` and normalized
/// in-cell coordinates `(dx,dy) ∈ [0,1]²`, triangle A is `dx+dy <= 1`.
///
/// Every consumer that needs the elevation at an arbitrary point inside a
/// cell (the terrain solid's top surface, the terrain provider, feature
/// draping) must call this function so all of them agree bit-for-bit.
#[inline]
pub fn barycentric_height(dx: f64, dy: f64, z00: f64, z10: f64, z01: f64, z11: f64) -> f64 {
	if dx + dy <= 1.0 {
		z00 * (1.0 - dx - dy) + z10 * dx + z01 * dy
	} else {
		z11 * (dx + dy - 1.0) + z10 * (1.0 - dy) + z01 * (1.0 - dx)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn quantile_median_of_four() {
		let v = [1.0, 2.0, 3.0, 4.0];
		assert!((quantile(&v, 0.5) - 2.5).abs() < 1e-9);
	}

	#[test]
	fn quantile_endpoints() {
		let v = [5.0, 1.0, 3.0];
		assert_eq!(quantile(&v, 0.0), 1.0);
		assert_eq!(quantile(&v, 1.0), 5.0);
	}

	#[test]
	fn barycentric_matches_corners() {
		assert_eq!(barycentric_height(0.0, 0.0, 1.0, 2.0, 3.0, 4.0), 1.0);
		assert_eq!(barycentric_height(1.0, 0.0, 1.0, 2.0, 3.0, 4.0), 2.0);
		assert_eq!(barycentric_height(0.0, 1.0, 1.0, 2.0, 3.0, 4.0), 3.0);
		assert_eq!(barycentric_height(1.0, 1.0, 1.0, 2.0, 3.0, 4.0), 4.0);
	}

	#[test]
	fn barycentric_continuous_across_diagonal() {
		let a = barycentric_height(0.5, 0.4999, 0.0, 10.0, 10.0, 20.0);
		let b = barycentric_height(0.5, 0.5001, 0.0, 10.0, 10.0, 20.0);
		assert!((a - b).abs() < 1e-3);
	}
}
