//! The height field (spec §3, §4.1): a regular grid of elevations in local
//! coordinates, plus the terrain-first flatten/depress operators.

use geo::{Contains, Polygon};
use rayon::prelude::*;

use crate::{
	error::{ElevationSampleError, PipelineError, Stage},
	features::PolygonFeature,
	units::quantile,
};

/// Abstraction over "give me the raw elevation at this lat/lon" (spec §6).
/// Implementations plug in tiled HTTP fetchers, local raster readers
/// ([`crate::raster::RasterSampler`] behind the `raster` feature), or
/// synthetic generators for tests.
pub trait ElevationSampler: Send + Sync {
	fn sample(&self, lat: f64, lon: f64) -> Result<f64, ElevationSampleError>;

	/// Batch form; the default maps the scalar one. Implementations backed
	/// by a raster can override this to issue one windowed read.
	fn sample_batch(&self, points: &[(f64, f64)]) -> Vec<Result<f64, ElevationSampleError>> {
		points.iter().map(|&(lat, lon)| self.sample(lat, lon)).collect()
	}

	/// How many samples may be requested from this sampler concurrently.
	/// `1` (the default) means "call serially" — spec §5 allows parallel
	/// sampling only when the callback is declared thread-safe.
	fn max_concurrency(&self) -> usize {
		1
	}
}

/// A synthetic, always-parallel-safe sampler backed by a closure. Used by
/// tests and by callers that already have elevation in memory.
pub struct SyntheticSampler<F>(pub F)
where
	F: Fn(f64, f64) -> f64 + Send + Sync;

impl<F> ElevationSampler for SyntheticSampler<F>
where
	F: Fn(f64, f64) -> f64 + Send + Sync,
{
	fn sample(&self, lat: f64, lon: f64) -> Result<f64, ElevationSampleError> {
		Ok((self.0)(lat, lon))
	}

	fn max_concurrency(&self) -> usize {
		rayon::current_num_threads()
	}
}

/// A regular grid of elevations in local coordinates (spec §3).
///
/// Nodes are laid out row-major in Y then X: `index = j * nx + i`, fixed
/// for the whole system (spec §9's open question is resolved this way).
#[derive(Debug, Clone)]
pub struct HeightField {
	pub min_x: f64,
	pub min_y: f64,
	pub max_x: f64,
	pub max_y: f64,
	pub nx: usize,
	pub ny: usize,
	pub dx: f64,
	pub dy: f64,
	pub z: Vec<f64>,
	pub elevation_ref_m: f64,
	pub z_scale: f64,
	/// Snapshotted by [`HeightField::depress`] the first time it runs.
	pub original_z: Option<Vec<f64>>,
}

/// Parameters for [`HeightField::build`] (spec §4.1, §6).
pub struct BuildParams {
	pub resolution: u32,
	pub elevation_ref_m: f64,
	pub z_scale: f64,
	pub smoothing_sigma: Option<f64>,
}

impl Default for BuildParams {
	fn default() -> Self {
		Self {
			resolution: 180,
			elevation_ref_m: 0.0,
			z_scale: 1.0,
			smoothing_sigma: Some(2.0),
		}
	}
}

impl HeightField {
	#[inline]
	pub fn index(&self, i: usize, j: usize) -> usize {
		j * self.nx + i
	}

	#[inline]
	pub fn node_x(&self, i: usize) -> f64 {
		self.min_x + self.dx * i as f64
	}

	#[inline]
	pub fn node_y(&self, j: usize) -> f64 {
		self.min_y + self.dy * j as f64
	}

	/// Builds the grid for `bounds = (minX,minY,maxX,maxY)` in local
	/// coordinates, sampling `sampler` through `anchor` to turn nodes back
	/// into geographic coordinates for the callback (spec §4.1).
	pub fn build(
		bounds: (f64, f64, f64, f64), params: &BuildParams, anchor: &crate::anchor::GlobalCenter,
		sampler: &dyn ElevationSampler,
	) -> Result<Self, PipelineError> {
		let (min_x, min_y, max_x, max_y) = bounds;
		let width = max_x - min_x;
		let height = max_y - min_y;
		if !(width > 0.0) || !(height > 0.0) {
			return Err(PipelineError::InvalidInput {
				stage: Stage::HeightField,
				reason: "extent must have positive width and height".into(),
			});
		}

		let resolution = params.resolution.clamp(60, 320) as f64;
		let aspect = width / height;
		let (nx, ny) = if width >= height {
			(resolution.round() as usize, (resolution / aspect).round() as usize)
		} else {
			((resolution * aspect).round() as usize, resolution.round() as usize)
		};
		let nx = nx.max(2);
		let ny = ny.max(2);

		let dx = width / (nx - 1) as f64;
		let dy = height / (ny - 1) as f64;

		let mut field = HeightField {
			min_x,
			min_y,
			max_x,
			max_y,
			nx,
			ny,
			dx,
			dy,
			z: vec![f64::NAN; nx * ny],
			elevation_ref_m: params.elevation_ref_m,
			z_scale: params.z_scale,
			original_z: None,
		};

		let nodes: Vec<(usize, f64, f64)> = (0..ny)
			.flat_map(|j| (0..nx).map(move |i| (j * nx + i, i, j)))
			.map(|(idx, i, j)| {
				let (x, y) = anchor.to_projected_from_local(field.node_x(i), field.node_y(j));
				let (lat, lon) = anchor.to_geographic(x, y).unwrap_or((0.0, 0.0));
				(idx, lat, lon)
			})
			.collect();

		let raw: Vec<Option<f64>> = if sampler.max_concurrency() > 1 {
			nodes
				.par_iter()
				.map(|&(_, lat, lon)| sampler.sample(lat, lon).ok())
				.collect()
		} else {
			nodes.iter().map(|&(_, lat, lon)| sampler.sample(lat, lon).ok()).collect()
		};

		for (idx, value) in raw.into_iter().enumerate() {
			if let Some(v) = value {
				field.z[idx] = v;
			}
		}

		field.fill_missing(params.elevation_ref_m);
		if field.z.iter().all(|v| !v.is_finite()) {
			return Err(PipelineError::EmptyHeightField { stage: Stage::HeightField });
		}

		for v in &mut field.z {
			*v = (*v - params.elevation_ref_m) * params.z_scale;
		}

		if let Some(sigma) = params.smoothing_sigma {
			if sigma > 0.0 {
				field.gaussian_smooth(sigma);
			}
		}

		Ok(field)
	}

	/// Nearest-neighbor fill of `NaN` cells, falling back to
	/// `elevation_ref_m` for any cell with no valid neighbor at all (spec
	/// §4.1, §7).
	fn fill_missing(&mut self, fallback: f64) {
		if self.z.iter().all(|v| v.is_finite()) {
			return;
		}

		let mut filled = self.z.clone();
		let mut changed = true;
		// Iteratively flood-fill from valid neighbors; a handful of passes
		// is enough because DEM gaps are local, not global.
		for _ in 0..8 {
			if !changed {
				break;
			}
			changed = false;
			for j in 0..self.ny {
				for i in 0..self.nx {
					let idx = self.index(i, j);
					if filled[idx].is_finite() {
						continue;
					}
					let mut sum = 0.0;
					let mut count = 0;
					for (di, dj) in [(-1i32, 0i32), (1, 0), (0, -1), (0, 1)] {
						let ni = i as i32 + di;
						let nj = j as i32 + dj;
						if ni >= 0 && nj >= 0 && (ni as usize) < self.nx && (nj as usize) < self.ny {
							let nidx = self.index(ni as usize, nj as usize);
							if self.z[nidx].is_finite() {
								sum += self.z[nidx];
								count += 1;
							}
						}
					}
					if count > 0 {
						filled[idx] = sum / count as f64;
						changed = true;
					}
				}
			}
			self.z.clone_from(&filled);
		}

		for v in &mut self.z {
			if !v.is_finite() {
				*v = fallback;
			}
		}
	}

	/// Separable Gaussian blur with reflected boundary handling, applied
	/// before normalization is locked in by the caller.
	fn gaussian_smooth(&mut self, sigma: f64) {
		let radius = (sigma * 3.0).ceil().max(1.0) as i32;
		let mut kernel = Vec::with_capacity((2 * radius + 1) as usize);
		let mut sum = 0.0;
		for k in -radius..=radius {
			let w = (-0.5 * (k as f64 / sigma).powi(2)).exp();
			kernel.push(w);
			sum += w;
		}
		for w in &mut kernel {
			*w /= sum;
		}

		let reflect = |v: i32, len: usize| -> usize {
			let len = len as i32;
			let mut v = v;
			while v < 0 || v >= len {
				if v < 0 {
					v = -v - 1;
				}
				if v >= len {
					v = 2 * len - v - 1;
				}
			}
			v as usize
		};

		// Horizontal pass.
		let mut horiz = vec![0.0; self.z.len()];
		for j in 0..self.ny {
			for i in 0..self.nx {
				let mut acc = 0.0;
				for (k, &w) in kernel.iter().enumerate() {
					let offset = k as i32 - radius;
					let si = reflect(i as i32 + offset, self.nx);
					acc += w * self.z[self.index(si, j)];
				}
				horiz[self.index(i, j)] = acc;
			}
		}

		// Vertical pass.
		let mut out = vec![0.0; self.z.len()];
		for j in 0..self.ny {
			for i in 0..self.nx {
				let mut acc = 0.0;
				for (k, &w) in kernel.iter().enumerate() {
					let offset = k as i32 - radius;
					let sj = reflect(j as i32 + offset, self.ny);
					acc += w * horiz[self.index(i, sj)];
				}
				out[self.index(i, j)] = acc;
			}
		}

		self.z = out;
	}

	/// Conservative rasterization of `polygon` onto the grid: a node is
	/// "inside" if the polygon contains it, or if it lies within half a
	/// cell diagonal of the boundary (spec §4.1: "cells touched by the
	/// boundary count as inside").
	fn rasterize(&self, polygon: &Polygon<f64>) -> Vec<usize> {
		use geo::{BoundingRect, Distance, Euclidean};

		let Some(rect) = polygon.bounding_rect() else {
			return Vec::new();
		};
		let tolerance = 0.5 * (self.dx * self.dx + self.dy * self.dy).sqrt();

		let i_lo = (((rect.min().x - tolerance - self.min_x) / self.dx).floor() as isize).max(0) as usize;
		let i_hi = (((rect.max().x + tolerance - self.min_x) / self.dx).ceil() as isize).min(self.nx as isize - 1) as usize;
		let j_lo = (((rect.min().y - tolerance - self.min_y) / self.dy).floor() as isize).max(0) as usize;
		let j_hi = (((rect.max().y + tolerance - self.min_y) / self.dy).ceil() as isize).min(self.ny as isize - 1) as usize;

		if i_lo > i_hi || j_lo > j_hi {
			return Vec::new();
		}

		let mut cells = Vec::new();
		for j in j_lo..=j_hi {
			for i in i_lo..=i_hi {
				let point = geo::Point::new(self.node_x(i), self.node_y(j));
				let inside = polygon.contains(&point)
					|| polygon
						.exterior()
						.lines()
						.any(|line| Euclidean::distance(&line, &point) <= tolerance);
				if inside {
					cells.push(self.index(i, j));
				}
			}
		}
		cells
	}

	/// Flatten under polygons (spec §4.1): each polygon's covered cells get
	/// the quantile of their pre-flatten Z. Caller controls pass ordering
	/// (buildings before roads) by calling this twice with disjoint sets,
	/// in order; within one call, input order is the tie-break.
	pub fn flatten(&mut self, polygons: &[PolygonFeature], q: f64) {
		for feature in polygons {
			let cells = self.rasterize(&feature.polygon);
			if cells.is_empty() {
				continue;
			}
			let samples: Vec<f64> = cells.iter().map(|&c| self.z[c]).collect();
			let target = quantile(&samples, q);
			for &c in &cells {
				self.z[c] = target;
			}
		}
	}

	/// Depress under water polygons (spec §4.1): relative to the
	/// pre-depression snapshot, so water never sits above original banks.
	pub fn depress(&mut self, polygons: &[PolygonFeature], depth: f64, surface_quantile: f64) {
		if self.original_z.is_none() {
			self.original_z = Some(self.z.clone());
		}
		let original = self.original_z.as_ref().unwrap().clone();

		for feature in polygons {
			let cells = self.rasterize(&feature.polygon);
			if cells.is_empty() {
				continue;
			}
			let samples: Vec<f64> = cells.iter().map(|&c| original[c]).collect();
			let surface = quantile(&samples, surface_quantile);
			for &c in &cells {
				self.z[c] = surface - depth;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use geo::{polygon, Polygon};

	use super::*;
	use crate::{anchor::GeoBounds, features::FeatureMaterial};

	fn flat_anchor() -> crate::anchor::GlobalCenter {
		crate::anchor::GlobalCenter::new(GeoBounds {
			min_lat: 10.0,
			min_lon: 10.0,
			max_lat: 10.1,
			max_lon: 10.1,
		})
		.unwrap()
	}

	#[test]
	fn build_rejects_degenerate_extent() {
		let anchor = flat_anchor();
		let sampler = SyntheticSampler(|_, _| 0.0);
		let err = HeightField::build((0.0, 0.0, 0.0, 100.0), &BuildParams::default(), &anchor, &sampler);
		assert!(err.is_err());
	}

	#[test]
	fn constant_field_stays_constant() {
		let anchor = flat_anchor();
		let sampler = SyntheticSampler(|_, _| 100.0);
		let params = BuildParams {
			resolution: 64,
			smoothing_sigma: None,
			..Default::default()
		};
		let field = HeightField::build((0.0, 0.0, 1000.0, 1000.0), &params, &anchor, &sampler).unwrap();
		assert!(field.z.iter().all(|&v| (v - 100.0).abs() < 1e-9));
	}

	#[test]
	fn flatten_sets_quantile_of_pre_flatten_values() {
		let anchor = flat_anchor();
		// Linear ramp in local X: z(x) = x / 100.
		let sampler_anchor = anchor.clone();
		let sampler = SyntheticSampler(move |lat, lon| {
			let (x, _y) = sampler_anchor.geo_to_local(lat, lon).unwrap();
			x / 100.0
		});
		let params = BuildParams {
			resolution: 100,
			smoothing_sigma: None,
			..Default::default()
		};
		let mut field = HeightField::build((0.0, 0.0, 100.0, 100.0), &params, &anchor, &sampler).unwrap();

		let poly: Polygon<f64> = polygon![
			(x: 45.0, y: 45.0),
			(x: 55.0, y: 45.0),
			(x: 55.0, y: 55.0),
			(x: 45.0, y: 55.0),
		];
		let feature = PolygonFeature::new("b1", poly, FeatureMaterial::Building);

		let cells = field.rasterize(&feature.polygon);
		let pre_values: Vec<f64> = cells.iter().map(|&c| field.z[c]).collect();
		let expected = quantile(&pre_values, 0.5);

		field.flatten(&[feature], 0.5);
		for &c in &cells {
			assert!((field.z[c] - expected).abs() < 1e-9);
		}
	}

	#[test]
	fn depress_is_relative_to_snapshot_not_already_modified_z() {
		let anchor = flat_anchor();
		let sampler = SyntheticSampler(|_, _| 10.0);
		let params = BuildParams {
			resolution: 64,
			smoothing_sigma: None,
			..Default::default()
		};
		let mut field = HeightField::build((0.0, 0.0, 200.0, 200.0), &params, &anchor, &sampler).unwrap();

		let poly: Polygon<f64> = polygon![
			(x: 75.0, y: 75.0),
			(x: 125.0, y: 75.0),
			(x: 125.0, y: 125.0),
			(x: 75.0, y: 125.0),
		];
		let feature = PolygonFeature::new("w1", poly, FeatureMaterial::Water);

		field.depress(&[feature.clone()], 2.0, 0.10);
		let cells = field.rasterize(&feature.polygon);
		for &c in &cells {
			assert!((field.z[c] - 8.0).abs() < 1e-9);
		}

		// Depressing again must use the snapshot, not the already-lowered Z.
		field.depress(&[feature], 2.0, 0.10);
		for &c in &cells {
			assert!((field.z[c] - 8.0).abs() < 1e-9);
		}
	}
}
