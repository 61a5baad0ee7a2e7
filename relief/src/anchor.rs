//! The coordinate frame: a single immutable anchor per world region (spec §3, §4.1).
//!
//! [`GlobalCenter`] is computed once from the request's geographic bounding
//! box and passed by value/reference through the rest of the pipeline. It
//! is never stored as process-wide state (spec §9) so a host can run
//! several world regions concurrently.

use proj4rs::{proj::Proj, transform::transform};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Stage};

/// A geographic bounding box, degrees, WGS84.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct GeoBounds {
	pub min_lat: f64,
	pub min_lon: f64,
	pub max_lat: f64,
	pub max_lon: f64,
}

impl GeoBounds {
	pub fn centroid(&self) -> (f64, f64) {
		((self.min_lat + self.max_lat) * 0.5, (self.min_lon + self.max_lon) * 0.5)
	}

	fn validate(&self) -> Result<(), PipelineError> {
		if !(self.min_lat < self.max_lat) || !(self.min_lon < self.max_lon) {
			return Err(PipelineError::InvalidInput {
				stage: Stage::CoordinateFrame,
				reason: "bounding box min must be strictly less than max on both axes".into(),
			});
		}
		if self.min_lat < -90.0 || self.max_lat > 90.0 {
			return Err(PipelineError::InvalidInput {
				stage: Stage::CoordinateFrame,
				reason: "latitude out of range".into(),
			});
		}
		Ok(())
	}
}

/// The projected metric CRS an anchor is expressed in. Deterministically
/// derived from the world region (the UTM zone containing its centroid),
/// so two independent runs over the same region pick the same CRS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectedCrs {
	/// EPSG code, informational only (e.g. `32633` for UTM 33N).
	pub epsg: u32,
	proj4: String,
}

impl ProjectedCrs {
	/// The deterministic UTM zone containing `lon`/`lat`.
	pub fn utm_for(lat: f64, lon: f64) -> Self {
		let zone = (((lon + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60);
		let northern = lat >= 0.0;
		let epsg = if northern { 32600 + zone as u32 } else { 32700 + zone as u32 };
		let proj4 = format!(
			"+proj=utm +zone={zone} +datum=WGS84 +units=m {}+no_defs",
			if northern { "" } else { "+south " }
		);
		Self { epsg, proj4 }
	}

	fn proj(&self) -> Result<Proj, PipelineError> {
		Proj::from_proj_string(&self.proj4).map_err(|e| PipelineError::InvalidInput {
			stage: Stage::CoordinateFrame,
			reason: format!("invalid projected CRS {}: {e}", self.proj4),
		})
	}
}

fn wgs84() -> Result<Proj, PipelineError> {
	Proj::from_proj_string("+proj=longlat +ellps=WGS84 +datum=WGS84 +no_defs").map_err(|e| PipelineError::InvalidInput {
		stage: Stage::CoordinateFrame,
		reason: format!("failed to construct WGS84 definition: {e}"),
	})
}

/// The immutable global anchor for one world region.
///
/// Invariant: constructed deterministically from `bounds` alone (centroid
/// of the bounding box, projected), so the same world region always yields
/// the same anchor and tiles of it stitch exactly (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalCenter {
	pub reference: (f64, f64),
	pub crs: ProjectedCrs,
	pub origin: (f64, f64),
}

impl GlobalCenter {
	pub fn new(bounds: GeoBounds) -> Result<Self, PipelineError> {
		bounds.validate()?;
		let (lat, lon) = bounds.centroid();
		let crs = ProjectedCrs::utm_for(lat, lon);

		let from = wgs84()?;
		let to = crs.proj()?;
		let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
		transform(&from, &to, &mut point).map_err(|e| PipelineError::InvalidInput {
			stage: Stage::CoordinateFrame,
			reason: format!("failed to project anchor centroid: {e}"),
		})?;

		Ok(Self {
			reference: (lat, lon),
			crs,
			origin: (point.0, point.1),
		})
	}

	/// geographic (lat, lon) -> projected metric (X, Y).
	pub fn to_projected(&self, lat: f64, lon: f64) -> Result<(f64, f64), PipelineError> {
		let from = wgs84()?;
		let to = self.crs.proj()?;
		let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
		transform(&from, &to, &mut point).map_err(|e| PipelineError::InvalidInput {
			stage: Stage::CoordinateFrame,
			reason: format!("failed to project ({lat}, {lon}): {e}"),
		})?;
		Ok((point.0, point.1))
	}

	/// projected metric (X, Y) -> geographic (lat, lon).
	pub fn to_geographic(&self, x: f64, y: f64) -> Result<(f64, f64), PipelineError> {
		let from = self.crs.proj()?;
		let to = wgs84()?;
		let mut point = (x, y, 0.0);
		transform(&from, &to, &mut point).map_err(|e| PipelineError::InvalidInput {
			stage: Stage::CoordinateFrame,
			reason: format!("failed to unproject ({x}, {y}): {e}"),
		})?;
		Ok((point.1.to_degrees(), point.0.to_degrees()))
	}

	/// projected metric (X, Y) -> local metric, centered on the anchor.
	#[inline]
	pub fn to_local(&self, x: f64, y: f64) -> (f64, f64) {
		(x - self.origin.0, y - self.origin.1)
	}

	/// local metric -> projected metric (X, Y).
	#[inline]
	pub fn to_projected_from_local(&self, x: f64, y: f64) -> (f64, f64) {
		(x + self.origin.0, y + self.origin.1)
	}

	/// Convenience: geographic straight to local.
	pub fn geo_to_local(&self, lat: f64, lon: f64) -> Result<(f64, f64), PipelineError> {
		let (x, y) = self.to_projected(lat, lon)?;
		Ok(self.to_local(x, y))
	}

	/// The request bounding box expressed in local coordinates
	/// (minX, minY, maxX, maxY).
	pub fn local_bounds(&self, bounds: GeoBounds) -> Result<(f64, f64, f64, f64), PipelineError> {
		let corners = [
			(bounds.min_lat, bounds.min_lon),
			(bounds.min_lat, bounds.max_lon),
			(bounds.max_lat, bounds.min_lon),
			(bounds.max_lat, bounds.max_lon),
		];
		let mut min_x = f64::INFINITY;
		let mut min_y = f64::INFINITY;
		let mut max_x = f64::NEG_INFINITY;
		let mut max_y = f64::NEG_INFINITY;
		for (lat, lon) in corners {
			let (x, y) = self.geo_to_local(lat, lon)?;
			min_x = min_x.min(x);
			min_y = min_y.min(y);
			max_x = max_x.max(x);
			max_y = max_y.max(y);
		}
		Ok((min_x, min_y, max_x, max_y))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn anchor_is_deterministic_for_same_bounds() {
		let bounds = GeoBounds {
			min_lat: 48.85,
			min_lon: 2.30,
			max_lat: 48.86,
			max_lon: 2.32,
		};
		let a = GlobalCenter::new(bounds).unwrap();
		let b = GlobalCenter::new(bounds).unwrap();
		assert_eq!(a.origin, b.origin);
		assert_eq!(a.crs.epsg, b.crs.epsg);
	}

	#[test]
	fn round_trip_projection_is_close() {
		let bounds = GeoBounds {
			min_lat: 40.70,
			min_lon: -74.02,
			max_lat: 40.72,
			max_lon: -74.00,
		};
		let anchor = GlobalCenter::new(bounds).unwrap();
		let (lat, lon) = (40.71, -74.01);
		let (x, y) = anchor.to_projected(lat, lon).unwrap();
		let (lat2, lon2) = anchor.to_geographic(x, y).unwrap();
		assert!((lat - lat2).abs() < 1e-6);
		assert!((lon - lon2).abs() < 1e-6);
	}

	#[test]
	fn invalid_bounds_rejected() {
		let bounds = GeoBounds {
			min_lat: 10.0,
			min_lon: 10.0,
			max_lat: 5.0,
			max_lon: 20.0,
		};
		assert!(GlobalCenter::new(bounds).is_err());
	}
}
