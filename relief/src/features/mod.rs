//! Feature inputs (spec §3) and the per-feature processors (spec §4.4-§4.8).

mod building;
mod green;
mod poi;
mod road;
mod water;

pub use building::{process_buildings, BuildingParams};
pub use green::{process_green, GreenParams};
pub use poi::{process_poi, Poi, PoiParams};
pub use road::{process_roads, RoadClass, RoadParams};
pub use water::{process_water, WaterParams};

use std::collections::BTreeMap;

use geo::{LineString, Polygon};

/// Freeform OSM-like tags, kept in a `BTreeMap` for deterministic
/// iteration order (needed for the "input-stable" ordering guarantee of
/// spec §5 when tags drive tie-breaking).
pub type Tags = BTreeMap<String, String>;

/// The material a polygon feature belongs to (spec §3).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FeatureMaterial {
	Building,
	Water,
	Green,
	Park,
	Road,
	Bridge,
	Poi,
	Base,
}

/// A planar polygon feature in local coordinates (spec §3).
#[derive(Debug, Clone)]
pub struct PolygonFeature {
	pub id: String,
	pub polygon: Polygon<f64>,
	pub tags: Tags,
	pub height_m: Option<f64>,
	pub material: FeatureMaterial,
}

impl PolygonFeature {
	pub fn new(id: impl Into<String>, polygon: Polygon<f64>, material: FeatureMaterial) -> Self {
		Self {
			id: id.into(),
			polygon,
			tags: Tags::new(),
			height_m: None,
			material,
		}
	}

	pub fn with_tags(mut self, tags: Tags) -> Self {
		self.tags = tags;
		self
	}

	pub fn with_height_m(mut self, height_m: f64) -> Self {
		self.height_m = Some(height_m);
		self
	}
}

/// An ordered linestring feature in local coordinates (spec §3).
#[derive(Debug, Clone)]
pub struct LineFeature {
	pub id: String,
	pub line: LineString<f64>,
	pub tags: Tags,
	pub road_class: RoadClass,
	pub bridge_tag: bool,
}

impl LineFeature {
	pub fn new(id: impl Into<String>, line: LineString<f64>, road_class: RoadClass) -> Self {
		Self {
			id: id.into(),
			line,
			tags: Tags::new(),
			road_class,
			bridge_tag: false,
		}
	}

	pub fn with_tags(mut self, tags: Tags) -> Self {
		self.tags = tags;
		self
	}

	pub fn as_bridge(mut self) -> Self {
		self.bridge_tag = true;
		self
	}
}
