//! On-disk feature input format: a single JSON document grouping building,
//! road, water, green, and POI records in projected metric coordinates,
//! plus a DEM raster path. The wire format is this crate's concern, not
//! the core library's (spec §6: "the core consumes and produces by
//! interface, not by file format").

use std::path::Path;

use geo::{LineString, Polygon};
use relief::features::{LineFeature, Poi, PolygonFeature, RoadClass, Tags};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct FeatureSet {
	#[serde(default)]
	pub buildings: Vec<RawBuilding>,
	#[serde(default)]
	pub roads: Vec<RawRoad>,
	#[serde(default)]
	pub water: Vec<RawPolygon>,
	#[serde(default)]
	pub green: Vec<RawPolygon>,
	#[serde(default)]
	pub pois: Vec<RawPoi>,
}

#[derive(Debug, Deserialize)]
pub struct RawBuilding {
	pub id: String,
	pub ring: Vec<[f64; 2]>,
	#[serde(default)]
	pub height_m: Option<f64>,
	#[serde(default)]
	pub tags: Tags,
}

#[derive(Debug, Deserialize)]
pub struct RawPolygon {
	pub id: String,
	pub ring: Vec<[f64; 2]>,
	#[serde(default)]
	pub tags: Tags,
}

#[derive(Debug, Deserialize)]
pub struct RawRoad {
	pub id: String,
	pub line: Vec<[f64; 2]>,
	pub class: String,
	#[serde(default)]
	pub bridge: bool,
	#[serde(default)]
	pub tags: Tags,
}

#[derive(Debug, Deserialize)]
pub struct RawPoi {
	pub id: String,
	pub x: f64,
	pub y: f64,
	#[serde(default)]
	pub class_priority: i32,
}

fn ring_to_polygon(ring: &[[f64; 2]]) -> Polygon<f64> {
	Polygon::new(LineString::from(ring.iter().map(|p| (p[0], p[1])).collect::<Vec<_>>()), Vec::new())
}

fn class_from_str(class: &str) -> RoadClass {
	match class {
		"motorway" => RoadClass::Motorway,
		"primary" => RoadClass::Primary,
		"secondary" => RoadClass::Secondary,
		"residential" => RoadClass::Residential,
		"path" => RoadClass::Path,
		"suspension" => RoadClass::Suspension,
		"arch" => RoadClass::Arch,
		"beam" => RoadClass::Beam,
		_ => RoadClass::Residential,
	}
}

impl FeatureSet {
	pub fn load(path: &Path) -> anyhow::Result<Self> {
		let contents = std::fs::read_to_string(path)?;
		Ok(serde_json::from_str(&contents)?)
	}

	pub fn into_buildings(buildings: Vec<RawBuilding>) -> Vec<PolygonFeature> {
		buildings
			.into_iter()
			.map(|b| {
				let polygon = ring_to_polygon(&b.ring);
				let mut feature = PolygonFeature::new(b.id, polygon, relief::features::FeatureMaterial::Building).with_tags(b.tags);
				if let Some(h) = b.height_m {
					feature = feature.with_height_m(h);
				}
				feature
			})
			.collect()
	}

	pub fn into_water(polygons: Vec<RawPolygon>) -> Vec<PolygonFeature> {
		polygons
			.into_iter()
			.map(|p| PolygonFeature::new(p.id, ring_to_polygon(&p.ring), relief::features::FeatureMaterial::Water).with_tags(p.tags))
			.collect()
	}

	pub fn into_green(polygons: Vec<RawPolygon>) -> Vec<PolygonFeature> {
		polygons
			.into_iter()
			.map(|p| PolygonFeature::new(p.id, ring_to_polygon(&p.ring), relief::features::FeatureMaterial::Green).with_tags(p.tags))
			.collect()
	}

	pub fn into_roads(roads: Vec<RawRoad>) -> Vec<LineFeature> {
		roads
			.into_iter()
			.map(|r| {
				let line = LineString::from(r.line.iter().map(|p| (p[0], p[1])).collect::<Vec<_>>());
				let mut feature = LineFeature::new(r.id, line, class_from_str(&r.class)).with_tags(r.tags);
				if r.bridge {
					feature = feature.as_bridge();
				}
				feature
			})
			.collect()
	}

	pub fn into_pois(pois: Vec<RawPoi>) -> Vec<Poi> {
		pois.into_iter().map(|p| Poi::new(p.id, p.x, p.y).with_class_priority(p.class_priority)).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_minimal_feature_set() {
		let json = r#"{
			"buildings": [{"id": "b1", "ring": [[0,0],[10,0],[10,10],[0,10]], "height_m": 12.0}],
			"roads": [{"id": "r1", "line": [[0,0],[50,0]], "class": "residential", "bridge": false}]
		}"#;
		let set: FeatureSet = serde_json::from_str(json).unwrap();
		assert_eq!(set.buildings.len(), 1);
		assert_eq!(set.roads.len(), 1);
		assert!(set.water.is_empty());
	}

	#[test]
	fn unknown_road_class_falls_back_to_residential() {
		assert_eq!(class_from_str("made-up"), RoadClass::Residential);
	}
}
