//! Pipeline parameters (spec §6): every recognized tuning knob, with the
//! defaults and clamps spec.md names, collected under one validated struct.

use serde::{Deserialize, Serialize};

use crate::{
	error::{PipelineError, Stage},
	features::{BuildingParams, GreenParams, PoiParams, RoadParams, WaterParams},
	height_field::BuildParams,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenParams {
	pub buildings: bool,
	pub roads: bool,
	pub road_quantile: f64,
}

impl Default for FlattenParams {
	fn default() -> Self {
		Self {
			buildings: true,
			roads: false,
			road_quantile: 0.50,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterPipelineParams {
	pub depth_m: f64,
	pub thickness_m: f64,
	pub protrusion_m: f64,
	pub surface_quantile: f64,
}

impl Default for WaterPipelineParams {
	fn default() -> Self {
		Self {
			depth_m: 1.0,
			thickness_m: 0.5,
			protrusion_m: 0.0,
			surface_quantile: 0.10,
		}
	}
}

/// The full set of recognized parameters (spec §6). Not `serde(deny_unknown_fields)`:
/// forward-compatible with future fields a caller's config file may carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
	pub resolution: u32,
	pub z_scale: f64,
	pub smoothing_sigma: f64,
	pub elevation_ref_m: f64,
	pub base_thickness_mm: f64,
	pub subdivision_levels: u8,
	pub model_size_mm: f64,

	pub flatten: FlattenParams,
	pub water: WaterPipelineParams,
	pub building: BuildingDefaults,
	pub road: RoadDefaults,
	pub green: GreenDefaults,
	pub poi: PoiDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingDefaults {
	pub min_height_m: f64,
	pub height_multiplier: f64,
	pub foundation_mm: f64,
	pub embed_mm: f64,
	pub safety_margin_m: f64,
}

impl Default for BuildingDefaults {
	fn default() -> Self {
		let p = BuildingParams::default();
		Self {
			min_height_m: p.min_height_m,
			height_multiplier: p.height_multiplier,
			foundation_mm: p.foundation_mm,
			embed_mm: p.embed_mm,
			safety_margin_m: p.safety_margin_m,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadDefaults {
	pub width_multiplier: f64,
	pub height_mm: f64,
	pub embed_mm: f64,
}

impl Default for RoadDefaults {
	fn default() -> Self {
		let p = RoadParams::default();
		Self {
			width_multiplier: p.width_multiplier,
			height_mm: p.height_mm,
			embed_mm: p.embed_mm,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreenDefaults {
	pub height_m: f64,
	pub embed_m: f64,
}

impl Default for GreenDefaults {
	fn default() -> Self {
		let p = GreenParams::default();
		Self {
			height_m: p.height_m,
			embed_m: p.embed_m,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoiDefaults {
	pub height_m: f64,
	pub embed_m: f64,
	pub max: usize,
}

impl Default for PoiDefaults {
	fn default() -> Self {
		let p = PoiParams::default();
		Self {
			height_m: p.height_m,
			embed_m: p.embed_m,
			max: p.n_max,
		}
	}
}

impl Default for Parameters {
	fn default() -> Self {
		let build = BuildParams::default();
		Self {
			resolution: build.resolution,
			z_scale: build.z_scale,
			smoothing_sigma: build.smoothing_sigma.unwrap_or(2.0),
			elevation_ref_m: build.elevation_ref_m,
			base_thickness_mm: 2.0,
			subdivision_levels: 0,
			model_size_mm: 100.0,
			flatten: FlattenParams::default(),
			water: WaterPipelineParams::default(),
			building: BuildingDefaults::default(),
			road: RoadDefaults::default(),
			green: GreenDefaults::default(),
			poi: PoiDefaults::default(),
		}
	}
}

impl Parameters {
	pub fn validate(&self) -> Result<(), PipelineError> {
		if self.subdivision_levels > 2 {
			return Err(PipelineError::InvalidInput {
				stage: Stage::Solidifier,
				reason: format!("subdivision_levels {} exceeds the maximum of 2", self.subdivision_levels),
			});
		}
		if self.model_size_mm <= 0.0 {
			return Err(PipelineError::InvalidInput {
				stage: Stage::Assembler,
				reason: "model_size_mm must be positive".into(),
			});
		}
		Ok(())
	}

	pub fn to_build_params(&self) -> BuildParams {
		BuildParams {
			resolution: self.resolution.clamp(60, 320),
			elevation_ref_m: self.elevation_ref_m,
			z_scale: self.z_scale,
			smoothing_sigma: if self.smoothing_sigma > 0.0 { Some(self.smoothing_sigma) } else { None },
		}
	}

	pub fn to_building_params(&self) -> BuildingParams {
		BuildingParams {
			min_height_m: self.building.min_height_m,
			height_multiplier: self.building.height_multiplier,
			foundation_mm: self.building.foundation_mm,
			embed_mm: self.building.embed_mm,
			safety_margin_m: self.building.safety_margin_m,
			color: None,
		}
	}

	pub fn to_road_params(&self) -> RoadParams {
		RoadParams {
			width_multiplier: self.road.width_multiplier,
			height_mm: self.road.height_mm,
			embed_mm: self.road.embed_mm,
			color: None,
		}
	}

	pub fn to_water_params(&self) -> WaterParams {
		WaterParams {
			thickness_m: self.water.thickness_m,
			protrusion_m: self.water.protrusion_m,
			color: None,
		}
	}

	pub fn to_green_params(&self) -> GreenParams {
		GreenParams {
			height_m: self.green.height_m,
			embed_m: self.green.embed_m,
			color: None,
		}
	}

	pub fn to_poi_params(&self) -> PoiParams {
		PoiParams {
			height_m: self.poi.height_m,
			embed_m: self.poi.embed_m,
			n_max: self.poi.max,
			footprint_m: 0.002,
			color: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_parameters_validate() {
		assert!(Parameters::default().validate().is_ok());
	}

	#[test]
	fn resolution_out_of_range_is_clamped_not_rejected() {
		let mut params = Parameters::default();
		params.resolution = 10;
		assert!(params.validate().is_ok());
		assert_eq!(params.to_build_params().resolution, 60);

		params.resolution = 1000;
		assert!(params.validate().is_ok());
		assert_eq!(params.to_build_params().resolution, 320);
	}

	#[test]
	fn subdivision_levels_above_two_is_rejected() {
		let mut params = Parameters::default();
		params.subdivision_levels = 3;
		assert!(params.validate().is_err());
	}
}
