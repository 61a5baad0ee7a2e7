//! Error kinds for the composition engine (spec §7).
//!
//! Structural failures (height field, solidifier, cancellation) abort the
//! pipeline via `Err(PipelineError)`. Per-feature failures never reach this
//! type directly — they are collected as [`FeatureWarning`]s alongside a
//! best-effort [`crate::mesh::Scene`].

use thiserror::Error;

/// Stage names used to tag errors and warnings, per spec §7's policy that
/// every user-visible failure carries the stage it happened in.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Stage {
	CoordinateFrame,
	HeightField,
	Solidifier,
	Provider,
	Buildings,
	Roads,
	Water,
	Green,
	Poi,
	Assembler,
}

impl std::fmt::Display for Stage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			Stage::CoordinateFrame => "coordinate-frame",
			Stage::HeightField => "height-field",
			Stage::Solidifier => "solidifier",
			Stage::Provider => "provider",
			Stage::Buildings => "buildings",
			Stage::Roads => "roads",
			Stage::Water => "water",
			Stage::Green => "green",
			Stage::Poi => "poi",
			Stage::Assembler => "assembler",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Error)]
pub enum ElevationSampleError {
	#[error("elevation sample at ({lat}, {lon}) failed: {reason}")]
	Failed { lat: f64, lon: f64, reason: String },
	#[error("elevation sample at ({lat}, {lon}) is outside the raster's coverage")]
	OutOfCoverage { lat: f64, lon: f64 },
}

#[derive(Debug, Error)]
pub enum PipelineError {
	#[error("[{stage}] invalid input: {reason}")]
	InvalidInput { stage: Stage, reason: String },

	#[error("[{stage}] elevation sampling failed with no valid neighbor to fall back on: {source}")]
	ElevationSampleError {
		stage: Stage,
		#[source]
		source: ElevationSampleError,
	},

	#[error("[{stage}] height field has no valid samples after fill")]
	EmptyHeightField { stage: Stage },

	#[error("[{stage}] terrain solid failed the watertight check after re-welding")]
	NonWatertightBase { stage: Stage },

	#[error("pipeline cancelled during [{stage}]")]
	Cancelled { stage: Stage },
}

/// A non-fatal, per-feature failure. The feature is dropped; the pipeline
/// continues (spec §7's resilience policy).
#[derive(Debug, Error)]
pub enum FeatureWarning {
	#[error("[{stage}] feature {feature_id} is degenerate and was skipped: {reason}")]
	DegenerateFeature {
		stage: Stage,
		feature_id: String,
		reason: String,
	},

	#[error("[{stage}] geometry operation on feature {feature_id} failed and was skipped: {reason}")]
	InternalGeometryFailure {
		stage: Stage,
		feature_id: String,
		reason: String,
	},

	#[error("[{stage}] elevation sample for feature {feature_id} was recovered by nearest-neighbor fill")]
	ElevationRecovered { stage: Stage, feature_id: String },
}

impl FeatureWarning {
	pub fn log(&self) {
		log::warn!("{self}");
	}
}
