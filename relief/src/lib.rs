//! A composition engine that turns a geographic bounding box, OSM-like
//! vector features, and a DEM elevation source into a single watertight,
//! 3D-printable scene.
//!
//! The pipeline (see [`pipeline::run`]) moves through the stages laid out
//! in the module list below, in order, always against one immutable
//! [`anchor::GlobalCenter`] per world region.

pub mod anchor;
pub mod assembler;
pub mod config;
pub mod error;
pub mod features;
pub mod height_field;
pub mod mesh;
pub mod pipeline;
pub mod provider;
pub mod solidify;
pub mod units;

#[cfg(feature = "raster")]
pub mod raster;

pub use anchor::{GeoBounds, GlobalCenter};
pub use config::Parameters;
pub use error::{FeatureWarning, PipelineError};
pub use mesh::{Material, MeshFragment, Scene};
pub use pipeline::{run, CancellationToken, PipelineInput, PipelineOutput};
