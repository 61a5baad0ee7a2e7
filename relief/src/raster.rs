//! A DEM raster-backed [`ElevationSampler`] (spec §4.10, §6), gated behind
//! the `raster` feature. Grounded on the teacher's `geoc::source::Raster`:
//! one `gdal::Dataset` handle per thread via `ThreadLocal`, since GDAL
//! dataset handles are not `Sync`.

use std::path::{Path, PathBuf};

use gdal::{errors::GdalError, raster::ResampleAlg, Dataset};
use thread_local::ThreadLocal;

use crate::error::ElevationSampleError;

struct Transform([f64; 6]);

impl Transform {
	fn to_image(&self, lat: f64, lon: f64) -> (f64, f64) {
		((lon - self.0[0]) / self.0[1], (lat - self.0[3]) / self.0[5])
	}
}

/// A single-band GDAL raster sampled at arbitrary lat/lon via nearest
/// resampling, one open handle per worker thread.
pub struct RasterSampler {
	path: PathBuf,
	set: ThreadLocal<Dataset>,
	transform: Transform,
}

impl RasterSampler {
	pub fn load(path: &Path) -> Result<Self, GdalError> {
		let dataset = Dataset::open(path)?;
		let transform = dataset.geo_transform()?;

		assert_eq!(transform[2], 0.0, "row rotation must be 0");
		assert_eq!(transform[4], 0.0, "column rotation must be 0");
		assert!(transform[5] <= 0.0, "y scale must be negative");

		let set = ThreadLocal::new();
		set.get_or(|| dataset);

		Ok(Self {
			path: path.to_path_buf(),
			set,
			transform: Transform(transform),
		})
	}

	fn dataset(&self) -> &Dataset {
		self.set.get_or(|| Dataset::open(&self.path).expect("failed to reopen raster dataset on worker thread"))
	}
}

impl crate::height_field::ElevationSampler for RasterSampler {
	fn sample(&self, lat: f64, lon: f64) -> Result<f64, ElevationSampleError> {
		let set = self.dataset();
		let (x, y) = self.transform.to_image(lat, lon);
		let (w, h) = set.raster_size();
		let (xi, yi) = (x.floor() as isize, y.floor() as isize);
		if xi < 0 || yi < 0 || xi >= w as isize || yi >= h as isize {
			return Err(ElevationSampleError::OutOfCoverage { lat, lon });
		}

		let band = set.rasterband(1).map_err(|e| ElevationSampleError::Failed {
			lat,
			lon,
			reason: e.to_string(),
		})?;
		let buf = band
			.read_as::<f64>((xi, yi), (1, 1), (1, 1), Some(ResampleAlg::NearestNeighbour))
			.map_err(|e| ElevationSampleError::Failed {
				lat,
				lon,
				reason: e.to_string(),
			})?;
		buf.data.first().copied().ok_or_else(|| ElevationSampleError::Failed {
			lat,
			lon,
			reason: "raster read returned no data".into(),
		})
	}

	fn max_concurrency(&self) -> usize {
		rayon::current_num_threads()
	}
}
