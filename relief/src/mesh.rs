//! The output mesh model (spec §3): indexed triangle fragments tagged with
//! a material, concatenated by the assembler into a [`Scene`].

use crate::units::Vec3;

/// The tagged variant carried by every fragment. Placement parameters live
/// on the processor that produced the fragment, not here — per spec §9,
/// the assembler only switches on this tag to pick a default color.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Material {
	Base,
	Road,
	Bridge,
	Building,
	Water,
	Green,
	Poi,
}

impl Material {
	/// The default RGB color applied when a fragment doesn't carry its own
	/// (spec §4.4, §4.5, §4.6, §4.7, §4.8).
	pub fn default_color(self) -> [u8; 3] {
		match self {
			Material::Base => [150, 140, 120],
			Material::Road | Material::Bridge => [30, 30, 30],
			Material::Building => [180, 180, 180],
			Material::Water => [0, 100, 255],
			Material::Green => [90, 140, 80],
			Material::Poi => [220, 180, 60],
		}
	}
}

/// An indexed triangle mesh with CCW-outward-normal winding.
#[derive(Debug, Clone)]
pub struct MeshFragment {
	pub vertices: Vec<Vec3>,
	/// Each entry is three indices into `vertices`.
	pub faces: Vec<[u32; 3]>,
	pub color: Option<[u8; 3]>,
	pub material: Material,
	/// A stable identifier for error/warning reporting; empty for
	/// synthetic fragments (the terrain base).
	pub source_id: String,
}

impl MeshFragment {
	pub fn new(material: Material, source_id: impl Into<String>) -> Self {
		Self {
			vertices: Vec::new(),
			faces: Vec::new(),
			color: None,
			material,
			source_id: source_id.into(),
		}
	}

	pub fn with_color(mut self, color: [u8; 3]) -> Self {
		self.color = Some(color);
		self
	}

	pub fn is_empty(&self) -> bool {
		self.faces.is_empty()
	}

	pub fn translate_z(&mut self, dz: f64) {
		for v in &mut self.vertices {
			v.z += dz;
		}
	}

	pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
		let mut iter = self.vertices.iter();
		let first = *iter.next()?;
		let mut min = first;
		let mut max = first;
		for &v in iter {
			min = min.min(v);
			max = max.max(v);
		}
		Some((min, max))
	}

	/// Every edge of the mesh, as an incidence count keyed by its
	/// (unordered) endpoint indices. Used by the solidifier's watertight
	/// check and reused directly by tests asserting the same invariant.
	pub fn edge_incidence(&self) -> std::collections::HashMap<(u32, u32), u32> {
		let mut counts = std::collections::HashMap::new();
		for face in &self.faces {
			for k in 0..3 {
				let a = face[k];
				let b = face[(k + 1) % 3];
				let key = if a < b { (a, b) } else { (b, a) };
				*counts.entry(key).or_insert(0) += 1;
			}
		}
		counts
	}

	pub fn is_watertight(&self) -> bool {
		self.edge_incidence().values().all(|&count| count == 2)
	}
}

/// An ordered collection of mesh fragments, material-tagged, ready for an
/// external exporter. Insertion order follows spec §5's ordering
/// guarantee: base, roads (incl. bridges/supports), buildings, water,
/// green, poi.
#[derive(Debug, Clone, Default)]
pub struct Scene {
	pub fragments: Vec<MeshFragment>,
}

impl Scene {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, fragment: MeshFragment) {
		if !fragment.is_empty() {
			self.fragments.push(fragment);
		}
	}

	pub fn extend(&mut self, fragments: impl IntoIterator<Item = MeshFragment>) {
		for f in fragments {
			self.push(f);
		}
	}

	pub fn vertex_count(&self) -> usize {
		self.fragments.iter().map(|f| f.vertices.len()).sum()
	}

	pub fn face_count(&self) -> usize {
		self.fragments.iter().map(|f| f.faces.len()).sum()
	}

	pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
		self.fragments
			.iter()
			.filter_map(|f| f.bounds())
			.reduce(|(amin, amax), (bmin, bmax)| (amin.min(bmin), amax.max(bmax)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn triangle(material: Material) -> MeshFragment {
		let mut m = MeshFragment::new(material, "t");
		m.vertices = vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
		m.faces = vec![[0, 1, 2]];
		m
	}

	#[test]
	fn empty_fragment_is_not_pushed() {
		let mut scene = Scene::new();
		scene.push(MeshFragment::new(Material::Road, "empty"));
		assert_eq!(scene.fragments.len(), 0);
	}

	#[test]
	fn single_triangle_is_not_watertight() {
		assert!(!triangle(Material::Base).is_watertight());
	}

	#[test]
	fn tetrahedron_is_watertight() {
		let mut m = MeshFragment::new(Material::Base, "tet");
		m.vertices = vec![
			Vec3::new(0.0, 0.0, 0.0),
			Vec3::new(1.0, 0.0, 0.0),
			Vec3::new(0.0, 1.0, 0.0),
			Vec3::new(0.0, 0.0, 1.0),
		];
		m.faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
		assert!(m.is_watertight());
	}
}
