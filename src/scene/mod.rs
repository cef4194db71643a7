//! In-memory scene engine driven by the executor.
//!
//! [`Scene`] is deliberately `!Send`: it is created on the executor thread and
//! never leaves it, so every mutation happens on that one thread.

pub mod export;
pub mod preview;

use indexmap::IndexMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

pub use export::ExportFormat;

/// Errors raised by the scene engine.
#[derive(Debug, Error)]
pub enum SceneError {
    /// A file name contained path components or was empty.
    #[error("invalid file name '{0}'")]
    InvalidFilename(String),

    /// Writing an artifact failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Target path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The glTF document could not be encoded.
    #[error("failed to encode glTF: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Primitive kind an object was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Unit cube scaled to size.
    Box,
    /// Cylinder along the Z axis.
    Cylinder,
}

impl ObjectKind {
    /// Lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Box => "box",
            Self::Cylinder => "cylinder",
        }
    }
}

/// A polygon mesh in object space.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Vertex positions.
    pub vertices: Vec<[f64; 3]>,
    /// Faces as vertex index loops.
    pub faces: Vec<Vec<usize>>,
}

impl Mesh {
    /// Unit cube centred on the origin.
    pub fn cube() -> Self {
        let mut vertices = Vec::with_capacity(8);
        for &x in &[-0.5, 0.5] {
            for &y in &[-0.5, 0.5] {
                for &z in &[-0.5, 0.5] {
                    vertices.push([x, y, z]);
                }
            }
        }
        // index = 4x + 2y + z
        let faces = vec![
            vec![0, 1, 3, 2],
            vec![4, 6, 7, 5],
            vec![0, 4, 5, 1],
            vec![2, 3, 7, 6],
            vec![0, 2, 6, 4],
            vec![1, 5, 7, 3],
        ];
        Self { vertices, faces }
    }

    /// Cylinder of the given radius and depth, centred on the origin.
    pub fn cylinder(radius: f64, depth: f64, segments: usize) -> Self {
        let segments = segments.max(3);
        let half = depth / 2.0;
        let mut vertices = Vec::with_capacity(segments * 2);
        for i in 0..segments {
            let angle = std::f64::consts::TAU * i as f64 / segments as f64;
            let (s, c) = angle.sin_cos();
            vertices.push([radius * c, radius * s, -half]);
            vertices.push([radius * c, radius * s, half]);
        }
        let mut faces = Vec::with_capacity(segments + 2);
        for i in 0..segments {
            let j = (i + 1) % segments;
            faces.push(vec![2 * i, 2 * j, 2 * j + 1, 2 * i + 1]);
        }
        faces.push((0..segments).rev().map(|i| 2 * i).collect());
        faces.push((0..segments).map(|i| 2 * i + 1).collect());
        Self { vertices, faces }
    }

    /// Fan-triangulated face indices.
    pub fn triangles(&self) -> Vec<[usize; 3]> {
        self.faces
            .iter()
            .filter(|face| face.len() >= 3)
            .flat_map(|face| (1..face.len() - 1).map(move |i| [face[0], face[i], face[i + 1]]))
            .collect()
    }
}

/// A boolean modifier applied to an object.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanModifier {
    /// Name of the cutter object at the time it was applied.
    pub cutter: String,
    /// Cutter mesh in world space.
    pub cutter_vertices: Vec<[f64; 3]>,
}

/// An object placed in the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    /// Unique name.
    pub name: String,
    /// Primitive it was created from.
    pub kind: ObjectKind,
    /// Object-space mesh.
    pub mesh: Mesh,
    /// Translation.
    pub location: [f64; 3],
    /// Euler XYZ rotation in radians.
    pub rotation: [f64; 3],
    /// Per-axis scale.
    pub scale: [f64; 3],
    /// Applied boolean differences.
    pub modifiers: Vec<BooleanModifier>,
}

impl SceneObject {
    fn new(name: String, kind: ObjectKind, mesh: Mesh, location: [f64; 3]) -> Self {
        Self {
            name,
            kind,
            mesh,
            location,
            rotation: [0.0; 3],
            scale: [1.0; 3],
            modifiers: Vec::new(),
        }
    }

    /// Mesh vertices transformed to world space (scale, rotate XYZ, translate).
    pub fn world_vertices(&self) -> Vec<[f64; 3]> {
        let [rx, ry, rz] = self.rotation;
        let (sx, cx) = rx.sin_cos();
        let (sy, cy) = ry.sin_cos();
        let (sz, cz) = rz.sin_cos();
        self.mesh
            .vertices
            .iter()
            .map(|v| {
                let (x, y, z) = (v[0] * self.scale[0], v[1] * self.scale[1], v[2] * self.scale[2]);
                let (y, z) = (y * cx - z * sx, y * sx + z * cx);
                let (x, z) = (x * cy + z * sy, -x * sy + z * cy);
                let (x, y) = (x * cz - y * sz, x * sz + y * cz);
                [
                    x + self.location[0],
                    y + self.location[1],
                    z + self.location[2],
                ]
            })
            .collect()
    }
}

/// The mutable scene owned by the executor.
#[derive(Debug)]
pub struct Scene {
    objects: IndexMap<String, SceneObject>,
    active: Option<String>,
    output_dir: PathBuf,
    preview_size: u32,
    _thread_bound: PhantomData<Rc<()>>,
}

impl Scene {
    /// Create an empty scene writing artifacts under `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>, preview_size: u32) -> Self {
        Self {
            objects: IndexMap::new(),
            active: None,
            output_dir: output_dir.into(),
            preview_size,
            _thread_bound: PhantomData,
        }
    }

    /// Remove every object.
    pub fn reset(&mut self) {
        self.objects.clear();
        self.active = None;
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the scene holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in creation order.
    pub fn objects(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.values()
    }

    /// Look up an object by name.
    pub fn get(&self, name: &str) -> Option<&SceneObject> {
        self.objects.get(name)
    }

    /// Look up an object by name for mutation.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut SceneObject> {
        self.objects.get_mut(name)
    }

    /// Name of the most recently added object still in the scene.
    pub fn active_object(&self) -> Option<&str> {
        self.active
            .as_deref()
            .filter(|name| self.objects.contains_key(*name))
    }

    /// Directory artifacts are written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Edge length of rendered previews in pixels.
    pub fn preview_size(&self) -> u32 {
        self.preview_size
    }

    /// Add a box with the given dimensions; returns the final name.
    pub fn add_box(&mut self, name: &str, size: [f64; 3], location: [f64; 3]) -> String {
        let mut object =
            SceneObject::new(self.unique_name(name), ObjectKind::Box, Mesh::cube(), location);
        object.scale = size;
        self.insert(object)
    }

    /// Add a cylinder; returns the final name.
    pub fn add_cylinder(
        &mut self,
        name: &str,
        radius: f64,
        depth: f64,
        location: [f64; 3],
    ) -> String {
        let object = SceneObject::new(
            self.unique_name(name),
            ObjectKind::Cylinder,
            Mesh::cylinder(radius, depth, 32),
            location,
        );
        self.insert(object)
    }

    fn insert(&mut self, object: SceneObject) -> String {
        let name = object.name.clone();
        tracing::debug!(
            target: "bridge.scene",
            object = %name,
            kind = object.kind.as_str(),
            "object added"
        );
        self.objects.insert(name.clone(), object);
        self.active = Some(name.clone());
        name
    }

    /// Apply `target - cutter` and delete the cutter.
    ///
    /// Returns `false` when either object is missing. The modifier is
    /// recorded on the target; mesh-level CSG is not evaluated.
    pub fn boolean_difference(&mut self, target: &str, cutter: &str) -> bool {
        if target == cutter || !self.objects.contains_key(target) {
            return false;
        }
        let Some(cutter_obj) = self.objects.shift_remove(cutter) else {
            return false;
        };
        let modifier = BooleanModifier {
            cutter: cutter_obj.name.clone(),
            cutter_vertices: cutter_obj.world_vertices(),
        };
        if let Some(target_obj) = self.objects.get_mut(target) {
            target_obj.modifiers.push(modifier);
        }
        self.active = Some(target.to_string());
        true
    }

    /// Return `base` or the first free `base.NNN` variant.
    pub fn unique_name(&self, base: &str) -> String {
        if !self.objects.contains_key(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}.{n:03}"))
            .find(|candidate| !self.objects.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Resolve a bare file name inside the output directory.
    pub fn output_path(&self, filename: &str) -> Result<PathBuf, SceneError> {
        let valid = !filename.is_empty()
            && filename != "."
            && filename != ".."
            && !filename.contains(['/', '\\'])
            && !filename.contains('\0');
        if !valid {
            return Err(SceneError::InvalidFilename(filename.to_string()));
        }
        Ok(self.output_dir.join(filename))
    }

    /// Export the scene to `filename`, picking the format from the extension.
    pub fn export(&self, filename: &str) -> Result<PathBuf, SceneError> {
        let format = ExportFormat::from_filename(filename);
        self.export_as(filename, format)
    }

    /// Export the scene to `filename` in `format`.
    pub fn export_as(&self, filename: &str, format: ExportFormat) -> Result<PathBuf, SceneError> {
        let path = self.output_path(filename)?;
        let contents = format.encode(self)?;
        write_artifact(&path, contents.as_bytes())?;
        tracing::info!(
            target: "bridge.scene",
            path = %path.display(),
            format = format.extension(),
            "scene exported"
        );
        Ok(path)
    }

    /// Render an SVG preview. A non-`.svg` extension is replaced.
    pub fn render_preview(&self, filename: &str) -> Result<PathBuf, SceneError> {
        let filename = preview::preview_filename(filename);
        let path = self.output_path(&filename)?;
        let svg = preview::render_svg(self, self.preview_size);
        write_artifact(&path, svg.as_bytes())?;
        tracing::info!(target: "bridge.scene", path = %path.display(), "preview rendered");
        Ok(path)
    }
}

fn write_artifact(path: &Path, contents: &[u8]) -> Result<(), SceneError> {
    let io_err = |source| SceneError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, contents).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> Scene {
        Scene::new(std::env::temp_dir(), 256)
    }

    #[test]
    fn duplicate_names_get_suffixes() {
        let mut scene = scene();
        assert_eq!(scene.add_box("B", [1.0; 3], [0.0; 3]), "B");
        assert_eq!(scene.add_box("B", [1.0; 3], [0.0; 3]), "B.001");
        assert_eq!(scene.add_cylinder("B", 0.5, 1.0, [0.0; 3]), "B.002");
        assert_eq!(scene.len(), 3);
        assert_eq!(scene.active_object(), Some("B.002"));
    }

    #[test]
    fn box_world_vertices_follow_size_and_location() {
        let mut scene = scene();
        let name = scene.add_box("B", [2.0, 4.0, 6.0], [10.0, 0.0, 0.0]);
        let verts = scene.get(&name).unwrap().world_vertices();
        let max_x = verts.iter().map(|v| v[0]).fold(f64::MIN, f64::max);
        let max_z = verts.iter().map(|v| v[2]).fold(f64::MIN, f64::max);
        assert!((max_x - 11.0).abs() < 1e-9);
        assert!((max_z - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rotation_about_z_swaps_axes() {
        let mut scene = scene();
        let name = scene.add_box("B", [2.0, 1.0, 1.0], [0.0; 3]);
        scene.get_mut(&name).unwrap().rotation = [0.0, 0.0, std::f64::consts::FRAC_PI_2];
        let verts = scene.get(&name).unwrap().world_vertices();
        let max_y = verts.iter().map(|v| v[1]).fold(f64::MIN, f64::max);
        assert!((max_y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn boolean_difference_removes_cutter() {
        let mut scene = scene();
        scene.add_box("T", [2.0; 3], [0.0; 3]);
        scene.add_cylinder("C", 0.3, 3.0, [0.0; 3]);
        assert!(scene.boolean_difference("T", "C"));
        assert!(scene.get("C").is_none());
        assert_eq!(scene.get("T").unwrap().modifiers.len(), 1);
        assert!(!scene.boolean_difference("T", "C"));
        assert!(!scene.boolean_difference("T", "T"));
    }

    #[test]
    fn output_path_rejects_traversal() {
        let scene = scene();
        assert!(scene.output_path("model.obj").is_ok());
        for bad in ["", "..", "../x.obj", "a/b.obj", "a\\b.obj"] {
            assert!(scene.output_path(bad).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn cylinder_triangulation_counts() {
        let mesh = Mesh::cylinder(1.0, 2.0, 8);
        assert_eq!(mesh.vertices.len(), 16);
        // 8 side quads -> 16 triangles, two octagon caps -> 6 each
        assert_eq!(mesh.triangles().len(), 28);
    }
}
