//! Model exporters: Wavefront OBJ and glTF 2.0.
//!
//! Both formats write world-space geometry. glTF output embeds its single
//! binary buffer as a base64 data URI so each export is one file.

use base64::Engine;
use serde_json::{json, Value};
use std::fmt::Write;

use super::{Scene, SceneError};

const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;
const FLOAT: u32 = 5126;
const UNSIGNED_INT: u32 = 5125;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Wavefront OBJ.
    Obj,
    /// glTF 2.0 JSON with embedded buffer.
    Gltf,
}

impl ExportFormat {
    /// Formats attempted after every successful script, in order.
    pub const ALL: [ExportFormat; 2] = [ExportFormat::Gltf, ExportFormat::Obj];

    /// Pick a format from a file name; anything but `.gltf` is OBJ.
    pub fn from_filename(filename: &str) -> Self {
        if filename.to_ascii_lowercase().ends_with(".gltf") {
            Self::Gltf
        } else {
            Self::Obj
        }
    }

    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Obj => "obj",
            Self::Gltf => "gltf",
        }
    }

    /// Encode the scene in this format.
    pub fn encode(&self, scene: &Scene) -> Result<String, SceneError> {
        match self {
            Self::Obj => Ok(to_obj(scene)),
            Self::Gltf => Ok(serde_json::to_string_pretty(&to_gltf(scene))?),
        }
    }
}

/// Render the scene as OBJ text.
pub fn to_obj(scene: &Scene) -> String {
    let mut out = String::from("# scene-bridge OBJ export\n");
    let mut base = 1usize;
    for object in scene.objects() {
        let vertices = object.world_vertices();
        let _ = writeln!(out, "o {}", object.name);
        for v in &vertices {
            let _ = writeln!(out, "v {:.6} {:.6} {:.6}", v[0], v[1], v[2]);
        }
        for face in &object.mesh.faces {
            let indices: Vec<String> = face.iter().map(|i| (i + base).to_string()).collect();
            let _ = writeln!(out, "f {}", indices.join(" "));
        }
        base += vertices.len();
    }
    out
}

/// Build the glTF document for the scene.
pub fn to_gltf(scene: &Scene) -> Value {
    let mut buffer: Vec<u8> = Vec::new();
    let mut nodes = Vec::new();
    let mut meshes = Vec::new();
    let mut accessors = Vec::new();
    let mut buffer_views = Vec::new();

    for (index, object) in scene.objects().enumerate() {
        let vertices = object.world_vertices();
        let triangles = object.mesh.triangles();

        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        let position_offset = buffer.len();
        for v in &vertices {
            for axis in 0..3 {
                let c = v[axis] as f32;
                min[axis] = min[axis].min(c);
                max[axis] = max[axis].max(c);
                buffer.extend_from_slice(&c.to_le_bytes());
            }
        }
        let position_len = buffer.len() - position_offset;

        let index_offset = buffer.len();
        for tri in &triangles {
            for &i in tri {
                buffer.extend_from_slice(&(i as u32).to_le_bytes());
            }
        }
        let index_len = buffer.len() - index_offset;

        let position_view = buffer_views.len();
        buffer_views.push(json!({
            "buffer": 0,
            "byteOffset": position_offset,
            "byteLength": position_len,
            "target": ARRAY_BUFFER
        }));
        buffer_views.push(json!({
            "buffer": 0,
            "byteOffset": index_offset,
            "byteLength": index_len,
            "target": ELEMENT_ARRAY_BUFFER
        }));

        let position_accessor = accessors.len();
        accessors.push(json!({
            "bufferView": position_view,
            "componentType": FLOAT,
            "count": vertices.len(),
            "type": "VEC3",
            "min": min,
            "max": max
        }));
        accessors.push(json!({
            "bufferView": position_view + 1,
            "componentType": UNSIGNED_INT,
            "count": triangles.len() * 3,
            "type": "SCALAR"
        }));

        meshes.push(json!({
            "name": object.name,
            "primitives": [{
                "attributes": { "POSITION": position_accessor },
                "indices": position_accessor + 1
            }]
        }));
        nodes.push(json!({ "name": object.name, "mesh": index }));
    }

    let node_indices: Vec<usize> = (0..nodes.len()).collect();
    let mut document = json!({
        "asset": {
            "version": "2.0",
            "generator": concat!("scene-bridge ", env!("CARGO_PKG_VERSION")),
        },
        "scene": 0,
        "scenes": [{ "nodes": node_indices }],
        "nodes": nodes,
    });
    if !buffer.is_empty() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&buffer);
        document["meshes"] = json!(meshes);
        document["accessors"] = json!(accessors);
        document["bufferViews"] = json!(buffer_views);
        document["buffers"] = json!([{
            "byteLength": buffer.len(),
            "uri": format!("data:application/octet-stream;base64,{encoded}")
        }]);
    }
    document
}
