//! The standard scene capabilities.
//!
//! Status-style handlers (`translate`, `rotate`, `boolean_diff`) report a
//! missing object as `[false, "<reason>"]` rather than as an error, so a batch
//! can tell "nothing to do" apart from "handler failed".

use serde_json::{json, Value};

use super::{Capability, CapabilityError, ParamReader};
use crate::scene::Scene;
use crate::types::Params;

/// Registration table, in listing order.
pub const ENTRIES: [Capability; 7] = [
    Capability::new("reset", reset, true, &[]),
    Capability::new("add_box", add_box, true, &["name", "size", "location"]),
    Capability::new(
        "add_cylinder",
        add_cylinder,
        true,
        &["name", "radius", "depth", "location"],
    ),
    Capability::new("translate", translate, true, &["object", "vector"]),
    Capability::new("rotate", rotate, true, &["object", "rotation"]),
    Capability::new("boolean_diff", boolean_diff, true, &["target", "cutter"]),
    Capability::new("export", export, true, &["filename"]),
];

fn status(ok: bool, message: &str) -> Value {
    json!([ok, message])
}

fn reset(scene: &mut Scene, _params: &Params) -> Result<Value, CapabilityError> {
    scene.reset();
    Ok(Value::Null)
}

fn add_box(scene: &mut Scene, params: &Params) -> Result<Value, CapabilityError> {
    let p = ParamReader::new(params);
    let name = p.str_or("name", "Box")?;
    let size = p.vec3_or("size", [1.0, 1.0, 1.0])?;
    let location = p.vec3_or("location", [0.0, 0.0, 0.0])?;
    Ok(Value::String(scene.add_box(name, size, location)))
}

fn add_cylinder(scene: &mut Scene, params: &Params) -> Result<Value, CapabilityError> {
    let p = ParamReader::new(params);
    let name = p.str_or("name", "Cyl")?;
    let radius = p.f64_or("radius", 0.5)?;
    let depth = p.f64_or("depth", 1.0)?;
    let location = p.vec3_or("location", [0.0, 0.0, 0.0])?;
    Ok(Value::String(
        scene.add_cylinder(name, radius, depth, location),
    ))
}

fn translate(scene: &mut Scene, params: &Params) -> Result<Value, CapabilityError> {
    let p = ParamReader::new(params);
    let vector = p.vec3_or("vector", [0.0, 0.0, 0.0])?;
    let Some(object) = p.opt_str("object")?.and_then(|name| scene.get_mut(name)) else {
        return Ok(status(false, "object not found"));
    };
    for (axis, delta) in object.location.iter_mut().zip(vector) {
        *axis += delta;
    }
    Ok(status(true, "translated"))
}

fn rotate(scene: &mut Scene, params: &Params) -> Result<Value, CapabilityError> {
    let p = ParamReader::new(params);
    let rotation = p.vec3_or("rotation", [0.0, 0.0, 0.0])?;
    let Some(object) = p.opt_str("object")?.and_then(|name| scene.get_mut(name)) else {
        return Ok(status(false, "object not found"));
    };
    object.rotation = rotation;
    Ok(status(true, "rotated"))
}

fn boolean_diff(scene: &mut Scene, params: &Params) -> Result<Value, CapabilityError> {
    let p = ParamReader::new(params);
    let (Some(target), Some(cutter)) = (p.opt_str("target")?, p.opt_str("cutter")?) else {
        return Ok(status(false, "objects not found"));
    };
    if scene.boolean_difference(target, cutter) {
        Ok(status(true, "applied"))
    } else {
        Ok(status(false, "objects not found"))
    }
}

fn export(scene: &mut Scene, params: &Params) -> Result<Value, CapabilityError> {
    let p = ParamReader::new(params);
    let filename = p.str_or("filename", "model.obj")?;
    let path = scene.export(filename)?;
    Ok(Value::String(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CapabilityRegistry;
    use serde_json::Map;

    fn call(scene: &mut Scene, op: &str, params: Value) -> Result<Value, CapabilityError> {
        let params: Map<String, Value> = serde_json::from_value(params).unwrap();
        CapabilityRegistry::builtin()
            .get(op)
            .unwrap()
            .invoke(scene, &params)
    }

    #[test]
    fn add_box_returns_name() {
        let mut scene = Scene::new(std::env::temp_dir(), 64);
        let name = call(&mut scene, "add_box", json!({"name": "B1", "size": [2, 2, 2]})).unwrap();
        assert_eq!(name, json!("B1"));
        assert_eq!(scene.get("B1").unwrap().scale, [2.0, 2.0, 2.0]);
    }

    #[test]
    fn translate_accumulates() {
        let mut scene = Scene::new(std::env::temp_dir(), 64);
        call(&mut scene, "add_box", json!({"name": "B", "location": [1, 0, 0]})).unwrap();
        let out =
            call(&mut scene, "translate", json!({"object": "B", "vector": [1, 2, 3]})).unwrap();
        assert_eq!(out, json!([true, "translated"]));
        assert_eq!(scene.get("B").unwrap().location, [2.0, 2.0, 3.0]);
    }

    #[test]
    fn missing_object_is_status_not_error() {
        let mut scene = Scene::new(std::env::temp_dir(), 64);
        let out =
            call(&mut scene, "rotate", json!({"object": "ghost", "rotation": [0, 0, 1]})).unwrap();
        assert_eq!(out, json!([false, "object not found"]));
        let out = call(&mut scene, "boolean_diff", json!({"target": "a"})).unwrap();
        assert_eq!(out, json!([false, "objects not found"]));
    }

    #[test]
    fn bad_param_is_error() {
        let mut scene = Scene::new(std::env::temp_dir(), 64);
        let err = call(&mut scene, "add_cylinder", json!({"radius": "wide"})).unwrap_err();
        assert!(err.to_string().contains("radius"));
    }

    #[test]
    fn export_writes_into_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut scene = Scene::new(dir.path(), 64);
        call(&mut scene, "add_box", json!({})).unwrap();
        let path = call(&mut scene, "export", json!({"filename": "m.obj"})).unwrap();
        let path = std::path::PathBuf::from(path.as_str().unwrap());
        assert!(path.starts_with(dir.path()));
        assert!(std::fs::read_to_string(path).unwrap().contains("o Box"));

        let err = call(&mut scene, "export", json!({"filename": "../escape.obj"})).unwrap_err();
        assert!(err.to_string().contains("invalid file name"));
    }
}
