//! Capability registry: the fixed table of named scene operations.
//!
//! The registry is built once at start-up and shared read-only (behind an
//! `Arc`) by the executor and the gateway. Handlers take the scene by
//! mutable reference, so they can only run where the scene lives: on the
//! executor thread.
//!
//! # Examples
//!
//! ```
//! use scene_bridge::registry::CapabilityRegistry;
//!
//! let registry = CapabilityRegistry::builtin();
//! assert!(registry.get("add_box").is_some());
//! assert!(registry.get("rm_rf").is_none());
//! ```

pub mod builtin;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::scene::{Scene, SceneError};
use crate::types::Params;

/// Errors raised by capability handlers.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// A parameter had the wrong type or shape.
    #[error("invalid parameter '{name}': expected {expected}")]
    InvalidParam {
        /// Parameter name.
        name: String,
        /// What was expected.
        expected: &'static str,
    },

    /// The scene engine failed.
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Signature every capability handler implements.
pub type Handler = fn(&mut Scene, &Params) -> Result<Value, CapabilityError>;

/// One registry entry.
#[derive(Debug, Clone, Copy)]
pub struct Capability {
    name: &'static str,
    handler: Handler,
    requires_privileged_thread: bool,
    params: &'static [&'static str],
}

impl Capability {
    /// Create an entry. `params` lists parameter names in positional order.
    pub const fn new(
        name: &'static str,
        handler: Handler,
        requires_privileged_thread: bool,
        params: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            handler,
            requires_privileged_thread,
            params,
        }
    }

    /// Capability name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the handler must run on the executor thread.
    pub fn requires_privileged_thread(&self) -> bool {
        self.requires_privileged_thread
    }

    /// Parameter names in positional order.
    pub fn params(&self) -> &'static [&'static str] {
        self.params
    }

    /// Run the handler.
    pub fn invoke(&self, scene: &mut Scene, params: &Params) -> Result<Value, CapabilityError> {
        (self.handler)(scene, params)
    }
}

/// Serializable description of a capability for introspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityInfo {
    /// Capability name.
    pub name: String,
    /// Whether it must run on the executor thread.
    pub requires_privileged_thread: bool,
    /// Parameter names in positional order.
    pub params: Vec<String>,
}

/// Name-indexed set of capabilities.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    entries: IndexMap<&'static str, Capability>,
}

impl CapabilityRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard scene capabilities.
    pub fn builtin() -> Self {
        builtin::ENTRIES
            .iter()
            .fold(Self::new(), |registry, entry| registry.with(*entry))
    }

    /// Add or replace an entry.
    pub fn with(mut self, capability: Capability) -> Self {
        self.entries.insert(capability.name, capability);
        self
    }

    /// Look up a capability by name.
    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.get(name)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Introspection listing.
    pub fn describe(&self) -> Vec<CapabilityInfo> {
        self.entries
            .values()
            .map(|c| CapabilityInfo {
                name: c.name.to_string(),
                requires_privileged_thread: c.requires_privileged_thread,
                params: c.params.iter().map(|p| (*p).to_string()).collect(),
            })
            .collect()
    }
}

/// Typed access to a handler's parameter map.
#[derive(Debug, Clone, Copy)]
pub struct ParamReader<'a> {
    params: &'a Params,
}

impl<'a> ParamReader<'a> {
    /// Wrap a parameter map.
    pub fn new(params: &'a Params) -> Self {
        Self { params }
    }

    fn present(&self, name: &str) -> Option<&'a Value> {
        self.params.get(name).filter(|v| !v.is_null())
    }

    /// An optional string parameter.
    pub fn opt_str(&self, name: &str) -> Result<Option<&'a str>, CapabilityError> {
        match self.present(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(invalid(name, "a string")),
        }
    }

    /// A string parameter with a default.
    pub fn str_or(&self, name: &str, default: &'a str) -> Result<&'a str, CapabilityError> {
        Ok(self.opt_str(name)?.unwrap_or(default))
    }

    /// A number parameter with a default.
    pub fn f64_or(&self, name: &str, default: f64) -> Result<f64, CapabilityError> {
        match self.present(name) {
            None => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| invalid(name, "a number")),
        }
    }

    /// A three-component vector with a default.
    pub fn vec3_or(&self, name: &str, default: [f64; 3]) -> Result<[f64; 3], CapabilityError> {
        let Some(value) = self.present(name) else {
            return Ok(default);
        };
        let items = value
            .as_array()
            .filter(|items| items.len() == 3)
            .ok_or_else(|| invalid(name, "a list of 3 numbers"))?;
        let mut out = [0.0; 3];
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = item
                .as_f64()
                .ok_or_else(|| invalid(name, "a list of 3 numbers"))?;
        }
        Ok(out)
    }
}

fn invalid(name: &str, expected: &'static str) -> CapabilityError {
    CapabilityError::InvalidParam {
        name: name.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn builtin_registry_has_minimum_set() {
        let registry = CapabilityRegistry::builtin();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(
            names,
            vec![
                "reset",
                "add_box",
                "add_cylinder",
                "translate",
                "rotate",
                "boolean_diff",
                "export"
            ]
        );
        assert!(registry.get("add_box").unwrap().requires_privileged_thread());
    }

    #[test]
    fn describe_lists_params() {
        let info = CapabilityRegistry::builtin().describe();
        let add_box = info.iter().find(|c| c.name == "add_box").unwrap();
        assert_eq!(add_box.params, vec!["name", "size", "location"]);
    }

    #[test]
    fn reader_defaults_and_errors() {
        let p = params(json!({
            "name": "A",
            "size": [1, 2, 3],
            "bad": [1, 2],
            "radius": "x",
            "n": null
        }));
        let r = ParamReader::new(&p);
        assert_eq!(r.str_or("name", "Box").unwrap(), "A");
        assert_eq!(r.str_or("missing", "Box").unwrap(), "Box");
        assert_eq!(r.str_or("n", "Box").unwrap(), "Box");
        assert_eq!(r.vec3_or("size", [0.0; 3]).unwrap(), [1.0, 2.0, 3.0]);
        assert!(r.vec3_or("bad", [0.0; 3]).is_err());
        let err = r.f64_or("radius", 0.5).unwrap_err();
        assert_eq!(err.to_string(), "invalid parameter 'radius': expected a number");
    }

    #[test]
    fn with_replaces_existing_entry() {
        fn noop(_: &mut Scene, _: &Params) -> Result<Value, CapabilityError> {
            Ok(json!("noop"))
        }
        let registry =
            CapabilityRegistry::builtin().with(Capability::new("reset", noop, false, &[]));
        assert_eq!(registry.len(), 7);
        let mut scene = Scene::new(std::env::temp_dir(), 64);
        let reset = registry.get("reset").unwrap();
        assert_eq!(reset.invoke(&mut scene, &Params::new()).unwrap(), json!("noop"));
        assert!(!reset.requires_privileged_thread());
    }
}
