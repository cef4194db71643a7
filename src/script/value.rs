//! Runtime values of the script interpreter.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt::Write;
use std::rc::Rc;

use serde_json::{Map, Number, Value as Json};

/// Deepest container nesting that comparisons, `repr` and JSON conversion
/// will follow before raising `RecursionError`.
pub(crate) const MAX_VALUE_DEPTH: usize = 200;

/// Result of an operation that does not know its source line yet.
///
/// The message already carries the Python-style error kind, for example
/// `"TypeError: ..."`; the interpreter attaches the line.
pub(crate) type Op<T> = Result<T, String>;

/// Modules a script can import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModuleKind {
    Scene,
    Math,
    Mathutils,
    Random,
}

impl ModuleKind {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "scene" => Self::Scene,
            "math" => Self::Math,
            "mathutils" => Self::Mathutils,
            "random" => Self::Random,
            _ => return None,
        })
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Math => "math",
            Self::Mathutils => "mathutils",
            Self::Random => "random",
        }
    }
}

/// Functions available without an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Range,
    Len,
    Print,
    Float,
    Int,
    Str,
    Abs,
    Min,
    Max,
    Round,
    List,
    Enumerate,
    RenderAndSave,
}

impl Builtin {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "range" => Self::Range,
            "len" => Self::Len,
            "print" => Self::Print,
            "float" => Self::Float,
            "int" => Self::Int,
            "str" => Self::Str,
            "abs" => Self::Abs,
            "min" => Self::Min,
            "max" => Self::Max,
            "round" => Self::Round,
            "list" => Self::List,
            "enumerate" => Self::Enumerate,
            "render_and_save" => Self::RenderAndSave,
            _ => return None,
        })
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Range => "range",
            Self::Len => "len",
            Self::Print => "print",
            Self::Float => "float",
            Self::Int => "int",
            Self::Str => "str",
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Round => "round",
            Self::List => "list",
            Self::Enumerate => "enumerate",
            Self::RenderAndSave => "render_and_save",
        }
    }
}

/// Anything a script can call.
#[derive(Debug, Clone)]
pub(crate) enum Function {
    Builtin(Builtin),
    /// A function exported by a module, such as `math.sin`.
    Module(ModuleKind, &'static str),
    /// A registry capability exposed on the `scene` module.
    Capability(&'static str),
    /// A method bound to its receiver, such as `items.append`.
    Method(Box<Value>, &'static str),
}

impl Function {
    pub(crate) fn name(&self) -> String {
        match self {
            Self::Builtin(b) => b.name().to_string(),
            Self::Module(m, f) => format!("{}.{f}", m.name()),
            Self::Capability(c) => format!("scene.{c}"),
            Self::Method(receiver, m) => format!("{}.{m}", receiver.type_name()),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Vec<(Value, Value)>>>),
    Module(ModuleKind),
    Function(Function),
    /// Handle to a scene object, by name.
    Object(Rc<str>),
}

impl Value {
    pub(crate) fn str(text: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(text.as_ref()))
    }

    pub(crate) fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub(crate) fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::new(items))
    }

    pub(crate) fn dict(pairs: Vec<(Value, Value)>) -> Self {
        Self::Dict(Rc::new(RefCell::new(pairs)))
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Module(_) => "module",
            Self::Function(_) => "function",
            Self::Object(_) => "Object",
        }
    }

    pub(crate) fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::Dict(pairs) => !pairs.borrow().is_empty(),
            Self::Module(_) | Self::Function(_) | Self::Object(_) => true,
        }
    }

    /// Numeric view; `bool` counts as a number.
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub(crate) fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Items produced by iterating over the value.
    pub(crate) fn iterate(&self) -> Op<Vec<Value>> {
        match self {
            Self::List(items) => Ok(items.borrow().clone()),
            Self::Tuple(items) => Ok((**items).clone()),
            Self::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            Self::Dict(pairs) => Ok(pairs.borrow().iter().map(|(k, _)| k.clone()).collect()),
            other => Err(format!("TypeError: '{}' object is not iterable", other.type_name())),
        }
    }

    /// `==`. Identical containers compare equal without being walked.
    pub(crate) fn py_eq(&self, other: &Value) -> Op<bool> {
        self.eq_at(other, 0)
    }

    fn eq_at(&self, other: &Value, depth: usize) -> Op<bool> {
        if depth > MAX_VALUE_DEPTH {
            return Err(recursion_error());
        }
        Ok(match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) if Rc::ptr_eq(a, b) => true,
            (Self::List(a), Self::List(b)) => seq_eq(&a.borrow(), &b.borrow(), depth + 1)?,
            (Self::Tuple(a), Self::Tuple(b)) if Rc::ptr_eq(a, b) => true,
            (Self::Tuple(a), Self::Tuple(b)) => seq_eq(a, b, depth + 1)?,
            (Self::Dict(a), Self::Dict(b)) if Rc::ptr_eq(a, b) => true,
            (Self::Dict(a), Self::Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (k, v) in a.iter() {
                    let mut found = false;
                    for (k2, v2) in b.iter() {
                        if k.eq_at(k2, depth + 1)? && v.eq_at(v2, depth + 1)? {
                            found = true;
                            break;
                        }
                    }
                    if !found {
                        return Ok(false);
                    }
                }
                true
            },
            (Self::Module(a), Self::Module(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        })
    }

    /// Ordering used by `<`, `min` and `max`.
    pub(crate) fn py_cmp(&self, other: &Value, symbol: &str) -> Op<Ordering> {
        self.cmp_at(other, symbol, 0)
    }

    fn cmp_at(&self, other: &Value, symbol: &str, depth: usize) -> Op<Ordering> {
        if depth > MAX_VALUE_DEPTH {
            return Err(recursion_error());
        }
        let unsupported = || {
            format!(
                "TypeError: '{symbol}' not supported between instances of '{}' and '{}'",
                self.type_name(),
                other.type_name()
            )
        };
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => Ok(a.cmp(b)),
            (Self::List(a), Self::List(b)) if Rc::ptr_eq(a, b) => Ok(Ordering::Equal),
            (Self::List(a), Self::List(b)) => seq_cmp(&a.borrow(), &b.borrow(), symbol, depth + 1),
            (Self::Tuple(a), Self::Tuple(b)) => seq_cmp(a, b, symbol, depth + 1),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(unsupported),
                _ => Err(unsupported()),
            },
        }
    }

    /// `str(value)`.
    pub(crate) fn display(&self) -> Op<String> {
        match self {
            Self::Str(s) => Ok(s.to_string()),
            other => other.repr(),
        }
    }

    /// `repr(value)`. A container met again inside itself prints as `[...]`
    /// or `{...}`.
    pub(crate) fn repr(&self) -> Op<String> {
        let mut out = String::new();
        self.write_repr(&mut out, &mut Vec::new())?;
        Ok(out)
    }

    fn write_repr(&self, out: &mut String, open: &mut Vec<*const ()>) -> Op<()> {
        if open.len() > MAX_VALUE_DEPTH {
            return Err(recursion_error());
        }
        match self {
            Self::None => out.push_str("None"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(i) => {
                let _ = write!(out, "{i}");
            },
            Self::Float(f) => out.push_str(&format_float(*f)),
            Self::Str(s) => {
                let _ = write!(out, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"));
            },
            Self::List(items) => {
                let id = Rc::as_ptr(items).cast::<()>();
                if open.contains(&id) {
                    out.push_str("[...]");
                    return Ok(());
                }
                open.push(id);
                out.push('[');
                write_items(&items.borrow(), out, open)?;
                out.push(']');
                open.pop();
            },
            Self::Tuple(items) => {
                open.push(Rc::as_ptr(items).cast::<()>());
                out.push('(');
                write_items(items, out, open)?;
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
                open.pop();
            },
            Self::Dict(pairs) => {
                let id = Rc::as_ptr(pairs).cast::<()>();
                if open.contains(&id) {
                    out.push_str("{...}");
                    return Ok(());
                }
                open.push(id);
                out.push('{');
                for (i, (k, v)) in pairs.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.write_repr(out, open)?;
                    out.push_str(": ");
                    v.write_repr(out, open)?;
                }
                out.push('}');
                open.pop();
            },
            Self::Module(m) => {
                let _ = write!(out, "<module '{}'>", m.name());
            },
            Self::Function(f) => {
                let _ = write!(out, "<function {}>", f.name());
            },
            Self::Object(name) => {
                let _ = write!(out, "<Object '{name}'>");
            },
        }
        Ok(())
    }

    /// Convert to JSON for a capability call. Object handles become names.
    pub(crate) fn to_json(&self) -> Op<Json> {
        self.json_at(&mut Vec::new())
    }

    fn json_at(&self, open: &mut Vec<*const ()>) -> Op<Json> {
        if open.len() > MAX_VALUE_DEPTH {
            return Err(recursion_error());
        }
        let json = match self {
            Self::None => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::from(*i),
            Self::Float(f) => Number::from_f64(*f).map(Json::Number).ok_or_else(|| {
                "ValueError: out of range float values are not JSON compliant".to_string()
            })?,
            Self::Str(s) | Self::Object(s) => Json::String(s.to_string()),
            Self::List(items) => {
                enter(open, Rc::as_ptr(items).cast())?;
                let array =
                    items.borrow().iter().map(|item| item.json_at(open)).collect::<Op<Vec<_>>>()?;
                open.pop();
                Json::Array(array)
            },
            Self::Tuple(items) => {
                enter(open, Rc::as_ptr(items).cast())?;
                let array = items.iter().map(|item| item.json_at(open)).collect::<Op<Vec<_>>>()?;
                open.pop();
                Json::Array(array)
            },
            Self::Dict(pairs) => {
                enter(open, Rc::as_ptr(pairs).cast())?;
                let mut map = Map::new();
                for (k, v) in pairs.borrow().iter() {
                    let Self::Str(key) = k else {
                        return Err(format!("TypeError: keys must be str, not {}", k.type_name()));
                    };
                    map.insert(key.to_string(), v.json_at(open)?);
                }
                open.pop();
                Json::Object(map)
            },
            other => {
                return Err(format!(
                    "TypeError: Object of type {} is not JSON serializable",
                    other.type_name()
                ))
            },
        };
        Ok(json)
    }

    pub(crate) fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Self::None,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .unwrap_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN))),
            Json::String(s) => Self::str(s),
            Json::Array(items) => Self::list(items.iter().map(Self::from_json).collect()),
            Json::Object(map) => Self::dict(
                map.iter()
                    .map(|(k, v)| (Self::str(k), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// A three-component float vector, from any numeric sequence of length 3.
    pub(crate) fn to_vec3(&self) -> Op<[f64; 3]> {
        let items = self.iterate()?;
        let mut out = [0.0; 3];
        if items.len() != 3 {
            return Err(format!("ValueError: expected 3 components, got {}", items.len()));
        }
        for (slot, item) in out.iter_mut().zip(&items) {
            *slot = item
                .as_f64()
                .ok_or_else(|| {
                    format!("TypeError: expected a number, got '{}'", item.type_name())
                })?;
        }
        Ok(out)
    }

    pub(crate) fn from_vec3(v: [f64; 3]) -> Self {
        Self::tuple(v.iter().map(|c| Self::Float(*c)).collect())
    }

    /// Whether the value may be used as a dict key.
    pub(crate) fn is_hashable(&self) -> bool {
        let mut pending = vec![self];
        while let Some(value) = pending.pop() {
            match value {
                Self::List(_) | Self::Dict(_) => return false,
                Self::Tuple(items) => pending.extend(items.iter()),
                _ => {},
            }
        }
        true
    }
}

fn seq_eq(a: &[Value], b: &[Value], depth: usize) -> Op<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b) {
        if !x.eq_at(y, depth)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn seq_cmp(a: &[Value], b: &[Value], symbol: &str, depth: usize) -> Op<Ordering> {
    for (x, y) in a.iter().zip(b) {
        if !x.eq_at(y, depth)? {
            return x.cmp_at(y, symbol, depth);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

fn write_items(items: &[Value], out: &mut String, open: &mut Vec<*const ()>) -> Op<()> {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, open)?;
    }
    Ok(())
}

/// Mark a container as being converted; meeting it again is a cycle.
fn enter(open: &mut Vec<*const ()>, id: *const ()) -> Op<()> {
    if open.contains(&id) {
        return Err("ValueError: Circular reference detected".to_string());
    }
    open.push(id);
    Ok(())
}

fn recursion_error() -> String {
    "RecursionError: maximum recursion depth exceeded".to_string()
}

pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        (if f > 0.0 { "inf" } else { "-inf" }).to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}
