//! Tree-walking interpreter for sanitized scripts.
//!
//! The interpreter owns no global state: every name a script can reach is
//! either bound by the script itself, one of the pre-bound names (`scene`,
//! `render_and_save`, `OUTPUT_DIR`), a builtin, or an attribute of an
//! allow-listed module. Capability calls go through the registry and mutate
//! the [`Scene`] they were given.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use rand::RngExt;
use serde_json::Map;

use super::ast::{BinOp, BoolOp, CmpOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use super::value::{format_float, Builtin, Function, ModuleKind, Op, Value};
use super::ScriptError;
use crate::registry::CapabilityRegistry;
use crate::scene::Scene;

/// Largest sequence `range` will build.
const MAX_RANGE: i64 = 1_000_000;

const MATH_CONSTANTS: &[(&str, f64)] = &[
    ("pi", std::f64::consts::PI),
    ("e", std::f64::consts::E),
    ("tau", std::f64::consts::TAU),
    ("inf", f64::INFINITY),
];

const MATH_FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "asin", "acos", "atan", "atan2", "sqrt", "radians", "degrees", "floor",
    "ceil", "fabs", "pow", "hypot", "exp", "log",
];

const MATHUTILS_FUNCTIONS: &[&str] = &["Vector", "Euler"];

const RANDOM_FUNCTIONS: &[&str] = &["random", "uniform", "randint", "choice"];

/// What a script left behind besides its scene mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutcome {
    /// Previews written through `render_and_save`, oldest first.
    pub rendered: Vec<PathBuf>,
}

impl ScriptOutcome {
    /// The most recently rendered preview.
    pub fn latest_preview(&self) -> Option<&PathBuf> {
        self.rendered.last()
    }
}

/// Runs one script against a scene.
pub struct Interpreter<'a> {
    scene: &'a mut Scene,
    registry: &'a CapabilityRegistry,
    globals: HashMap<String, Value>,
    rendered: Vec<PathBuf>,
}

impl<'a> Interpreter<'a> {
    pub fn new(scene: &'a mut Scene, registry: &'a CapabilityRegistry) -> Self {
        let mut globals = HashMap::new();
        globals.insert("scene".to_string(), Value::Module(ModuleKind::Scene));
        globals.insert(
            "OUTPUT_DIR".to_string(),
            Value::str(scene.output_dir().display().to_string()),
        );
        Self {
            scene,
            registry,
            globals,
            rendered: Vec::new(),
        }
    }

    /// Execute `program` to completion or to its first error.
    ///
    /// Scene mutations made before an error are kept.
    pub fn run(mut self, program: &Program) -> Result<ScriptOutcome, ScriptError> {
        self.block(&program.body)?;
        Ok(ScriptOutcome {
            rendered: self.rendered,
        })
    }

    fn block(&mut self, body: &[Stmt]) -> Result<(), ScriptError> {
        body.iter().try_for_each(|stmt| self.statement(stmt))
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), ScriptError> {
        let at = |message: String| ScriptError::runtime(stmt.line, message);
        match &stmt.kind {
            StmtKind::Pass => Ok(()),
            StmtKind::Expr(expr) => self.eval(expr).map(drop),
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    let mut segments = alias.name.split('.');
                    let root = segments.next().unwrap_or_default();
                    let module = ModuleKind::from_name(root)
                        .filter(|_| segments.next().is_none())
                        .ok_or_else(|| {
                            at(format!("ModuleNotFoundError: No module named '{}'", alias.name))
                        })?;
                    let binding = alias.asname.clone().unwrap_or_else(|| root.to_string());
                    self.globals.insert(binding, Value::Module(module));
                }
                Ok(())
            },
            StmtKind::FromImport { module, level, names } => {
                let name = module.as_deref().unwrap_or_default();
                if *level > 0 {
                    return Err(at("ImportError: relative imports are not supported".to_string()));
                }
                let kind = ModuleKind::from_name(name)
                    .ok_or_else(|| at(format!("ModuleNotFoundError: No module named '{name}'")))?;
                for alias in names {
                    if alias.name == "*" {
                        for member in self.module_members(kind) {
                            let value = self.module_attr(kind, member).map_err(at)?;
                            self.globals.insert(member.to_string(), value);
                        }
                        continue;
                    }
                    let value = self.module_attr(kind, &alias.name).map_err(|_| {
                        let imported = &alias.name;
                        at(format!("ImportError: cannot import name '{imported}' from '{name}'"))
                    })?;
                    let binding = alias.asname.clone().unwrap_or_else(|| alias.name.clone());
                    self.globals.insert(binding, value);
                }
                Ok(())
            },
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
                Ok(())
            },
            StmtKind::AugAssign { target, op, value } => {
                let current = self.eval(target)?;
                let rhs = self.eval(value)?;
                let updated = binary(*op, &current, &rhs).map_err(at)?;
                self.assign(target, updated)
            },
            StmtKind::For { target, iter, body } => {
                let items = self.eval(iter)?.iterate().map_err(at)?;
                for item in items {
                    self.assign(target, item)?;
                    self.block(body)?;
                }
                Ok(())
            },
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    if self.eval(test)?.truthy() {
                        return self.block(body);
                    }
                }
                self.block(orelse)
            },
        }
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), ScriptError> {
        let at = |message: String| ScriptError::runtime(target.line, message);
        match &target.kind {
            ExprKind::Name(name) => {
                self.globals.insert(name.clone(), value);
                Ok(())
            },
            ExprKind::Tuple(targets) | ExprKind::List(targets) => {
                let items = value.iterate().map_err(at)?;
                if items.len() != targets.len() {
                    return Err(at(format!(
                        "ValueError: expected {} values to unpack, got {}",
                        targets.len(),
                        items.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
                Ok(())
            },
            ExprKind::Attribute { value: owner, attr } => {
                let owner = self.eval(owner)?;
                self.set_attr(&owner, attr, value).map_err(at)
            },
            ExprKind::Subscript { value: container, index } => {
                let container = self.eval(container)?;
                let index = self.eval(index)?;
                set_item(&container, index, value).map_err(at)
            },
            _ => Err(at("SyntaxError: cannot assign to expression".to_string())),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        let at = |message: String| ScriptError::runtime(expr.line, message);
        Ok(match &expr.kind {
            ExprKind::Name(name) => self.lookup(name).map_err(at)?,
            ExprKind::Int(i) => Value::Int(*i),
            ExprKind::Float(f) => Value::Float(*f),
            ExprKind::Str(s) => Value::str(s),
            ExprKind::Bool(b) => Value::Bool(*b),
            ExprKind::None => Value::None,
            ExprKind::List(items) => Value::list(self.eval_all(items)?),
            ExprKind::Tuple(items) => Value::tuple(self.eval_all(items)?),
            ExprKind::Dict(pairs) => {
                let mut out: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = self.eval(k)?;
                    let value = self.eval(v)?;
                    dict_insert(&mut out, key, value).map_err(at)?;
                }
                Value::dict(out)
            },
            ExprKind::Attribute { value, attr } => {
                let owner = self.eval(value)?;
                self.get_attr(&owner, attr).map_err(at)?
            },
            ExprKind::Subscript { value, index } => {
                let container = self.eval(value)?;
                let index = self.eval(index)?;
                get_item(&container, &index).map_err(at)?
            },
            ExprKind::Call { func, args, keywords } => {
                let callee = self.eval(func)?;
                let args = self.eval_all(args)?;
                let mut kwargs = Vec::with_capacity(keywords.len());
                for (name, value) in keywords {
                    kwargs.push((name.clone(), self.eval(value)?));
                }
                self.call(&callee, args, kwargs).map_err(at)?
            },
            ExprKind::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                unary(*op, &operand).map_err(at)?
            },
            ExprKind::Binary { left, op, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right).map_err(at)?
            },
            ExprKind::Compare { left, ops } => {
                let mut current = self.eval(left)?;
                for (op, operand) in ops {
                    let next = self.eval(operand)?;
                    if !compare(*op, &current, &next).map_err(at)? {
                        return Ok(Value::Bool(false));
                    }
                    current = next;
                }
                Value::Bool(true)
            },
            ExprKind::BoolOp { op, values } => {
                let mut last = Value::None;
                for value in values {
                    last = self.eval(value)?;
                    let short_circuit = match op {
                        BoolOp::And => !last.truthy(),
                        BoolOp::Or => last.truthy(),
                    };
                    if short_circuit {
                        break;
                    }
                }
                last
            },
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(test)?.truthy() {
                    self.eval(body)?
                } else {
                    self.eval(orelse)?
                }
            },
        })
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, ScriptError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn lookup(&self, name: &str) -> Op<Value> {
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        Builtin::from_name(name)
            .map(|b| Value::Function(Function::Builtin(b)))
            .ok_or_else(|| format!("NameError: name '{name}' is not defined"))
    }

    // ----- modules and attributes -----

    fn module_members(&self, kind: ModuleKind) -> Vec<&'static str> {
        match kind {
            ModuleKind::Scene => {
                let mut names: Vec<&'static str> = self.registry.names().collect();
                names.push("get");
                names
            },
            ModuleKind::Math => MATH_CONSTANTS
                .iter()
                .map(|(name, _)| *name)
                .chain(MATH_FUNCTIONS.iter().copied())
                .collect(),
            ModuleKind::Mathutils => MATHUTILS_FUNCTIONS.to_vec(),
            ModuleKind::Random => RANDOM_FUNCTIONS.to_vec(),
        }
    }

    fn module_attr(&self, kind: ModuleKind, attr: &str) -> Op<Value> {
        let missing = || {
            format!("AttributeError: module '{}' has no attribute '{attr}'", kind.name())
        };
        let function = |table: &[&'static str]| {
            table
                .iter()
                .find(|name| **name == attr)
                .map(|name| Value::Function(Function::Module(kind, *name)))
        };
        match kind {
            ModuleKind::Scene => match attr {
                "get" => Ok(Value::Function(Function::Module(kind, "get"))),
                "objects" => Ok(Value::list(
                    self.scene
                        .objects()
                        .map(|o| Value::Object(Rc::from(o.name.as_str())))
                        .collect(),
                )),
                "active_object" => Ok(self
                    .scene
                    .active_object()
                    .map(|name| Value::Object(Rc::from(name)))
                    .unwrap_or(Value::None)),
                _ => self
                    .registry
                    .get(attr)
                    .map(|c| Value::Function(Function::Capability(c.name())))
                    .ok_or_else(missing),
            },
            ModuleKind::Math => MATH_CONSTANTS
                .iter()
                .find(|(name, _)| *name == attr)
                .map(|(_, v)| Value::Float(*v))
                .or_else(|| function(MATH_FUNCTIONS))
                .ok_or_else(missing),
            ModuleKind::Mathutils => function(MATHUTILS_FUNCTIONS).ok_or_else(missing),
            ModuleKind::Random => function(RANDOM_FUNCTIONS).ok_or_else(missing),
        }
    }

    fn get_attr(&self, owner: &Value, attr: &str) -> Op<Value> {
        let method =
            |name: &'static str| Value::Function(Function::Method(Box::new(owner.clone()), name));
        match (owner, attr) {
            (Value::Module(kind), _) => self.module_attr(*kind, attr),
            (Value::Object(name), _) => self.object_attr(name, attr),
            (Value::List(_), "append") => Ok(method("append")),
            (Value::Dict(_), "get") => Ok(method("get")),
            (Value::Dict(_), "keys") => Ok(method("keys")),
            (Value::Dict(_), "values") => Ok(method("values")),
            (Value::Dict(_), "items") => Ok(method("items")),
            _ => Err(format!(
                "AttributeError: '{}' object has no attribute '{attr}'",
                owner.type_name()
            )),
        }
    }

    fn object_attr(&self, name: &str, attr: &str) -> Op<Value> {
        let object = self
            .scene
            .get(name)
            .ok_or_else(|| format!("ReferenceError: object '{name}' was removed from the scene"))?;
        match attr {
            "name" => Ok(Value::str(&object.name)),
            "kind" | "type" => Ok(Value::str(object.kind.as_str())),
            "location" => Ok(Value::from_vec3(object.location)),
            "rotation" | "rotation_euler" => Ok(Value::from_vec3(object.rotation)),
            "scale" => Ok(Value::from_vec3(object.scale)),
            _ => Err(format!("AttributeError: 'Object' object has no attribute '{attr}'")),
        }
    }

    fn set_attr(&mut self, owner: &Value, attr: &str, value: Value) -> Op<()> {
        let Value::Object(name) = owner else {
            return Err(format!(
                "AttributeError: cannot set attribute '{attr}' on '{}' object",
                owner.type_name()
            ));
        };
        let vector = value.to_vec3();
        let object = self
            .scene
            .get_mut(name)
            .ok_or_else(|| format!("ReferenceError: object '{name}' was removed from the scene"))?;
        match attr {
            "location" => object.location = vector?,
            "rotation" | "rotation_euler" => object.rotation = vector?,
            "scale" => object.scale = vector?,
            _ => {
                return Err(format!(
                    "AttributeError: attribute '{attr}' of 'Object' object is not writable"
                ))
            },
        }
        Ok(())
    }

    // ----- calls -----

    fn call(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Op<Value> {
        let Value::Function(function) = callee else {
            return Err(format!("TypeError: '{}' object is not callable", callee.type_name()));
        };
        match function {
            Function::Capability(name) => self.call_capability(name, args, kwargs),
            Function::Builtin(Builtin::RenderAndSave) => {
                let args = bind_args("render_and_save", &["filename"], args, kwargs)?;
                let filename = match args.first() {
                    Some(Some(Value::Str(s))) => s.to_string(),
                    Some(Some(other)) => {
                        return Err(format!(
                            "TypeError: render_and_save() filename must be str, not {}",
                            other.type_name()
                        ))
                    },
                    _ => {
                        return Err("TypeError: render_and_save() missing required argument: \
                                    'filename'"
                            .to_string())
                    },
                };
                let path = self
                    .scene
                    .render_preview(&filename)
                    .map_err(|e| format!("OSError: {e}"))?;
                let shown = Value::str(path.display().to_string());
                self.rendered.push(path);
                Ok(shown)
            },
            Function::Builtin(builtin) => {
                no_keywords(builtin.name(), &kwargs)?;
                call_builtin(*builtin, args)
            },
            Function::Module(ModuleKind::Scene, _) => {
                no_keywords("scene.get", &kwargs)?;
                let [Value::Str(name)] = args.as_slice() else {
                    return Err("TypeError: scene.get() takes exactly one str argument".to_string());
                };
                Ok(if self.scene.get(name).is_some() {
                    Value::Object(name.clone())
                } else {
                    Value::None
                })
            },
            Function::Module(kind, name) => {
                no_keywords(&function.name(), &kwargs)?;
                call_module_function(*kind, name, args)
            },
            Function::Method(receiver, name) => {
                no_keywords(&function.name(), &kwargs)?;
                call_method(receiver, name, args)
            },
        }
    }

    fn call_capability(
        &mut self,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Op<Value> {
        let registry = self.registry;
        let capability = registry
            .get(name)
            .ok_or_else(|| format!("AttributeError: module 'scene' has no attribute '{name}'"))?;
        let bound = bind_args(name, capability.params(), args, kwargs)?;

        let mut params = Map::new();
        for (param, value) in capability.params().iter().zip(bound) {
            if let Some(value) = value {
                params.insert((*param).to_string(), value.to_json()?);
            }
        }
        let result = capability
            .invoke(self.scene, &params)
            .map_err(|e| format!("RuntimeError: {name}: {e}"))?;
        Ok(Value::from_json(&result))
    }
}

/// Map positional and keyword arguments onto parameter slots.
fn bind_args(
    function: &str,
    params: &[&str],
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Op<Vec<Option<Value>>> {
    if args.len() > params.len() {
        return Err(format!(
            "TypeError: {function}() takes at most {} arguments ({} given)",
            params.len(),
            args.len()
        ));
    }
    let mut slots: Vec<Option<Value>> = vec![None; params.len()];
    for (slot, arg) in slots.iter_mut().zip(args) {
        *slot = Some(arg);
    }
    for (key, value) in kwargs {
        let index = params
            .iter()
            .position(|p| *p == key)
            .ok_or_else(|| {
                format!("TypeError: {function}() got an unexpected keyword argument '{key}'")
            })?;
        if slots[index].is_some() {
            return Err(format!("TypeError: {function}() got multiple values for argument '{key}'"));
        }
        slots[index] = Some(value);
    }
    Ok(slots)
}

fn no_keywords(function: &str, kwargs: &[(String, Value)]) -> Op<()> {
    if kwargs.is_empty() {
        Ok(())
    } else {
        Err(format!("TypeError: {function}() takes no keyword arguments"))
    }
}

fn arity(function: &str, args: &[Value], min: usize, max: usize) -> Op<()> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        format!("exactly {min}")
    } else {
        format!("from {min} to {max}")
    };
    Err(format!(
        "TypeError: {function}() takes {expected} arguments ({} given)",
        args.len()
    ))
}

fn number(function: &str, value: &Value) -> Op<f64> {
    value.as_f64().ok_or_else(|| {
        format!(
            "TypeError: {function}() argument must be a number, not '{}'",
            value.type_name()
        )
    })
}

fn integer(function: &str, value: &Value) -> Op<i64> {
    value.as_i64().ok_or_else(|| {
        format!(
            "TypeError: {function}() argument must be an integer, not '{}'",
            value.type_name()
        )
    })
}

fn call_builtin(builtin: Builtin, args: Vec<Value>) -> Op<Value> {
    let name = builtin.name();
    match builtin {
        Builtin::Range => {
            arity(name, &args, 1, 3)?;
            let ints = args.iter().map(|a| integer(name, a)).collect::<Op<Vec<i64>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => unreachable!("arity checked"),
            };
            if step == 0 {
                return Err("ValueError: range() arg 3 must not be zero".to_string());
            }
            let span = if step > 0 {
                i128::from(stop) - i128::from(start)
            } else {
                i128::from(start) - i128::from(stop)
            };
            let stride = i128::from(step.unsigned_abs());
            let count = if span <= 0 { 0 } else { (span + stride - 1) / stride };
            if count > i128::from(MAX_RANGE) {
                return Err(format!("ValueError: range() may produce at most {MAX_RANGE} items"));
            }
            let items = (0..count as i64).map(|i| Value::Int(start + i * step)).collect();
            Ok(Value::list(items))
        },
        Builtin::Len => {
            arity(name, &args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.borrow().len(),
                Value::Tuple(items) => items.len(),
                Value::Dict(pairs) => pairs.borrow().len(),
                other => {
                    return Err(format!(
                        "TypeError: object of type '{}' has no len()",
                        other.type_name()
                    ))
                },
            };
            Ok(Value::Int(len as i64))
        },
        Builtin::Print => {
            let line = args.iter().map(Value::display).collect::<Op<Vec<_>>>()?.join(" ");
            tracing::info!(target: "bridge.script", "{line}");
            Ok(Value::None)
        },
        Builtin::Float => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => parse_float(s)
                    .map(Value::Float)
                    .ok_or_else(|| format!("ValueError: could not convert string to float: '{s}'")),
                Some(other) => number(name, other).map(Value::Float),
            }
        },
        Builtin::Int => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Str(s)) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| {
                        format!("ValueError: invalid literal for int() with base 10: '{s}'")
                    }),
                Some(Value::Float(f)) => float_to_int(f.trunc()).map(Value::Int),
                Some(other) => integer(name, other).map(Value::Int),
            }
        },
        Builtin::Str => {
            arity(name, &args, 0, 1)?;
            let text = match args.first() {
                Some(value) => value.display()?,
                None => String::new(),
            };
            Ok(Value::str(text))
        },
        Builtin::Abs => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Int(i) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| "OverflowError: integer overflow".to_string()),
                other => number(name, other).map(|f| Value::Float(f.abs())),
            }
        },
        Builtin::Min | Builtin::Max => {
            if args.is_empty() {
                return Err(format!("TypeError: {name} expected at least 1 argument, got 0"));
            }
            let candidates = if args.len() == 1 { args[0].iterate()? } else { args };
            let mut best: Option<Value> = None;
            for item in candidates {
                best = Some(match best {
                    None => item,
                    Some(current) => {
                        let op = if builtin == Builtin::Min { "<" } else { ">" };
                        let ordering = item.py_cmp(&current, op)?;
                        let replace = match builtin {
                            Builtin::Min => ordering.is_lt(),
                            _ => ordering.is_gt(),
                        };
                        if replace {
                            item
                        } else {
                            current
                        }
                    },
                });
            }
            best.ok_or_else(|| format!("ValueError: {name}() arg is an empty sequence"))
        },
        Builtin::Round => {
            arity(name, &args, 1, 2)?;
            let digits = match args.get(1) {
                None | Some(Value::None) => None,
                Some(d) => Some(integer(name, d)?),
            };
            match (&args[0], digits) {
                (Value::Int(i), _) => Ok(Value::Int(*i)),
                (value, None) => {
                    float_to_int(number(name, value)?.round_ties_even()).map(Value::Int)
                },
                (value, Some(digits)) => {
                    let x = number(name, value)?;
                    let factor = 10f64.powi(digits.clamp(-308, 308) as i32);
                    Ok(Value::Float((x * factor).round_ties_even() / factor))
                },
            }
        },
        Builtin::List => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::list(Vec::new())),
                Some(value) => Ok(Value::list(value.iterate()?)),
            }
        },
        Builtin::Enumerate => {
            arity(name, &args, 1, 2)?;
            let start = match args.get(1) {
                Some(v) => integer(name, v)?,
                None => 0,
            };
            let items = args[0]
                .iterate()?
                .into_iter()
                .enumerate()
                .map(|(i, item)| Value::tuple(vec![Value::Int(start + i as i64), item]))
                .collect();
            Ok(Value::list(items))
        },
        Builtin::RenderAndSave => Err("TypeError: render_and_save() needs a scene".to_string()),
    }
}

fn parse_float(text: &str) -> Option<f64> {
    let text = text.trim();
    match text.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        "nan" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

fn float_to_int(f: f64) -> Op<i64> {
    if !f.is_finite() {
        return Err(format!("OverflowError: cannot convert float {} to integer", format_float(f)));
    }
    if f >= -(2f64.powi(63)) && f < 2f64.powi(63) {
        Ok(f as i64)
    } else {
        Err("OverflowError: integer overflow".to_string())
    }
}

fn call_module_function(kind: ModuleKind, name: &str, args: Vec<Value>) -> Op<Value> {
    let qualified = format!("{}.{name}", kind.name());
    let f = |i: usize| number(&qualified, &args[i]);
    match (kind, name) {
        (ModuleKind::Math, "atan2" | "pow" | "hypot") => {
            arity(&qualified, &args, 2, 2)?;
            let (a, b) = (f(0)?, f(1)?);
            Ok(Value::Float(match name {
                "atan2" => a.atan2(b),
                "pow" => a.powf(b),
                _ => a.hypot(b),
            }))
        },
        (ModuleKind::Math, "log") => {
            arity(&qualified, &args, 1, 2)?;
            let x = f(0)?;
            if x <= 0.0 {
                return Err("ValueError: math domain error".to_string());
            }
            match args.len() {
                1 => Ok(Value::Float(x.ln())),
                _ => Ok(Value::Float(x.ln() / f(1)?.ln())),
            }
        },
        (ModuleKind::Math, "floor" | "ceil") => {
            arity(&qualified, &args, 1, 1)?;
            let x = f(0)?;
            float_to_int(if name == "floor" { x.floor() } else { x.ceil() }).map(Value::Int)
        },
        (ModuleKind::Math, _) => {
            arity(&qualified, &args, 1, 1)?;
            let x = f(0)?;
            let result = match name {
                "sin" => x.sin(),
                "cos" => x.cos(),
                "tan" => x.tan(),
                "asin" | "acos" if !(-1.0..=1.0).contains(&x) => {
                    return Err("ValueError: math domain error".to_string())
                },
                "asin" => x.asin(),
                "acos" => x.acos(),
                "atan" => x.atan(),
                "sqrt" if x < 0.0 => return Err("ValueError: math domain error".to_string()),
                "sqrt" => x.sqrt(),
                "radians" => x.to_radians(),
                "degrees" => x.to_degrees(),
                "fabs" => x.abs(),
                "exp" => x.exp(),
                _ => return Err(format!("AttributeError: module 'math' has no attribute '{name}'")),
            };
            Ok(Value::Float(result))
        },
        (ModuleKind::Mathutils, _) => {
            // Vector((x, y, z)) / Euler((x, y, z), 'XYZ'); both become float tuples
            arity(&qualified, &args, 1, 2)?;
            let components = args[0]
                .iterate()?
                .iter()
                .map(|c| number(&qualified, c).map(Value::Float))
                .collect::<Op<Vec<_>>>()?;
            Ok(Value::tuple(components))
        },
        (ModuleKind::Random, "random") => {
            arity(&qualified, &args, 0, 0)?;
            Ok(Value::Float(rand::random::<f64>()))
        },
        (ModuleKind::Random, "uniform") => {
            arity(&qualified, &args, 2, 2)?;
            let (a, b) = (f(0)?, f(1)?);
            Ok(Value::Float(a + (b - a) * rand::random::<f64>()))
        },
        (ModuleKind::Random, "randint") => {
            arity(&qualified, &args, 2, 2)?;
            let (a, b) = (integer(&qualified, &args[0])?, integer(&qualified, &args[1])?);
            if a > b {
                return Err(format!("ValueError: empty range in randint({a}, {b})"));
            }
            Ok(Value::Int(rand::rng().random_range(a..=b)))
        },
        (ModuleKind::Random, "choice") => {
            arity(&qualified, &args, 1, 1)?;
            let items = args[0].iterate()?;
            if items.is_empty() {
                return Err("IndexError: cannot choose from an empty sequence".to_string());
            }
            let index = rand::rng().random_range(0..items.len());
            Ok(items[index].clone())
        },
        _ => Err(format!(
            "AttributeError: module '{}' has no attribute '{name}'",
            kind.name()
        )),
    }
}

fn call_method(receiver: &Value, name: &str, args: Vec<Value>) -> Op<Value> {
    match (receiver, name) {
        (Value::List(items), "append") => {
            arity("list.append", &args, 1, 1)?;
            items.borrow_mut().extend(args);
            Ok(Value::None)
        },
        (Value::Dict(pairs), "get") => {
            arity("dict.get", &args, 1, 2)?;
            let pairs = pairs.borrow();
            let found = key_position(&pairs, &args[0])?.map(|i| pairs[i].1.clone());
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        },
        (Value::Dict(pairs), "keys" | "values" | "items") => {
            arity(&format!("dict.{name}"), &args, 0, 0)?;
            let pairs = pairs.borrow();
            let items = pairs
                .iter()
                .map(|(k, v)| match name {
                    "keys" => k.clone(),
                    "values" => v.clone(),
                    _ => Value::tuple(vec![k.clone(), v.clone()]),
                })
                .collect();
            Ok(Value::list(items))
        },
        _ => Err(format!(
            "AttributeError: '{}' object has no attribute '{name}'",
            receiver.type_name()
        )),
    }
}

// ----- operators -----

fn unary(op: UnaryOp, operand: &Value) -> Op<Value> {
    match (op, operand) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| "OverflowError: integer overflow".to_string()),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-i64::from(*b))),
        (UnaryOp::Pos, v @ (Value::Int(_) | Value::Float(_))) => Ok(v.clone()),
        (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
        (op, v) => Err(format!(
            "TypeError: bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        )),
    }
}

fn overflow() -> String {
    "OverflowError: integer overflow".to_string()
}

fn zero_division() -> String {
    "ZeroDivisionError: division by zero".to_string()
}

pub(crate) fn binary(op: BinOp, left: &Value, right: &Value) -> Op<Value> {
    let unsupported = || {
        format!(
            "TypeError: unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        )
    };

    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::str(format!("{a}{b}"))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            return Ok(Value::list(items));
        },
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            return Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
        },
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if n.as_i64().is_some() => {
            let count = repeat_count(n.as_i64().unwrap_or(0), s.len())?;
            return Ok(Value::str(s.repeat(count)));
        },
        (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items))
            if n.as_i64().is_some() =>
        {
            let items = items.borrow();
            let count = repeat_count(n.as_i64().unwrap_or(0), items.len())?;
            let repeated = (0..count).flat_map(|_| items.iter().cloned()).collect();
            return Ok(Value::list(repeated));
        },
        _ => {},
    }

    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        return int_binary(op, a, b);
    }
    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(unsupported());
    };
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div if b == 0.0 => return Err(zero_division()),
        BinOp::Div => a / b,
        BinOp::FloorDiv if b == 0.0 => return Err(zero_division()),
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod if b == 0.0 => return Err(zero_division()),
        BinOp::Mod => a - b * (a / b).floor(),
        BinOp::Pow if a == 0.0 && b < 0.0 => {
            return Err("ZeroDivisionError: 0.0 cannot be raised to a negative power".to_string())
        },
        BinOp::Pow => a.powf(b),
    };
    Ok(Value::Float(result))
}

fn int_binary(op: BinOp, a: i64, b: i64) -> Op<Value> {
    let checked = |v: Option<i64>| v.map(Value::Int).ok_or_else(overflow);
    match op {
        BinOp::Add => checked(a.checked_add(b)),
        BinOp::Sub => checked(a.checked_sub(b)),
        BinOp::Mul => checked(a.checked_mul(b)),
        BinOp::Div if b == 0 => Err(zero_division()),
        BinOp::Div => Ok(Value::Float(a as f64 / b as f64)),
        BinOp::FloorDiv | BinOp::Mod if b == 0 => Err(zero_division()),
        BinOp::FloorDiv => {
            let q = a.checked_div(b).ok_or_else(overflow)?;
            let adjust = a % b != 0 && ((a < 0) != (b < 0));
            checked(if adjust { q.checked_sub(1) } else { Some(q) })
        },
        BinOp::Mod => {
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            Ok(Value::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }))
        },
        BinOp::Pow if b < 0 => {
            if a == 0 {
                return Err(
                    "ZeroDivisionError: 0.0 cannot be raised to a negative power".to_string()
                );
            }
            Ok(Value::Float((a as f64).powf(b as f64)))
        },
        BinOp::Pow => {
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            checked(a.checked_pow(exp))
        },
    }
}

fn repeat_count(n: i64, unit: usize) -> Op<usize> {
    let count = usize::try_from(n.max(0)).map_err(|_| overflow())?;
    if count.saturating_mul(unit.max(1)) > MAX_RANGE as usize {
        return Err("MemoryError: sequence repetition too large".to_string());
    }
    Ok(count)
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Op<bool> {
    Ok(match op {
        CmpOp::Eq => left.py_eq(right)?,
        CmpOp::NotEq => !left.py_eq(right)?,
        CmpOp::Lt => left.py_cmp(right, "<")?.is_lt(),
        CmpOp::LtE => left.py_cmp(right, "<=")?.is_le(),
        CmpOp::Gt => left.py_cmp(right, ">")?.is_gt(),
        CmpOp::GtE => left.py_cmp(right, ">=")?.is_ge(),
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
    })
}

fn contains(container: &Value, needle: &Value) -> Op<bool> {
    match (container, needle) {
        (Value::Str(haystack), Value::Str(n)) => Ok(haystack.contains(n.as_ref())),
        (Value::Str(_), other) => Err(format!(
            "TypeError: 'in <string>' requires string as left operand, not {}",
            other.type_name()
        )),
        (Value::List(items), _) => any_equal(items.borrow().iter(), needle),
        (Value::Tuple(items), _) => any_equal(items.iter(), needle),
        (Value::Dict(pairs), _) => Ok(key_position(&pairs.borrow(), needle)?.is_some()),
        (other, _) => Err(format!(
            "TypeError: argument of type '{}' is not iterable",
            other.type_name()
        )),
    }
}

// ----- subscripts -----

fn sequence_index(index: &Value, len: usize, kind: &str) -> Op<usize> {
    let i = index
        .as_i64()
        .ok_or_else(|| {
            format!("TypeError: {kind} indices must be integers, not '{}'", index.type_name())
        })?;
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(format!("IndexError: {kind} index out of range"));
    }
    Ok(resolved as usize)
}

fn get_item(container: &Value, index: &Value) -> Op<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let i = sequence_index(index, items.len(), "list")?;
            Ok(items[i].clone())
        },
        Value::Tuple(items) => {
            let i = sequence_index(index, items.len(), "tuple")?;
            Ok(items[i].clone())
        },
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = sequence_index(index, chars.len(), "string")?;
            Ok(Value::str(chars[i].to_string()))
        },
        Value::Dict(pairs) => {
            let pairs = pairs.borrow();
            match key_position(&pairs, index)? {
                Some(i) => Ok(pairs[i].1.clone()),
                None => Err(format!("KeyError: {}", index.repr()?)),
            }
        },
        other => Err(format!(
            "TypeError: '{}' object is not subscriptable",
            other.type_name()
        )),
    }
}

fn set_item(container: &Value, index: Value, value: Value) -> Op<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = sequence_index(&index, items.len(), "list")?;
            items[i] = value;
            Ok(())
        },
        Value::Dict(pairs) => dict_insert(&mut pairs.borrow_mut(), index, value),
        other => Err(format!(
            "TypeError: '{}' object does not support item assignment",
            other.type_name()
        )),
    }
}

fn dict_insert(pairs: &mut Vec<(Value, Value)>, key: Value, value: Value) -> Op<()> {
    if !key.is_hashable() {
        return Err(format!("TypeError: unhashable type: '{}'", key.type_name()));
    }
    match key_position(pairs, &key)? {
        Some(i) => pairs[i].1 = value,
        None => pairs.push((key, value)),
    }
    Ok(())
}

fn key_position(pairs: &[(Value, Value)], key: &Value) -> Op<Option<usize>> {
    for (i, (k, _)) in pairs.iter().enumerate() {
        if k.py_eq(key)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

fn any_equal<'a>(items: impl IntoIterator<Item = &'a Value>, needle: &Value) -> Op<bool> {
    for item in items {
        if item.py_eq(needle)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse;
    use pretty_assertions::assert_eq;

    fn run_in(scene: &mut Scene, source: &str) -> Result<ScriptOutcome, ScriptError> {
        let registry = CapabilityRegistry::builtin();
        let program = parse(source).unwrap();
        Interpreter::new(scene, &registry).run(&program)
    }

    fn scene() -> (tempfile::TempDir, Scene) {
        let dir = tempfile::tempdir().unwrap();
        let scene = Scene::new(dir.path(), 64);
        (dir, scene)
    }

    fn runtime_message(err: ScriptError) -> String {
        match err {
            ScriptError::Runtime { message, .. } => message,
            other => panic!("expected runtime error, got {other:?}"),
        }
    }

    #[test]
    fn capabilities_with_keywords_and_positionals() {
        let (_dir, mut scene) = scene();
        run_in(
            &mut scene,
            "import scene\n\
             name = scene.add_box('Top', size=[2, 2, 0.1])\n\
             scene.add_cylinder(location=(1, 1, 0))\n\
             scene.translate(name, (0, 0, 1))\n",
        )
        .unwrap();
        assert_eq!(scene.len(), 2);
        assert_eq!(scene.get("Top").unwrap().location, [0.0, 0.0, 1.0]);
        assert_eq!(scene.get("Cyl").unwrap().location, [1.0, 1.0, 0.0]);
    }

    #[test]
    fn loops_math_and_object_attributes() {
        let (_dir, mut scene) = scene();
        let source = "\
from math import pi, cos, sin
legs = []
for i in range(4):
    angle = i * pi / 2
    legs.append(scene.add_cylinder('Leg', 0.05, 1.0, [cos(angle), sin(angle), 0]))
obj = scene.get(legs[-1])
obj.location = (0, 0, 5)
if len(legs) == 4 and obj.name == 'Leg.003':
    scene.add_box('Ok')
";
        run_in(&mut scene, source).unwrap();
        assert_eq!(scene.len(), 5);
        assert!(scene.get("Ok").is_some());
        assert_eq!(scene.get("Leg.003").unwrap().location, [0.0, 0.0, 5.0]);
    }

    #[test]
    fn render_and_save_records_previews() {
        let (dir, mut scene) = scene();
        let outcome = run_in(
            &mut scene,
            "scene.add_box()\n\
             render_and_save('first.png')\n\
             render_and_save(filename='second.svg')\n",
        )
        .unwrap();
        assert_eq!(outcome.rendered.len(), 2);
        assert_eq!(outcome.latest_preview(), Some(&dir.path().join("second.svg")));
        assert!(dir.path().join("first.svg").exists());
    }

    #[test]
    fn errors_keep_earlier_mutations() {
        let (_dir, mut scene) = scene();
        let err =
            run_in(&mut scene, "scene.add_box('A')\nx = 1 / 0\nscene.add_box('B')\n").unwrap_err();
        assert_eq!(err, ScriptError::runtime(2, "ZeroDivisionError: division by zero"));
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn runtime_error_messages() {
        let cases = [
            ("y = x + 1", "NameError: name 'x' is not defined"),
            ("import os", "ModuleNotFoundError: No module named 'os'"),
            ("from math import nope", "ImportError: cannot import name 'nope' from 'math'"),
            (
                "scene.add_box(colour='red')",
                "TypeError: add_box() got an unexpected keyword argument 'colour'",
            ),
            (
                "scene.add_box(size='big')",
                "RuntimeError: add_box: invalid parameter 'size': expected a list of 3 numbers",
            ),
            ("[1, 2][5]", "IndexError: list index out of range"),
            ("{'a': 1}['b']", "KeyError: 'b'"),
            ("1 + 'a'", "TypeError: unsupported operand type(s) for +: 'int' and 'str'"),
            ("len(3)", "TypeError: object of type 'int' has no len()"),
            ("a, b = (1, 2, 3)", "ValueError: expected 2 values to unpack, got 3"),
            ("range(0, 10, 0)", "ValueError: range() arg 3 must not be zero"),
            ("9223372036854775807 + 1", "OverflowError: integer overflow"),
            ("5()", "TypeError: 'int' object is not callable"),
        ];
        for (source, expected) in cases {
            let (_dir, mut scene) = scene();
            let err = run_in(&mut scene, source).unwrap_err();
            assert_eq!(runtime_message(err), expected, "{source}");
        }
    }

    #[test]
    fn python_arithmetic_semantics() {
        let cases = [
            ("-7 // 2", "-4"),
            ("-7 % 3", "2"),
            ("7 / 2", "3.5"),
            ("2 ** 10", "1024"),
            ("2 ** -1", "0.5"),
            ("round(2.5)", "2"),
            ("round(3.14159, 2)", "3.14"),
            ("int('42') + int(3.9)", "45"),
            ("'ab' * 2", "'abab'"),
            ("1 < 2 <= 2", "True"),
            ("'x' in ['x', 'y']", "True"),
            ("3 not in (1, 2)", "True"),
            ("0 or 'fallback'", "'fallback'"),
            ("max([3, 9, 1])", "9"),
            ("min(4, 2.5)", "2.5"),
            ("list(enumerate('ab', 1))", "[(1, 'a'), (2, 'b')]"),
            ("'yes' if 1 else 'no'", "'yes'"),
        ];
        for (source, expected) in cases {
            let (_dir, mut scene) = scene();
            let registry = CapabilityRegistry::builtin();
            let program = parse(&format!("result = {source}")).unwrap();
            let mut interp = Interpreter::new(&mut scene, &registry);
            interp.block(&program.body).unwrap();
            assert_eq!(interp.globals["result"].repr().unwrap(), expected, "{source}");
        }
    }

    #[test]
    fn mathutils_and_random() {
        let (_dir, mut scene) = scene();
        let registry = CapabilityRegistry::builtin();
        let program = parse(
            "import mathutils\n\
             import random\n\
             v = mathutils.Vector((1, 2, 3))\n\
             r = random.randint(1, 3)\n\
             u = random.uniform(2.0, 4.0)\n",
        )
        .unwrap();
        let mut interp = Interpreter::new(&mut scene, &registry);
        interp.block(&program.body).unwrap();
        assert_eq!(interp.globals["v"].repr().unwrap(), "(1.0, 2.0, 3.0)");
        let r = interp.globals["r"].as_i64().unwrap();
        assert!((1..=3).contains(&r));
        let u = interp.globals["u"].as_f64().unwrap();
        assert!((2.0..=4.0).contains(&u));
    }

    #[test]
    fn self_referential_list_prints_and_compares() {
        let (_dir, mut scene) = scene();
        let registry = CapabilityRegistry::builtin();
        let program =
            parse("a = [1]\na.append(a)\nprint(a)\ntext = str(a)\nsame = a == a\n").unwrap();
        let mut interp = Interpreter::new(&mut scene, &registry);
        interp.block(&program.body).unwrap();
        assert_eq!(interp.globals["text"].display().unwrap(), "[1, [...]]");
        assert!(interp.globals["same"].truthy());

        let cases = [
            (
                "a = []\na.append(a)\nscene.add_box('A', size=a)\n",
                "ValueError: Circular reference detected",
            ),
            (
                "a = [1]\na.append(a)\nb = [1]\nb.append(b)\nc = a == b\n",
                "RecursionError: maximum recursion depth exceeded",
            ),
        ];
        for (source, expected) in cases {
            let (_dir, mut scene) = self::scene();
            let err = run_in(&mut scene, source).unwrap_err();
            assert_eq!(runtime_message(err), expected, "{source}");
        }
    }

    #[test]
    fn star_import_binds_capabilities() {
        let (_dir, mut scene) = scene();
        run_in(&mut scene, "from scene import *\nreset()\nadd_box('Z')\n").unwrap();
        assert!(scene.get("Z").is_some());
    }
}
