//! Static validation of script text before it is queued.
//!
//! The sanitizer parses the script and walks the tree once. It never runs
//! anything. A script passes when every import is rooted in an allow-listed
//! module and no statically resolvable call names a denied function.
//!
//! Calls whose target cannot be resolved to a name (`f()()`, `x[0]()`) are
//! not flagged. At run time those can still only reach what the interpreter
//! exposes.
//!
//! # Examples
//!
//! ```
//! use scene_bridge::sanitizer::Sanitizer;
//!
//! let sanitizer = Sanitizer::default();
//! assert!(sanitizer.validate("import math\nscene.add_box('A')").is_ok());
//!
//! let rejected = sanitizer.validate("import os\nos.system('ls')").unwrap_err();
//! assert_eq!(rejected.reason(), "forbidden call detected: os.system");
//! ```

use std::fmt;

use thiserror::Error;

use crate::script::ast::{
    walk_expr, walk_program, walk_stmt, Expr, ExprKind, Program, Stmt, StmtKind, Visitor,
};
use crate::script::{parse, ScriptError};

/// Root modules a script may import.
pub const ALLOWED_IMPORTS: &[&str] = &["scene", "math", "mathutils", "random"];

/// Call names rejected on their full dotted path or their last segment.
pub const FORBIDDEN_CALLS: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "open",
    "__import__",
    "run",
    "Popen",
    "system",
    "popen",
];

/// One problem found in a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// An import outside the allow-list.
    DisallowedImport { name: String, line: usize },
    /// A call to a denied function.
    ForbiddenCall { name: String, line: usize },
}

impl Finding {
    pub fn line(&self) -> usize {
        match self {
            Self::DisallowedImport { line, .. } | Self::ForbiddenCall { line, .. } => *line,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DisallowedImport { name, .. } => write!(f, "import not allowed: {name}"),
            Self::ForbiddenCall { name, .. } => write!(f, "forbidden call detected: {name}"),
        }
    }
}

/// Why a script was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct Rejection {
    reason: String,
    findings: Vec<Finding>,
}

impl Rejection {
    fn syntax(err: &ScriptError) -> Self {
        Self {
            reason: format!("syntax error: {err}"),
            findings: Vec::new(),
        }
    }

    /// The single reason reported to callers.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Every finding, in source order. Empty for syntax errors.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn is_syntax_error(&self) -> bool {
        self.findings.is_empty()
    }
}

/// A script that passed validation.
///
/// Only [`Sanitizer::validate`] can build one, so holding a
/// `SanitizedScript` proves the check ran.
#[derive(Debug, Clone)]
pub struct SanitizedScript {
    source: String,
    program: Program,
}

impl SanitizedScript {
    /// The validated source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed program the executor will run.
    pub fn program(&self) -> &Program {
        &self.program
    }
}

/// Import allow-list and call deny-list checker.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    allowed_imports: Vec<String>,
    forbidden_calls: Vec<String>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            allowed_imports: ALLOWED_IMPORTS.iter().map(|s| (*s).to_string()).collect(),
            forbidden_calls: FORBIDDEN_CALLS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl Sanitizer {
    /// Validate `code`, returning the parsed script or the first problem.
    ///
    /// A forbidden call outranks a disallowed import when both are present.
    pub fn validate(&self, code: &str) -> Result<SanitizedScript, Rejection> {
        let program = parse(code).map_err(|err| Rejection::syntax(&err))?;

        let mut scan = Scan {
            sanitizer: self,
            findings: Vec::new(),
        };
        walk_program(&mut scan, &program);
        let findings = scan.findings;

        let reported = findings
            .iter()
            .find(|f| matches!(f, Finding::ForbiddenCall { .. }))
            .or_else(|| findings.first());
        if let Some(first) = reported {
            tracing::debug!(
                target: "bridge.sanitizer",
                findings = findings.len(),
                line = first.line(),
                "script rejected"
            );
            return Err(Rejection {
                reason: first.to_string(),
                findings,
            });
        }

        Ok(SanitizedScript {
            source: code.to_string(),
            program,
        })
    }

    fn import_allowed(&self, module: &str) -> bool {
        let root = module.split('.').next().unwrap_or_default();
        self.allowed_imports.iter().any(|m| m == root)
    }

    fn call_forbidden(&self, dotted: &str) -> bool {
        let last = dotted.rsplit('.').next().unwrap_or(dotted);
        self.forbidden_calls.iter().any(|f| f == dotted || f == last)
    }
}

struct Scan<'a> {
    sanitizer: &'a Sanitizer,
    findings: Vec<Finding>,
}

impl Visitor for Scan<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    if !self.sanitizer.import_allowed(&alias.name) {
                        self.findings.push(Finding::DisallowedImport {
                            name: alias.name.clone(),
                            line: stmt.line,
                        });
                    }
                }
            },
            StmtKind::FromImport { module, level, .. } => {
                let module = module.as_deref().unwrap_or_default();
                // relative imports have no allow-listed root
                if *level > 0 || !self.sanitizer.import_allowed(module) {
                    self.findings.push(Finding::DisallowedImport {
                        name: format!("{}{module}", ".".repeat(*level)),
                        line: stmt.line,
                    });
                }
            },
            _ => {},
        }
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        if let ExprKind::Call { func, .. } = &expr.kind {
            if let Some(dotted) = func.dotted_name() {
                if self.sanitizer.call_forbidden(&dotted) {
                    self.findings.push(Finding::ForbiddenCall {
                        name: dotted,
                        line: expr.line,
                    });
                }
            }
        }
        walk_expr(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reason(code: &str) -> String {
        Sanitizer::default()
            .validate(code)
            .map(|_| "ok".to_string())
            .unwrap_or_else(|r| r.reason().to_string())
    }

    #[test]
    fn allowed_scripts_pass() {
        let script = "\
import scene
import math, random
from mathutils import Vector
for i in range(3):
    scene.add_box('B', location=Vector((i * 2, 0, 0)))
render_and_save('preview.png')
";
        let sanitized = Sanitizer::default().validate(script).unwrap();
        assert_eq!(sanitized.source(), script);
        assert_eq!(sanitized.program().body.len(), 5);
    }

    #[test]
    fn forbidden_calls() {
        assert_eq!(reason("eval('1')"), "forbidden call detected: eval");
        assert_eq!(reason("x = subprocess.run(['ls'])"), "forbidden call detected: subprocess.run");
        assert_eq!(reason("f = open('/etc/passwd')"), "forbidden call detected: open");
        assert_eq!(reason("a.b.popen('x')"), "forbidden call detected: a.b.popen");
        assert_eq!(reason("print(__import__('os'))"), "forbidden call detected: __import__");
        // nested inside other expressions and blocks
        assert_eq!(
            reason("if True:\n    y = [1, exec('x')]"),
            "forbidden call detected: exec"
        );
    }

    #[test]
    fn disallowed_imports() {
        assert_eq!(reason("import os"), "import not allowed: os");
        assert_eq!(reason("import math, sys"), "import not allowed: sys");
        assert_eq!(reason("from os.path import join"), "import not allowed: os.path");
        assert_eq!(reason("from . import sibling"), "import not allowed: .");
        assert_eq!(reason("from ..pkg import x"), "import not allowed: ..pkg");
        assert_eq!(reason("import scene.objects"), "ok");
    }

    #[test]
    fn forbidden_call_outranks_import() {
        let rejection = Sanitizer::default()
            .validate("import os\nos.system('ls')")
            .unwrap_err();
        assert_eq!(rejection.reason(), "forbidden call detected: os.system");
        assert_eq!(
            rejection.findings(),
            &[
                Finding::DisallowedImport { name: "os".into(), line: 1 },
                Finding::ForbiddenCall { name: "os.system".into(), line: 2 },
            ]
        );
    }

    #[test]
    fn syntax_errors_are_not_forbidden_calls() {
        let rejection = Sanitizer::default().validate("eval(\n").unwrap_err();
        assert!(rejection.reason().starts_with("syntax error: "), "{}", rejection.reason());
        assert!(rejection.is_syntax_error());
        assert_eq!(
            reason("x = (1, 2"),
            "syntax error: line 1, column 10: unexpected end of input: unclosed bracket"
        );
    }

    #[test]
    fn unresolvable_callees_are_not_flagged() {
        assert_eq!(reason("handlers[0]('x')"), "ok");
        assert_eq!(reason("get()('x')"), "ok");
        assert_eq!(reason("scene.evaluate()"), "ok");
    }
}
