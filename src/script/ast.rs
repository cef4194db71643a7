//! Syntax tree for scene scripts.

/// A parsed script.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

/// A statement and the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

/// `name` or `name as alias` inside an import.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `import a.b as c, d`
    Import(Vec<Alias>),
    /// `from ..module import a as b`
    FromImport {
        module: Option<String>,
        level: usize,
        names: Vec<Alias>,
    },
    /// `a = b = value`
    Assign { targets: Vec<Expr>, value: Expr },
    /// `target += value`
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    Expr(Expr),
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
    },
    /// `if`/`elif` branches in order, then the optional `else` block.
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    Pass,
}

/// An expression with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub line: usize,
    pub column: usize,
    /// Height of this subtree; a leaf is 1.
    pub depth: usize,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<(String, Expr)>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// Chained comparison: `a < b <= c`.
    Compare {
        left: Box<Expr>,
        ops: Vec<(CmpOp, Expr)>,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<Expr>,
    },
    /// `body if test else orelse`
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl Expr {
    /// `a.b.c` for a chain of attribute lookups on a name; `None` otherwise.
    pub fn dotted_name(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Name(name) => Some(name.clone()),
            ExprKind::Attribute { value, attr } => {
                value.dotted_name().map(|base| format!("{base}.{attr}"))
            },
            _ => None,
        }
    }

    /// The last segment of a call target: `system` for `os.system`, or for
    /// `f().system`.
    pub fn tail_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name(name) => Some(name),
            ExprKind::Attribute { attr, .. } => Some(attr),
            _ => None,
        }
    }

    /// Direct child expressions, in source order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Name(_)
            | ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Str(_)
            | ExprKind::Bool(_)
            | ExprKind::None => Vec::new(),
            ExprKind::List(items) | ExprKind::Tuple(items) => items.iter().collect(),
            ExprKind::Dict(pairs) => pairs.iter().flat_map(|(k, v)| [k, v]).collect(),
            ExprKind::Attribute { value, .. } => vec![value.as_ref()],
            ExprKind::Subscript { value, index } => vec![value.as_ref(), index.as_ref()],
            ExprKind::Call { func, args, keywords } => std::iter::once(func.as_ref())
                .chain(args)
                .chain(keywords.iter().map(|(_, v)| v))
                .collect(),
            ExprKind::Unary { operand, .. } => vec![operand.as_ref()],
            ExprKind::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            ExprKind::Compare { left, ops } => std::iter::once(left.as_ref())
                .chain(ops.iter().map(|(_, e)| e))
                .collect(),
            ExprKind::BoolOp { values, .. } => values.iter().collect(),
            ExprKind::IfExp { test, body, orelse } => {
                vec![body.as_ref(), test.as_ref(), orelse.as_ref()]
            },
        }
    }
}

/// Read-only traversal over a program.
///
/// Implementors override the hooks they care about; the default walk visits
/// every statement and every expression depth-first.
pub trait Visitor {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_program<V: Visitor + ?Sized>(visitor: &mut V, program: &Program) {
    for stmt in &program.body {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Import(_) | StmtKind::FromImport { .. } | StmtKind::Pass => {},
        StmtKind::Assign { targets, value } => {
            for target in targets {
                visitor.visit_expr(target);
            }
            visitor.visit_expr(value);
        },
        StmtKind::AugAssign { target, value, .. } => {
            visitor.visit_expr(target);
            visitor.visit_expr(value);
        },
        StmtKind::Expr(expr) => visitor.visit_expr(expr),
        StmtKind::For { target, iter, body } => {
            visitor.visit_expr(target);
            visitor.visit_expr(iter);
            for stmt in body {
                visitor.visit_stmt(stmt);
            }
        },
        StmtKind::If { branches, orelse } => {
            for (test, body) in branches {
                visitor.visit_expr(test);
                for stmt in body {
                    visitor.visit_stmt(stmt);
                }
            }
            for stmt in orelse {
                visitor.visit_stmt(stmt);
            }
        },
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    for child in expr.children() {
        visitor.visit_expr(child);
    }
}
