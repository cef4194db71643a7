//! Recursive-descent parser producing [`Program`]s.
//!
//! Operator precedence, lowest first: conditional expression, `or`, `and`,
//! `not`, comparisons, `+ -`, `* / // %`, unary sign, `**`, then calls,
//! subscripts and attribute access.

use super::ast::{
    Alias, BinOp, BoolOp, CmpOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp,
};
use super::lexer::{tokenize, Keyword, Token, TokenKind, UNSUPPORTED_KEYWORDS};
use super::{ScriptError, MAX_EXPR_DEPTH, MAX_NESTING};

const TOO_MANY_PARENS: &str = "too many nested parentheses";

/// Parse a complete script.
pub fn parse(source: &str) -> Result<Program, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut body = Vec::new();
    while !parser.at(&TokenKind::Eof) {
        body.extend(parser.statement()?);
    }
    Ok(Program { body })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Current recursion depth through brackets, unary operators and blocks.
    depth: usize,
}

impl Parser {
    fn current(&self) -> &Token {
        // tokenize always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn at_punct(&self, punct: &str) -> bool {
        matches!(&self.current().kind, TokenKind::Punct(p) if *p == punct)
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        self.current().kind == TokenKind::Keyword(keyword)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.at_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ScriptError {
        let token = self.current();
        ScriptError::syntax(token.line, token.column, message)
    }

    fn unexpected(&self) -> ScriptError {
        let description = match &self.current().kind {
            TokenKind::Name(name) => format!("unexpected name '{name}'"),
            TokenKind::Int(_) | TokenKind::Float(_) => "unexpected number".to_string(),
            TokenKind::Str(_) => "unexpected string".to_string(),
            TokenKind::Keyword(k) => format!("unexpected keyword '{}'", keyword_text(*k)),
            TokenKind::Punct(p) => format!("unexpected '{p}'"),
            TokenKind::Newline => "unexpected end of line".to_string(),
            TokenKind::Indent => "unexpected indent".to_string(),
            TokenKind::Dedent => "unexpected dedent".to_string(),
            TokenKind::Eof => "unexpected end of input".to_string(),
        };
        self.error_here(description)
    }

    /// Run a nested parse, failing once nesting passes [`MAX_NESTING`].
    fn descend<T>(
        &mut self,
        too_deep: &'static str,
        parse: impl FnOnce(&mut Self) -> Result<T, ScriptError>,
    ) -> Result<T, ScriptError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_here(too_deep));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), ScriptError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{punct}'")))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<(), ScriptError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{}'", keyword_text(keyword))))
        }
    }

    fn expect_name(&mut self) -> Result<String, ScriptError> {
        match &self.current().kind {
            TokenKind::Name(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            },
            _ => Err(self.error_here("expected a name")),
        }
    }

    fn expect_newline(&mut self) -> Result<(), ScriptError> {
        if self.at(&TokenKind::Newline) {
            self.advance();
            Ok(())
        } else if self.at(&TokenKind::Eof) || self.at(&TokenKind::Dedent) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    // ----- statements -----

    fn statement(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        if self.at_keyword(Keyword::For) {
            return Ok(vec![self.for_statement()?]);
        }
        if self.at_keyword(Keyword::If) {
            return Ok(vec![self.if_statement()?]);
        }
        if self.at(&TokenKind::Indent) {
            return Err(self.error_here("unexpected indent"));
        }
        self.simple_statements()
    }

    fn simple_statements(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut stmts = vec![self.simple_statement()?];
        while self.eat_punct(";") {
            if self.at(&TokenKind::Newline) || self.at(&TokenKind::Eof) {
                break;
            }
            stmts.push(self.simple_statement()?);
        }
        self.expect_newline()?;
        Ok(stmts)
    }

    fn simple_statement(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.current().line;
        let kind = if self.eat_keyword(Keyword::Pass) {
            StmtKind::Pass
        } else if self.eat_keyword(Keyword::Import) {
            StmtKind::Import(self.import_names()?)
        } else if self.at_keyword(Keyword::From) {
            self.from_import()?
        } else {
            self.expression_statement()?
        };
        Ok(Stmt { line, kind })
    }

    fn dotted(&mut self) -> Result<String, ScriptError> {
        let mut name = self.expect_name()?;
        while self.eat_punct(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn alias(&mut self, dotted: bool) -> Result<Alias, ScriptError> {
        let name = if dotted { self.dotted()? } else { self.expect_name()? };
        let asname = if self.eat_keyword(Keyword::As) {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(Alias { name, asname })
    }

    fn import_names(&mut self) -> Result<Vec<Alias>, ScriptError> {
        let mut names = vec![self.alias(true)?];
        while self.eat_punct(",") {
            names.push(self.alias(true)?);
        }
        Ok(names)
    }

    fn from_import(&mut self) -> Result<StmtKind, ScriptError> {
        self.expect_keyword(Keyword::From)?;
        let mut level = 0;
        while self.eat_punct(".") {
            level += 1;
        }
        let module = if self.at_keyword(Keyword::Import) {
            None
        } else {
            Some(self.dotted()?)
        };
        if module.is_none() && level == 0 {
            return Err(self.error_here("expected a module name"));
        }
        self.expect_keyword(Keyword::Import)?;

        let names = if self.eat_punct("*") {
            vec![Alias {
                name: "*".to_string(),
                asname: None,
            }]
        } else {
            let parenthesized = self.eat_punct("(");
            let mut names = vec![self.alias(false)?];
            while self.eat_punct(",") {
                if parenthesized && self.at_punct(")") {
                    break;
                }
                names.push(self.alias(false)?);
            }
            if parenthesized {
                self.expect_punct(")")?;
            }
            names
        };
        Ok(StmtKind::FromImport {
            module,
            level,
            names,
        })
    }

    fn expression_statement(&mut self) -> Result<StmtKind, ScriptError> {
        let first = self.expression_list()?;

        let aug = [
            ("+=", BinOp::Add),
            ("-=", BinOp::Sub),
            ("*=", BinOp::Mul),
            ("/=", BinOp::Div),
        ]
        .into_iter()
        .find(|(punct, _)| self.at_punct(punct));
        if let Some((_, op)) = aug {
            self.advance();
            check_target(&first, false)?;
            let value = self.expression_list()?;
            return Ok(StmtKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if !self.at_punct("=") {
            return Ok(StmtKind::Expr(first));
        }
        let mut targets = vec![first];
        while self.eat_punct("=") {
            targets.push(self.expression_list()?);
        }
        let value = targets.pop().ok_or_else(|| self.error_here("expected a value"))?;
        for target in &targets {
            check_target(target, true)?;
        }
        Ok(StmtKind::Assign { targets, value })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.descend("too many nested blocks", Self::block_body)
    }

    fn block_body(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect_punct(":")?;
        if !self.at(&TokenKind::Newline) {
            return self.simple_statements();
        }
        self.advance();
        if !self.at(&TokenKind::Indent) {
            return Err(self.error_here("expected an indented block"));
        }
        self.advance();
        let mut body = Vec::new();
        while !self.at(&TokenKind::Dedent) && !self.at(&TokenKind::Eof) {
            body.extend(self.statement()?);
        }
        if self.at(&TokenKind::Dedent) {
            self.advance();
        }
        Ok(body)
    }

    fn for_statement(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.current().line;
        self.expect_keyword(Keyword::For)?;
        let target = self.target_list()?;
        check_target(&target, true)?;
        self.expect_keyword(Keyword::In)?;
        let iter = self.expression_list()?;
        let body = self.block()?;
        Ok(Stmt {
            line,
            kind: StmtKind::For { target, iter, body },
        })
    }

    fn if_statement(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.current().line;
        self.expect_keyword(Keyword::If)?;
        let mut branches = vec![(self.test()?, self.block()?)];
        let mut orelse = Vec::new();
        loop {
            if self.eat_keyword(Keyword::Elif) {
                let test = self.test()?;
                let body = self.block()?;
                branches.push((test, body));
            } else if self.eat_keyword(Keyword::Else) {
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt {
            line,
            kind: StmtKind::If { branches, orelse },
        })
    }

    // ----- expressions -----

    fn expr(&self, kind: ExprKind, line: usize, column: usize) -> Result<Expr, ScriptError> {
        let mut expr = Expr {
            line,
            column,
            depth: 1,
            kind,
        };
        let below = expr.children().iter().map(|child| child.depth).max().unwrap_or(0);
        expr.depth += below;
        if expr.depth > MAX_EXPR_DEPTH {
            return Err(ScriptError::syntax(line, column, "expression is too deeply nested"));
        }
        Ok(expr)
    }

    /// `a` or `a, b, ...` (a tuple).
    fn expression_list(&mut self) -> Result<Expr, ScriptError> {
        let (line, column) = (self.current().line, self.current().column);
        let first = self.test()?;
        if !self.at_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            if self.ends_expression_list() {
                break;
            }
            items.push(self.test()?);
        }
        self.expr(ExprKind::Tuple(items), line, column)
    }

    /// Loop targets stop before `in`, so they cannot use `test`.
    fn target_list(&mut self) -> Result<Expr, ScriptError> {
        let (line, column) = (self.current().line, self.current().column);
        let first = self.arith()?;
        if !self.at_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            if self.at_keyword(Keyword::In) {
                break;
            }
            items.push(self.arith()?);
        }
        self.expr(ExprKind::Tuple(items), line, column)
    }

    fn ends_expression_list(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Newline
                | TokenKind::Eof
                | TokenKind::Punct("=" | ")" | ":" | ";" | "+=" | "-=" | "*=" | "/=")
        )
    }

    fn test(&mut self) -> Result<Expr, ScriptError> {
        self.descend(TOO_MANY_PARENS, Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, ScriptError> {
        let (line, column) = (self.current().line, self.current().column);
        let body = self.or_test()?;
        if !self.eat_keyword(Keyword::If) {
            return Ok(body);
        }
        let test = self.or_test()?;
        self.expect_keyword(Keyword::Else)?;
        let orelse = self.test()?;
        self.expr(
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            line,
            column,
        )
    }

    fn bool_chain(
        &mut self,
        keyword: Keyword,
        op: BoolOp,
        next: fn(&mut Self) -> Result<Expr, ScriptError>,
    ) -> Result<Expr, ScriptError> {
        let (line, column) = (self.current().line, self.current().column);
        let first = next(self)?;
        if !self.at_keyword(keyword) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword(keyword) {
            values.push(next(self)?);
        }
        self.expr(ExprKind::BoolOp { op, values }, line, column)
    }

    fn or_test(&mut self) -> Result<Expr, ScriptError> {
        self.bool_chain(Keyword::Or, BoolOp::Or, Self::and_test)
    }

    fn and_test(&mut self) -> Result<Expr, ScriptError> {
        self.bool_chain(Keyword::And, BoolOp::And, Self::not_test)
    }

    fn not_test(&mut self) -> Result<Expr, ScriptError> {
        let (line, column) = (self.current().line, self.current().column);
        if self.eat_keyword(Keyword::Not) {
            let operand = self.descend(TOO_MANY_PARENS, Self::not_test)?;
            return self.expr(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                line,
                column,
            );
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match &self.current().kind {
            TokenKind::Punct("==") => CmpOp::Eq,
            TokenKind::Punct("!=") => CmpOp::NotEq,
            TokenKind::Punct("<") => CmpOp::Lt,
            TokenKind::Punct("<=") => CmpOp::LtE,
            TokenKind::Punct(">") => CmpOp::Gt,
            TokenKind::Punct(">=") => CmpOp::GtE,
            TokenKind::Keyword(Keyword::In) => CmpOp::In,
            TokenKind::Keyword(Keyword::Not)
                if *self.peek_kind(1) == TokenKind::Keyword(Keyword::In) =>
            {
                self.advance();
                CmpOp::NotIn
            },
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let (line, column) = (self.current().line, self.current().column);
        let left = self.arith()?;
        let mut ops = Vec::new();
        while let Some(op) = self.comparison_op() {
            ops.push((op, self.arith()?));
        }
        if ops.is_empty() {
            return Ok(left);
        }
        self.expr(
            ExprKind::Compare {
                left: Box::new(left),
                ops,
            },
            line,
            column,
        )
    }

    fn binary_chain(
        &mut self,
        table: &[(&str, BinOp)],
        next: fn(&mut Self) -> Result<Expr, ScriptError>,
    ) -> Result<Expr, ScriptError> {
        let mut left = next(self)?;
        loop {
            let Some(&(_, op)) = table.iter().find(|(punct, _)| self.at_punct(punct)) else {
                return Ok(left);
            };
            let token = self.advance();
            let right = next(self)?;
            left = self.expr(
                ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                token.line,
                token.column,
            )?;
        }
    }

    fn arith(&mut self) -> Result<Expr, ScriptError> {
        self.binary_chain(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::term)
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        self.binary_chain(
            &[
                ("*", BinOp::Mul),
                ("/", BinOp::Div),
                ("//", BinOp::FloorDiv),
                ("%", BinOp::Mod),
            ],
            Self::factor,
        )
    }

    fn factor(&mut self) -> Result<Expr, ScriptError> {
        let (line, column) = (self.current().line, self.current().column);
        let op = if self.eat_punct("-") {
            UnaryOp::Neg
        } else if self.eat_punct("+") {
            UnaryOp::Pos
        } else {
            return self.power();
        };
        let operand = self.descend(TOO_MANY_PARENS, Self::factor)?;
        self.expr(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            line,
            column,
        )
    }

    fn power(&mut self) -> Result<Expr, ScriptError> {
        let base = self.postfix()?;
        if !self.at_punct("**") {
            return Ok(base);
        }
        let token = self.advance();
        let exponent = self.descend(TOO_MANY_PARENS, Self::factor)?;
        self.expr(
            ExprKind::Binary {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exponent),
            },
            token.line,
            token.column,
        )
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.atom()?;
        loop {
            let (line, column) = (expr.line, expr.column);
            if self.eat_punct("(") {
                let (args, keywords) = self.call_arguments()?;
                expr = self.expr(
                    ExprKind::Call {
                        func: Box::new(expr),
                        args,
                        keywords,
                    },
                    line,
                    column,
                )?;
            } else if self.eat_punct("[") {
                let index = self.expression_list()?;
                self.expect_punct("]")?;
                expr = self.expr(
                    ExprKind::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    },
                    line,
                    column,
                )?;
            } else if self.eat_punct(".") {
                let attr = self.expect_name()?;
                expr = self.expr(
                    ExprKind::Attribute {
                        value: Box::new(expr),
                        attr,
                    },
                    line,
                    column,
                )?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ScriptError> {
        let mut args = Vec::new();
        let mut keywords: Vec<(String, Expr)> = Vec::new();
        while !self.at_punct(")") {
            let is_keyword = matches!(self.current().kind, TokenKind::Name(_))
                && *self.peek_kind(1) == TokenKind::Punct("=");
            if is_keyword {
                let name = self.expect_name()?;
                if keywords.iter().any(|(existing, _)| *existing == name) {
                    return Err(self.error_here(format!("keyword argument repeated: {name}")));
                }
                self.advance();
                keywords.push((name, self.test()?));
            } else {
                if !keywords.is_empty() {
                    return Err(self.error_here("positional argument follows keyword argument"));
                }
                args.push(self.test()?);
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok((args, keywords))
    }

    fn atom(&mut self) -> Result<Expr, ScriptError> {
        let token = self.current().clone();
        let (line, column) = (token.line, token.column);
        let kind = match token.kind {
            TokenKind::Name(name) => {
                if UNSUPPORTED_KEYWORDS.contains(&name.as_str()) {
                    return Err(self.error_here(format!("'{name}' is not supported")));
                }
                self.advance();
                ExprKind::Name(name)
            },
            TokenKind::Int(value) => {
                self.advance();
                ExprKind::Int(value)
            },
            TokenKind::Float(value) => {
                self.advance();
                ExprKind::Float(value)
            },
            TokenKind::Str(mut text) => {
                self.advance();
                // adjacent literals concatenate
                while let TokenKind::Str(more) = &self.current().kind {
                    text.push_str(more);
                    self.advance();
                }
                ExprKind::Str(text)
            },
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                ExprKind::Bool(true)
            },
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                ExprKind::Bool(false)
            },
            TokenKind::Keyword(Keyword::None) => {
                self.advance();
                ExprKind::None
            },
            TokenKind::Punct("(") => {
                self.advance();
                if self.eat_punct(")") {
                    ExprKind::Tuple(Vec::new())
                } else {
                    let inner = self.expression_list()?;
                    self.expect_punct(")")?;
                    return Ok(inner);
                }
            },
            TokenKind::Punct("[") => {
                self.advance();
                ExprKind::List(self.sequence("]")?)
            },
            TokenKind::Punct("{") => {
                self.advance();
                self.dict()?
            },
            _ => return Err(self.unexpected()),
        };
        self.expr(kind, line, column)
    }

    fn sequence(&mut self, close: &str) -> Result<Vec<Expr>, ScriptError> {
        let mut items = Vec::new();
        while !self.at_punct(close) {
            items.push(self.test()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(close)?;
        Ok(items)
    }

    fn dict(&mut self) -> Result<ExprKind, ScriptError> {
        let mut pairs = Vec::new();
        while !self.at_punct("}") {
            let key = self.test()?;
            self.expect_punct(":")?;
            let value = self.test()?;
            pairs.push((key, value));
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct("}")?;
        Ok(ExprKind::Dict(pairs))
    }
}

fn check_target(target: &Expr, allow_unpack: bool) -> Result<(), ScriptError> {
    match &target.kind {
        ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Ok(()),
        ExprKind::Tuple(items) | ExprKind::List(items) if allow_unpack => {
            items.iter().try_for_each(|item| check_target(item, true))
        },
        _ => Err(ScriptError::syntax(
            target.line,
            target.column,
            "cannot assign to expression",
        )),
    }
}

fn keyword_text(keyword: Keyword) -> &'static str {
    match keyword {
        Keyword::Import => "import",
        Keyword::From => "from",
        Keyword::As => "as",
        Keyword::For => "for",
        Keyword::In => "in",
        Keyword::If => "if",
        Keyword::Elif => "elif",
        Keyword::Else => "else",
        Keyword::Pass => "pass",
        Keyword::And => "and",
        Keyword::Or => "or",
        Keyword::Not => "not",
        Keyword::True => "True",
        Keyword::False => "False",
        Keyword::None => "None",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn single(source: &str) -> StmtKind {
        let mut program = parse(source).unwrap();
        assert_eq!(program.body.len(), 1, "{source}");
        program.body.remove(0).kind
    }

    fn rendered(expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Name(n) => n.clone(),
            ExprKind::Int(i) => i.to_string(),
            ExprKind::Binary { left, op, right } => {
                format!("({} {} {})", rendered(left), op.symbol(), rendered(right))
            },
            ExprKind::Unary { op: UnaryOp::Neg, operand } => format!("(-{})", rendered(operand)),
            ExprKind::Call { func, args, .. } => format!(
                "{}({})",
                rendered(func),
                args.iter().map(rendered).collect::<Vec<_>>().join(", ")
            ),
            ExprKind::Attribute { value, attr } => format!("{}.{attr}", rendered(value)),
            other => format!("{other:?}"),
        }
    }

    fn expression(source: &str) -> String {
        match single(source) {
            StmtKind::Expr(expr) => rendered(&expr),
            other => panic!("not an expression: {other:?}"),
        }
    }

    #[test]
    fn precedence() {
        assert_eq!(expression("1 + 2 * 3"), "(1 + (2 * 3))");
        assert_eq!(expression("-2 ** 2"), "(-(2 ** 2))");
        assert_eq!(expression("2 ** -1"), "(2 ** (-1))");
        assert_eq!(expression("a - b - c"), "((a - b) - c)");
        assert_eq!(expression("f(a, b).c(1)"), "f(a, b).c(1)");
    }

    #[test]
    fn imports() {
        assert_eq!(
            single("import bpy, math as m"),
            StmtKind::Import(vec![
                Alias { name: "bpy".into(), asname: None },
                Alias { name: "math".into(), asname: Some("m".into()) },
            ])
        );
        match single("from os.path import (join,\n exists,)") {
            StmtKind::FromImport { module, level, names } => {
                assert_eq!(module.as_deref(), Some("os.path"));
                assert_eq!(level, 0);
                assert_eq!(names.len(), 2);
            },
            other => panic!("{other:?}"),
        }
        match single("from . import x") {
            StmtKind::FromImport { module, level, .. } => {
                assert_eq!(module, None);
                assert_eq!(level, 1);
            },
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn compound_statements() {
        let program = parse(concat!(
            "for i, name in enumerate(names):\n",
            "    if i > 1:\n",
            "        pass\n",
            "    elif i == 0: x = 1\n",
            "    else:\n",
            "        y = 2\n",
            "z = 3\n",
        ))
        .unwrap();
        assert_eq!(program.body.len(), 2);
        let StmtKind::For { target, body, .. } = &program.body[0].kind else {
            panic!("expected for");
        };
        assert!(matches!(target.kind, ExprKind::Tuple(ref items) if items.len() == 2));
        let StmtKind::If { branches, orelse } = &body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(orelse.len(), 1);
        assert_eq!(program.body[1].line, 7);
    }

    #[test]
    fn keyword_arguments() {
        let StmtKind::Expr(expr) = single("scene.add_box('A', size=[1, 2, 3], location=(0, 0, 1))")
        else {
            panic!("expected expression");
        };
        let ExprKind::Call { args, keywords, .. } = expr.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        let names: Vec<_> = keywords.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["size", "location"]);
    }

    #[test]
    fn chained_assignment_and_unpacking() {
        match single("a = b = 1") {
            StmtKind::Assign { targets, .. } => assert_eq!(targets.len(), 2),
            other => panic!("{other:?}"),
        }
        match single("x, y = 1, 2") {
            StmtKind::Assign { targets, value } => {
                assert!(matches!(targets[0].kind, ExprKind::Tuple(_)));
                assert!(matches!(value.kind, ExprKind::Tuple(_)));
            },
            other => panic!("{other:?}"),
        }
        assert!(matches!(single("n += 1"), StmtKind::AugAssign { op: BinOp::Add, .. }));
    }

    #[test]
    fn syntax_errors() {
        let cases = [
            ("def f():\n    pass", "'def' is not supported"),
            ("x = ", "unexpected end of line"),
            ("1 = x", "cannot assign to expression"),
            ("for i in range(3)\n    pass", "expected ':'"),
            ("if x:\npass", "expected an indented block"),
            ("f(a=1, 2)", "positional argument follows keyword argument"),
            ("while True:\n    pass", "'while' is not supported"),
            ("  x = 1", "unexpected indent"),
        ];
        for (source, expected) in cases {
            let err = parse(source).unwrap_err();
            assert!(err.to_string().contains(expected), "{source:?} gave {err}");
        }
    }

    #[test]
    fn nesting_is_capped_before_the_stack_runs_out() {
        let deep_parens = format!("x = {}1{}", "(".repeat(20_000), ")".repeat(20_000));
        let deep_calls = format!("x = {}1{}", "f(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        let deep_unary = format!("x = {}1", "-".repeat(100_000));
        let deep_not = format!("x = {}y", "not ".repeat(10_000));
        let deep_power = format!("x = 2{}", " ** 2".repeat(10_000));
        for source in [&deep_parens, &deep_calls, &deep_unary, &deep_not, &deep_power] {
            let err = parse(source).unwrap_err();
            assert!(err.is_syntax());
            assert!(err.to_string().contains("too many nested parentheses"), "{err}");
        }

        let nested_blocks = (0..MAX_NESTING + 1)
            .map(|level| format!("{}if x:\n", "    ".repeat(level)))
            .collect::<String>()
            + &"    ".repeat(MAX_NESTING + 1)
            + "pass\n";
        let err = parse(&nested_blocks).unwrap_err();
        assert!(err.to_string().contains("too many nested"), "{err}");
    }

    #[test]
    fn long_operator_chains_are_capped() {
        let long_sum = format!("x = 1{}", " + 1".repeat(100_000));
        let err = parse(&long_sum).unwrap_err();
        assert!(err.to_string().contains("expression is too deeply nested"), "{err}");

        let long_attribute = format!("x = a{}", ".b".repeat(10_000));
        assert!(parse(&long_attribute).is_err());
    }

    #[test]
    fn ordinary_nesting_still_parses() {
        let parens = format!("x = {}1{}", "(".repeat(40), ")".repeat(40));
        assert!(parse(&parens).is_ok());
        let sum = format!("x = 1{}", " + 1".repeat(MAX_EXPR_DEPTH - 2));
        let StmtKind::Assign { value, .. } = single(&sum) else {
            panic!("expected assignment");
        };
        assert_eq!(value.depth, MAX_EXPR_DEPTH - 1);
    }

    #[test]
    fn error_position() {
        let err = parse("x = 1\ny = )").unwrap_err();
        assert_eq!(err.to_string(), "line 2, column 5: unmatched ')'");
    }
}
