//! Source text → PL AST parser.
//!
//! A hand-written recursive-descent parser over the token stream from
//! [`lexer`](super::lexer). Transforms are separated by newlines or `|`;
//! function application is whitespace-based (`average salary`), so argument
//! positions accept only "tight" expressions — anything more complex is
//! parenthesized by the query author.

use crate::error::{CompileError, Span};

use super::lexer::{lex, Token, TokenKind};
use super::types::*;

/// Parse a source string into a PL query. The whole compilation aborts on
/// the first syntax error; no partial AST is returned.
pub fn parse(source: &str) -> Result<Query, CompileError> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_query()
}

/// Parse a single expression fragment (the inside of an `{...}` interpolation
/// slot). `offset` is the fragment's byte offset in the enclosing source, so
/// reported spans stay absolute.
fn parse_fragment(text: &str, offset: usize) -> Result<Expr, CompileError> {
    let mut tokens = lex(text).map_err(|e| shift_error(e, offset))?;
    for token in &mut tokens {
        token.span = token.span.shifted(offset);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if !parser.at_end() {
        return Err(CompileError::parse(
            "unexpected trailing tokens in interpolation",
            parser.current_span(),
        ));
    }
    Ok(expr)
}

fn shift_error(e: CompileError, offset: usize) -> CompileError {
    match e {
        CompileError::Parse { message, span } => CompileError::Parse {
            message,
            span: span.map(|s| s.shifted(offset)),
        },
        other => other,
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    // ------------------------------------------------------------------
    // token helpers
    // ------------------------------------------------------------------

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn current_span(&self) -> Option<Span> {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Span, CompileError> {
        if self.peek() == Some(kind) {
            let span = self.tokens[self.pos].span;
            self.pos += 1;
            Ok(span)
        } else {
            Err(CompileError::parse(
                format!("expected {what}"),
                self.current_span(),
            ))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, Span), CompileError> {
        match self.advance() {
            Some(Token {
                kind: TokenKind::Ident(name),
                span,
            }) => Ok((name, span)),
            other => Err(CompileError::parse(
                format!("expected {what}"),
                other.map(|t| t.span).or_else(|| self.current_span()),
            )),
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(TokenKind::NewLine)) {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(TokenKind::NewLine) | Some(TokenKind::Pipe)) {
            self.pos += 1;
        }
    }

    fn at_separator_or_end(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(TokenKind::NewLine) | Some(TokenKind::Pipe) | Some(TokenKind::RParen)
        )
    }

    // ------------------------------------------------------------------
    // query structure
    // ------------------------------------------------------------------

    fn parse_query(&mut self) -> Result<Query, CompileError> {
        self.skip_newlines();

        let def = self.parse_directive()?;

        let mut stmts = Vec::new();
        self.skip_separators();
        while !self.at_end() {
            if self.peek() == Some(&TokenKind::Ident("let".into())) {
                stmts.push(Stmt::FuncDef(self.parse_func_def()?));
            } else {
                let pipeline = self.parse_pipeline(false)?;
                if pipeline.transforms.is_empty() {
                    return Err(CompileError::parse("empty pipeline", self.current_span()));
                }
                stmts.push(Stmt::Main(pipeline));
            }
            self.skip_separators();
        }

        if !stmts.iter().any(|s| matches!(s, Stmt::Main(_))) {
            return Err(CompileError::parse("query has no pipeline", None));
        }

        Ok(Query { def, stmts })
    }

    /// `prql target:sql.mssql` as the first line. Unknown directive keys are
    /// tolerated (forward compatibility); only `target` is interpreted.
    fn parse_directive(&mut self) -> Result<QueryDef, CompileError> {
        let mut def = QueryDef::default();
        let is_directive = self.peek() == Some(&TokenKind::Ident("prql".into()))
            && matches!(self.peek_at(1), Some(TokenKind::Ident(_)))
            && self.peek_at(2) == Some(&TokenKind::Colon);
        if !is_directive {
            return Ok(def);
        }
        self.pos += 1; // prql
        while let Some(TokenKind::Ident(_)) = self.peek() {
            let (key, _) = self.expect_ident("directive key")?;
            self.expect(&TokenKind::Colon, "`:` after directive key")?;
            let value = match self.peek() {
                Some(TokenKind::Str(_)) => match self.advance().map(|t| t.kind) {
                    Some(TokenKind::Str(s)) => s,
                    _ => unreachable!(),
                },
                _ => self.parse_ident_path()?.join("."),
            };
            if key == "target" {
                def.target = Some(value);
            }
        }
        if !self.at_end() {
            self.expect(&TokenKind::NewLine, "newline after `prql` directive")?;
        }
        Ok(def)
    }

    /// `let add_one = x -> x + 1`
    fn parse_func_def(&mut self) -> Result<FuncDef, CompileError> {
        self.pos += 1; // let
        let (name, _) = self.expect_ident("function name after `let`")?;
        self.expect(&TokenKind::Assign, "`=` after function name")?;
        let mut params = Vec::new();
        while let Some(TokenKind::Ident(_)) = self.peek() {
            let (param, _) = self.expect_ident("parameter")?;
            params.push(param);
        }
        self.expect(&TokenKind::Arrow, "`->` after function parameters")?;
        let body = self.parse_expr()?;
        Ok(FuncDef { name, params, body })
    }

    fn parse_pipeline(&mut self, nested: bool) -> Result<Pipeline, CompileError> {
        let mut transforms = Vec::new();
        loop {
            self.skip_separators();
            if self.at_end() || (nested && self.peek() == Some(&TokenKind::RParen)) {
                break;
            }
            // `let` statements terminate the current pipeline
            if !nested && self.peek() == Some(&TokenKind::Ident("let".into())) {
                break;
            }
            transforms.push(self.parse_transform()?);
            if !self.at_separator_or_end() {
                return Err(CompileError::parse(
                    "expected end of transform",
                    self.current_span(),
                ));
            }
        }
        Ok(Pipeline { transforms })
    }

    // ------------------------------------------------------------------
    // transforms
    // ------------------------------------------------------------------

    fn parse_transform(&mut self) -> Result<Transform, CompileError> {
        let (name, span) = self.expect_ident("transform name")?;
        match name.as_str() {
            "from" => Ok(Transform::From(self.parse_table_ref()?)),
            "select" => Ok(Transform::Select(self.parse_tuple_or_single()?)),
            "derive" => Ok(Transform::Derive(self.parse_tuple_or_single()?)),
            "aggregate" => Ok(Transform::Aggregate(self.parse_tuple_or_single()?)),
            "filter" => Ok(Transform::Filter(self.parse_expr()?)),
            "group" => self.parse_group(),
            "join" => self.parse_join(),
            "sort" => Ok(Transform::Sort(self.parse_sort_items()?)),
            "take" => Ok(Transform::Take(self.parse_expr()?)),
            "window" => self.parse_window(),
            other => Err(CompileError::parse(
                format!("unknown transform `{other}`"),
                Some(span),
            )),
        }
    }

    fn parse_table_ref(&mut self) -> Result<TableRef, CompileError> {
        let (first, _) = self.expect_ident("table name")?;
        if self.eat(&TokenKind::Assign) {
            let name = self.parse_ident_path()?.join(".");
            Ok(TableRef {
                name,
                alias: Some(first),
            })
        } else {
            let mut parts = vec![first];
            while self.eat(&TokenKind::Dot) {
                let (part, _) = self.expect_ident("identifier after `.`")?;
                parts.push(part);
            }
            Ok(TableRef {
                name: parts.join("."),
                alias: None,
            })
        }
    }

    fn parse_group(&mut self) -> Result<Transform, CompileError> {
        let keys = if self.peek() == Some(&TokenKind::LBrace) {
            self.parse_tuple()?
        } else {
            // a bare key must not swallow the `(...)` sub-pipeline as a call
            vec![self.parse_ident_expr()?]
        };
        self.expect(&TokenKind::LParen, "`(` before group pipeline")?;
        let pipeline = self.parse_pipeline(true)?;
        self.expect(&TokenKind::RParen, "`)` after group pipeline")?;
        Ok(Transform::Group { keys, pipeline })
    }

    fn parse_join(&mut self) -> Result<Transform, CompileError> {
        let mut side = JoinSide::Inner;
        if self.peek() == Some(&TokenKind::Ident("side".into()))
            && self.peek_at(1) == Some(&TokenKind::Colon)
        {
            self.pos += 2;
            let (value, value_span) = self.expect_ident("join side")?;
            side = match value.as_str() {
                "inner" => JoinSide::Inner,
                "left" => JoinSide::Left,
                "right" => JoinSide::Right,
                "full" => JoinSide::Full,
                other => {
                    return Err(CompileError::parse(
                        format!("invalid join side `{other}`"),
                        Some(value_span),
                    ))
                }
            };
        }
        let with = self.parse_table_ref()?;
        self.expect(&TokenKind::LParen, "`(` before join condition")?;
        let condition = if self.eat(&TokenKind::Eq) {
            let (column, _) = self.expect_ident("column name after `==`")?;
            JoinCondition::Eq(column)
        } else {
            JoinCondition::On(self.parse_expr()?)
        };
        self.expect(&TokenKind::RParen, "`)` after join condition")?;
        Ok(Transform::Join {
            side,
            with,
            condition,
        })
    }

    fn parse_sort_items(&mut self) -> Result<Vec<SortItem>, CompileError> {
        if self.peek() == Some(&TokenKind::LBrace) {
            self.pos += 1;
            let mut items = Vec::new();
            loop {
                self.skip_newlines();
                if self.eat(&TokenKind::RBrace) {
                    break;
                }
                items.push(self.parse_sort_item()?);
                self.skip_newlines();
                if !self.eat(&TokenKind::Comma) {
                    self.skip_newlines();
                    self.expect(&TokenKind::RBrace, "`}` after sort items")?;
                    break;
                }
            }
            Ok(items)
        } else {
            Ok(vec![self.parse_sort_item()?])
        }
    }

    fn parse_sort_item(&mut self) -> Result<SortItem, CompileError> {
        let direction = if self.eat(&TokenKind::Minus) {
            SortDirection::Desc
        } else {
            self.eat(&TokenKind::Plus);
            SortDirection::Asc
        };
        let expr = self.parse_expr()?;
        Ok(SortItem { expr, direction })
    }

    fn parse_window(&mut self) -> Result<Transform, CompileError> {
        let mut rows = None;
        while let (Some(TokenKind::Ident(key)), Some(TokenKind::Colon)) =
            (self.peek(), self.peek_at(1))
        {
            let key = key.clone();
            self.pos += 2;
            let value = self.parse_expr()?;
            match key.as_str() {
                "rows" => rows = Some(value),
                other => {
                    return Err(CompileError::parse(
                        format!("unknown window argument `{other}`"),
                        value.span,
                    ))
                }
            }
        }
        self.expect(&TokenKind::LParen, "`(` before window pipeline")?;
        let pipeline = self.parse_pipeline(true)?;
        self.expect(&TokenKind::RParen, "`)` after window pipeline")?;
        Ok(Transform::Window { rows, pipeline })
    }

    // ------------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------------

    /// Tuple `{a, b = expr, ...}` or a single expression.
    fn parse_tuple_or_single(&mut self) -> Result<Vec<Expr>, CompileError> {
        if self.peek() == Some(&TokenKind::LBrace) {
            self.parse_tuple()
        } else {
            Ok(vec![self.parse_tuple_item()?])
        }
    }

    fn parse_tuple(&mut self) -> Result<Vec<Expr>, CompileError> {
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut items = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat(&TokenKind::RBrace) {
                break;
            }
            items.push(self.parse_tuple_item()?);
            self.skip_newlines();
            if !self.eat(&TokenKind::Comma) {
                self.skip_newlines();
                self.expect(&TokenKind::RBrace, "`}` after tuple items")?;
                break;
            }
        }
        Ok(items)
    }

    fn parse_tuple_item(&mut self) -> Result<Expr, CompileError> {
        if let (Some(TokenKind::Ident(name)), Some(TokenKind::Assign)) =
            (self.peek(), self.peek_at(1))
        {
            let name = name.clone();
            let start = self.tokens[self.pos].span;
            self.pos += 2;
            let expr = self.parse_expr()?;
            let span = merge_spans(Some(start), expr.span);
            return Ok(Expr::new(
                ExprKind::Assign {
                    name,
                    expr: Box::new(expr),
                },
                span,
            ));
        }
        self.parse_expr()
    }

    pub(super) fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_range()
    }

    fn parse_range(&mut self) -> Result<Expr, CompileError> {
        if self.peek() == Some(&TokenKind::DotDot) {
            let start_span = self.tokens[self.pos].span;
            self.pos += 1;
            let end = self.parse_range_bound()?;
            let span = merge_spans(Some(start_span), end.as_ref().and_then(|e| e.span));
            return Ok(Expr::new(
                ExprKind::Range {
                    start: None,
                    end: end.map(Box::new),
                },
                span,
            ));
        }
        let expr = self.parse_or()?;
        if self.peek() == Some(&TokenKind::DotDot) {
            self.pos += 1;
            let end = self.parse_range_bound()?;
            let span = merge_spans(expr.span, end.as_ref().and_then(|e| e.span).or(expr.span));
            return Ok(Expr::new(
                ExprKind::Range {
                    start: Some(Box::new(expr)),
                    end: end.map(Box::new),
                },
                span,
            ));
        }
        Ok(expr)
    }

    /// A range bound is a tight expression (or absent, as in `take 3..`).
    fn parse_range_bound(&mut self) -> Result<Option<Expr>, CompileError> {
        match self.peek() {
            Some(TokenKind::Int(_))
            | Some(TokenKind::Float(_))
            | Some(TokenKind::Ident(_))
            | Some(TokenKind::Minus) => Ok(Some(self.parse_unary()?)),
            _ => Ok(None),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&TokenKind::Ident("or".into())) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = binary(left, BinOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&TokenKind::Ident("and".into())) {
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = binary(left, BinOp::And, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_coalesce()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Eq) => BinOp::Eq,
                Some(TokenKind::NotEq) => BinOp::NotEq,
                Some(TokenKind::Lt) => BinOp::Lt,
                Some(TokenKind::LtEq) => BinOp::LtEq,
                Some(TokenKind::Gt) => BinOp::Gt,
                Some(TokenKind::GtEq) => BinOp::GtEq,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_coalesce()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_coalesce(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_additive()?;
        while self.eat(&TokenKind::Coalesce) {
            let right = self.parse_additive()?;
            left = binary(left, BinOp::Coalesce, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                Some(TokenKind::Percent) => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek() {
            Some(TokenKind::Minus) => Some(UnOp::Neg),
            Some(TokenKind::Not) => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let op_span = self.tokens[self.pos].span;
            self.pos += 1;
            let expr = self.parse_unary()?;
            let span = merge_spans(Some(op_span), expr.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
                span,
            ));
        }
        self.parse_call()
    }

    /// An identifier path, optionally applied to whitespace-separated
    /// arguments: `average salary`, `round 2 total`, `count this`.
    fn parse_call(&mut self) -> Result<Expr, CompileError> {
        if !matches!(self.peek(), Some(TokenKind::Ident(_))) {
            return self.parse_primary();
        }
        let path_expr = self.parse_ident_expr()?;

        // literals masquerading as identifiers never take arguments
        if !matches!(path_expr.kind, ExprKind::Ident(_)) {
            return Ok(path_expr);
        }

        if !self.at_arg_start() {
            return Ok(path_expr);
        }

        let name = match &path_expr.kind {
            ExprKind::Ident(parts) => parts.join("."),
            _ => unreachable!(),
        };
        let mut args = Vec::new();
        let mut named_args = Vec::new();
        let mut last_span = path_expr.span;
        while self.at_arg_start() {
            if let (Some(TokenKind::Ident(key)), Some(TokenKind::Colon)) =
                (self.peek(), self.peek_at(1))
            {
                let key = key.clone();
                self.pos += 2;
                let value = self.parse_arg()?;
                last_span = value.span.or(last_span);
                named_args.push((key, value));
            } else {
                let value = self.parse_arg()?;
                last_span = value.span.or(last_span);
                args.push(value);
            }
        }
        let span = merge_spans(path_expr.span, last_span);
        Ok(Expr::new(
            ExprKind::FuncCall {
                name,
                args,
                named_args,
            },
            span,
        ))
    }

    fn at_arg_start(&self) -> bool {
        match self.peek() {
            // `and`/`or` are infix operators, never arguments
            Some(TokenKind::Ident(name)) => name != "and" && name != "or",
            Some(TokenKind::Int(_))
            | Some(TokenKind::Float(_))
            | Some(TokenKind::Str(_))
            | Some(TokenKind::Date(_))
            | Some(TokenKind::Interp { .. })
            | Some(TokenKind::LParen) => true,
            _ => false,
        }
    }

    /// One function argument: a primary expression (parenthesize for more).
    fn parse_arg(&mut self) -> Result<Expr, CompileError> {
        if matches!(self.peek(), Some(TokenKind::Ident(_))) {
            self.parse_ident_expr()
        } else {
            self.parse_primary()
        }
    }

    /// A bare dotted identifier path, as used by table names and directive
    /// values.
    fn parse_ident_path(&mut self) -> Result<Vec<String>, CompileError> {
        let (first, _) = self.expect_ident("identifier")?;
        let mut parts = vec![first];
        while self.eat(&TokenKind::Dot) {
            let (part, _) = self.expect_ident("identifier after `.`")?;
            parts.push(part);
        }
        Ok(parts)
    }

    /// A dotted identifier path (`t.col`) with literal keywords recognized.
    fn parse_ident_expr(&mut self) -> Result<Expr, CompileError> {
        let (first, first_span) = self.expect_ident("identifier")?;
        match first.as_str() {
            "true" => {
                return Ok(Expr::new(
                    ExprKind::Literal(Literal::Boolean(true)),
                    Some(first_span),
                ))
            }
            "false" => {
                return Ok(Expr::new(
                    ExprKind::Literal(Literal::Boolean(false)),
                    Some(first_span),
                ))
            }
            "null" => {
                return Ok(Expr::new(
                    ExprKind::Literal(Literal::Null),
                    Some(first_span),
                ))
            }
            _ => {}
        }
        let mut parts = vec![first];
        let mut end_span = first_span;
        while self.eat(&TokenKind::Dot) {
            let (part, part_span) = self.expect_ident("identifier after `.`")?;
            parts.push(part);
            end_span = part_span;
        }
        Ok(Expr::new(
            ExprKind::Ident(parts),
            Some(Span::new(first_span.start, end_span.end)),
        ))
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let token = self.advance().ok_or_else(|| {
            CompileError::parse("unexpected end of input", self.current_span())
        })?;
        let span = Some(token.span);
        match token.kind {
            TokenKind::Int(v) => Ok(Expr::new(ExprKind::Literal(Literal::Integer(v)), span)),
            TokenKind::Float(v) => Ok(Expr::new(ExprKind::Literal(Literal::Float(v)), span)),
            TokenKind::Str(v) => Ok(Expr::new(ExprKind::Literal(Literal::String(v)), span)),
            TokenKind::Date(v) => Ok(Expr::new(ExprKind::Literal(Literal::Date(v)), span)),
            TokenKind::Ident(_) => {
                self.pos -= 1;
                self.parse_ident_expr()
            }
            TokenKind::Interp {
                prefix,
                body,
                body_offset,
            } => {
                let items = parse_interpolation(&body, body_offset)?;
                let kind = if prefix == 'f' {
                    ExprKind::FString(items)
                } else {
                    ExprKind::SString(items)
                };
                Ok(Expr::new(kind, span))
            }
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                let close = self.expect(&TokenKind::RParen, "`)`")?;
                Ok(Expr::new(
                    ExprKind::Nested(Box::new(inner)),
                    Some(Span::new(token.span.start, close.end)),
                ))
            }
            other => Err(CompileError::parse(
                format!("unexpected token {other:?}"),
                span,
            )),
        }
    }
}

fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    let span = merge_spans(left.span, right.span);
    Expr::new(
        ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

fn merge_spans(a: Option<Span>, b: Option<Span>) -> Option<Span> {
    match (a, b) {
        (Some(a), Some(b)) => Some(Span::new(a.start.min(b.start), a.end.max(b.end))),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

/// Split an f/s-string body into literal fragments and `{expr}` slots.
/// `{{` and `}}` escape literal braces.
fn parse_interpolation(
    body: &str,
    body_offset: usize,
) -> Result<Vec<InterpolateItem>, CompileError> {
    let mut items = Vec::new();
    let mut literal = String::new();
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                literal.push('{');
                i += 2;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                literal.push('}');
                i += 2;
            }
            b'{' => {
                let close = body[i + 1..].find('}').ok_or_else(|| {
                    CompileError::parse(
                        "unterminated `{` in interpolated string",
                        Some(Span::new(body_offset + i, body_offset + body.len())),
                    )
                })? + i + 1;
                if !literal.is_empty() {
                    items.push(InterpolateItem::String(std::mem::take(&mut literal)));
                }
                let fragment = &body[i + 1..close];
                let expr = parse_fragment(fragment, body_offset + i + 1)?;
                items.push(InterpolateItem::Expr(Box::new(expr)));
                i = close + 1;
            }
            _ => {
                let c_len = utf8_len(bytes[i]);
                literal.push_str(&body[i..i + c_len]);
                i += c_len;
            }
        }
    }
    if !literal.is_empty() {
        items.push(InterpolateItem::String(literal));
    }
    Ok(items)
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b & 0xE0 == 0xC0 => 2,
        b if b & 0xF0 == 0xE0 => 3,
        _ => 4,
    }
}
