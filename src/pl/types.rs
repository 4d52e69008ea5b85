//! Pipeline-language (PL) AST types.
//!
//! PL is the parsed, not-yet-resolved representation of a query: an ordered
//! sequence of transforms, each consuming the output of the previous one.
//! The AST is owned exclusively by the compilation call that produced it and
//! is designed to be:
//! - Order-preserving (transform order is semantically meaningful)
//! - Serializable (the PL JSON form is the per-stage interchange format)
//! - Span-tracked (every expression remembers where it came from)

use serde::{Deserialize, Serialize};

use crate::error::Span;

/// A parsed query: an optional header directive plus statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub def: QueryDef,
    pub stmts: Vec<Stmt>,
}

/// Header information from the leading `prql target:<name>` directive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryDef {
    /// Default target dialect, overridden by an explicit
    /// `CompileOptions::target`.
    pub target: Option<String>,
}

/// A top-level statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `let name = p1 p2 -> expr` — a pipeline-local function definition.
    FuncDef(FuncDef),
    /// The main pipeline of the query.
    Main(Pipeline),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
}

/// A strictly ordered sequence of transforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub transforms: Vec<Transform>,
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transform {
    /// `from employees` or `from e = employees`
    From(TableRef),
    /// `select {a, b, x = expr}`
    Select(Vec<Expr>),
    /// `filter expr`
    Filter(Expr),
    /// `derive {x = expr, ...}`
    Derive(Vec<Expr>),
    /// `aggregate {s = sum salary}` (outside `group`: whole-relation)
    Aggregate(Vec<Expr>),
    /// `group {a, b} (aggregate {...})`
    Group { keys: Vec<Expr>, pipeline: Pipeline },
    /// `join side:left t (==id)` or `join t (t.id == other.id)`
    Join {
        side: JoinSide,
        with: TableRef,
        condition: JoinCondition,
    },
    /// `sort {-code, day}`
    Sort(Vec<SortItem>),
    /// `take 10` or `take 3..5`
    Take(Expr),
    /// `window rows:-2..0 (derive {...})`
    Window {
        rows: Option<Expr>,
        pipeline: Pipeline,
    },
}

/// A base-table reference, optionally aliased (`e = employees`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinSide {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JoinCondition {
    /// `(==col)` — equality on a same-named column from both relations.
    Eq(String),
    /// `(left.id == right.id)` — an arbitrary predicate.
    On(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortItem {
    pub expr: Expr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// An expression with its source span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Option<Span>) -> Self {
        Expr { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Possibly dotted reference: `salary`, `employees.salary`.
    Ident(Vec<String>),
    Literal(Literal),
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    /// Whitespace-applied call: `average salary`, `round 2 total`.
    FuncCall {
        name: String,
        args: Vec<Expr>,
        named_args: Vec<(String, Expr)>,
    },
    /// `f"hello {name}"` — interpolation compiled to string concatenation.
    FString(Vec<InterpolateItem>),
    /// `s"version()"` — raw passthrough; fragments are never re-interpreted.
    SString(Vec<InterpolateItem>),
    /// `a..b`, `a..`, `..b`
    Range {
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    /// `alias = expr` inside a tuple.
    Assign { name: String, expr: Box<Expr> },
    /// Parenthesized expression.
    Nested(Box<Expr>),
}

/// One fragment of an interpolated (f/s) string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InterpolateItem {
    String(String),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// `@2011-02-01`, validated during lexing.
    Date(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// `??`
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_order_is_preserved() {
        let p = Pipeline {
            transforms: vec![
                Transform::From(TableRef {
                    name: "users".into(),
                    alias: None,
                }),
                Transform::Take(Expr::new(ExprKind::Literal(Literal::Integer(3)), None)),
            ],
        };
        assert!(matches!(p.transforms[0], Transform::From(_)));
        assert!(matches!(p.transforms[1], Transform::Take(_)));
    }

    #[test]
    fn test_expr_json_round_trip() {
        let expr = Expr::new(
            ExprKind::Binary {
                left: Box::new(Expr::new(ExprKind::Ident(vec!["age".into()]), None)),
                op: BinOp::Gt,
                right: Box::new(Expr::new(ExprKind::Literal(Literal::Integer(18)), None)),
            },
            Some(Span::new(0, 8)),
        );
        let json = serde_json::to_string(&expr).unwrap();
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(expr, back);
    }

    #[test]
    fn test_span_is_omitted_when_absent() {
        let expr = Expr::new(ExprKind::Literal(Literal::Null), None);
        let json = serde_json::to_string(&expr).unwrap();
        assert!(!json.contains("span"));
    }
}
