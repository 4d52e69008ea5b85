//! Relational-query (RQ) IR types.
//!
//! RQ is the resolved, dialect-independent form of a query: one relation
//! built by an ordered pipeline of relational operators. All columns live in
//! a single index-addressed arena on the query (`columns`); operators and
//! expressions refer to them by [`ColumnId`]. The resolver guarantees that
//! every reference points to a column introduced by an *earlier* operator in
//! the pipeline — [`validate`](super::validate::validate) checks this
//! structurally. RQ is immutable once produced; the generator only reads it.

use serde::{Deserialize, Serialize};

pub use crate::pl::types::{BinOp, JoinSide, Literal, QueryDef, SortDirection, UnOp};

/// Index into [`Query::columns`].
pub type ColumnId = usize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub def: QueryDef,
    /// Arena of every column the pipeline mentions.
    pub columns: Vec<ColumnDecl>,
    /// Ordered relational operators, source first.
    pub pipeline: Vec<Transform>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnDecl {
    /// The as-yet-unenumerated column set of a base table (`table.*`).
    Wildcard { table: String },
    /// A named column, optionally qualified by its owning table.
    Named {
        name: String,
        table: Option<String>,
    },
    /// An anonymous computed column.
    Expr,
}

impl ColumnDecl {
    pub fn name(&self) -> Option<&str> {
        match self {
            ColumnDecl::Named { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transform {
    /// Base table scan. Introduces `columns`.
    Source {
        table: String,
        alias: Option<String>,
        columns: Vec<ColumnId>,
    },
    /// Projection to exactly the listed columns.
    Select(Vec<ColumnId>),
    /// Row predicate over the current relation.
    Filter(Expr),
    /// A derived column. `window` is set when the expression must render
    /// with an `OVER` clause.
    Compute {
        column: ColumnId,
        expr: Expr,
        window: Option<WindowSpec>,
    },
    /// Grouped (or whole-relation, when `by` is empty) aggregation.
    /// Replaces the relation with `by` + the computed columns.
    Aggregate {
        by: Vec<ColumnId>,
        computed: Vec<(ColumnId, Expr)>,
    },
    /// Merge another base table into the relation. Introduces `columns`;
    /// `on` may reference both operands' columns.
    Join {
        side: JoinSide,
        table: String,
        alias: Option<String>,
        columns: Vec<ColumnId>,
        on: Expr,
    },
    Sort(Vec<SortColumn>),
    /// Pagination. When both are present, `offset` applies before `limit`.
    Take {
        offset: Option<i64>,
        limit: Option<i64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortColumn {
    pub expr: Expr,
    pub direction: SortDirection,
}

/// `OVER (...)` shape for window computes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WindowSpec {
    pub order_by: Vec<SortColumn>,
    pub rows: Option<FrameBounds>,
}

/// `ROWS BETWEEN` bounds; `None` means unbounded on that side. Negative
/// offsets precede the current row, positive ones follow it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameBounds {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    ColumnRef(ColumnId),
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
    /// A resolved SQL function call, e.g. `AVG`, `ROW_NUMBER`.
    Call { func: String, args: Vec<Expr> },
    /// `*`, as in `COUNT(*)`.
    Star,
    /// Interpolation compiled to string concatenation.
    FString(Vec<InterpolateItem>),
    /// Raw passthrough; string fragments are emitted verbatim.
    SString(Vec<InterpolateItem>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InterpolateItem {
    String(String),
    Expr(Box<Expr>),
}
