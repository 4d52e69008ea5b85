//! Render tree for one SQL statement.
//!
//! The generator lowers the RQ pipeline into this clause-per-field shape;
//! the compact renderer and the pretty formatter then only arrange text.
//! Expressions are already rendered to strings at this point — only the
//! statement structure (and subquery nesting) remains.

#[derive(Debug, Clone, Default)]
pub struct SqlSelect {
    /// `TOP (n)` in the projection clause (dialect-dependent).
    pub top: Option<i64>,
    pub projection: Vec<ProjectionItem>,
    pub from: Option<SqlFrom>,
    /// Fully rendered join clauses, e.g. `LEFT JOIN b ON a.id = b.a_id`.
    pub joins: Vec<String>,
    pub where_clause: Option<String>,
    pub group_by: Vec<String>,
    pub having: Option<String>,
    /// Rendered order expressions, e.g. `age DESC`.
    pub order_by: Vec<String>,
    /// `LIMIT n` / `OFFSET m`
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// ANSI pagination: `OFFSET m ROWS` / `FETCH FIRST n ROWS ONLY`
    pub offset_rows: Option<i64>,
    pub fetch_first: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ProjectionItem {
    pub sql: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SqlFrom {
    Table {
        name: String,
        alias: Option<String>,
    },
    Subquery {
        query: Box<SqlSelect>,
        alias: String,
    },
}

impl ProjectionItem {
    pub fn bare(sql: impl Into<String>) -> Self {
        ProjectionItem {
            sql: sql.into(),
            alias: None,
        }
    }

    pub fn aliased(sql: impl Into<String>, alias: impl Into<String>) -> Self {
        ProjectionItem {
            sql: sql.into(),
            alias: Some(alias.into()),
        }
    }
}
