//! RQ → SQL lowering and the compact renderer.
//!
//! A single bottom-up pass over the RQ pipeline folds operators into one
//! [`SqlSelect`]. When an operator cannot be merged into the statement built
//! so far (a filter over a paginated relation, an aggregate over an already
//! projected one), the statement is finished and nested as a subquery, and
//! folding continues on the outer level. Computed columns are inlined into
//! the expressions that reference them, so `WHERE`/`HAVING`/`ORDER BY` never
//! mention projection aliases.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::CompileError;
use crate::rq;
use crate::rq::{ColumnDecl, ColumnId};

use super::dialect::{DialectDescriptor, Pagination};
use super::types::{ProjectionItem, SqlFrom, SqlSelect};

/// Lower a validated RQ query into a render tree for `dialect`.
pub fn lower(
    query: &rq::Query,
    dialect: &'static DialectDescriptor,
) -> Result<SqlSelect, CompileError> {
    let mut generator = Generator {
        columns: &query.columns,
        dialect,
        select: SqlSelect::default(),
        inline: HashMap::new(),
        window_sql: HashMap::new(),
        window_ids: HashSet::new(),
        derives: Vec::new(),
        tables_here: Vec::new(),
        has_aggregate: false,
        projected: false,
        pending_offset: None,
        pending_limit: None,
        subquery_counter: 0,
    };
    generator.fold(&query.pipeline)?;
    generator.finalize_projection()?;
    generator.apply_pagination();
    debug!(dialect = dialect.name, "lowered relation");
    Ok(generator.select)
}

struct Generator<'a> {
    columns: &'a [ColumnDecl],
    dialect: &'static DialectDescriptor,
    select: SqlSelect,
    /// Expressions of columns computed at the current nesting level,
    /// substituted into later references.
    inline: HashMap<ColumnId, rq::Expr>,
    /// Fully rendered window expressions (they carry an `OVER` clause and
    /// are never re-derived from the expression tree).
    window_sql: HashMap<ColumnId, String>,
    window_ids: HashSet<ColumnId>,
    /// Computed columns awaiting the default `*`-projection.
    derives: Vec<ColumnId>,
    /// Table references visible at the current level; more than one means
    /// column references render qualified.
    tables_here: Vec<String>,
    has_aggregate: bool,
    projected: bool,
    pending_offset: Option<i64>,
    pending_limit: Option<i64>,
    subquery_counter: usize,
}

impl<'a> Generator<'a> {
    fn fold(&mut self, pipeline: &[rq::Transform]) -> Result<(), CompileError> {
        for transform in pipeline {
            match transform {
                rq::Transform::Source {
                    table,
                    alias,
                    columns: _,
                } => {
                    if self.select.from.is_some() {
                        return Err(CompileError::generate(
                            "relation has more than one source",
                        ));
                    }
                    self.select.from = Some(SqlFrom::Table {
                        name: quote_ident(table, self.dialect),
                        alias: alias.as_deref().map(|a| quote_ident(a, self.dialect)),
                    });
                    self.tables_here
                        .push(alias.clone().unwrap_or_else(|| table.clone()));
                }
                rq::Transform::Compute {
                    column,
                    expr,
                    window,
                } => self.fold_compute(*column, expr, window)?,
                rq::Transform::Filter(expr) => self.fold_filter(expr)?,
                rq::Transform::Select(ids) => self.fold_select(ids)?,
                rq::Transform::Aggregate { by, computed } => self.fold_aggregate(by, computed)?,
                rq::Transform::Join {
                    side,
                    table,
                    alias,
                    columns: _,
                    on,
                } => self.fold_join(*side, table, alias.as_deref(), on)?,
                rq::Transform::Sort(items) => self.fold_sort(items)?,
                rq::Transform::Take { offset, limit } => {
                    if self.has_pagination() {
                        self.nest()?;
                    }
                    self.pending_offset = *offset;
                    self.pending_limit = *limit;
                }
            }
        }
        Ok(())
    }

    fn fold_compute(
        &mut self,
        column: ColumnId,
        expr: &rq::Expr,
        window: &Option<rq::WindowSpec>,
    ) -> Result<(), CompileError> {
        if window.is_some() && self.has_pagination() {
            // window functions evaluate before LIMIT; keep the pagination
            // inside a subquery so they only see the taken rows
            self.nest()?;
        }
        match window {
            Some(spec) => {
                let base = self.render_expr(expr, 0)?;
                let over = self.render_over(spec)?;
                let sql = format!("{base} OVER ({over})");
                self.window_sql.insert(column, sql);
                self.window_ids.insert(column);
            }
            None => {
                self.inline.insert(column, expr.clone());
            }
        }
        if self.projected {
            let item = self.projection_item(column)?;
            self.select.projection.push(item);
        } else {
            self.derives.push(column);
        }
        Ok(())
    }

    fn fold_filter(&mut self, expr: &rq::Expr) -> Result<(), CompileError> {
        if self.has_pagination() || self.references_window(expr) {
            self.nest()?;
        }
        let condition = self.render_expr(expr, 0)?;
        let slot = if self.has_aggregate {
            &mut self.select.having
        } else {
            &mut self.select.where_clause
        };
        *slot = Some(match slot.take() {
            Some(existing) => format!("{existing} AND {condition}"),
            None => condition,
        });
        Ok(())
    }

    fn fold_select(&mut self, ids: &[ColumnId]) -> Result<(), CompileError> {
        let mut items = Vec::new();
        for &id in ids {
            items.push(self.projection_item(id)?);
        }
        self.select.projection = items;
        self.derives.clear();
        self.projected = true;
        Ok(())
    }

    fn fold_aggregate(
        &mut self,
        by: &[ColumnId],
        computed: &[(ColumnId, rq::Expr)],
    ) -> Result<(), CompileError> {
        if self.projected || self.has_aggregate || self.has_pagination()
            || !self.window_sql.is_empty()
        {
            self.nest()?;
        }
        let mut projection = Vec::new();
        let mut group_by = Vec::new();
        for &id in by {
            group_by.push(self.render_expr(&rq::Expr::ColumnRef(id), 0)?);
            // a derived key keeps its alias in the projection
            projection.push(self.projection_item(id)?);
        }
        for (id, expr) in computed {
            let sql = self.render_expr(expr, 0)?;
            let item = match self.columns[*id].name() {
                Some(name) => ProjectionItem::aliased(sql, quote_ident(name, self.dialect)),
                None => ProjectionItem::bare(sql),
            };
            projection.push(item);
            self.inline.insert(*id, expr.clone());
        }
        self.select.projection = projection;
        self.select.group_by = group_by;
        self.derives.clear();
        self.has_aggregate = true;
        self.projected = true;
        Ok(())
    }

    fn fold_join(
        &mut self,
        side: rq::JoinSide,
        table: &str,
        alias: Option<&str>,
        on: &rq::Expr,
    ) -> Result<(), CompileError> {
        if self.projected || self.has_aggregate || self.has_pagination() {
            self.nest()?;
        }
        if self.select.from.is_none() {
            return Err(CompileError::generate(
                "join requires a source relation",
            ));
        }
        self.tables_here
            .push(alias.map(str::to_string).unwrap_or_else(|| table.to_string()));
        let keyword = match side {
            rq::JoinSide::Inner => "JOIN",
            rq::JoinSide::Left => "LEFT JOIN",
            rq::JoinSide::Right => "RIGHT JOIN",
            rq::JoinSide::Full => "FULL JOIN",
        };
        let mut clause = format!("{keyword} {}", quote_ident(table, self.dialect));
        if let Some(alias) = alias {
            clause.push_str(&format!(" AS {}", quote_ident(alias, self.dialect)));
        }
        clause.push_str(&format!(" ON {}", self.render_expr(on, 0)?));
        self.select.joins.push(clause);
        Ok(())
    }

    fn fold_sort(&mut self, items: &[rq::SortColumn]) -> Result<(), CompileError> {
        if self.has_pagination() {
            self.nest()?;
        }
        let mut rendered = Vec::new();
        for item in items {
            rendered.push(self.render_sort_column(item)?);
        }
        self.select.order_by = rendered;
        Ok(())
    }

    fn render_sort_column(&self, item: &rq::SortColumn) -> Result<String, CompileError> {
        let sql = self.render_expr(&item.expr, 0)?;
        Ok(match item.direction {
            rq::SortDirection::Asc => sql,
            rq::SortDirection::Desc => format!("{sql} DESC"),
        })
    }

    // ------------------------------------------------------------------
    // statement boundaries
    // ------------------------------------------------------------------

    fn has_pagination(&self) -> bool {
        self.pending_offset.is_some() || self.pending_limit.is_some()
    }

    /// Finish the statement built so far and continue on an outer SELECT
    /// with the finished one as its FROM.
    fn nest(&mut self) -> Result<(), CompileError> {
        self.finalize_projection()?;
        self.apply_pagination();
        let alias = format!("table_{}", self.subquery_counter);
        self.subquery_counter += 1;
        let inner = std::mem::take(&mut self.select);
        self.select.from = Some(SqlFrom::Subquery {
            query: Box::new(inner),
            alias,
        });
        self.inline.clear();
        self.window_sql.clear();
        self.window_ids.clear();
        self.derives.clear();
        self.tables_here.clear();
        self.has_aggregate = false;
        self.projected = false;
        Ok(())
    }

    /// Default projection when no `select`/`aggregate` fixed one: `*` plus
    /// any derived columns.
    fn finalize_projection(&mut self) -> Result<(), CompileError> {
        if self.projected {
            return Ok(());
        }
        let mut items = vec![ProjectionItem::bare("*")];
        let derives = std::mem::take(&mut self.derives);
        for id in derives {
            items.push(self.projection_item(id)?);
        }
        self.select.projection = items;
        self.projected = true;
        Ok(())
    }

    fn apply_pagination(&mut self) {
        let offset = self.pending_offset.take();
        let limit = self.pending_limit.take();
        if offset.is_none() && limit.is_none() {
            return;
        }
        match self.dialect.pagination {
            Pagination::LimitOffset => {
                self.select.limit = limit;
                self.select.offset = offset;
            }
            Pagination::Top => {
                if offset.is_none() {
                    self.select.top = limit;
                } else {
                    self.offset_fetch(offset, limit);
                }
            }
            Pagination::OffsetFetch => {
                self.offset_fetch(offset.or(Some(0)), limit);
            }
        }
    }

    /// ANSI `OFFSET … ROWS FETCH FIRST … ROWS ONLY`. FETCH is only valid
    /// after ORDER BY, so an arbitrary stable ordering is injected when the
    /// query has none.
    fn offset_fetch(&mut self, offset: Option<i64>, limit: Option<i64>) {
        if limit.is_some() && self.select.order_by.is_empty() {
            self.select.order_by.push("(SELECT NULL)".to_string());
        }
        self.select.offset_rows = offset.or(if limit.is_some() { Some(0) } else { None });
        self.select.fetch_first = limit;
    }

    // ------------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------------

    fn projection_item(&self, id: ColumnId) -> Result<ProjectionItem, CompileError> {
        if let Some(sql) = self.window_sql.get(&id) {
            return Ok(match self.columns[id].name() {
                Some(name) => {
                    ProjectionItem::aliased(sql.clone(), quote_ident(name, self.dialect))
                }
                None => ProjectionItem::bare(sql.clone()),
            });
        }
        if let Some(expr) = self.inline.get(&id) {
            let sql = self.render_expr(expr, 0)?;
            return Ok(match self.columns[id].name() {
                Some(name) => ProjectionItem::aliased(sql, quote_ident(name, self.dialect)),
                None => ProjectionItem::bare(sql),
            });
        }
        Ok(ProjectionItem::bare(
            self.render_expr(&rq::Expr::ColumnRef(id), 0)?,
        ))
    }

    fn references_window(&self, expr: &rq::Expr) -> bool {
        match expr {
            rq::Expr::ColumnRef(id) => self.window_ids.contains(id),
            rq::Expr::Literal(_) | rq::Expr::Star => false,
            rq::Expr::Binary { left, right, .. } => {
                self.references_window(left) || self.references_window(right)
            }
            rq::Expr::Unary { expr, .. } => self.references_window(expr),
            rq::Expr::Call { args, .. } => args.iter().any(|a| self.references_window(a)),
            rq::Expr::FString(items) | rq::Expr::SString(items) => items.iter().any(|i| {
                matches!(i, rq::InterpolateItem::Expr(e) if self.references_window(e))
            }),
        }
    }

    fn render_expr(&self, expr: &rq::Expr, parent_prec: u8) -> Result<String, CompileError> {
        match expr {
            rq::Expr::ColumnRef(id) => self.render_column_ref(*id, parent_prec),
            rq::Expr::Literal(lit) => Ok(render_literal(lit)),
            rq::Expr::Star => Ok("*".to_string()),
            rq::Expr::Binary { left, op, right } => {
                if *op == rq::BinOp::Coalesce {
                    return Ok(format!(
                        "COALESCE({}, {})",
                        self.render_expr(left, 0)?,
                        self.render_expr(right, 0)?
                    ));
                }
                let prec = binop_prec(*op);
                let sql = format!(
                    "{} {} {}",
                    self.render_expr(left, prec)?,
                    binop_str(*op),
                    self.render_expr(right, prec + 1)?
                );
                Ok(parenthesize(sql, prec, parent_prec))
            }
            rq::Expr::Unary { op, expr } => match op {
                rq::UnOp::Neg => {
                    let sql = format!("-{}", self.render_expr(expr, UNARY_PREC)?);
                    Ok(parenthesize(sql, UNARY_PREC, parent_prec))
                }
                rq::UnOp::Not => {
                    let sql = format!("NOT {}", self.render_expr(expr, NOT_PREC + 1)?);
                    Ok(parenthesize(sql, NOT_PREC, parent_prec))
                }
            },
            rq::Expr::Call { func, args } => {
                let rendered = args
                    .iter()
                    .map(|a| self.render_expr(a, 0))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("{func}({})", rendered.join(", ")))
            }
            rq::Expr::FString(items) => self.render_fstring(items, parent_prec),
            rq::Expr::SString(items) => {
                let mut out = String::new();
                for item in items {
                    match item {
                        // passthrough fragments are opaque by contract
                        rq::InterpolateItem::String(s) => out.push_str(s),
                        rq::InterpolateItem::Expr(e) => out.push_str(&self.render_expr(e, 0)?),
                    }
                }
                Ok(out)
            }
        }
    }

    fn render_column_ref(&self, id: ColumnId, parent_prec: u8) -> Result<String, CompileError> {
        if let Some(sql) = self.window_sql.get(&id) {
            return Ok(format!("({sql})"));
        }
        if let Some(expr) = self.inline.get(&id) {
            return self.render_expr(expr, parent_prec);
        }
        let decl = self.columns.get(id).ok_or_else(|| {
            CompileError::generate(format!("column id {id} is out of bounds"))
        })?;
        match decl {
            ColumnDecl::Named { name, table } => {
                let qualify = self.tables_here.len() > 1
                    && table
                        .as_ref()
                        .is_some_and(|t| self.tables_here.contains(t));
                match (qualify, table) {
                    (true, Some(table)) => Ok(format!(
                        "{}.{}",
                        quote_ident(table, self.dialect),
                        quote_ident(name, self.dialect)
                    )),
                    _ => Ok(quote_ident(name, self.dialect)),
                }
            }
            ColumnDecl::Wildcard { table } => {
                if self.tables_here.len() > 1 {
                    Ok(format!("{}.*", quote_ident(table, self.dialect)))
                } else {
                    Ok("*".to_string())
                }
            }
            ColumnDecl::Expr => Err(CompileError::generate(format!(
                "column id {id} is anonymous and cannot be referenced here"
            ))),
        }
    }

    fn render_fstring(
        &self,
        items: &[rq::InterpolateItem],
        parent_prec: u8,
    ) -> Result<String, CompileError> {
        let mut pieces = Vec::new();
        for item in items {
            pieces.push(match item {
                rq::InterpolateItem::String(s) => string_literal(s),
                rq::InterpolateItem::Expr(e) => self.render_expr(e, 0)?,
            });
        }
        if self.dialect.has_concat_function {
            Ok(format!("CONCAT({})", pieces.join(", ")))
        } else {
            let sql = pieces.join(" || ");
            Ok(if parent_prec > 0 && pieces.len() > 1 {
                format!("({sql})")
            } else {
                sql
            })
        }
    }

    fn render_over(&self, spec: &rq::WindowSpec) -> Result<String, CompileError> {
        let mut parts = Vec::new();
        if !spec.order_by.is_empty() {
            let items = spec
                .order_by
                .iter()
                .map(|i| self.render_sort_column(i))
                .collect::<Result<Vec<_>, _>>()?;
            parts.push(format!("ORDER BY {}", items.join(", ")));
        }
        if let Some(bounds) = spec.rows {
            parts.push(format!(
                "ROWS BETWEEN {} AND {}",
                frame_bound(bounds.start, true),
                frame_bound(bounds.end, false)
            ));
        }
        Ok(parts.join(" "))
    }
}

const UNARY_PREC: u8 = 6;
const NOT_PREC: u8 = 2;

fn binop_prec(op: rq::BinOp) -> u8 {
    match op {
        rq::BinOp::Or => 1,
        rq::BinOp::And => 2,
        rq::BinOp::Eq
        | rq::BinOp::NotEq
        | rq::BinOp::Lt
        | rq::BinOp::LtEq
        | rq::BinOp::Gt
        | rq::BinOp::GtEq => 3,
        rq::BinOp::Add | rq::BinOp::Sub => 4,
        rq::BinOp::Mul | rq::BinOp::Div | rq::BinOp::Mod => 5,
        // rendered as COALESCE(), never as an infix operator
        rq::BinOp::Coalesce => 7,
    }
}

fn binop_str(op: rq::BinOp) -> &'static str {
    match op {
        rq::BinOp::Eq => "=",
        rq::BinOp::NotEq => "<>",
        rq::BinOp::Lt => "<",
        rq::BinOp::LtEq => "<=",
        rq::BinOp::Gt => ">",
        rq::BinOp::GtEq => ">=",
        rq::BinOp::And => "AND",
        rq::BinOp::Or => "OR",
        rq::BinOp::Add => "+",
        rq::BinOp::Sub => "-",
        rq::BinOp::Mul => "*",
        rq::BinOp::Div => "/",
        rq::BinOp::Mod => "%",
        rq::BinOp::Coalesce => unreachable!("coalesce renders as a function"),
    }
}

fn parenthesize(sql: String, prec: u8, parent_prec: u8) -> String {
    if prec < parent_prec {
        format!("({sql})")
    } else {
        sql
    }
}

fn frame_bound(bound: Option<i64>, is_start: bool) -> String {
    match bound {
        None if is_start => "UNBOUNDED PRECEDING".to_string(),
        None => "UNBOUNDED FOLLOWING".to_string(),
        Some(0) => "CURRENT ROW".to_string(),
        Some(n) if n < 0 => format!("{} PRECEDING", -n),
        Some(n) => format!("{n} FOLLOWING"),
    }
}

fn render_literal(lit: &rq::Literal) -> String {
    match lit {
        rq::Literal::Null => "NULL".to_string(),
        rq::Literal::Boolean(true) => "TRUE".to_string(),
        rq::Literal::Boolean(false) => "FALSE".to_string(),
        rq::Literal::Integer(v) => v.to_string(),
        rq::Literal::Float(v) => format!("{v}"),
        rq::Literal::String(s) => string_literal(s),
        rq::Literal::Date(d) => format!("DATE '{d}'"),
    }
}

fn string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn plain_ident(part: &str) -> bool {
    !part.is_empty()
        && !part.as_bytes()[0].is_ascii_digit()
        && part
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$')
}

/// Quote an identifier only when it needs it. Schema-qualified names keep
/// their dots unquoted as long as every part is plain.
pub(super) fn quote_ident(name: &str, dialect: &DialectDescriptor) -> String {
    let plain =
        plain_ident(name) || (name.contains('.') && name.split('.').all(plain_ident));
    if plain {
        name.to_string()
    } else {
        let q = dialect.ident_quote;
        let doubled = format!("{q}{q}");
        format!("{q}{}{q}", name.replace(q, &doubled))
    }
}

// ------------------------------------------------------------------
// compact rendering
// ------------------------------------------------------------------

/// Render a statement as a single line.
pub fn render_compact(select: &SqlSelect) -> String {
    let mut parts = Vec::new();

    let mut head = String::from("SELECT ");
    if let Some(top) = select.top {
        head.push_str(&format!("TOP ({top}) "));
    }
    let items: Vec<String> = select.projection.iter().map(projection_sql).collect();
    head.push_str(&items.join(", "));
    parts.push(head);

    if let Some(from) = &select.from {
        parts.push(format!("FROM {}", from_compact(from)));
    }
    for join in &select.joins {
        parts.push(join.clone());
    }
    if let Some(where_clause) = &select.where_clause {
        parts.push(format!("WHERE {where_clause}"));
    }
    if !select.group_by.is_empty() {
        parts.push(format!("GROUP BY {}", select.group_by.join(", ")));
    }
    if let Some(having) = &select.having {
        parts.push(format!("HAVING {having}"));
    }
    if !select.order_by.is_empty() {
        parts.push(format!("ORDER BY {}", select.order_by.join(", ")));
    }
    if let Some(limit) = select.limit {
        parts.push(format!("LIMIT {limit}"));
    }
    if let Some(offset) = select.offset {
        parts.push(format!("OFFSET {offset}"));
    }
    if let Some(offset_rows) = select.offset_rows {
        parts.push(format!("OFFSET {offset_rows} ROWS"));
    }
    if let Some(fetch_first) = select.fetch_first {
        parts.push(format!("FETCH FIRST {fetch_first} ROWS ONLY"));
    }

    parts.join(" ")
}

pub(super) fn projection_sql(item: &ProjectionItem) -> String {
    match &item.alias {
        Some(alias) => format!("{} AS {alias}", item.sql),
        None => item.sql.clone(),
    }
}

fn from_compact(from: &SqlFrom) -> String {
    match from {
        SqlFrom::Table { name, alias } => {
            let mut s = name.clone();
            if let Some(alias) = alias {
                s.push_str(&format!(" AS {alias}"));
            }
            s
        }
        SqlFrom::Subquery { query, alias } => {
            format!("({}) AS {alias}", render_compact(query))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pl::parse;
    use crate::resolve::resolve;
    use crate::sql::dialect;

    /// Helper: compile source to compact SQL under the named target.
    fn compact(source: &str, target: &str) -> String {
        let rq = resolve(parse(source).unwrap()).unwrap();
        let descriptor = dialect::lookup(target);
        let select = lower(&rq, descriptor).unwrap();
        render_compact(&select)
    }

    #[test]
    fn test_simple_from() {
        assert_eq!(compact("from employee", "sql.any"), "SELECT * FROM employee");
    }

    #[test]
    fn test_select_columns() {
        assert_eq!(
            compact("from employees | select {name, age}", "sql.any"),
            "SELECT name, age FROM employees"
        );
    }

    #[test]
    fn test_filter_where() {
        assert_eq!(
            compact("from t | filter age > 18", "sql.any"),
            "SELECT * FROM t WHERE age > 18"
        );
    }

    #[test]
    fn test_two_filters_merge_with_and() {
        assert_eq!(
            compact("from t | filter a > 1 | filter b < 2", "sql.any"),
            "SELECT * FROM t WHERE a > 1 AND b < 2"
        );
    }

    #[test]
    fn test_take_limit_generic() {
        assert_eq!(compact("from t | take 3", "sql.sqlite"), "SELECT * FROM t LIMIT 3");
        assert_eq!(
            compact("from t | take 3..5", "sql.any"),
            "SELECT * FROM t LIMIT 3 OFFSET 2"
        );
    }

    #[test]
    fn test_take_mssql_top() {
        assert_eq!(
            compact("from t | take 3", "sql.mssql"),
            "SELECT TOP (3) * FROM t"
        );
    }

    #[test]
    fn test_take_mssql_offset_fetch() {
        assert_eq!(
            compact("from tracks | take 3..5", "sql.mssql"),
            "SELECT * FROM tracks ORDER BY (SELECT NULL) OFFSET 2 ROWS FETCH FIRST 3 ROWS ONLY"
        );
        assert_eq!(
            compact("from tracks | take 3..", "sql.mssql"),
            "SELECT * FROM tracks OFFSET 2 ROWS"
        );
    }

    #[test]
    fn test_mssql_offset_fetch_keeps_real_order_by() {
        let sql = compact("from t | sort day | take 3..5", "sql.mssql");
        assert_eq!(
            sql,
            "SELECT * FROM t ORDER BY day OFFSET 2 ROWS FETCH FIRST 3 ROWS ONLY"
        );
    }

    #[test]
    fn test_unknown_target_uses_generic_pagination() {
        assert_eq!(
            compact("from t | take 3", "sql.no-such-dialect"),
            "SELECT * FROM t LIMIT 3"
        );
    }

    #[test]
    fn test_derive_extends_star() {
        assert_eq!(
            compact("from t | derive {gross = net * 2}", "sql.any"),
            "SELECT *, net * 2 AS gross FROM t"
        );
    }

    #[test]
    fn test_filter_inlines_derived_column() {
        assert_eq!(
            compact("from t | derive {gross = net * 2} | filter gross > 10", "sql.any"),
            "SELECT *, net * 2 AS gross FROM t WHERE net * 2 > 10"
        );
    }

    #[test]
    fn test_group_aggregate_single_statement() {
        let sql = compact(
            "from emp | group {dept} (aggregate {n = count this, avg_salary = average salary})",
            "sql.any",
        );
        assert_eq!(
            sql,
            "SELECT dept, COUNT(*) AS n, AVG(salary) AS avg_salary FROM emp GROUP BY dept"
        );
    }

    #[test]
    fn test_filter_after_aggregate_is_having() {
        let sql = compact(
            "from emp | group {dept} (aggregate {n = count this}) | filter n > 5",
            "sql.any",
        );
        assert_eq!(
            sql,
            "SELECT dept, COUNT(*) AS n FROM emp GROUP BY dept HAVING COUNT(*) > 5"
        );
    }

    #[test]
    fn test_join_qualifies_columns() {
        let sql = compact("from a | join side:left b (==id)", "sql.any");
        assert_eq!(sql, "SELECT * FROM a LEFT JOIN b ON a.id = b.id");
    }

    #[test]
    fn test_join_then_group() {
        let sql = compact(
            "from employees | join salaries (==emp_id) | group {dept} (aggregate {avg_salary = average salaries.salary})",
            "sql.any",
        );
        assert_eq!(
            sql,
            "SELECT employees.dept, AVG(salaries.salary) AS avg_salary FROM employees JOIN salaries ON employees.emp_id = salaries.emp_id GROUP BY employees.dept"
        );
    }

    #[test]
    fn test_sort_directions() {
        assert_eq!(
            compact("from t | sort {-code, day}", "sql.any"),
            "SELECT * FROM t ORDER BY code DESC, day"
        );
    }

    #[test]
    fn test_filter_after_take_nests() {
        let sql = compact("from t | take 10 | filter x > 1", "sql.any");
        assert_eq!(
            sql,
            "SELECT * FROM (SELECT * FROM t LIMIT 10) AS table_0 WHERE x > 1"
        );
    }

    #[test]
    fn test_filter_on_window_compute_nests() {
        let sql = compact("from t | derive {rn = row_number this} | filter rn > 2", "sql.any");
        assert_eq!(
            sql,
            "SELECT * FROM (SELECT *, ROW_NUMBER() OVER () AS rn FROM t) AS table_0 WHERE rn > 2"
        );
    }

    #[test]
    fn test_window_transform_over_clause() {
        let sql = compact(
            "from t | window rows:-2..0 (derive {ma = average value})",
            "sql.any",
        );
        assert_eq!(
            sql,
            "SELECT *, AVG(value) OVER (ROWS BETWEEN 2 PRECEDING AND CURRENT ROW) AS ma FROM t"
        );
    }

    #[test]
    fn test_window_sort_becomes_over_order() {
        let sql = compact(
            "from t | window (sort day | derive {r = rank this})",
            "sql.any",
        );
        assert_eq!(sql, "SELECT *, RANK() OVER (ORDER BY day) AS r FROM t");
    }

    #[test]
    fn test_fstring_concat_by_dialect() {
        let generic = compact(r#"from t | derive {l = f"{name} - {title}"}"#, "sql.any");
        assert_eq!(generic, "SELECT *, CONCAT(name, ' - ', title) AS l FROM t");
        let sqlite = compact(r#"from t | derive {l = f"{name} - {title}"}"#, "sql.sqlite");
        assert_eq!(sqlite, "SELECT *, name || ' - ' || title AS l FROM t");
    }

    #[test]
    fn test_sstring_verbatim() {
        let sql = compact(r#"from t | derive {v = s"CURRENT_TIMESTAMP"}"#, "sql.any");
        assert_eq!(sql, "SELECT *, CURRENT_TIMESTAMP AS v FROM t");
    }

    #[test]
    fn test_coalesce_renders_as_function() {
        let sql = compact("from t | derive {v = a ?? 0}", "sql.any");
        assert_eq!(sql, "SELECT *, COALESCE(a, 0) AS v FROM t");
    }

    #[test]
    fn test_precedence_parens() {
        let sql = compact("from t | derive {v = (a + b) * c}", "sql.any");
        assert_eq!(sql, "SELECT *, (a + b) * c AS v FROM t");
    }

    #[test]
    fn test_date_literal() {
        let sql = compact("from t | filter start >= @2020-01-01", "sql.any");
        assert_eq!(sql, "SELECT * FROM t WHERE start >= DATE '2020-01-01'");
    }

    #[test]
    fn test_string_literal_escaped() {
        let sql = compact("from t | filter name == 'O''Brien'", "sql.any");
        assert!(sql.contains("'O''Brien'"));
    }

    #[test]
    fn test_quoted_identifier() {
        let sql = compact("from `order-line` | take 1", "sql.any");
        assert_eq!(sql, r#"SELECT * FROM "order-line" LIMIT 1"#);
        let sql = compact("from `order-line` | take 1", "sql.mysql");
        assert_eq!(sql, "SELECT * FROM `order-line` LIMIT 1");
    }

    #[test]
    fn test_idempotent_generation() {
        let rq = resolve(parse("from t | filter a > 1 | take 5").unwrap()).unwrap();
        let descriptor = dialect::lookup("sql.any");
        let first = render_compact(&lower(&rq, descriptor).unwrap());
        let second = render_compact(&lower(&rq, descriptor).unwrap());
        assert_eq!(first, second);
    }
}
