//! Semantic resolution: PL → RQ.
//!
//! Walks the pipeline AST threading a [`Frame`] of visible columns, resolves
//! names and function calls, and lowers each transform into a relational
//! operator over the column arena. The output satisfies the RQ invariant:
//! no column is referenced before the operator that introduces it.

pub mod functions;
pub mod scope;

use std::collections::HashMap;

use tracing::debug;

use crate::error::{CompileError, ResolveErrorKind, Span};
use crate::pl;
use crate::rq;
use crate::rq::{ColumnDecl, ColumnId};

use functions::FuncKind;
use scope::{Frame, FrameColumn, TableScope};

/// Resolve a parsed query into relational IR. Fails fast on the first
/// unresolved name, bad function call or malformed transform.
pub fn resolve(query: pl::Query) -> Result<rq::Query, CompileError> {
    let mut funcs = HashMap::new();
    let mut main = None;
    for stmt in query.stmts {
        match stmt {
            pl::Stmt::FuncDef(def) => {
                funcs.insert(def.name.clone(), def);
            }
            pl::Stmt::Main(pipeline) => {
                if main.is_some() {
                    return Err(CompileError::resolve(
                        ResolveErrorKind::InvalidTransform,
                        "query has more than one main pipeline",
                        None,
                    ));
                }
                main = Some(pipeline);
            }
        }
    }
    // PL can arrive from deserialized JSON, so a missing pipeline is an
    // input error here even though the parser never produces one
    let main = main.ok_or_else(|| {
        CompileError::resolve(
            ResolveErrorKind::InvalidTransform,
            "query has no main pipeline",
            None,
        )
    })?;

    let mut resolver = Resolver {
        columns: Vec::new(),
        pipeline: Vec::new(),
        frame: Frame::default(),
        funcs,
        in_aggregate: false,
        saw_window_fn: false,
        func_depth: 0,
    };
    resolver.resolve_pipeline(main)?;
    debug!(
        columns = resolver.columns.len(),
        transforms = resolver.pipeline.len(),
        "resolved pipeline"
    );

    Ok(rq::Query {
        def: query.def,
        columns: resolver.columns,
        pipeline: resolver.pipeline,
    })
}

struct Resolver {
    columns: Vec<ColumnDecl>,
    pipeline: Vec<rq::Transform>,
    frame: Frame,
    funcs: HashMap<String, pl::FuncDef>,
    in_aggregate: bool,
    saw_window_fn: bool,
    func_depth: usize,
}

impl Resolver {
    // ------------------------------------------------------------------
    // transforms
    // ------------------------------------------------------------------

    fn resolve_pipeline(&mut self, pipeline: pl::Pipeline) -> Result<(), CompileError> {
        let mut transforms = pipeline.transforms.into_iter();
        match transforms.next() {
            Some(pl::Transform::From(table)) => self.transform_from(table),
            _ => {
                return Err(CompileError::resolve(
                    ResolveErrorKind::InvalidTransform,
                    "pipeline must start with `from`",
                    None,
                ))
            }
        }
        for transform in transforms {
            match transform {
                pl::Transform::From(_) => {
                    return Err(CompileError::resolve(
                        ResolveErrorKind::InvalidTransform,
                        "`from` is only allowed as the first transform",
                        None,
                    ))
                }
                pl::Transform::Select(items) => self.transform_select(items)?,
                pl::Transform::Derive(items) => self.transform_derive(items)?,
                pl::Transform::Filter(expr) => self.transform_filter(expr)?,
                pl::Transform::Aggregate(items) => self.do_aggregate(Vec::new(), items)?,
                pl::Transform::Group { keys, pipeline } => self.transform_group(keys, pipeline)?,
                pl::Transform::Join {
                    side,
                    with,
                    condition,
                } => self.transform_join(side, with, condition)?,
                pl::Transform::Sort(items) => self.transform_sort(items)?,
                pl::Transform::Take(expr) => self.transform_take(expr)?,
                pl::Transform::Window { rows, pipeline } => {
                    self.transform_window(rows, pipeline)?
                }
            }
        }
        Ok(())
    }

    fn transform_from(&mut self, table: pl::TableRef) {
        let reference = table.alias.clone().unwrap_or_else(|| table.name.clone());
        let wildcard = self.new_column(ColumnDecl::Wildcard {
            table: reference.clone(),
        });
        self.pipeline.push(rq::Transform::Source {
            table: table.name,
            alias: table.alias,
            columns: vec![wildcard],
        });
        self.frame.tables.push(TableScope {
            reference,
            source_index: 0,
            wildcard: true,
        });
        self.frame.columns.push(FrameColumn::Wildcard { table_index: 0 });
    }

    fn transform_select(&mut self, items: Vec<pl::Expr>) -> Result<(), CompileError> {
        let mut ids = Vec::new();
        for item in items {
            let span = item.span;
            match item.kind {
                pl::ExprKind::Assign { name, expr } => {
                    ids.push(self.push_compute(Some(name), *expr, None)?);
                }
                pl::ExprKind::Ident(path) => match self.lookup_path(&path, span)? {
                    rq::Expr::ColumnRef(id) => ids.push(id),
                    _ => {
                        return Err(CompileError::resolve(
                            ResolveErrorKind::InvalidTransform,
                            "`this` cannot be selected",
                            span,
                        ))
                    }
                },
                kind => {
                    ids.push(self.push_compute(None, pl::Expr::new(kind, span), None)?);
                }
            }
        }
        self.pipeline.push(rq::Transform::Select(ids.clone()));
        self.replace_frame_with(&ids);
        Ok(())
    }

    fn transform_derive(&mut self, items: Vec<pl::Expr>) -> Result<(), CompileError> {
        for item in items {
            let span = item.span;
            match item.kind {
                pl::ExprKind::Assign { name, expr } => {
                    self.push_compute(Some(name), *expr, None)?;
                }
                kind => {
                    self.push_compute(None, pl::Expr::new(kind, span), None)?;
                }
            }
        }
        Ok(())
    }

    fn transform_filter(&mut self, expr: pl::Expr) -> Result<(), CompileError> {
        let span = expr.span;
        self.saw_window_fn = false;
        let resolved = self.resolve_expr(&expr)?;
        if self.saw_window_fn {
            return Err(CompileError::resolve(
                ResolveErrorKind::InvalidTransform,
                "window functions are not allowed in `filter`; derive a column first",
                span,
            ));
        }
        self.pipeline.push(rq::Transform::Filter(resolved));
        Ok(())
    }

    fn transform_group(
        &mut self,
        keys: Vec<pl::Expr>,
        pipeline: pl::Pipeline,
    ) -> Result<(), CompileError> {
        let mut by = Vec::new();
        for key in keys {
            let span = key.span;
            let path = match key.kind {
                pl::ExprKind::Ident(path) => path,
                _ => {
                    return Err(CompileError::resolve(
                        ResolveErrorKind::InvalidTransform,
                        "group keys must be column references",
                        span,
                    ))
                }
            };
            match self.lookup_path(&path, span)? {
                rq::Expr::ColumnRef(id) => by.push(id),
                _ => {
                    return Err(CompileError::resolve(
                        ResolveErrorKind::InvalidTransform,
                        "group keys must be column references",
                        span,
                    ))
                }
            }
        }

        let mut transforms = pipeline.transforms.into_iter();
        match (transforms.next(), transforms.next()) {
            (Some(pl::Transform::Aggregate(items)), None) => self.do_aggregate(by, items),
            _ => Err(CompileError::resolve(
                ResolveErrorKind::InvalidTransform,
                "group expects an `aggregate` sub-pipeline",
                None,
            )),
        }
    }

    fn do_aggregate(
        &mut self,
        by: Vec<ColumnId>,
        items: Vec<pl::Expr>,
    ) -> Result<(), CompileError> {
        let mut computed = Vec::new();
        self.in_aggregate = true;
        for item in items {
            let span = item.span;
            let (name, expr) = match item.kind {
                pl::ExprKind::Assign { name, expr } => (Some(name), *expr),
                kind => (None, pl::Expr::new(kind, span)),
            };
            self.saw_window_fn = false;
            let resolved = self.resolve_expr(&expr);
            // reset before propagating errors so later transforms start clean
            let saw_window = std::mem::take(&mut self.saw_window_fn);
            let resolved = resolved?;
            if saw_window {
                self.in_aggregate = false;
                return Err(CompileError::resolve(
                    ResolveErrorKind::InvalidTransform,
                    "window functions are not allowed in `aggregate`",
                    span,
                ));
            }
            let id = self.new_column(match name {
                Some(n) => ColumnDecl::Named {
                    name: n,
                    table: None,
                },
                None => ColumnDecl::Expr,
            });
            computed.push((id, resolved));
        }
        self.in_aggregate = false;

        self.pipeline.push(rq::Transform::Aggregate {
            by: by.clone(),
            computed: computed.clone(),
        });

        let mut frame_columns = Vec::new();
        for id in by.iter().chain(computed.iter().map(|(id, _)| id)) {
            if let Some(name) = self.columns[*id].name() {
                frame_columns.push(FrameColumn::Named {
                    name: name.to_string(),
                    id: *id,
                });
            }
        }
        self.frame.columns = frame_columns;
        self.frame.close_wildcards();
        Ok(())
    }

    fn transform_join(
        &mut self,
        side: pl::JoinSide,
        with: pl::TableRef,
        condition: pl::JoinCondition,
    ) -> Result<(), CompileError> {
        let reference = with.alias.clone().unwrap_or_else(|| with.name.clone());

        // the left side of an `==col` shorthand resolves against the frame
        // as it is *before* the joined table becomes visible
        let shorthand_left = match &condition {
            pl::JoinCondition::Eq(column) => Some(self.lookup_single(column, None)?),
            pl::JoinCondition::On(_) => None,
        };

        let wildcard = self.new_column(ColumnDecl::Wildcard {
            table: reference.clone(),
        });
        let join_index = self.pipeline.len();
        self.pipeline.push(rq::Transform::Join {
            side,
            table: with.name,
            alias: with.alias,
            columns: vec![wildcard],
            on: rq::Expr::Literal(rq::Literal::Boolean(true)),
        });
        let table_index = self.frame.tables.len();
        self.frame.tables.push(TableScope {
            reference,
            source_index: join_index,
            wildcard: true,
        });
        self.frame
            .columns
            .push(FrameColumn::Wildcard { table_index });

        let on = match condition {
            pl::JoinCondition::Eq(column) => {
                let left = shorthand_left.expect("resolved above");
                let right = self.materialize(table_index, &column);
                rq::Expr::Binary {
                    left: Box::new(rq::Expr::ColumnRef(left)),
                    op: rq::BinOp::Eq,
                    right: Box::new(rq::Expr::ColumnRef(right)),
                }
            }
            pl::JoinCondition::On(expr) => self.resolve_expr(&expr)?,
        };
        if let Some(rq::Transform::Join { on: slot, .. }) = self.pipeline.get_mut(join_index) {
            *slot = on;
        }
        Ok(())
    }

    fn transform_sort(&mut self, items: Vec<pl::SortItem>) -> Result<(), CompileError> {
        let resolved = self.resolve_sort_items(items)?;
        self.pipeline.push(rq::Transform::Sort(resolved));
        Ok(())
    }

    fn resolve_sort_items(
        &mut self,
        items: Vec<pl::SortItem>,
    ) -> Result<Vec<rq::SortColumn>, CompileError> {
        items
            .into_iter()
            .map(|item| {
                Ok(rq::SortColumn {
                    expr: self.resolve_expr(&item.expr)?,
                    direction: item.direction,
                })
            })
            .collect()
    }

    fn transform_take(&mut self, expr: pl::Expr) -> Result<(), CompileError> {
        let span = expr.span;
        let invalid = |span| {
            CompileError::resolve(
                ResolveErrorKind::InvalidTake,
                "take expected a positive int or range",
                span,
            )
        };
        let (offset, limit) = match &expr.kind {
            pl::ExprKind::Literal(pl::Literal::Integer(n)) if *n >= 1 => (None, Some(*n)),
            pl::ExprKind::Range { start, end } => {
                let start = match start {
                    Some(e) => Some(const_int(e).ok_or_else(|| invalid(span))?),
                    None => None,
                };
                let end = match end {
                    Some(e) => Some(const_int(e).ok_or_else(|| invalid(span))?),
                    None => None,
                };
                if start.is_some_and(|s| s < 1) || end.is_some_and(|e| e < 1) {
                    return Err(invalid(span));
                }
                if let (Some(s), Some(e)) = (start, end) {
                    if e < s {
                        return Err(invalid(span));
                    }
                }
                let offset = start.filter(|s| *s > 1).map(|s| s - 1);
                let limit = match (start, end) {
                    (Some(s), Some(e)) => Some(e - s + 1),
                    (None, Some(e)) => Some(e),
                    (_, None) => None,
                };
                (offset, limit)
            }
            _ => return Err(invalid(span)),
        };
        self.pipeline.push(rq::Transform::Take { offset, limit });
        Ok(())
    }

    fn transform_window(
        &mut self,
        rows: Option<pl::Expr>,
        pipeline: pl::Pipeline,
    ) -> Result<(), CompileError> {
        let bounds = match rows {
            Some(expr) => Some(self.frame_bounds(expr)?),
            None => None,
        };
        let mut order: Vec<rq::SortColumn> = Vec::new();
        for transform in pipeline.transforms {
            match transform {
                pl::Transform::Sort(items) => {
                    order = self.resolve_sort_items(items)?;
                }
                pl::Transform::Derive(items) => {
                    for item in items {
                        let span = item.span;
                        let (name, expr) = match item.kind {
                            pl::ExprKind::Assign { name, expr } => (Some(name), *expr),
                            kind => (None, pl::Expr::new(kind, span)),
                        };
                        let spec = rq::WindowSpec {
                            order_by: order.clone(),
                            rows: bounds,
                        };
                        self.in_aggregate = true;
                        let result = self.push_compute(name, expr, Some(spec));
                        self.in_aggregate = false;
                        result?;
                    }
                }
                _ => {
                    return Err(CompileError::resolve(
                        ResolveErrorKind::InvalidTransform,
                        "window supports only `sort` and `derive` in its pipeline",
                        None,
                    ))
                }
            }
        }
        Ok(())
    }

    fn frame_bounds(&self, expr: pl::Expr) -> Result<rq::FrameBounds, CompileError> {
        let span = expr.span;
        match expr.kind {
            pl::ExprKind::Range { start, end } => {
                let start = match start {
                    Some(e) => Some(const_int(&e).ok_or_else(|| {
                        CompileError::resolve(
                            ResolveErrorKind::InvalidTransform,
                            "window rows bounds must be integers",
                            span,
                        )
                    })?),
                    None => None,
                };
                let end = match end {
                    Some(e) => Some(const_int(&e).ok_or_else(|| {
                        CompileError::resolve(
                            ResolveErrorKind::InvalidTransform,
                            "window rows bounds must be integers",
                            span,
                        )
                    })?),
                    None => None,
                };
                Ok(rq::FrameBounds { start, end })
            }
            _ => Err(CompileError::resolve(
                ResolveErrorKind::InvalidTransform,
                "window `rows` expects a range",
                span,
            )),
        }
    }

    // ------------------------------------------------------------------
    // columns and names
    // ------------------------------------------------------------------

    fn new_column(&mut self, decl: ColumnDecl) -> ColumnId {
        self.columns.push(decl);
        self.columns.len() - 1
    }

    /// Add a named column of `tables[table_index]` to the arena and register
    /// it with the transform that introduced the table.
    fn materialize(&mut self, table_index: usize, name: &str) -> ColumnId {
        let table = &self.frame.tables[table_index];
        let reference = table.reference.clone();
        let source_index = table.source_index;
        let id = self.new_column(ColumnDecl::Named {
            name: name.to_string(),
            table: Some(reference),
        });
        match &mut self.pipeline[source_index] {
            rq::Transform::Source { columns, .. } | rq::Transform::Join { columns, .. } => {
                columns.push(id)
            }
            _ => unreachable!("table scopes point at Source/Join transforms"),
        }
        self.frame.columns.push(FrameColumn::Named {
            name: name.to_string(),
            id,
        });
        id
    }

    fn lookup_single(&mut self, name: &str, span: Option<Span>) -> Result<ColumnId, CompileError> {
        if let Some(id) = self.frame.find_named(name) {
            // a locally computed column (derive/select/aggregate) shadows
            // table columns outright
            if matches!(
                self.columns[id],
                ColumnDecl::Named { table: None, .. } | ColumnDecl::Expr
            ) {
                return Ok(id);
            }
            // when the same name is already pinned to several tables, an
            // unqualified reference cannot pick one
            let owners: Vec<&str> = self
                .frame
                .columns
                .iter()
                .filter_map(|c| match c {
                    FrameColumn::Named { name: n, id } if n == name => {
                        match &self.columns[*id] {
                            ColumnDecl::Named { table: Some(t), .. } => Some(t.as_str()),
                            _ => None,
                        }
                    }
                    _ => None,
                })
                .collect();
            let distinct_owners = {
                let mut owners = owners.clone();
                owners.sort_unstable();
                owners.dedup();
                owners.len()
            };
            if distinct_owners > 1 && owners.len() > 1 {
                return Err(CompileError::resolve(
                    ResolveErrorKind::AmbiguousReference,
                    format!("`{name}` is ambiguous; qualify it with a table name"),
                    span,
                ));
            }
            return Ok(id);
        }
        // not seen yet: materialize from the primary (first) relation that
        // can still contribute columns
        match self.frame.wildcard_tables().first() {
            Some(&table_index) => Ok(self.materialize(table_index, name)),
            None => Err(CompileError::resolve(
                ResolveErrorKind::UnresolvedName,
                format!("unknown name `{name}`"),
                span,
            )),
        }
    }

    fn lookup_path(&mut self, path: &[String], span: Option<Span>) -> Result<rq::Expr, CompileError> {
        match path {
            [name] if name == "this" => Ok(rq::Expr::Star),
            [name] => Ok(rq::Expr::ColumnRef(self.lookup_single(name, span)?)),
            [table, name] => {
                let table_index = self.frame.table_by_reference(table).ok_or_else(|| {
                    CompileError::resolve(
                        ResolveErrorKind::UnresolvedName,
                        format!("unknown table `{table}`"),
                        span,
                    )
                })?;
                if let Some(id) = self.find_materialized(table, name) {
                    return Ok(rq::Expr::ColumnRef(id));
                }
                if self.frame.tables[table_index].wildcard {
                    return Ok(rq::Expr::ColumnRef(self.materialize(table_index, name)));
                }
                Err(CompileError::resolve(
                    ResolveErrorKind::UnresolvedName,
                    format!("unknown name `{table}.{name}`"),
                    span,
                ))
            }
            _ => Err(CompileError::resolve(
                ResolveErrorKind::UnresolvedName,
                format!("unknown name `{}`", path.join(".")),
                span,
            )),
        }
    }

    fn find_materialized(&self, table: &str, name: &str) -> Option<ColumnId> {
        self.frame.columns.iter().rev().find_map(|c| match c {
            FrameColumn::Named { name: n, id } if n == name => match &self.columns[*id] {
                ColumnDecl::Named {
                    table: Some(t), ..
                } if t == table => Some(*id),
                _ => None,
            },
            _ => None,
        })
    }

    /// Replace the frame with exactly the given columns (projection).
    fn replace_frame_with(&mut self, ids: &[ColumnId]) {
        let mut columns = Vec::new();
        for &id in ids {
            if let Some(name) = self.columns[id].name() {
                columns.push(FrameColumn::Named {
                    name: name.to_string(),
                    id,
                });
            }
        }
        self.frame.columns = columns;
        self.frame.close_wildcards();
    }

    // ------------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------------

    /// Resolve one computed column and append its `Compute` transform.
    fn push_compute(
        &mut self,
        name: Option<String>,
        expr: pl::Expr,
        window: Option<rq::WindowSpec>,
    ) -> Result<ColumnId, CompileError> {
        let span = expr.span;
        self.saw_window_fn = false;
        let resolved = self.resolve_expr(&expr);
        let saw_window = std::mem::take(&mut self.saw_window_fn);
        let resolved = resolved?;

        let window = match window {
            Some(spec) => Some(spec),
            None if saw_window => Some(rq::WindowSpec::default()),
            None => None,
        };
        if window.is_some() && !matches!(resolved, rq::Expr::Call { .. }) {
            return Err(CompileError::resolve(
                ResolveErrorKind::InvalidTransform,
                "a windowed expression must be a single function call",
                span,
            ));
        }

        let id = self.new_column(match &name {
            Some(n) => ColumnDecl::Named {
                name: n.clone(),
                table: None,
            },
            None => ColumnDecl::Expr,
        });
        self.pipeline.push(rq::Transform::Compute {
            column: id,
            expr: resolved,
            window,
        });
        if let Some(n) = name {
            self.frame.columns.push(FrameColumn::Named { name: n, id });
        }
        Ok(id)
    }

    fn resolve_expr(&mut self, expr: &pl::Expr) -> Result<rq::Expr, CompileError> {
        let span = expr.span;
        match &expr.kind {
            pl::ExprKind::Ident(path) => self.lookup_path(path, span),
            pl::ExprKind::Literal(lit) => Ok(rq::Expr::Literal(lit.clone())),
            pl::ExprKind::Binary { left, op, right } => Ok(rq::Expr::Binary {
                left: Box::new(self.resolve_expr(left)?),
                op: *op,
                right: Box::new(self.resolve_expr(right)?),
            }),
            pl::ExprKind::Unary { op, expr } => Ok(rq::Expr::Unary {
                op: *op,
                expr: Box::new(self.resolve_expr(expr)?),
            }),
            pl::ExprKind::Nested(inner) => self.resolve_expr(inner),
            pl::ExprKind::FuncCall {
                name,
                args,
                named_args,
            } => self.resolve_call(name, args, named_args, span),
            pl::ExprKind::FString(items) => {
                Ok(rq::Expr::FString(self.resolve_interpolation(items)?))
            }
            pl::ExprKind::SString(items) => {
                Ok(rq::Expr::SString(self.resolve_interpolation(items)?))
            }
            pl::ExprKind::Range { .. } => Err(CompileError::resolve(
                ResolveErrorKind::InvalidTransform,
                "a range is not allowed in this context",
                span,
            )),
            pl::ExprKind::Assign { .. } => Err(CompileError::resolve(
                ResolveErrorKind::InvalidTransform,
                "an assignment is not allowed in this context",
                span,
            )),
        }
    }

    fn resolve_interpolation(
        &mut self,
        items: &[pl::InterpolateItem],
    ) -> Result<Vec<rq::InterpolateItem>, CompileError> {
        items
            .iter()
            .map(|item| match item {
                pl::InterpolateItem::String(s) => Ok(rq::InterpolateItem::String(s.clone())),
                pl::InterpolateItem::Expr(e) => Ok(rq::InterpolateItem::Expr(Box::new(
                    self.resolve_expr(e)?,
                ))),
            })
            .collect()
    }

    fn resolve_call(
        &mut self,
        name: &str,
        args: &[pl::Expr],
        named_args: &[(String, pl::Expr)],
        span: Option<Span>,
    ) -> Result<rq::Expr, CompileError> {
        if !named_args.is_empty() {
            return Err(CompileError::resolve(
                ResolveErrorKind::ArityMismatch,
                format!("function `{name}` takes no named arguments"),
                span,
            ));
        }

        // pipeline-local definitions shadow built-ins
        if let Some(def) = self.funcs.get(name).cloned() {
            if args.len() != def.params.len() {
                return Err(CompileError::resolve(
                    ResolveErrorKind::ArityMismatch,
                    format!(
                        "function `{name}` expects {} arguments, got {}",
                        def.params.len(),
                        args.len()
                    ),
                    span,
                ));
            }
            if self.func_depth >= 32 {
                return Err(CompileError::resolve(
                    ResolveErrorKind::InvalidTransform,
                    format!("function `{name}` expands too deeply"),
                    span,
                ));
            }
            let mut substitutions = HashMap::new();
            for (param, arg) in def.params.iter().zip(args) {
                substitutions.insert(param.clone(), arg.clone());
            }
            let body = substitute(&def.body, &substitutions);
            self.func_depth += 1;
            let result = self.resolve_expr(&body);
            self.func_depth -= 1;
            return result;
        }

        let builtin = functions::lookup(name).ok_or_else(|| {
            CompileError::resolve(
                ResolveErrorKind::UnknownFunction,
                format!("unknown function `{name}`"),
                span,
            )
        })?;
        if args.len() != builtin.arity {
            return Err(CompileError::resolve(
                ResolveErrorKind::ArityMismatch,
                format!(
                    "function `{name}` expects {} arguments, got {}",
                    builtin.arity,
                    args.len()
                ),
                span,
            ));
        }

        match builtin.kind {
            FuncKind::Aggregate => {
                if !self.in_aggregate {
                    return Err(CompileError::resolve(
                        ResolveErrorKind::InvalidTransform,
                        format!("aggregation function `{name}` is only allowed in `aggregate` or `window`"),
                        span,
                    ));
                }
                let args = args
                    .iter()
                    .map(|a| self.resolve_expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rq::Expr::Call {
                    func: builtin.sql.to_string(),
                    args,
                })
            }
            FuncKind::Window => {
                // the argument is a positional marker and does not reach SQL
                for arg in args {
                    if let pl::ExprKind::Ident(path) = &arg.kind {
                        self.lookup_path(path, arg.span)?;
                    }
                }
                self.saw_window_fn = true;
                Ok(rq::Expr::Call {
                    func: builtin.sql.to_string(),
                    args: Vec::new(),
                })
            }
            FuncKind::Scalar => {
                let mut args = args
                    .iter()
                    .map(|a| self.resolve_expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                if builtin.reverse_args {
                    args.reverse();
                }
                Ok(rq::Expr::Call {
                    func: builtin.sql.to_string(),
                    args,
                })
            }
        }
    }
}

/// Replace single-segment identifiers with bound arguments (function
/// inlining).
fn substitute(expr: &pl::Expr, bindings: &HashMap<String, pl::Expr>) -> pl::Expr {
    let kind = match &expr.kind {
        pl::ExprKind::Ident(path) => {
            if let [name] = path.as_slice() {
                if let Some(bound) = bindings.get(name) {
                    return bound.clone();
                }
            }
            pl::ExprKind::Ident(path.clone())
        }
        pl::ExprKind::Binary { left, op, right } => pl::ExprKind::Binary {
            left: Box::new(substitute(left, bindings)),
            op: *op,
            right: Box::new(substitute(right, bindings)),
        },
        pl::ExprKind::Unary { op, expr } => pl::ExprKind::Unary {
            op: *op,
            expr: Box::new(substitute(expr, bindings)),
        },
        pl::ExprKind::Nested(inner) => {
            pl::ExprKind::Nested(Box::new(substitute(inner, bindings)))
        }
        pl::ExprKind::FuncCall {
            name,
            args,
            named_args,
        } => pl::ExprKind::FuncCall {
            name: name.clone(),
            args: args.iter().map(|a| substitute(a, bindings)).collect(),
            named_args: named_args
                .iter()
                .map(|(n, a)| (n.clone(), substitute(a, bindings)))
                .collect(),
        },
        pl::ExprKind::FString(items) => {
            pl::ExprKind::FString(substitute_items(items, bindings))
        }
        pl::ExprKind::SString(items) => {
            pl::ExprKind::SString(substitute_items(items, bindings))
        }
        other => other.clone(),
    };
    pl::Expr::new(kind, expr.span)
}

fn substitute_items(
    items: &[pl::InterpolateItem],
    bindings: &HashMap<String, pl::Expr>,
) -> Vec<pl::InterpolateItem> {
    items
        .iter()
        .map(|item| match item {
            pl::InterpolateItem::String(s) => pl::InterpolateItem::String(s.clone()),
            pl::InterpolateItem::Expr(e) => {
                pl::InterpolateItem::Expr(Box::new(substitute(e, bindings)))
            }
        })
        .collect()
}

fn const_int(expr: &pl::Expr) -> Option<i64> {
    match &expr.kind {
        pl::ExprKind::Literal(pl::Literal::Integer(n)) => Some(*n),
        pl::ExprKind::Unary {
            op: pl::UnOp::Neg,
            expr,
        } => const_int(expr).map(|n| -n),
        pl::ExprKind::Nested(inner) => const_int(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveErrorKind;
    use crate::pl::parse;
    use crate::rq::validate;

    fn resolve_str(source: &str) -> Result<rq::Query, CompileError> {
        resolve(parse(source).unwrap())
    }

    #[test]
    fn test_resolve_from_introduces_wildcard() {
        let q = resolve_str("from employee").unwrap();
        assert_eq!(q.pipeline.len(), 1);
        match &q.pipeline[0] {
            rq::Transform::Source { table, columns, .. } => {
                assert_eq!(table, "employee");
                assert_eq!(columns.len(), 1);
            }
            other => panic!("expected source, got {other:?}"),
        }
        assert!(validate(&q).is_ok());
    }

    #[test]
    fn test_resolve_materializes_columns() {
        let q = resolve_str("from t | select {a, b}").unwrap();
        // wildcard + two materialized columns
        assert_eq!(q.columns.len(), 3);
        match &q.pipeline[0] {
            rq::Transform::Source { columns, .. } => assert_eq!(columns.len(), 3),
            other => panic!("expected source, got {other:?}"),
        }
        assert!(validate(&q).is_ok());
    }

    #[test]
    fn test_resolve_unknown_name_after_projection() {
        let err = resolve_str("from t | select {a} | filter b > 1").unwrap_err();
        match err {
            CompileError::Resolve { kind, .. } => {
                assert_eq!(kind, ResolveErrorKind::UnresolvedName)
            }
            other => panic!("expected resolve error, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_unknown_function() {
        let err = resolve_str("from t | aggregate {m = median x}").unwrap_err();
        match err {
            CompileError::Resolve { kind, span, .. } => {
                assert_eq!(kind, ResolveErrorKind::UnknownFunction);
                assert!(span.is_some());
            }
            other => panic!("expected resolve error, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_arity_mismatch() {
        let err = resolve_str("from t | aggregate {m = average a b}").unwrap_err();
        match err {
            CompileError::Resolve { kind, .. } => {
                assert_eq!(kind, ResolveErrorKind::ArityMismatch)
            }
            other => panic!("expected resolve error, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_aggregate_outside_aggregate() {
        let err = resolve_str("from t | derive {m = average a}").unwrap_err();
        assert!(err.to_string().contains("average"));
    }

    #[test]
    fn test_resolve_group_aggregate() {
        let q = resolve_str(
            "from employees | join salaries (==emp_id) | group {dept, title} (aggregate {avg_salary = average salaries.salary})",
        )
        .unwrap();
        assert!(validate(&q).is_ok());
        let aggregate = q
            .pipeline
            .iter()
            .find_map(|t| match t {
                rq::Transform::Aggregate { by, computed } => Some((by.len(), computed.len())),
                _ => None,
            })
            .expect("pipeline contains an aggregate");
        assert_eq!(aggregate, (2, 1));
    }

    #[test]
    fn test_resolve_join_shorthand_condition() {
        let q = resolve_str("from a | join b (==id)").unwrap();
        match &q.pipeline[1] {
            rq::Transform::Join { on, .. } => match on {
                rq::Expr::Binary { op, .. } => assert_eq!(*op, rq::BinOp::Eq),
                other => panic!("expected binary, got {other:?}"),
            },
            other => panic!("expected join, got {other:?}"),
        }
        assert!(validate(&q).is_ok());
    }

    #[test]
    fn test_resolve_ambiguous_after_join() {
        // `id` is pinned to both tables by the join condition, so an
        // unqualified reference cannot pick one
        let err = resolve_str("from a | join b (a.id == b.id) | filter id > 1").unwrap_err();
        match err {
            CompileError::Resolve { kind, .. } => {
                assert_eq!(kind, ResolveErrorKind::AmbiguousReference)
            }
            other => panic!("expected resolve error, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_unqualified_prefers_primary_relation() {
        let q = resolve_str("from a | join b (a.id == b.a_id) | filter x > 1").unwrap();
        assert!(validate(&q).is_ok());
        // x materialized from `a`, the primary relation
        let source_columns = match &q.pipeline[0] {
            rq::Transform::Source { columns, .. } => columns.clone(),
            other => panic!("expected source, got {other:?}"),
        };
        let x = q
            .columns
            .iter()
            .position(|c| c.name() == Some("x"))
            .unwrap();
        assert!(source_columns.contains(&x));
    }

    #[test]
    fn test_resolve_qualified_after_join() {
        let q = resolve_str("from a | join b (a.id == b.a_id) | filter a.x > 1").unwrap();
        assert!(validate(&q).is_ok());
    }

    #[test]
    fn test_resolve_take_forms() {
        let take = |source: &str| {
            let q = resolve_str(source).unwrap();
            match q.pipeline.last().unwrap() {
                rq::Transform::Take { offset, limit } => (*offset, *limit),
                other => panic!("expected take, got {other:?}"),
            }
        };
        assert_eq!(take("from t | take 10"), (None, Some(10)));
        assert_eq!(take("from t | take 3..5"), (Some(2), Some(3)));
        assert_eq!(take("from t | take ..5"), (None, Some(5)));
        assert_eq!(take("from t | take 3.."), (Some(2), None));
    }

    #[test]
    fn test_resolve_take_rejects_non_positive() {
        for source in ["from t | take 0", "from t | take -1..", "from t | take 5..3"] {
            let err = resolve_str(source).unwrap_err();
            match err {
                CompileError::Resolve { kind, .. } => {
                    assert_eq!(kind, ResolveErrorKind::InvalidTake, "source: {source}")
                }
                other => panic!("expected resolve error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_resolve_derive_shadows_upstream() {
        let q = resolve_str("from t | derive {a = b + 1} | select {a}").unwrap();
        assert!(validate(&q).is_ok());
        // the select picks the derived column, not a fresh materialization
        let compute_id = q
            .pipeline
            .iter()
            .find_map(|t| match t {
                rq::Transform::Compute { column, .. } => Some(*column),
                _ => None,
            })
            .unwrap();
        match q.pipeline.last().unwrap() {
            rq::Transform::Select(ids) => assert_eq!(ids, &vec![compute_id]),
            other => panic!("expected select, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_user_function_inlined() {
        let q = resolve_str("let double = x -> x * 2\nfrom t | derive {y = double a}").unwrap();
        let compute = q
            .pipeline
            .iter()
            .find_map(|t| match t {
                rq::Transform::Compute { expr, .. } => Some(expr.clone()),
                _ => None,
            })
            .unwrap();
        match compute {
            rq::Expr::Binary { op, .. } => assert_eq!(op, rq::BinOp::Mul),
            other => panic!("expected inlined binary, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_user_function_arity() {
        let err =
            resolve_str("let double = x -> x * 2\nfrom t | derive {y = double a b}").unwrap_err();
        match err {
            CompileError::Resolve { kind, .. } => {
                assert_eq!(kind, ResolveErrorKind::ArityMismatch)
            }
            other => panic!("expected resolve error, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_window_function_in_derive() {
        let q = resolve_str("from t | derive {rn = row_number this}").unwrap();
        match &q.pipeline[1] {
            rq::Transform::Compute { window, expr, .. } => {
                assert!(window.is_some());
                assert_eq!(
                    *expr,
                    rq::Expr::Call {
                        func: "ROW_NUMBER".into(),
                        args: vec![]
                    }
                );
            }
            other => panic!("expected compute, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_window_transform() {
        let q = resolve_str(
            "from t | sort day | window rows:-2..0 (derive {ma = average value})",
        )
        .unwrap();
        match q.pipeline.last().unwrap() {
            rq::Transform::Compute { window, .. } => {
                let spec = window.as_ref().unwrap();
                assert_eq!(
                    spec.rows,
                    Some(rq::FrameBounds {
                        start: Some(-2),
                        end: Some(0)
                    })
                );
            }
            other => panic!("expected compute, got {other:?}"),
        }
        assert!(validate(&q).is_ok());
    }

    #[test]
    fn test_resolve_no_forward_references_property() {
        // structural traversal over a variety of shapes
        for source in [
            "from employee",
            "from t | select {a, b} | filter a > 1 | sort {-b} | take 10",
            "from a | join side:left b (==id) | group {x} (aggregate {n = count this})",
            "from t | derive {d = a * 2} | filter d > 1",
        ] {
            let q = resolve_str(source).unwrap();
            assert!(validate(&q).is_ok(), "source: {source}");
        }
    }

    #[test]
    fn test_resolve_sstring_passthrough() {
        let q = resolve_str(r#"from t | derive {v = s"CURRENT_TIMESTAMP"}"#).unwrap();
        match &q.pipeline[1] {
            rq::Transform::Compute { expr, .. } => {
                assert_eq!(
                    *expr,
                    rq::Expr::SString(vec![rq::InterpolateItem::String(
                        "CURRENT_TIMESTAMP".into()
                    )])
                );
            }
            other => panic!("expected compute, got {other:?}"),
        }
    }
}
