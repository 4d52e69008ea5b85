//! Structural validation of the RQ invariant: every column reference must
//! resolve to a column introduced earlier in the relation chain.
//!
//! The resolver upholds this by construction; the check exists because RQ
//! can also arrive from outside (deserialized JSON handed to `rq_to_sql`),
//! where nothing else guarantees it.

use super::types::{Expr, InterpolateItem, Query, Transform};

/// Walk the pipeline in order, tracking which column ids have been
/// introduced, and reject any reference that points forward (or out of the
/// arena entirely).
pub fn validate(query: &Query) -> Result<(), String> {
    let mut introduced = vec![false; query.columns.len()];

    fn introduce(ids: &[usize], introduced: &mut [bool]) -> Result<(), String> {
        for &id in ids {
            if id >= introduced.len() {
                return Err(format!("column id {id} is out of bounds"));
            }
            introduced[id] = true;
        }
        Ok(())
    }

    for (index, transform) in query.pipeline.iter().enumerate() {
        match transform {
            Transform::Source { columns, .. } => introduce(columns, &mut introduced)?,
            Transform::Select(columns) => {
                for &id in columns {
                    check_ref(id, &introduced, index)?;
                }
            }
            Transform::Filter(expr) => check_expr(expr, &introduced, index)?,
            Transform::Compute {
                column,
                expr,
                window,
            } => {
                check_expr(expr, &introduced, index)?;
                if let Some(spec) = window {
                    for sort in &spec.order_by {
                        check_expr(&sort.expr, &introduced, index)?;
                    }
                }
                introduce(&[*column], &mut introduced)?;
            }
            Transform::Aggregate { by, computed } => {
                for &id in by {
                    check_ref(id, &introduced, index)?;
                }
                for (_, expr) in computed {
                    check_expr(expr, &introduced, index)?;
                }
                introduce(&computed.iter().map(|(id, _)| *id).collect::<Vec<_>>(), &mut introduced)?;
            }
            Transform::Join { columns, on, .. } => {
                introduce(columns, &mut introduced)?;
                check_expr(on, &introduced, index)?;
            }
            Transform::Sort(items) => {
                for item in items {
                    check_expr(&item.expr, &introduced, index)?;
                }
            }
            Transform::Take { .. } => {}
        }
    }
    Ok(())
}

fn check_ref(id: usize, introduced: &[bool], transform_index: usize) -> Result<(), String> {
    match introduced.get(id) {
        Some(true) => Ok(()),
        Some(false) => Err(format!(
            "column id {id} referenced in transform {transform_index} before it is introduced"
        )),
        None => Err(format!("column id {id} is out of bounds")),
    }
}

fn check_expr(expr: &Expr, introduced: &[bool], transform_index: usize) -> Result<(), String> {
    match expr {
        Expr::ColumnRef(id) => check_ref(*id, introduced, transform_index),
        Expr::Literal(_) | Expr::Star => Ok(()),
        Expr::Binary { left, right, .. } => {
            check_expr(left, introduced, transform_index)?;
            check_expr(right, introduced, transform_index)
        }
        Expr::Unary { expr, .. } => check_expr(expr, introduced, transform_index),
        Expr::Call { args, .. } => {
            for arg in args {
                check_expr(arg, introduced, transform_index)?;
            }
            Ok(())
        }
        Expr::FString(items) | Expr::SString(items) => {
            for item in items {
                if let InterpolateItem::Expr(e) = item {
                    check_expr(e, introduced, transform_index)?;
                }
            }
            Ok(())
        }
    }
}
