//! SQL pretty-printer.
//!
//! Renders the same render tree as the compact renderer, but with one clause
//! per line and indented projection lists. Subqueries indent one level per
//! nesting depth.

use super::generator::projection_sql;
use super::types::{SqlFrom, SqlSelect};

const INDENT: &str = "    ";

/// Format a statement as indented, multi-line SQL.
pub fn format_select(select: &SqlSelect) -> String {
    format_at(select, 0)
}

fn indent(level: usize) -> String {
    INDENT.repeat(level)
}

fn format_at(select: &SqlSelect, depth: usize) -> String {
    let prefix = indent(depth);
    let mut parts: Vec<String> = Vec::new();

    // SELECT [TOP (n)]
    let mut head = format!("{prefix}SELECT");
    if let Some(top) = select.top {
        head.push_str(&format!(" TOP ({top})"));
    }
    if select.projection.len() <= 1 {
        if let Some(item) = select.projection.first() {
            head.push_str(&format!(" {}", projection_sql(item)));
        }
        parts.push(head);
    } else {
        for (i, item) in select.projection.iter().enumerate() {
            let comma = if i < select.projection.len() - 1 { "," } else { "" };
            head.push_str(&format!("\n{prefix}{INDENT}{}{comma}", projection_sql(item)));
        }
        parts.push(head);
    }

    if let Some(from) = &select.from {
        parts.push(format_from(from, depth));
    }

    for join in &select.joins {
        parts.push(format!("{prefix}{join}"));
    }

    if let Some(where_clause) = &select.where_clause {
        parts.push(format!("{prefix}WHERE {where_clause}"));
    }

    if !select.group_by.is_empty() {
        parts.push(format!("{prefix}GROUP BY {}", select.group_by.join(", ")));
    }

    if let Some(having) = &select.having {
        parts.push(format!("{prefix}HAVING {having}"));
    }

    if !select.order_by.is_empty() {
        parts.push(format!("{prefix}ORDER BY {}", select.order_by.join(", ")));
    }

    if let Some(limit) = select.limit {
        parts.push(format!("{prefix}LIMIT {limit}"));
    }
    if let Some(offset) = select.offset {
        parts.push(format!("{prefix}OFFSET {offset}"));
    }
    if let Some(offset_rows) = select.offset_rows {
        parts.push(format!("{prefix}OFFSET {offset_rows} ROWS"));
    }
    if let Some(fetch_first) = select.fetch_first {
        parts.push(format!("{prefix}FETCH FIRST {fetch_first} ROWS ONLY"));
    }

    parts.join("\n")
}

fn format_from(from: &SqlFrom, depth: usize) -> String {
    let prefix = indent(depth);
    match from {
        SqlFrom::Table { name, alias } => match alias {
            Some(alias) => format!("{prefix}FROM {name} AS {alias}"),
            None => format!("{prefix}FROM {name}"),
        },
        SqlFrom::Subquery { query, alias } => {
            format!(
                "{prefix}FROM (\n{}\n{prefix}) AS {alias}",
                format_at(query, depth + 1)
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pl::parse;
    use crate::resolve::resolve;
    use crate::sql::dialect;
    use crate::sql::generator::lower;

    fn pretty(source: &str, target: &str) -> String {
        let rq = resolve(parse(source).unwrap()).unwrap();
        let select = lower(&rq, dialect::lookup(target)).unwrap();
        format_select(&select)
    }

    #[test]
    fn test_format_clause_per_line() {
        let sql = pretty("from t | filter a > 1 | sort a | take 3", "sql.any");
        assert_eq!(
            sql,
            "SELECT *\nFROM t\nWHERE a > 1\nORDER BY a\nLIMIT 3"
        );
    }

    #[test]
    fn test_format_projection_list_indented() {
        let sql = pretty("from t | select {a, b}", "sql.any");
        assert_eq!(sql, "SELECT\n    a,\n    b\nFROM t");
    }

    #[test]
    fn test_format_top_on_select_line() {
        let sql = pretty("from t | take 3", "sql.mssql");
        assert_eq!(sql, "SELECT TOP (3) *\nFROM t");
    }

    #[test]
    fn test_format_subquery_indented() {
        let sql = pretty("from t | take 10 | filter x > 1", "sql.any");
        assert_eq!(
            sql,
            "SELECT *\nFROM (\n    SELECT *\n    FROM t\n    LIMIT 10\n) AS table_0\nWHERE x > 1"
        );
    }

    #[test]
    fn test_format_is_deterministic() {
        let a = pretty("from t | select {a, b} | filter a > 1", "sql.any");
        let b = pretty("from t | select {a, b} | filter a > 1", "sql.any");
        assert_eq!(a, b);
    }
}
