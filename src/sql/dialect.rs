//! SQL dialect registry.
//!
//! Each dialect is a plain data record of the syntax rules that actually
//! differ between targets: pagination form, identifier quoting and operator
//! spelling. Adding a dialect is a data addition. The table is `const`,
//! ordered, and never mutated, so concurrent compilations can read it
//! without synchronization.

/// Syntax rules for one SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectDescriptor {
    pub name: &'static str,
    pub pagination: Pagination,
    pub ident_quote: char,
    /// When false, f-strings concatenate with `||` instead of `CONCAT`.
    pub has_concat_function: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `TOP (n)` in the projection clause when there is no offset; the ANSI
    /// `OFFSET … ROWS FETCH FIRST … ROWS ONLY` form when there is.
    Top,
    /// Always the ANSI `OFFSET … ROWS FETCH FIRST … ROWS ONLY` form.
    OffsetFetch,
}

const fn descriptor(
    name: &'static str,
    pagination: Pagination,
    ident_quote: char,
    has_concat_function: bool,
) -> DialectDescriptor {
    DialectDescriptor {
        name,
        pagination,
        ident_quote,
        has_concat_function,
    }
}

/// All registered dialects, `sql.any` first. The order is the public order
/// of `get_targets()` and is stable for the process lifetime.
pub const DIALECTS: &[DialectDescriptor] = &[
    descriptor("sql.any", Pagination::LimitOffset, '"', true),
    descriptor("sql.ansi", Pagination::OffsetFetch, '"', true),
    descriptor("sql.bigquery", Pagination::LimitOffset, '`', true),
    descriptor("sql.clickhouse", Pagination::LimitOffset, '`', true),
    descriptor("sql.duckdb", Pagination::LimitOffset, '"', true),
    descriptor("sql.generic", Pagination::LimitOffset, '"', true),
    descriptor("sql.mssql", Pagination::Top, '"', true),
    descriptor("sql.mysql", Pagination::LimitOffset, '`', true),
    descriptor("sql.postgres", Pagination::LimitOffset, '"', true),
    descriptor("sql.snowflake", Pagination::LimitOffset, '"', true),
    descriptor("sql.sqlite", Pagination::LimitOffset, '"', false),
];

/// Look a dialect up by name. Unknown names fall back to the generic
/// `sql.any` descriptor; this is deliberately not an error.
pub fn lookup(name: &str) -> &'static DialectDescriptor {
    DIALECTS.iter().find(|d| d.name == name).unwrap_or(&DIALECTS[0])
}

/// Pick the dialect for a compilation: an explicit option wins over the
/// query's `prql target:` directive; absent both, generic SQL.
pub fn resolve_target(
    option: Option<&str>,
    directive: Option<&str>,
) -> &'static DialectDescriptor {
    match option.or(directive) {
        Some(name) => lookup(name),
        None => &DIALECTS[0],
    }
}

/// Ordered list of every registered dialect name.
pub fn get_targets() -> Vec<&'static str> {
    DIALECTS.iter().map(|d| d.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_dialects() {
        assert_eq!(lookup("sql.mssql").pagination, Pagination::Top);
        assert_eq!(lookup("sql.sqlite").pagination, Pagination::LimitOffset);
        assert!(!lookup("sql.sqlite").has_concat_function);
        assert_eq!(lookup("sql.mysql").ident_quote, '`');
    }

    #[test]
    fn test_unknown_falls_back_to_generic() {
        let unknown = lookup("sql.oracle12");
        assert_eq!(unknown.name, "sql.any");
        assert_eq!(unknown.pagination, Pagination::LimitOffset);
    }

    #[test]
    fn test_option_wins_over_directive() {
        let d = resolve_target(Some("sql.sqlite"), Some("sql.mssql"));
        assert_eq!(d.name, "sql.sqlite");
        let d = resolve_target(None, Some("sql.mssql"));
        assert_eq!(d.name, "sql.mssql");
        let d = resolve_target(None, None);
        assert_eq!(d.name, "sql.any");
    }

    #[test]
    fn test_targets_are_ordered_and_unique() {
        let targets = get_targets();
        assert!(!targets.is_empty());
        assert_eq!(targets[0], "sql.any");
        let mut deduped = targets.clone();
        deduped.dedup();
        assert_eq!(targets.len(), deduped.len());
        // stable across calls
        assert_eq!(targets, get_targets());
    }
}
