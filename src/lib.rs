//! Compiler for a pipeline query language, targeting SQL.
//!
//! The pipeline has three stages, each independently callable so every
//! intermediate representation can be inspected or serialized:
//!
//! ```text
//! Source text
//!       ↓
//! prql_to_pl       (lex + parse)
//!       ↓
//! PL  — pipeline AST            ⇄ json::from_pl / json::to_pl
//!       ↓
//! pl_to_rq         (resolve names, scopes, functions)
//!       ↓
//! RQ  — relational IR           ⇄ json::from_rq / json::to_rq
//!       ↓
//! rq_to_sql        (dialect-aware generation)
//!       ↓
//! SQL text
//! ```
//!
//! [`compile`] wraps all three. Compilation is pure and deterministic: the
//! only process-wide state is the read-only dialect table, safe for
//! concurrent readers.

pub mod error;
pub mod options;
pub mod pl;
pub mod resolve;
pub mod rq;
pub mod sql;

pub use error::{CompileError, ResolveErrorKind, Span};
pub use options::CompileOptions;
pub use sql::dialect::get_targets;

/// Compiler version, embedded in signature comments.
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compile a query into a SQL string.
///
/// Sequences [`prql_to_pl`] → [`pl_to_rq`] → [`rq_to_sql`]. Any stage
/// failure aborts the compilation; no partial SQL is ever returned.
pub fn compile(source: &str, options: &CompileOptions) -> Result<String, CompileError> {
    prql_to_pl(source)
        .and_then(pl_to_rq)
        .and_then(|query| rq_to_sql(query, options))
}

/// Parse source text into the pipeline AST.
pub fn prql_to_pl(source: &str) -> Result<pl::Query, CompileError> {
    pl::parse(source)
}

/// Resolve names, scopes and function calls; lower PL into relational IR.
pub fn pl_to_rq(query: pl::Query) -> Result<rq::Query, CompileError> {
    resolve::resolve(query)
}

/// Generate SQL text from relational IR.
pub fn rq_to_sql(query: rq::Query, options: &CompileOptions) -> Result<String, CompileError> {
    sql::generate(&query, options)
}

/// JSON forms of the intermediate representations, for callers that inspect
/// or transport them between stages.
pub mod json {
    use super::{pl, rq, CompileError};

    pub fn from_pl(query: &pl::Query) -> Result<String, CompileError> {
        serde_json::to_string(query)
            .map_err(|e| CompileError::generate(format!("cannot serialize PL: {e}")))
    }

    pub fn to_pl(json: &str) -> Result<pl::Query, CompileError> {
        serde_json::from_str(json)
            .map_err(|e| CompileError::parse(format!("invalid PL json: {e}"), None))
    }

    pub fn from_rq(query: &rq::Query) -> Result<String, CompileError> {
        serde_json::to_string(query)
            .map_err(|e| CompileError::generate(format!("cannot serialize RQ: {e}")))
    }

    pub fn to_rq(json: &str) -> Result<rq::Query, CompileError> {
        serde_json::from_str(json)
            .map_err(|e| CompileError::parse(format!("invalid RQ json: {e}"), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> CompileOptions {
        CompileOptions::default().no_format().no_signature()
    }

    #[test]
    fn test_from_employee_end_to_end() {
        let sql = compile("from employee", &CompileOptions::default()).unwrap();
        assert!(sql.starts_with("SELECT"));
        assert!(sql.contains("employee"));
        assert!(!COMPILER_VERSION.is_empty());
    }

    #[test]
    fn test_dialect_substitution_law() {
        let source = "from a | take 3";
        let mssql = compile(
            source,
            &CompileOptions::default().with_target("sql.mssql"),
        )
        .unwrap();
        assert!(mssql.starts_with("SELECT"));
        assert!(mssql.contains("TOP (3)"));

        for target in ["sql.sqlite", "sql.this-is-not-a-dialect"] {
            let sql = compile(source, &CompileOptions::default().with_target(target)).unwrap();
            assert!(sql.contains("LIMIT 3"), "target: {target}");
        }
    }

    #[test]
    fn test_mssql_offset_never_top() {
        let sql = compile(
            "from tracks | take 3..5",
            &CompileOptions::default().with_target("sql.mssql").no_format(),
        )
        .unwrap();
        assert!(sql.contains("OFFSET 2 ROWS"));
        assert!(sql.contains("FETCH FIRST 3 ROWS ONLY"));
        assert!(!sql.contains("TOP"));
    }

    #[test]
    fn test_unknown_target_matches_generic_exactly() {
        let source = "from t | take 3";
        let generic = compile(source, &CompileOptions::default().with_target("sql.any")).unwrap();
        let unknown = compile(
            source,
            &CompileOptions::default().with_target("sql.made-up-dialect"),
        )
        .unwrap();
        assert_eq!(generic, unknown);
    }

    #[test]
    fn test_join_group_aggregate_end_to_end() {
        let sql = compile(
            "from employees | join salaries (==emp_id) | group {dept, title} (aggregate {avg_salary = average salaries.salary})",
            &plain(),
        )
        .unwrap();
        assert_eq!(sql.matches("SELECT").count(), 1);
        assert!(sql.contains("GROUP BY"));
        assert!(sql.contains("JOIN salaries"));
        assert!(sql.contains("AVG(salaries.salary)"));
    }

    #[test]
    fn test_round_trip_is_stable() {
        let source = "from t | filter a > 1 | sort {-b} | take 10";
        let via_stages =
            |s: &str| rq_to_sql(pl_to_rq(prql_to_pl(s).unwrap()).unwrap(), &plain()).unwrap();
        let first = via_stages(source);
        let second = via_stages(source);
        assert_eq!(first, second);
        assert_eq!(first, compile(source, &plain()).unwrap());
    }

    #[test]
    fn test_json_interchange_round_trip() {
        let pl = prql_to_pl("from t | select {a, b} | take 5").unwrap();
        let pl_json = json::from_pl(&pl).unwrap();
        let pl_back = json::to_pl(&pl_json).unwrap();
        assert_eq!(pl, pl_back);

        let rq = pl_to_rq(pl_back).unwrap();
        let rq_json = json::from_rq(&rq).unwrap();
        let rq_back = json::to_rq(&rq_json).unwrap();
        assert_eq!(rq, rq_back);

        let sql = rq_to_sql(rq_back, &plain()).unwrap();
        assert_eq!(sql, "SELECT a, b FROM t LIMIT 5");
    }

    #[test]
    fn test_get_targets_contract() {
        let targets = get_targets();
        assert!(!targets.is_empty());
        let mut unique = targets.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), targets.len());
        assert_eq!(targets.len(), get_targets().len());
        assert!(targets.contains(&"sql.any"));
        assert!(targets.contains(&"sql.mssql"));
        assert!(targets.contains(&"sql.sqlite"));
    }

    #[test]
    fn test_error_stages() {
        let err = compile("from t | explode x", &plain()).unwrap_err();
        assert_eq!(err.stage(), "parse");

        let err = compile("from t | select {a} | filter b > 1", &plain()).unwrap_err();
        assert_eq!(err.stage(), "resolve");

        let mut rq = pl_to_rq(prql_to_pl("from t").unwrap()).unwrap();
        rq.pipeline
            .push(rq::Transform::Filter(rq::Expr::ColumnRef(42)));
        let err = rq_to_sql(rq, &plain()).unwrap_err();
        assert_eq!(err.stage(), "generate");
    }

    #[test]
    fn test_signature_comment_strippable() {
        let with_signature = compile("from t", &CompileOptions::default().no_format()).unwrap();
        let without = compile(
            "from t",
            &CompileOptions::default().no_format().no_signature(),
        )
        .unwrap();
        let stripped = with_signature
            .split(" -- Generated by")
            .next()
            .unwrap()
            .to_string();
        assert_eq!(stripped, without);
        assert!(with_signature.contains(COMPILER_VERSION));
    }

    /// Generated SQL must be well-formed; re-parse it with sqlparser.
    #[test]
    fn test_output_reparses() {
        use sqlparser::dialect::{GenericDialect, MsSqlDialect};
        use sqlparser::parser::Parser as SqlParser;

        let generic_cases = [
            "from employee",
            "from t | select {a, b} | filter a > 1 | sort {-b} | take 10",
            "from employees | join salaries (==emp_id) | group {dept} (aggregate {avg_salary = average salaries.salary})",
            "from t | take 10 | filter x > 1",
            "from t | derive {rn = row_number this} | filter rn > 2",
            "from t | window (sort day | derive {r = rank this})",
            r#"from t | derive {label = f"{name} - {title}"}"#,
            "from emp | group {dept} (aggregate {n = count this}) | filter n > 5 | sort {-n}",
        ];
        for source in generic_cases {
            let sql = compile(source, &plain()).unwrap();
            SqlParser::parse_sql(&GenericDialect {}, &sql)
                .unwrap_or_else(|e| panic!("`{source}` produced unparseable SQL `{sql}`: {e}"));
        }

        let mssql = compile(
            "from t | take 3",
            &CompileOptions::default()
                .with_target("sql.mssql")
                .no_format()
                .no_signature(),
        )
        .unwrap();
        SqlParser::parse_sql(&MsSqlDialect {}, &mssql).unwrap();
    }

    #[test]
    fn test_directive_sets_default_target() {
        let sql = compile("prql target:sql.mssql\nfrom t | take 3", &plain()).unwrap();
        assert!(sql.contains("TOP (3)"));

        // explicit option wins
        let sql = compile(
            "prql target:sql.mssql\nfrom t | take 3",
            &CompileOptions::default()
                .with_target("sql.sqlite")
                .no_format()
                .no_signature(),
        )
        .unwrap();
        assert!(sql.contains("LIMIT 3"));
    }

    #[test]
    fn test_let_function_end_to_end() {
        let sql = compile(
            "let fahrenheit = c -> c * 9 / 5 + 32\nfrom weather | derive {f = fahrenheit temp_c}",
            &plain(),
        )
        .unwrap();
        assert_eq!(sql, "SELECT *, temp_c * 9 / 5 + 32 AS f FROM weather");
    }
}
