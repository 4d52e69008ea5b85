//! SQL backend: dialect registry, RQ → SQL generation, formatting and the
//! signature comment.

pub mod dialect;
pub mod formatter;
pub mod generator;
pub mod types;

use crate::error::CompileError;
use crate::options::CompileOptions;
use crate::rq;

/// Generate SQL text from relational IR.
///
/// The dialect is picked from `options.target` when set, else from the
/// query's `prql target:` directive, else generic SQL; unknown names fall
/// back to generic silently. The output is deterministic for a fixed
/// (query, options) pair.
pub fn generate(query: &rq::Query, options: &CompileOptions) -> Result<String, CompileError> {
    rq::validate(query).map_err(CompileError::generate)?;

    let descriptor =
        dialect::resolve_target(options.target.as_deref(), query.def.target.as_deref());
    let select = generator::lower(query, descriptor)?;

    let sql = if options.format {
        formatter::format_select(&select)
    } else {
        generator::render_compact(&select)
    };

    Ok(if options.signature_comment {
        let signature = format!(
            "-- Generated by prqlrs version:{} target:{}",
            crate::COMPILER_VERSION,
            descriptor.name
        );
        if options.format {
            format!("{sql}\n\n{signature}\n")
        } else {
            format!("{sql} {signature}")
        }
    } else if options.format {
        format!("{sql}\n")
    } else {
        sql
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pl::parse;
    use crate::resolve::resolve;

    fn rq_of(source: &str) -> rq::Query {
        resolve(parse(source).unwrap()).unwrap()
    }

    #[test]
    fn test_generate_compact_no_signature() {
        let options = CompileOptions::default().no_format().no_signature();
        let sql = generate(&rq_of("from a"), &options).unwrap();
        assert_eq!(sql, "SELECT * FROM a");
    }

    #[test]
    fn test_generate_formatted_ends_with_newline() {
        let options = CompileOptions::default().no_signature();
        let sql = generate(&rq_of("from a"), &options).unwrap();
        assert_eq!(sql, "SELECT *\nFROM a\n");
    }

    #[test]
    fn test_signature_comment_appended() {
        let options = CompileOptions::default().no_format();
        let sql = generate(&rq_of("from a"), &options).unwrap();
        assert!(sql.starts_with("SELECT * FROM a -- Generated by prqlrs version:"));
        assert!(sql.contains("target:sql.any"));
    }

    #[test]
    fn test_signature_names_resolved_target() {
        let options = CompileOptions::default().no_format().with_target("sql.postgres");
        let sql = generate(&rq_of("from a"), &options).unwrap();
        assert!(sql.contains("target:sql.postgres"));
    }

    #[test]
    fn test_directive_target_used_when_option_absent() {
        let rq = rq_of("prql target:sql.mssql\nfrom t | take 3");
        let options = CompileOptions::default().no_format().no_signature();
        let sql = generate(&rq, &options).unwrap();
        assert_eq!(sql, "SELECT TOP (3) * FROM t");
    }

    #[test]
    fn test_option_target_overrides_directive() {
        let rq = rq_of("prql target:sql.mssql\nfrom t | take 3");
        let options = CompileOptions::default()
            .no_format()
            .no_signature()
            .with_target("sql.sqlite");
        let sql = generate(&rq, &options).unwrap();
        assert_eq!(sql, "SELECT * FROM t LIMIT 3");
    }

    #[test]
    fn test_dangling_column_ref_is_generate_error() {
        let mut query = rq_of("from t | select {a}");
        // simulate a hand-edited RQ JSON with a bad reference
        query
            .pipeline
            .push(rq::Transform::Filter(rq::Expr::ColumnRef(99)));
        let err = generate(&query, &CompileOptions::default()).unwrap_err();
        assert_eq!(err.stage(), "generate");
    }

    #[test]
    fn test_unknown_target_is_not_an_error() {
        let options = CompileOptions::default()
            .no_format()
            .no_signature()
            .with_target("sql.does-not-exist");
        let sql = generate(&rq_of("from t | take 3"), &options).unwrap();
        assert_eq!(sql, "SELECT * FROM t LIMIT 3");
    }
}
