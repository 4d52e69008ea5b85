//! Compilation options.

use serde::{Deserialize, Serialize};

/// Options accepted by [`compile`](crate::compile) and
/// [`rq_to_sql`](crate::rq_to_sql).
///
/// Options are pure input: no stage of the pipeline mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Target dialect name, e.g. `"sql.postgres"`.
    ///
    /// `None` means `sql.any`: the dialect is taken from the query's
    /// `prql target:` directive when present, otherwise generic SQL is
    /// produced. When set, this always wins over the directive. An
    /// unrecognized name silently falls back to the generic dialect.
    pub target: Option<String>,

    /// Pretty-print the emitted SQL with one clause per line and indented
    /// projection lists. When false, output is a single compact line.
    ///
    /// Defaults to true.
    pub format: bool,

    /// Append a trailing comment embedding the compiler name, version and
    /// resolved target, for reproducibility tracking.
    ///
    /// Defaults to true.
    pub signature_comment: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            target: None,
            format: true,
            signature_comment: true,
        }
    }
}

impl CompileOptions {
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_format(mut self, format: bool) -> Self {
        self.format = format;
        self
    }

    pub fn no_format(self) -> Self {
        self.with_format(false)
    }

    pub fn with_signature_comment(mut self, signature_comment: bool) -> Self {
        self.signature_comment = signature_comment;
        self
    }

    pub fn no_signature(self) -> Self {
        self.with_signature_comment(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = CompileOptions::default();
        assert!(opts.target.is_none());
        assert!(opts.format);
        assert!(opts.signature_comment);
    }

    #[test]
    fn test_builder_chain() {
        let opts = CompileOptions::default()
            .with_target("sql.sqlite")
            .no_format()
            .no_signature();
        assert_eq!(opts.target.as_deref(), Some("sql.sqlite"));
        assert!(!opts.format);
        assert!(!opts.signature_comment);
    }
}
