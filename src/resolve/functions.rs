//! Built-in function table.
//!
//! Functions the resolver knows out of the box, with the SQL spelling each
//! one resolves to. Pipeline-local `let` definitions are checked first and
//! may shadow any of these.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncKind {
    /// Only valid inside `aggregate` (or a `window` sub-pipeline, where it
    /// renders with an OVER clause).
    Aggregate,
    /// Renders as `FUNC() OVER (...)`; arguments are positional markers and
    /// do not reach the SQL.
    Window,
    Scalar,
}

pub struct Builtin {
    pub name: &'static str,
    pub sql: &'static str,
    pub arity: usize,
    pub kind: FuncKind,
    /// `round 2 total` puts the digit count first; SQL wants it last.
    pub reverse_args: bool,
}

const fn builtin(name: &'static str, sql: &'static str, arity: usize, kind: FuncKind) -> Builtin {
    Builtin {
        name,
        sql,
        arity,
        kind,
        reverse_args: false,
    }
}

pub const BUILTINS: &[Builtin] = &[
    builtin("average", "AVG", 1, FuncKind::Aggregate),
    builtin("sum", "SUM", 1, FuncKind::Aggregate),
    builtin("count", "COUNT", 1, FuncKind::Aggregate),
    builtin("min", "MIN", 1, FuncKind::Aggregate),
    builtin("max", "MAX", 1, FuncKind::Aggregate),
    builtin("row_number", "ROW_NUMBER", 1, FuncKind::Window),
    builtin("rank", "RANK", 1, FuncKind::Window),
    builtin("dense_rank", "DENSE_RANK", 1, FuncKind::Window),
    builtin("lower", "LOWER", 1, FuncKind::Scalar),
    builtin("upper", "UPPER", 1, FuncKind::Scalar),
    builtin("abs", "ABS", 1, FuncKind::Scalar),
    Builtin {
        name: "round",
        sql: "ROUND",
        arity: 2,
        kind: FuncKind::Scalar,
        reverse_args: true,
    },
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known() {
        let avg = lookup("average").unwrap();
        assert_eq!(avg.sql, "AVG");
        assert_eq!(avg.kind, FuncKind::Aggregate);
    }

    #[test]
    fn test_lookup_unknown() {
        assert!(lookup("median").is_none());
    }

    #[test]
    fn test_no_duplicate_names() {
        for (i, a) in BUILTINS.iter().enumerate() {
            for b in &BUILTINS[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }
}
