//! Read/write classification of SQL statements.
//!
//! A statement is a read when, after trimming surrounding whitespace and
//! upper-casing, it begins with one of the read prefixes. The check is a
//! literal prefix match: `WITH ... SELECT` and statements preceded by a
//! comment classify as writes and therefore run inside a transaction.
//!
//! `USE` is singled out: it would rebind the live connection behind the
//! session's back, so the executor refuses it.

use std::fmt;

/// Statement prefixes that only retrieve data.
pub const READ_PREFIXES: &[&str] = &["SELECT", "SHOW", "DESCRIBE", "EXPLAIN"];

/// How a statement must be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Returns rows; never committed or rolled back.
    Read,
    /// Mutates state; committed on success, rolled back on failure.
    Write,
}

impl StatementKind {
    /// Classifies a statement.
    pub fn classify(sql: &str) -> Self {
        let normalized = sql.trim().to_uppercase();
        if READ_PREFIXES
            .iter()
            .any(|prefix| normalized.starts_with(prefix))
        {
            Self::Read
        } else {
            Self::Write
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read)
    }
}

/// Returns true when any statement in `sql` starts with `USE`.
///
/// Statements are split on semicolons outside quoted strings and
/// identifiers, so `SELECT 1; USE billing` is caught while a literal such as
/// `'a; use b'` is not.
pub fn changes_database(sql: &str) -> bool {
    split_statements(sql).into_iter().any(|statement| {
        statement
            .split_whitespace()
            .next()
            .map(|word| word.trim_end_matches(';').eq_ignore_ascii_case("USE"))
            .unwrap_or(false)
    })
}

fn split_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in sql.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, ';') => {
                statements.push(&sql[start..i]);
                start = i + 1;
            }
            (None, _) => {}
        }
    }
    statements.push(&sql[start..]);
    statements
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}
