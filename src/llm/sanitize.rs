//! Cleanup of raw model output into a bare SQL statement.
//!
//! Models wrap statements in code fences and language tags even when told
//! not to. Cleanup removes, in order:
//!
//! - every run of three backticks, together with an attached `sql` or
//!   `mysql` tag (case-insensitive)
//! - one pair of single backticks wrapping the whole text, when the inner
//!   text contains no other backtick
//! - a leading standalone `sql`/`mysql` token followed by whitespace
//!
//! and trims surrounding whitespace, repeating until nothing changes. Tags
//! are only removed as whole tokens in tag position, so identifiers such as
//! `sql_id` or `mysql_users` survive. Nothing else is validated.

use regex::Regex;
use std::sync::LazyLock;

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)```[ \t]*(?:(?:my)?sql\b)?").expect("fence pattern is valid")
});

static LEADING_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:my)?sql(?:\s+|$)").expect("tag pattern is valid")
});

/// Cleans raw model output into the statement to execute.
///
/// Idempotent: cleaning an already clean statement returns it unchanged.
pub fn clean_generated_sql(raw: &str) -> String {
    let mut current = raw.trim().to_string();
    loop {
        let next = clean_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn clean_once(text: &str) -> String {
    let unfenced = FENCE.replace_all(text, "");
    let unwrapped = strip_backtick_pair(unfenced.trim()).trim();
    LEADING_TAG.replace(unwrapped, "").trim().to_string()
}

fn strip_backtick_pair(text: &str) -> &str {
    match text
        .strip_prefix('`')
        .and_then(|rest| rest.strip_suffix('`'))
    {
        Some(inner) if !inner.contains('`') => inner,
        _ => text,
    }
}
