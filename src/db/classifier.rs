//! Lightweight SQL statement classification.
//!
//! This is a lexical heuristic, not a parser: comments are stripped, whitespace is
//! collapsed and verbs are matched as whole words anywhere in the text. It is good
//! enough for permission checks and for deciding whether a statement returns rows.

use crate::permission::Verb;
use std::collections::BTreeSet;

/// Leading keywords of statements that produce a row set.
const QUERY_PREFIXES: [&str; 6] = ["SELECT", "WITH", "SHOW", "EXPLAIN", "DESCRIBE", "DESC "];

/// Remove `--` line comments and `/* */` block comments, then collapse whitespace.
///
/// An unterminated block comment is left in place.
pub fn clean_sql(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;

    while !rest.is_empty() {
        let line = rest.find("--");
        let block = rest.find("/*");
        let (start, is_line) = match (line, block) {
            (Some(l), Some(b)) if l < b => (l, true),
            (Some(l), None) => (l, true),
            (_, Some(b)) => (b, false),
            (None, None) => {
                out.push_str(rest);
                break;
            }
        };

        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if is_line {
            match tail.find('\n') {
                Some(nl) => rest = &tail[nl..],
                None => break,
            }
        } else {
            match tail[2..].find("*/") {
                Some(end) => {
                    out.push(' ');
                    rest = &tail[2 + end + 2..];
                }
                None => {
                    out.push_str(tail);
                    break;
                }
            }
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collect every verb appearing as a whole word in the cleaned, upper-cased statement.
pub fn extract_operations(sql: &str) -> BTreeSet<Verb> {
    let upper = clean_sql(sql).to_uppercase();
    Verb::ALL
        .into_iter()
        .filter(|verb| contains_word(&upper, verb.as_str()))
        .collect()
}

/// Whether the statement returns a row set rather than an affected-row count.
pub fn is_query_type(sql: &str) -> bool {
    let upper = clean_sql(sql).to_uppercase();
    QUERY_PREFIXES.iter().any(|p| upper.starts_with(p))
}

/// Split a script on `;`, trimming each piece and dropping empty ones.
///
/// Semicolons inside string literals or procedural blocks are not understood.
pub fn split_statements(script: &str) -> Vec<&str> {
    script
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + word.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_comments_and_whitespace() {
        let sql = "SELECT a, -- trailing\n  b /* block\n comment */ FROM\t\tt";
        assert_eq!(clean_sql(sql), "SELECT a, b FROM t");
    }

    #[test]
    fn test_clean_line_comment_at_end() {
        assert_eq!(clean_sql("DELETE FROM t -- DROP TABLE t"), "DELETE FROM t");
    }

    #[test]
    fn test_clean_unterminated_block() {
        assert_eq!(clean_sql("SELECT 1 /* open"), "SELECT 1 /* open");
    }

    #[test]
    fn test_extract_whole_words_anywhere() {
        let ops = extract_operations("insert into t select * from s");
        assert_eq!(ops, [Verb::Select, Verb::Insert].into_iter().collect());
    }

    #[test]
    fn test_extract_ignores_partial_words() {
        let ops = extract_operations("SELECT created_at, updated FROM dropped_rows");
        assert_eq!(ops, [Verb::Select].into_iter().collect());
    }

    #[test]
    fn test_extract_ignores_commented_verbs() {
        let ops = extract_operations("/* DROP TABLE x */ SELECT 1 -- DELETE");
        assert_eq!(ops, [Verb::Select].into_iter().collect());
    }

    #[test]
    fn test_extract_empty() {
        assert!(extract_operations("").is_empty());
        assert!(extract_operations("-- only a comment").is_empty());
        assert!(extract_operations("BEGIN").is_empty());
    }

    #[test]
    fn test_is_query_type() {
        assert!(is_query_type("  select 1"));
        assert!(is_query_type("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(is_query_type("show tables"));
        assert!(is_query_type("desc users"));
        assert!(is_query_type("-- lead\nEXPLAIN SELECT 1"));
        assert!(!is_query_type("DESCRIPTION"));
        assert!(!is_query_type("UPDATE t SET a = 1"));
        assert!(!is_query_type(""));
    }

    #[test]
    fn test_split_statements() {
        assert_eq!(
            split_statements("SELECT 1; BAD SQL; SELECT 2;"),
            vec!["SELECT 1", "BAD SQL", "SELECT 2"]
        );
        assert!(split_statements(" ; ;\n").is_empty());
    }
}
