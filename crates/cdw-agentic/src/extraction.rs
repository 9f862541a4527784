//! Fenced code extraction
//!
//! Pulls SQL out of free-form model responses.

use std::sync::LazyLock;

use regex::Regex;

static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").unwrap());

/// One fenced block with its (possibly empty) info tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    pub tag: String,
    pub body: String,
}

impl FencedBlock {
    pub fn is_sql(&self) -> bool {
        self.tag.eq_ignore_ascii_case("sql")
    }
}

/// Info strings recognised whatever their case
const KNOWN_TAGS: &[&str] = &[
    "sql", "postgresql", "postgres", "pgsql", "plpgsql", "psql", "sqlite", "mysql", "tsql",
    "json", "text", "txt", "sh", "bash", "shell", "python", "py",
];

/// Statement keywords that open an untagged block rather than naming a language
const LEADING_KEYWORDS: &[&str] = &[
    "select", "insert", "update", "delete", "with", "create", "alter", "drop", "begin",
];

/// An unknown token alone on the fence line is read as a tag only when it is
/// lowercase and not a statement keyword.
fn is_plain_tag(token: &str) -> bool {
    !token.chars().any(|c| c.is_ascii_uppercase())
        && !LEADING_KEYWORDS.contains(&token)
}

/// Split the text between two fences into info tag and body.
///
/// A tag is a single token on the opening line (` ```sql\n`). `sql` is also
/// accepted inline (` ```sql SELECT 1``` `). A statement that starts on the
/// fence line stays in the body.
fn split_info(inner: &str) -> (String, String) {
    let token_len = inner
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '.' | '-')))
        .unwrap_or(inner.len());
    let (token, rest) = inner.split_at(token_len);
    let fence_line = rest.split_once('\n').map_or(rest, |(line, _)| line);
    let alone = fence_line.trim().is_empty();
    let known = KNOWN_TAGS.iter().any(|t| t.eq_ignore_ascii_case(token));

    let tagged = !token.is_empty()
        && if known {
            alone || (token.eq_ignore_ascii_case("sql") && rest.starts_with(char::is_whitespace))
        } else {
            alone && rest.contains('\n') && is_plain_tag(token)
        };

    if tagged {
        (token.to_string(), rest.trim().to_string())
    } else {
        (String::new(), inner.trim().to_string())
    }
}

/// All fenced blocks in order of appearance
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    FENCE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| {
            let (tag, body) = split_info(m.as_str());
            FencedBlock { tag, body }
        })
        .collect()
}

/// SQL blocks to append for one response.
///
/// Every block tagged `sql` wins; without any, the first fenced block of any
/// tag is used. Empty bodies are dropped. An empty result is a soft failure
/// for the caller to report.
pub fn extract_sql_blocks(text: &str) -> Vec<String> {
    let blocks = fenced_blocks(text);

    let tagged: Vec<String> = blocks
        .iter()
        .filter(|b| b.is_sql() && !b.body.is_empty())
        .map(|b| b.body.clone())
        .collect();
    if !tagged.is_empty() {
        return tagged;
    }

    blocks
        .into_iter()
        .find(|b| !b.body.is_empty())
        .map(|b| vec![b.body])
        .unwrap_or_default()
}
