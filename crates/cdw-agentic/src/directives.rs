//! Repair directives
//!
//! Best-effort extraction of `{step id, replacement body}` edits from a model
//! response. Parsing sits behind [`DirectiveParser`] so the matching strategy
//! can be tightened without touching the orchestration code.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

/// Name of the edit function the model is instructed to call
pub const EDIT_FUNCTION: &str = "edit_sql_file";

static FUNCTION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<function=([A-Za-z0-9_]*)>(.*?)</function>").unwrap());

/// Whole-fragment replacement for one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairDirective {
    pub target_step_id: String,
    pub new_body: String,
}

/// Directives found in one response plus the count of skipped candidates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDirectives {
    pub directives: Vec<RepairDirective>,
    pub malformed: usize,
}

impl ParsedDirectives {
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

/// Text to edit directives
pub trait DirectiveParser: Send + Sync {
    fn parse(&self, response: &str) -> ParsedDirectives;
}

/// Parses `<function=edit_sql_file>{"id": .., "sql_script": ..}</function>`
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionTagParser;

#[derive(Deserialize)]
struct EditArgs {
    #[serde(alias = "step_id")]
    id: Option<serde_json::Value>,
    #[serde(alias = "body")]
    sql_script: Option<String>,
}

fn step_id_from(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl FunctionTagParser {
    fn parse_one(name: &str, payload: &str) -> Option<RepairDirective> {
        if name != EDIT_FUNCTION {
            return None;
        }
        let args: EditArgs = serde_json::from_str(payload.trim()).ok()?;
        let target_step_id = args.id.as_ref().and_then(step_id_from)?;
        let new_body = args.sql_script.filter(|s| !s.trim().is_empty())?;
        Some(RepairDirective {
            target_step_id,
            new_body,
        })
    }
}

impl DirectiveParser for FunctionTagParser {
    fn parse(&self, response: &str) -> ParsedDirectives {
        let mut parsed = ParsedDirectives::default();
        for caps in FUNCTION_TAG.captures_iter(response) {
            let name = caps.get(1).map_or("", |m| m.as_str());
            let payload = caps.get(2).map_or("", |m| m.as_str());
            match Self::parse_one(name, payload) {
                Some(directive) => parsed.directives.push(directive),
                None => {
                    tracing::debug!(function = name, "skipping unusable function call");
                    parsed.malformed += 1;
                }
            }
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_numeric_and_string_ids() {
        let text = r#"Fixing step 1.
<function=edit_sql_file>{"id": 1, "sql_script": "INSERT INTO omop.location VALUES (2);"}</function>
and
<function=edit_sql_file>{"id": "0.1", "sql_script": "SELECT 1;"}</function>"#;

        let parsed = FunctionTagParser.parse(text);
        assert_eq!(parsed.malformed, 0);
        assert_eq!(
            parsed.directives,
            vec![
                RepairDirective {
                    target_step_id: "1".to_string(),
                    new_body: "INSERT INTO omop.location VALUES (2);".to_string(),
                },
                RepairDirective {
                    target_step_id: "0.1".to_string(),
                    new_body: "SELECT 1;".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_multiline_payload() {
        let text = "<function=edit_sql_file>{\n  \"id\": 3,\n  \"sql_script\": \"A;\\nB;\"\n}</function>";
        let parsed = FunctionTagParser.parse(text);
        assert_eq!(parsed.directives.len(), 1);
        assert_eq!(parsed.directives[0].new_body, "A;\nB;");
    }

    #[test]
    fn test_malformed_are_skipped_not_fatal() {
        let text = r#"
<function=edit_sql_file>{"id": 1, "sql_script": </function>
<function=drop_table>{"id": 1, "sql_script": "DROP TABLE x;"}</function>
<function=edit_sql_file>{"sql_script": "SELECT 1;"}</function>
<function=edit_sql_file>{"id": 2, "sql_script": "  "}</function>
<function=edit_sql_file>{"id": 4, "sql_script": "SELECT 4;"}</function>"#;

        let parsed = FunctionTagParser.parse(text);
        assert_eq!(parsed.malformed, 4);
        assert_eq!(parsed.directives.len(), 1);
        assert_eq!(parsed.directives[0].target_step_id, "4");
    }

    #[test]
    fn test_no_directives() {
        let parsed = FunctionTagParser.parse("The SQL looks fine to me.");
        assert!(parsed.is_empty());
        assert_eq!(parsed.malformed, 0);
    }
}
