//! JSON Extraction
//!
//! Pulls a JSON object out of free-text model output:
//! - Fenced ```json block anywhere in the response
//! - Then the widest brace range (first `{` to last `}`)
//! - Trailing commas before `]`/`}` are dropped when the first parse fails
//!
//! Every failure maps to [`WikiError::PlanParse`]; callers never retry on it.

use serde::de::DeserializeOwned;
use tracing::debug;

use super::fence::find_fenced_block;
use crate::types::{Result, WikiError};

const PREVIEW_CHARS: usize = 200;

/// Locate the JSON-shaped part of `text`
pub fn extract_json_str(text: &str) -> Option<&str> {
    json_candidates(text).into_iter().next()
}

/// Fenced block first, then the widest brace range when it differs
fn json_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::with_capacity(2);

    if let Some(block) = find_fenced_block(text, &["json"])
        && block.trim_start().starts_with('{')
    {
        candidates.push(block.trim());
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}'))
        && end > start
    {
        let range = &text[start..=end];
        if !candidates.contains(&range) {
            candidates.push(range);
        }
    }

    candidates
}

/// Extract and deserialize the JSON object embedded in `text`
///
/// A fenced block that does not deserialize falls through to the brace
/// range, so fences quoted inside JSON strings do not truncate the object.
pub fn parse_embedded_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let candidates = json_candidates(text);
    let mut first_failure: Option<(serde_json::Error, &str)> = None;

    for candidate in candidates {
        match parse_candidate(candidate) {
            Ok(value) => return Ok(value),
            Err(err) => {
                debug!(error = %err, "JSON candidate rejected");
                if first_failure.is_none() {
                    first_failure = Some((err, candidate));
                }
            }
        }
    }

    Err(match first_failure {
        Some((err, candidate)) => {
            WikiError::PlanParse(format!("{} in: {}", err, preview(candidate)))
        }
        None => WikiError::PlanParse(format!(
            "no JSON object found in response: {}",
            preview(text)
        )),
    })
}

/// Parse as-is, then once more with trailing commas dropped
fn parse_candidate<T: DeserializeOwned>(candidate: &str) -> serde_json::Result<T> {
    serde_json::from_str(candidate).or_else(|first_err| {
        serde_json::from_str(&fix_trailing_commas(candidate)).map_err(|_| first_err)
    })
}

/// Remove commas directly followed by `]` or `}` outside of strings
fn fix_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escape = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            match ch {
                _ if escape => escape = false,
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            result.push(ch);
            continue;
        }

        if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some(']') | Some('}')) {
                continue;
            }
        }
        result.push(ch);
    }

    result
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_fenced_block_preferred() {
        let text = "Plan {draft}\n```json\n{\"pages\": [1]}\n```\nDone {x}";
        assert_eq!(extract_json_str(text), Some("{\"pages\": [1]}"));
    }

    #[test]
    fn test_brace_range_fallback() {
        let text = "Sure! {\"pages\": [{\"title\": \"A\"}]} Let me know.";
        let value: Value = parse_embedded_json(text).unwrap();
        assert_eq!(value["pages"][0]["title"], "A");
    }

    #[test]
    fn test_fence_inside_string_falls_back_to_brace_range() {
        let text = "```json\n{\"pages\":[{\"title\":\"Examples\",\"systemPrompt\":\"Show a ```rust``` snippet\"}]}\n```";
        let value: Value = parse_embedded_json(text).unwrap();
        assert_eq!(value["pages"][0]["title"], "Examples");
        assert_eq!(
            value["pages"][0]["systemPrompt"],
            "Show a ```rust``` snippet"
        );
    }

    #[test]
    fn test_trailing_comma_repaired() {
        let text = r#"{"pages": [{"title": "A, B",},]}"#;
        let value: Value = parse_embedded_json(text).unwrap();
        assert_eq!(value["pages"][0]["title"], "A, B");
    }

    #[test]
    fn test_no_json_is_plan_parse_error() {
        let result: Result<Value> = parse_embedded_json("I could not do that.");
        assert!(matches!(result, Err(WikiError::PlanParse(_))));
    }

    #[test]
    fn test_malformed_json_is_plan_parse_error() {
        let result: Result<Value> = parse_embedded_json("{\"pages\": [oops}");
        assert!(matches!(result, Err(WikiError::PlanParse(_))));
    }
}
