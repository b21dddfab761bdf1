//! Structured-output parsing
//!
//! Model text is never trusted to be clean JSON: fences are stripped, the
//! outermost object is extracted by balanced-brace scanning, and the
//! result is checked against the prompt's declared required keys.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Errors from structured-output parsing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("no JSON object found in model output")]
    NoJsonObject,
    #[error("model output is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("model output missing required key `{0}`")]
    MissingKey(String),
}

/// Prompt-independent soft-refusal detection.
static REFUSAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(i\s+(can't|cannot|am\s+unable\s+to|won't)|i'm\s+(sorry|unable|not\s+able)|as\s+an\s+ai\b.{0,40}\b(can't|cannot))",
    )
    .expect("refusal pattern compiles")
});

/// Does the response text read as a content-policy soft refusal?
pub fn is_soft_refusal(text: &str) -> bool {
    REFUSAL_PATTERN.is_match(text.trim())
}

/// Strip markdown code fences, keeping the fenced body.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.contains("```") {
        return trimmed.to_string();
    }
    let mut out = String::with_capacity(trimmed.len());
    let mut in_fence = false;
    for line in trimmed.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            out.push_str(line);
            out.push('\n');
        }
    }
    // No fenced body at all means the fences were decorative; fall back to
    // the raw text with fence markers removed.
    if out.trim().is_empty() {
        trimmed.replace("```", "")
    } else {
        out
    }
}

/// Extract the outermost JSON object from text that may carry prose
/// around it. String literals and escapes are respected.
pub fn extract_outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Full parse pipeline: fences, outermost object, JSON, required keys.
pub fn parse_structured(text: &str, required_keys: &[&str]) -> Result<Value, ParseError> {
    let cleaned = strip_code_fences(text);
    let candidate = extract_outermost_object(&cleaned).ok_or(ParseError::NoJsonObject)?;
    let value: Value =
        serde_json::from_str(candidate).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    for key in required_keys {
        if value.get(key).is_none() {
            return Err(ParseError::MissingKey((*key).to_string()));
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        let cleaned = strip_code_fences(text);
        assert!(cleaned.contains("{\"a\": 1}"));
        assert!(!cleaned.contains("```"));
    }

    #[test]
    fn extracts_outermost_object_with_prose() {
        let text = "The answer is {\"outer\": {\"inner\": \"has } brace\"}} as requested";
        let extracted = extract_outermost_object(text).unwrap();
        assert_eq!(extracted, "{\"outer\": {\"inner\": \"has } brace\"}}");
    }

    #[test]
    fn parse_validates_required_keys() {
        let ok = parse_structured("{\"queries\": []}", &["queries"]);
        assert!(ok.is_ok());

        let missing = parse_structured("{\"other\": []}", &["queries"]);
        assert!(matches!(missing, Err(ParseError::MissingKey(k)) if k == "queries"));

        let no_json = parse_structured("no object here", &["queries"]);
        assert!(matches!(no_json, Err(ParseError::NoJsonObject)));
    }

    #[test]
    fn refusal_detection_is_prompt_independent() {
        assert!(is_soft_refusal("I can't help with that request."));
        assert!(is_soft_refusal("I'm sorry, but I cannot assist."));
        assert!(is_soft_refusal("I am unable to verify claims about this."));
        assert!(!is_soft_refusal("{\"verdicts\": []}"));
        assert!(!is_soft_refusal("The study found it can't be replicated."));
    }

    #[test]
    fn escaped_quotes_do_not_break_extraction() {
        let text = r#"{"statement": "she said \"done\" yesterday", "n": 1}"#;
        let extracted = extract_outermost_object(text).unwrap();
        let value: Value = serde_json::from_str(extracted).unwrap();
        assert_eq!(value["n"], 1);
    }
}
