use serde_json::Value;

/// Outcome of looking for an embedded JSON object in a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonExtraction {
    Found(Value),
    /// The first `{` never closes, or its balanced span is not valid JSON.
    Malformed,
    Absent,
}

impl JsonExtraction {
    pub fn object(&self) -> Option<&Value> {
        match self {
            JsonExtraction::Found(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<Value> {
        match self {
            JsonExtraction::Found(v) => Some(v),
            _ => None,
        }
    }
}

/// Returns the byte index of the `}` closing the object opened at `start`,
/// skipping braces inside JSON string literals.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses the brace-balanced span starting at the first `{` in `text`.
///
/// Only that one span is considered. Later or nested objects are never
/// tried, so a malformed block counts as no object at all.
pub fn extract_json_object(text: &str) -> JsonExtraction {
    let Some(start) = text.find('{') else {
        return JsonExtraction::Absent;
    };
    let Some(end) = balanced_end(text, start) else {
        return JsonExtraction::Malformed;
    };
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(value) => JsonExtraction::Found(value),
        Err(_) => JsonExtraction::Malformed,
    }
}
