//! JSON extraction and structural repair for model output.
//!
//! Planning, decision, and draft turns all request JSON-mode output, but
//! models still wrap objects in prose or code fences, and long draft turns
//! sometimes truncate mid-string. `extract_json` locates the object;
//! `repair_truncated_json` applies a small, closed grammar of fixes to a
//! truncated object and nothing more.

/// Extract a JSON object from potentially noisy LLM output.
///
/// Handles:
/// - Pure JSON responses
/// - JSON wrapped in markdown code fences
/// - JSON embedded in prose
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();

    // If it starts with {, find matching closing brace
    if trimmed.starts_with('{') {
        if let Some(end) = find_matching_brace(trimmed) {
            return &trimmed[..end];
        }
    }

    // Try to find JSON anywhere in the response
    if let Some(start) = trimmed.find('{') {
        let remainder = &trimmed[start..];
        if let Some(end) = find_matching_brace(remainder) {
            return &remainder[..end];
        }
    }

    trimmed
}

/// Find the byte offset of the matching closing brace, respecting JSON strings.
/// Tracks "inside string" state so braces within `"..."` are not counted.
fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, c) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if c == '\\' && in_string {
            escape = true;
            continue;
        }
        if c == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Attempt a structural repair of a truncated JSON object.
///
/// The accepted grammar of fixes, applied in order:
/// 1. close an unterminated string (dropping a dangling escape backslash),
/// 2. drop a trailing comma,
/// 3. close still-open arrays and objects in LIFO order.
///
/// The repaired candidate must parse as JSON or the repair is rejected.
/// Anything outside this grammar (missing values, mangled keys, prose)
/// returns `None`.
pub fn repair_truncated_json(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let start = trimmed.find('{')?;
    let mut out: String = trimmed[start..].trim_end().to_string();

    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape = false;

    for c in out.chars() {
        if escape {
            escape = false;
            continue;
        }
        if c == '\\' && in_string {
            escape = true;
            continue;
        }
        if c == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match c {
            '{' | '[' => stack.push(c),
            '}' => {
                if stack.pop() != Some('{') {
                    return None;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return None;
                }
            }
            _ => {}
        }
    }

    if escape {
        // Input ended mid-escape; the backslash carries no content.
        out.pop();
    }
    if in_string {
        out.push('"');
    }

    let without_comma = out.trim_end().strip_suffix(',');
    if let Some(stripped) = without_comma {
        out = stripped.to_string();
    }

    while let Some(open) = stack.pop() {
        out.push(match open {
            '{' => '}',
            _ => ']',
        });
    }

    serde_json::from_str::<serde_json::Value>(&out)
        .ok()
        .map(|_| out)
}
