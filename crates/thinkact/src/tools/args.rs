//! Tool-argument parsing and repair.
//!
//! Models occasionally wrap tool arguments in prose or emit raw newlines and
//! tabs inside JSON strings. [`normalize_arguments`] recovers the intended
//! JSON before a call is dispatched; if nothing can be recovered the raw
//! string is passed through so the tool can report the problem itself.

/// Normalize a raw tool-argument string.
///
/// - Blank input becomes `{}`.
/// - Valid JSON is returned trimmed and otherwise untouched.
/// - Otherwise the first balanced JSON object or array is extracted, and raw
///   control characters inside string literals are escaped.
pub fn normalize_arguments(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "{}".to_string();
    }
    if is_valid_json(trimmed) {
        return trimmed.to_string();
    }

    let candidate = extract_json(trimmed).unwrap_or(trimmed);
    if is_valid_json(candidate) {
        return candidate.to_string();
    }

    let escaped = escape_control_chars(candidate);
    if is_valid_json(&escaped) {
        return escaped;
    }
    raw.to_string()
}

fn is_valid_json(s: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(s).is_ok()
}

/// Find the first balanced `{...}` or `[...]` in `s`, ignoring brackets that
/// appear inside string literals.
pub fn extract_json(s: &str) -> Option<&str> {
    let start = s.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in s.get(start..)?.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return s.get(start..end);
                }
            }
            _ => {}
        }
    }
    None
}

/// Escape raw newlines, carriage returns, and tabs that appear inside JSON
/// string literals.
pub fn escape_control_chars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(ch);
                continue;
            }
            match ch {
                '\\' => {
                    escaped = true;
                    out.push(ch);
                }
                '"' => {
                    in_string = false;
                    out.push(ch);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
        } else {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
        }
    }
    out
}

/// Parse raw JSON arguments into a typed struct.
///
/// Returns a formatted error string suitable for returning directly from
/// [`Tool::execute`](super::core::Tool::execute).
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(arguments: &str) -> Result<T, String> {
    serde_json::from_str(arguments).map_err(|e| {
        format!(
            "Error: invalid tool arguments: {e}. \
             Please provide valid JSON matching the tool's parameter schema."
        )
    })
}
