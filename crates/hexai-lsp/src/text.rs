//! Text utilities: position arithmetic, prefix deduplication, and model-output
//! normalization
//!
//! Positions arriving from the editor are byte offsets; every helper clamps
//! them to line length and snaps to a UTF-8 boundary so malformed offsets can
//! never panic the server.

/// Split text into lines with `\r\n` normalized to `\n`
pub fn split_lines(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split('\n')
        .map(str::to_string)
        .collect()
}

/// First line of a possibly multi-line string
pub fn first_line(s: &str) -> &str {
    match s.find(['\r', '\n']) {
        Some(idx) => &s[..idx],
        None => s,
    }
}

/// Trimmed string capped at 200 chars for documentation/log payloads
pub fn trim_len(s: &str) -> String {
    let t = s.trim();
    if t.chars().count() <= 200 {
        return t.to_string();
    }
    let cut: String = t.chars().take(200).collect();
    format!("{cut}…")
}

/// Truncate a payload for log previews
pub fn preview(s: &str, limit: usize) -> String {
    let flat = s.replace('\n', "\\n");
    if flat.chars().count() <= limit {
        return flat;
    }
    let cut: String = flat.chars().take(limit).collect();
    format!("{cut}…")
}

/// Clamp a byte offset into `s` to its length, snapped back to a char boundary
pub fn clamp_offset(s: &str, offset: usize) -> usize {
    let mut idx = offset.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Whether a byte is part of an identifier
pub fn is_ident_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

/// Whether a byte ends an identifier token
pub fn is_ident_boundary(ch: u8) -> bool {
    !is_ident_char(ch)
}

/// Walk left from `at` to the start of the identifier word under the cursor
pub fn word_start(line: &str, at: usize) -> usize {
    let mut at = clamp_offset(line, at);
    let bytes = line.as_bytes();
    while at > 0 && is_ident_char(bytes[at - 1]) {
        at -= 1;
    }
    at
}

/// Leading spaces and tabs of a line
pub fn leading_indent(line: &str) -> &str {
    let end = line
        .find(|c| c != ' ' && c != '\t')
        .unwrap_or(line.len());
    &line[..end]
}

/// Prefix every non-empty suggestion line with `indent` unless already indented
pub fn apply_indent(indent: &str, suggestion: &str) -> String {
    if indent.is_empty() || suggestion.is_empty() {
        return suggestion.to_string();
    }
    let lines: Vec<String> = split_lines(suggestion)
        .into_iter()
        .map(|line| {
            if line.trim().is_empty() || line.starts_with(indent) {
                line
            } else {
                format!("{indent}{line}")
            }
        })
        .collect();
    lines.join("\n")
}

/// Remove surrounding Markdown code fences when the entire response is wrapped
/// (e.g. starting with ```` ```go ```` and ending with ```` ``` ````).
pub fn strip_code_fences(s: &str) -> String {
    let t = s.trim();
    if t.is_empty() {
        return t.to_string();
    }
    let lines = split_lines(t);
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    let (Some(start), Some(end)) = (start, end) else {
        return t.to_string();
    };
    let first = lines[start].trim();
    let last = lines[end].trim();
    if first.starts_with("```") && last == "```" && end > start {
        return lines[start + 1..end].join("\n");
    }
    t.to_string()
}

/// Contents of the first inline backtick span, if any
pub fn strip_inline_code_span(s: &str) -> String {
    let t = s.trim();
    let Some(open) = t.find('`') else {
        return t.to_string();
    };
    let Some(close) = t[open + 1..].find('`') else {
        return t.to_string();
    };
    t[open + 1..open + 1 + close].to_string()
}

/// Remove a duplicated assignment prefix (e.g. `name :=` or `name =`) from the
/// start of a suggestion when that prefix already sits immediately left of the
/// cursor with only whitespace after it.
pub fn strip_duplicate_assignment_prefix(prefix_before_cursor: &str, suggestion: &str) -> String {
    let s2 = suggestion.trim_start_matches([' ', '\t']);

    // Prefer := when it ends the prefix
    if let Some(stripped) = strip_assignment_at(prefix_before_cursor, s2, ":=") {
        return stripped;
    }
    // Fall back to a plain '=' that is not part of ':='
    if let Some(idx) = prefix_before_cursor.rfind('=') {
        let colon_eq = idx > 0 && prefix_before_cursor.as_bytes()[idx - 1] == b':';
        if !colon_eq {
            if let Some(stripped) = strip_assignment_at(prefix_before_cursor, s2, "=") {
                return stripped;
            }
        }
    }
    suggestion.to_string()
}

/// Shared assignment-stripping walk for a given operator at the end of the prefix
fn strip_assignment_at(prefix: &str, suggestion: &str, op: &str) -> Option<String> {
    let idx = prefix.rfind(op)?;
    let tail = &prefix[idx + op.len()..];
    if !tail.trim().is_empty() {
        return None;
    }
    // Extend left over the identifier (and any spacing) being assigned
    let bytes = prefix.as_bytes();
    let mut start = idx;
    while start > 0 {
        let ch = bytes[start - 1];
        if is_ident_char(ch) || ch == b' ' || ch == b'\t' {
            start -= 1;
        } else {
            break;
        }
    }
    let seg = prefix[start..idx + op.len()].trim_end_matches([' ', '\t']);
    let rest = suggestion.strip_prefix(seg)?;
    Some(rest.trim_start_matches([' ', '\t']).to_string())
}

/// Remove an already-typed prefix that the model repeated: exact-match removal
/// of the whole left-of-cursor text, or the longest token-boundary-aligned
/// suffix of it that prefixes the suggestion.
pub fn strip_duplicate_general_prefix(prefix_before_cursor: &str, suggestion: &str) -> String {
    if suggestion.is_empty() {
        return suggestion.to_string();
    }
    let s = suggestion.trim_start_matches([' ', '\t']);
    let p = prefix_before_cursor.trim_end_matches([' ', '\t']);
    if !p.is_empty() {
        if let Some(rest) = s.strip_prefix(p) {
            return rest.trim_start_matches([' ', '\t']).to_string();
        }
    }
    let bytes = p.as_bytes();
    for k in (1..p.len()).rev() {
        if !p.is_char_boundary(k) || !is_ident_boundary(bytes[k - 1]) {
            continue;
        }
        let suf = p[k..].trim_start_matches([' ', '\t']);
        if suf.is_empty() {
            continue;
        }
        if let Some(rest) = s.strip_prefix(suf) {
            return rest.trim_start_matches([' ', '\t']).to_string();
        }
    }
    suggestion.to_string()
}
