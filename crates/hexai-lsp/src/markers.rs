//! Inline prompt markers
//!
//! A marker embeds a natural-language directive inside source text:
//!
//! - strict semicolon tag `;text;` — no space after the opening `;` nor before
//!   the closing `;`, inner text non-empty, never part of `;;`
//! - double-semicolon tag `;;text;` — removed whole-line by companion edits
//! - single-line block comments `/* text */` and `<!-- text -->`
//! - end-of-line comments `// text`, `# text`, `-- text`
//!
//! The earliest-occurring marker on a line wins for instruction extraction.

use crate::text::split_lines;
use crate::types::{Position, Range, TextEdit};

/// Find `;text;` with no space after the first `;` and no space before the
/// last `;`. Returns the inner text, the byte index of the opening `;`, and
/// the byte index just past the closing `;`.
pub fn find_strict_semicolon_tag(line: &str) -> Option<(String, usize, usize)> {
    let bytes = line.as_bytes();
    let mut pos = 0;
    while pos < line.len() {
        let j = line[pos..].find(';')? + pos;
        // require a single ';' (not ';;') followed by non-space
        if j + 1 >= line.len() || bytes[j + 1] == b';' || bytes[j + 1] == b' ' {
            pos = j + 1;
            continue;
        }
        let k = line[j + 1..].find(';')?;
        let close_idx = j + 1 + k;
        if bytes[close_idx - 1] == b' ' {
            pos = close_idx + 1;
            continue;
        }
        let inner = line[j + 1..close_idx].trim();
        if inner.is_empty() {
            pos = close_idx + 1;
            continue;
        }
        return Some((inner.to_string(), j, close_idx + 1));
    }
    None
}

/// Whether the line carries a `;;text;` marker (non-space content, closing `;`
/// not preceded by a space)
pub fn has_double_semicolon_trigger(line: &str) -> bool {
    let bytes = line.as_bytes();
    let mut pos = 0;
    while pos < line.len() {
        let Some(j) = line[pos..].find(";;") else {
            return false;
        };
        let j = j + pos;
        let content_start = j + 2;
        if content_start >= line.len() {
            return false;
        }
        let first = bytes[content_start];
        if first == b' ' || first == b';' {
            pos = content_start + 1;
            continue;
        }
        let Some(k) = line[content_start + 1..].find(';') else {
            return false;
        };
        let close_idx = content_start + 1 + k;
        if bytes[close_idx - 1] == b' ' {
            pos = close_idx + 1;
            continue;
        }
        return true;
    }
    false
}

/// A standalone `;;` with no inline content (possibly followed by whitespace
/// or a lone `;`); explicitly excludes the valid `;;text;` form.
pub fn is_bare_double_semicolon(line: &str) -> bool {
    let t = line.trim();
    if !t.contains(";;") || has_double_semicolon_trigger(t) {
        return false;
    }
    if let Some(rest) = t.strip_prefix(";;") {
        let rest = rest.trim();
        return rest.is_empty() || rest == ";";
    }
    false
}

/// Whether the line carries any inline prompt marker usable as a trigger
pub fn line_has_inline_prompt(line: &str) -> bool {
    find_strict_semicolon_tag(line).is_some() || has_double_semicolon_trigger(line)
}

/// The earliest instruction marker on the line, with the line cleaned of it.
/// Returns `(instruction, cleaned_line)`; the instruction may be empty for a
/// bare comment marker.
pub fn find_first_instruction_in_line(line: &str) -> Option<(String, String)> {
    struct Candidate {
        start: usize,
        end: usize,
        text: String,
    }
    let mut candidates: Vec<Candidate> = Vec::new();

    if let Some((text, start, end)) = find_strict_semicolon_tag(line) {
        candidates.push(Candidate { start, end, text });
    }
    if let Some(i) = line.find("/*") {
        if let Some(j) = line[i + 2..].find("*/") {
            candidates.push(Candidate {
                start: i,
                end: i + 2 + j + 2,
                text: line[i + 2..i + 2 + j].trim().to_string(),
            });
        }
    }
    if let Some(i) = line.find("<!--") {
        if let Some(j) = line[i + 4..].find("-->") {
            candidates.push(Candidate {
                start: i,
                end: i + 4 + j + 3,
                text: line[i + 4..i + 4 + j].trim().to_string(),
            });
        }
    }
    if let Some(i) = line.find("//") {
        candidates.push(Candidate {
            start: i,
            end: line.len(),
            text: line[i + 2..].trim().to_string(),
        });
    }
    if let Some(i) = line.find('#') {
        candidates.push(Candidate {
            start: i,
            end: line.len(),
            text: line[i + 1..].trim().to_string(),
        });
    }
    if let Some(i) = line.find("--") {
        candidates.push(Candidate {
            start: i,
            end: line.len(),
            text: line[i + 2..].trim().to_string(),
        });
    }

    let best = candidates.into_iter().min_by_key(|c| c.start)?;
    let cleaned = format!("{}{}", &line[..best.start], &line[best.end..]);
    Some((best.text, cleaned.trim_end_matches([' ', '\t']).to_string()))
}

/// Extract the first instruction from selection text, preferring the earliest
/// marker on the earliest line. Returns the instruction and the selection with
/// that marker removed.
pub fn instruction_from_selection(selection: &str) -> Option<(String, String)> {
    let mut lines = split_lines(selection);
    for idx in 0..lines.len() {
        if let Some((instr, cleaned)) = find_first_instruction_in_line(&lines[idx]) {
            if !instr.trim().is_empty() {
                lines[idx] = cleaned;
                return Some((instr, lines.join("\n")));
            }
        }
    }
    None
}

/// Edits that remove every inline prompt marker on the line. A `;;text;` line
/// is cleared entirely; otherwise each `;text;` tag is deleted in place (with
/// one trailing space, when present).
pub fn prompt_removal_edits_for_line(line: &str, line_num: u32) -> Vec<TextEdit> {
    if has_double_semicolon_trigger(line) {
        return vec![TextEdit::delete(Range::new(
            Position::new(line_num, 0),
            Position::new(line_num, line.len() as u32),
        ))];
    }
    collect_semicolon_markers(line, line_num)
}

fn collect_semicolon_markers(line: &str, line_num: u32) -> Vec<TextEdit> {
    let bytes = line.as_bytes();
    let mut edits = Vec::new();
    let mut pos = 0;
    while pos < line.len() {
        let Some(j) = line[pos..].find(';') else {
            break;
        };
        let j = j + pos;
        let Some(k) = line[j + 1..].find(';') else {
            break;
        };
        if j + 1 >= line.len() || bytes[j + 1] == b' ' {
            pos = j + 1;
            continue;
        }
        if bytes[j + 1] == b';' {
            pos = j + 2;
            continue;
        }
        let close_idx = j + 1 + k;
        if bytes[close_idx - 1] == b' ' || close_idx == j + 1 {
            pos = close_idx + 1;
            continue;
        }
        let mut end_char = close_idx + 1;
        if end_char < line.len() && bytes[end_char] == b' ' {
            end_char += 1;
        }
        edits.push(TextEdit::delete(Range::new(
            Position::new(line_num, j as u32),
            Position::new(line_num, end_char as u32),
        )));
        pos = end_char;
    }
    edits
}
