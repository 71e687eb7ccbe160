//! In-memory document store
//!
//! One document per open URI, replaced wholesale on `didChange` (the server
//! advertises full-text sync only). Documents are held behind `Arc` so read
//! paths take a snapshot and never hold the lock across suspension points.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::text::{clamp_offset, split_lines};
use crate::types::{Position, Range};

/// Lines that look like the start of a function/type signature
const SIGNATURE_KEYWORDS: [&str; 6] = ["func ", "def ", "class ", "fn ", "procedure ", "sub "];

/// An open document: full text plus its cached LF-normalized line split
#[derive(Debug, Clone)]
pub struct Document {
    pub uri: String,
    pub text: String,
    pub lines: Vec<String>,
}

impl Document {
    /// Create a document, normalizing CRLF line endings in the line split
    pub fn new(uri: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let lines = split_lines(&text);
        Self {
            uri: uri.into(),
            text,
            lines,
        }
    }

    /// Line index clamped into the document
    fn clamp_line(&self, line: u32) -> usize {
        (line as usize).min(self.lines.len().saturating_sub(1))
    }
}

/// Surrounding lines for a cursor position
#[derive(Debug, Clone, Default)]
pub struct LineContext {
    pub above: String,
    pub current: String,
    pub below: String,
    /// Nearest enclosing signature line, scanning upward
    pub function: String,
}

/// Store of open documents; multiple readers, one writer
#[derive(Default)]
pub struct DocumentStore {
    docs: RwLock<HashMap<String, Arc<Document>>>,
}

impl DocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the document for a URI
    pub fn set(&self, uri: &str, text: &str) {
        let doc = Arc::new(Document::new(uri, text));
        self.docs
            .write()
            .expect("document store lock")
            .insert(uri.to_string(), doc);
    }

    /// Remove a closed document
    pub fn remove(&self, uri: &str) {
        self.docs.write().expect("document store lock").remove(uri);
    }

    /// Snapshot of the document for a URI
    pub fn get(&self, uri: &str) -> Option<Arc<Document>> {
        self.docs
            .read()
            .expect("document store lock")
            .get(uri)
            .cloned()
    }

    /// The lines around the cursor plus the nearest enclosing signature line
    pub fn line_context(&self, uri: &str, pos: Position) -> LineContext {
        let Some(doc) = self.get(uri) else {
            return LineContext::default();
        };
        if doc.lines.is_empty() {
            return LineContext::default();
        }
        let idx = doc.clamp_line(pos.line);
        let mut ctx = LineContext {
            current: doc.lines[idx].clone(),
            ..LineContext::default()
        };
        if idx > 0 {
            ctx.above = doc.lines[idx - 1].clone();
        }
        if idx + 1 < doc.lines.len() {
            ctx.below = doc.lines[idx + 1].clone();
        }
        for line in doc.lines[..=idx].iter().rev() {
            let trimmed = line.trim();
            if SIGNATURE_KEYWORDS.iter().any(|kw| trimmed.contains(kw)) {
                ctx.function = trimmed.to_string();
                break;
            }
        }
        ctx
    }

    /// Whether the cursor sits inside a function signature, before the opening
    /// `{` of the body. Scans upward for a signature-start line, stopping at a
    /// closing brace that likely ends a previous block.
    pub fn is_defining_new_function(&self, uri: &str, pos: Position) -> bool {
        let Some(doc) = self.get(uri) else {
            return false;
        };
        if doc.lines.is_empty() {
            return false;
        }
        let idx = doc.clamp_line(pos.line);

        let mut sig_start = None;
        for i in (0..=idx).rev() {
            let line = &doc.lines[i];
            if SIGNATURE_KEYWORDS.iter().any(|kw| line.contains(kw)) {
                sig_start = Some(i);
                break;
            }
            if line.contains('}') {
                break;
            }
        }
        let Some(sig_start) = sig_start else {
            return false;
        };

        // A '{' between the signature start and the cursor means we are in the body
        for i in sig_start..=idx {
            if let Some(brace) = doc.lines[i].find('{') {
                if i < idx {
                    return false;
                }
                if pos.character as usize > brace {
                    return false;
                }
            }
        }
        true
    }

    /// The full document text split at the cursor: (before, after)
    pub fn before_after(&self, uri: &str, pos: Position) -> (String, String) {
        let Some(doc) = self.get(uri) else {
            return (String::new(), String::new());
        };
        if doc.lines.is_empty() {
            return (String::new(), String::new());
        }
        let line = doc.clamp_line(pos.line);
        let col = clamp_offset(&doc.lines[line], pos.character as usize);

        let mut before = String::new();
        for l in &doc.lines[..line] {
            before.push_str(l);
            before.push('\n');
        }
        before.push_str(&doc.lines[line][..col]);

        let mut after = String::new();
        after.push_str(&doc.lines[line][col..]);
        for l in &doc.lines[line + 1..] {
            after.push('\n');
            after.push_str(l);
        }
        (before, after)
    }
}

/// The exact text within a document range, clamping characters to line lengths
pub fn extract_range(doc: &Document, range: Range) -> String {
    if doc.lines.is_empty() {
        return String::new();
    }
    let range = range.normalized();
    let start_line = doc.clamp_line(range.start.line);
    let end_line = doc.clamp_line(range.end.line);

    if start_line == end_line {
        let line = &doc.lines[start_line];
        let a = clamp_offset(line, range.start.character as usize);
        let b = clamp_offset(line, range.end.character as usize);
        if a > b {
            return String::new();
        }
        return line[a..b].to_string();
    }

    let mut out = String::new();
    let first = &doc.lines[start_line];
    out.push_str(&first[clamp_offset(first, range.start.character as usize)..]);
    out.push('\n');
    for line in &doc.lines[start_line + 1..end_line] {
        out.push_str(line);
        out.push('\n');
    }
    let last = &doc.lines[end_line];
    out.push_str(&last[..clamp_offset(last, range.end.character as usize)]);
    out
}
