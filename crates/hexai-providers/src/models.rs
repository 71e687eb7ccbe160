//! Data models shared by all providers

use serde::{Deserialize, Serialize};

/// A chat-style prompt message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message role (system, user, assistant)
    pub role: String,
    /// Message content
    pub content: String,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Per-request options; providers ignore fields they do not support
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Model override; the provider's default model is used when absent
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Stop sequences
    pub stop: Vec<String>,
}

impl ChatOptions {
    /// Options with only a max-token budget set
    pub fn with_max_tokens(max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            ..Self::default()
        }
    }
}

/// Truncate a payload for log output
pub(crate) fn preview(s: &str) -> String {
    const LIMIT: usize = 100;
    let flat = s.replace('\n', "\\n");
    if flat.chars().count() <= LIMIT {
        return flat;
    }
    let cut: String = flat.chars().take(LIMIT).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("a").role, "system");
        assert_eq!(Message::user("b").role, "user");
        assert_eq!(Message::assistant("c").role, "assistant");
    }

    #[test]
    fn test_preview_truncates_and_flattens() {
        let long = "x".repeat(500);
        let p = preview(&long);
        assert!(p.chars().count() <= 101);
        assert!(p.ends_with('…'));
        assert_eq!(preview("a\nb"), "a\\nb");
    }
}
