//! Completion cache
//!
//! A small LRU mapping a context fingerprint to prior post-processed model
//! output. Keying on the right-trimmed left-of-cursor text (and its length)
//! makes trailing whitespace irrelevant, so retyping spaces after a word hits
//! the cache instead of the LLM.

use std::collections::HashMap;

use tracing::debug;

/// Maximum number of cached completions
pub const CACHE_CAPACITY: usize = 10;

/// Everything that distinguishes one completion context from another
#[derive(Debug, Clone, Copy)]
pub struct FingerprintInput<'a> {
    pub provider: &'a str,
    pub model: &'a str,
    pub temperature: Option<f64>,
    pub uri: &'a str,
    pub line: u32,
    pub above: &'a str,
    pub left_of_cursor: &'a str,
    pub right_of_cursor: &'a str,
    pub below: &'a str,
    pub function: &'a str,
    pub in_params: bool,
    pub extra_context: &'a str,
}

/// Deterministic cache key; fields are joined with the ASCII unit separator so
/// no field content can collide with the delimiter.
pub fn fingerprint(input: FingerprintInput<'_>) -> String {
    let left = input.left_of_cursor.trim_end_matches([' ', '\t']);
    let temperature = input
        .temperature
        .map(|t| t.to_string())
        .unwrap_or_default();
    let location = format!("{}:{}", input.line, left.len());
    let params = format!("params={}", input.in_params);
    [
        "v1",
        input.provider,
        input.model,
        temperature.as_str(),
        input.uri,
        location.as_str(),
        input.above,
        left,
        input.right_of_cursor,
        input.below,
        input.function,
        params.as_str(),
        input.extra_context,
    ]
    .join("\u{1f}")
}

/// Bounded LRU of fingerprint → completion text
pub struct CompletionCache {
    capacity: usize,
    entries: HashMap<String, String>,
    /// Keys ordered oldest-first; the last element is most recently used
    order: Vec<String>,
}

impl CompletionCache {
    /// Cache with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }

    /// Cache with an explicit capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Look up a fingerprint, promoting the entry to most recently used
    pub fn get(&mut self, key: &str) -> Option<String> {
        let value = self.entries.get(key).cloned()?;
        self.touch(key);
        Some(value)
    }

    /// Insert or update an entry, evicting the least recently used when full
    pub fn put(&mut self, key: String, value: String) {
        if self.entries.insert(key.clone(), value).is_some() {
            self.touch(&key);
            return;
        }
        self.order.push(key);
        if self.entries.len() > self.capacity {
            let oldest = self.order.remove(0);
            self.entries.remove(&oldest);
            debug!("completion cache evicted oldest entry");
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, key: &str) {
        if let Some(idx) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(idx);
            self.order.push(k);
        }
    }
}

impl Default for CompletionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(left: &'a str, line: u32) -> FingerprintInput<'a> {
        FingerprintInput {
            provider: "openai",
            model: "gpt-4.1",
            temperature: Some(0.2),
            uri: "file:///x.go",
            line,
            above: "",
            left_of_cursor: left,
            right_of_cursor: "",
            below: "",
            function: "",
            in_params: false,
            extra_context: "",
        }
    }

    #[test]
    fn test_fingerprint_ignores_trailing_whitespace() {
        let a = fingerprint(input("foo   ", 0));
        let b = fingerprint(input("foo             ", 0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_distinguishes_lines_and_content() {
        assert_ne!(fingerprint(input("foo", 0)), fingerprint(input("foo", 1)));
        assert_ne!(fingerprint(input("foo", 0)), fingerprint(input("bar", 0)));
    }

    #[test]
    fn test_lru_capacity_evicts_oldest() {
        let mut cache = CompletionCache::new();
        for i in 0..11 {
            cache.put(format!("k{i}"), format!("v{i}"));
        }
        assert_eq!(cache.len(), 10);
        assert!(cache.get("k0").is_none());
        for i in 1..11 {
            assert_eq!(cache.get(&format!("k{i}")).unwrap(), format!("v{i}"));
        }
    }

    #[test]
    fn test_get_touches_entry() {
        let mut cache = CompletionCache::with_capacity(2);
        cache.put("a".to_string(), "1".to_string());
        cache.put("b".to_string(), "2".to_string());
        // touch "a" so "b" becomes the eviction candidate
        assert!(cache.get("a").is_some());
        cache.put("c".to_string(), "3".to_string());
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_put_updates_existing_key_without_eviction() {
        let mut cache = CompletionCache::with_capacity(2);
        cache.put("a".to_string(), "1".to_string());
        cache.put("b".to_string(), "2".to_string());
        cache.put("a".to_string(), "updated".to_string());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap(), "updated");
        assert_eq!(cache.get("b").unwrap(), "2");
    }
}
