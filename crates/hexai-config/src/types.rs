//! Application configuration model

use serde::{Deserialize, Serialize};

/// Default completion trigger characters advertised to the editor
pub const DEFAULT_TRIGGER_CHARACTERS: [&str; 6] = [".", ":", "/", "_", ")", "{"];

/// User-configurable settings read from `~/.config/hexai/config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Maximum tokens requested from the LLM per call
    pub max_tokens: u32,
    /// Additional-context mode: minimal | window | file-on-new-func | always-full
    pub context_mode: String,
    /// Window height (in lines) for the "window" context mode
    pub context_window_lines: usize,
    /// Token budget for additional context
    pub max_context_tokens: usize,
    /// Maximum characters of payload shown in log previews
    pub log_preview_limit: usize,
    /// Log the full completion context on every request
    pub log_context: bool,
    /// Sampling temperature for coding requests
    pub coding_temperature: Option<f64>,
    /// Minimum identifier prefix required for manually invoked completions
    pub manual_invoke_min_prefix: usize,
    /// Completion trigger characters
    pub trigger_characters: Vec<String>,

    /// Provider name: openai | ollama | copilot
    pub provider: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_temperature: Option<f64>,
    pub copilot_base_url: String,
    pub copilot_model: String,
    pub copilot_temperature: Option<f64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4000,
            context_mode: "always-full".to_string(),
            context_window_lines: 120,
            max_context_tokens: 4000,
            log_preview_limit: 100,
            log_context: false,
            coding_temperature: Some(0.2),
            manual_invoke_min_prefix: 1,
            trigger_characters: DEFAULT_TRIGGER_CHARACTERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            provider: String::new(),
            openai_base_url: String::new(),
            openai_model: String::new(),
            ollama_base_url: String::new(),
            ollama_model: String::new(),
            ollama_temperature: None,
            copilot_base_url: String::new(),
            copilot_model: String::new(),
            copilot_temperature: None,
        }
    }
}

/// The subset of fields a config file may set; unset fields keep the defaults
#[derive(Debug, Default, Deserialize)]
pub(crate) struct FileConfig {
    pub max_tokens: Option<u32>,
    pub context_mode: Option<String>,
    pub context_window_lines: Option<usize>,
    pub max_context_tokens: Option<usize>,
    pub log_preview_limit: Option<usize>,
    pub log_context: Option<bool>,
    pub coding_temperature: Option<f64>,
    pub manual_invoke_min_prefix: Option<usize>,
    pub trigger_characters: Option<Vec<String>>,
    pub provider: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub ollama_base_url: Option<String>,
    pub ollama_model: Option<String>,
    pub ollama_temperature: Option<f64>,
    pub copilot_base_url: Option<String>,
    pub copilot_model: Option<String>,
    pub copilot_temperature: Option<f64>,
}

impl AppConfig {
    /// Overlay file values on top of the defaults; empty strings and empty
    /// lists in the file are treated as unset.
    pub(crate) fn merge(mut self, file: FileConfig) -> Self {
        if let Some(v) = file.max_tokens.filter(|v| *v > 0) {
            self.max_tokens = v;
        }
        if let Some(v) = file.context_mode.filter(|v| !v.trim().is_empty()) {
            self.context_mode = v;
        }
        if let Some(v) = file.context_window_lines.filter(|v| *v > 0) {
            self.context_window_lines = v;
        }
        if let Some(v) = file.max_context_tokens.filter(|v| *v > 0) {
            self.max_context_tokens = v;
        }
        if let Some(v) = file.log_preview_limit {
            self.log_preview_limit = v;
        }
        if let Some(v) = file.log_context {
            self.log_context = v;
        }
        if let Some(v) = file.coding_temperature {
            self.coding_temperature = Some(v);
        }
        if let Some(v) = file.manual_invoke_min_prefix {
            self.manual_invoke_min_prefix = v;
        }
        if let Some(v) = file.trigger_characters.filter(|v| !v.is_empty()) {
            self.trigger_characters = v;
        }
        if let Some(v) = file.provider.filter(|v| !v.trim().is_empty()) {
            self.provider = v;
        }
        if let Some(v) = file.openai_base_url.filter(|v| !v.trim().is_empty()) {
            self.openai_base_url = v;
        }
        if let Some(v) = file.openai_model.filter(|v| !v.trim().is_empty()) {
            self.openai_model = v;
        }
        if let Some(v) = file.ollama_base_url.filter(|v| !v.trim().is_empty()) {
            self.ollama_base_url = v;
        }
        if let Some(v) = file.ollama_model.filter(|v| !v.trim().is_empty()) {
            self.ollama_model = v;
        }
        if let Some(v) = file.ollama_temperature {
            self.ollama_temperature = Some(v);
        }
        if let Some(v) = file.copilot_base_url.filter(|v| !v.trim().is_empty()) {
            self.copilot_base_url = v;
        }
        if let Some(v) = file.copilot_model.filter(|v| !v.trim().is_empty()) {
            self.copilot_model = v;
        }
        if let Some(v) = file.copilot_temperature {
            self.copilot_temperature = Some(v);
        }
        self
    }
}
