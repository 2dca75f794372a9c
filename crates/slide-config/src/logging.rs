use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// `[logging]` section. Every field has a default, so the section may be
/// omitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global level filter (`"info"`, `"debug"`, ...).
    pub level: String,
    /// Per-module overrides, e.g. `{ "slide_core::window" = "debug" }`.
    pub modules: HashMap<String, String>,
    /// Optional log file. Relative paths resolve against the config file's
    /// directory.
    pub file: Option<PathBuf>,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            modules: HashMap::new(),
            file: None,
            format: LogFormat::Plain,
        }
    }
}

impl LoggingConfig {
    /// Render `level` plus module overrides as an env-filter directive string.
    pub fn directives(&self) -> String {
        let mut modules: Vec<_> = self.modules.iter().collect();
        modules.sort();
        let mut directives = self.level.clone();
        for (module, level) in modules {
            directives.push(',');
            directives.push_str(module);
            directives.push('=');
            directives.push_str(level);
        }
        directives
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}
