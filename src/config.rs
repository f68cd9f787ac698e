use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::tools::audit::{MAX_HISTORY_ENTRIES, MAX_TRACKED_TOOLS};

/// Default per-execution time bound
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default cap on file sizes read or written (2MB)
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 2_097_152;

/// Sandbox configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Absolute directories tools may touch
    pub allowed_roots: Vec<PathBuf>,

    /// Base for relative paths (first allowed root when unset)
    pub working_dir: Option<PathBuf>,

    /// Time bound applied when neither call nor tool overrides it
    pub default_timeout_ms: u64,

    /// Per-tool time bounds
    pub tool_timeouts_ms: HashMap<String, u64>,

    /// Audit records retained per tool
    pub max_history_entries: usize,

    /// Distinct tool ids with retained audit history
    pub max_tracked_tools: usize,

    /// Largest file read or content written, in bytes
    pub max_output_size: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            allowed_roots: Vec::new(),
            working_dir: None,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            tool_timeouts_ms: HashMap::new(),
            max_history_entries: MAX_HISTORY_ENTRIES,
            max_tracked_tools: MAX_TRACKED_TOOLS,
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
        }
    }
}

impl SandboxConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: SandboxConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// Load the default config file if present, otherwise defaults
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load(&config_path)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, toml_string).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;

        Ok(home.join(".sandboxbuddy").join("config.toml"))
    }

    pub fn with_allowed_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.allowed_roots.push(root.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_tool_timeout(mut self, tool_id: impl Into<String>, timeout: Duration) -> Self {
        self.tool_timeouts_ms
            .insert(tool_id.into(), timeout.as_millis() as u64);
        self
    }

    pub fn with_max_history_entries(mut self, entries: usize) -> Self {
        self.max_history_entries = entries;
        self
    }

    pub fn with_max_output_size(mut self, size: usize) -> Self {
        self.max_output_size = size;
        self
    }

    /// Effective time bound: call override, then per-tool, then default
    pub fn timeout_for(&self, tool_id: &str, call_override: Option<Duration>) -> Duration {
        call_override.unwrap_or_else(|| {
            let ms = self
                .tool_timeouts_ms
                .get(tool_id)
                .copied()
                .unwrap_or(self.default_timeout_ms);
            Duration::from_millis(ms)
        })
    }

    /// Working directory for relative paths
    pub fn effective_working_dir(&self) -> Option<PathBuf> {
        self.working_dir
            .clone()
            .or_else(|| self.allowed_roots.first().cloned())
    }
}
