use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ── Permission level ─────────────────────────────────────────────────────────

/// Ordered policy tier gating which tools may run.
///
/// | Level      | Typical tools                                          |
/// |------------|--------------------------------------------------------|
/// | `basic`    | Read-only queries (read a file, list processes).       |
/// | `advanced` | Writes and input automation (write a file, type text). |
/// | `admin`    | Destructive or system-wide (delete, kill, services).   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Basic,
    Advanced,
    Admin,
}

impl PermissionLevel {
    /// Ordinal used for tier comparison: `Basic < Advanced < Admin`.
    pub fn rank(self) -> u8 {
        match self {
            PermissionLevel::Basic => 0,
            PermissionLevel::Advanced => 1,
            PermissionLevel::Admin => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionLevel::Basic => "basic",
            PermissionLevel::Advanced => "advanced",
            PermissionLevel::Admin => "admin",
        }
    }

    /// Parse a configured level, falling back to `Basic` (the most
    /// restrictive tier) when the value is not recognised.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or(PermissionLevel::Basic)
    }
}

impl PartialOrd for PermissionLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PermissionLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(PermissionLevel::Basic),
            "advanced" => Ok(PermissionLevel::Advanced),
            "admin" => Ok(PermissionLevel::Admin),
            other => anyhow::bail!("unknown permission level: {other}"),
        }
    }
}

// ── Sections ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL for the Ollama API.  Overridden by `OLLAMA_HOST`.
    pub ollama_host: String,
    /// Model identifier sent with every chat request.  Overridden by
    /// `DEFAULT_TEXT_MODEL`.
    pub model: String,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ollama_host: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            request_timeout_secs: 120,
        }
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant with access to tools. \
When you need to use a tool, specify the tool call in your response. \
Use tools when they can help answer the user's question more accurately.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Upper bound on model calls per user turn.
    pub max_iterations: usize,
    /// Hard timeout applied to every tool call.
    pub tool_execution_timeout_secs: u64,
    /// Maximum number of messages retained in the conversation history.
    /// The leading system message is always kept.
    pub max_chat_history: usize,
    /// Empty string disables the system message entirely.
    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tool_execution_timeout_secs: 30,
            max_chat_history: 100,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// `basic`, `advanced` or `admin`.  Unrecognised values resolve to `basic`.
    pub permission_level: String,
    /// Global switch for human-in-the-loop confirmation.
    pub require_confirmation: bool,
    /// Per-class switch: confirm tools whose names look sensitive.
    pub sensitive_actions_require_confirmation: bool,
    pub enable_audit_log: bool,
    pub audit_log_path: String,
    /// How long a remembered confirmation decision stays valid.
    pub confirmation_ttl_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            permission_level: "advanced".to_string(),
            require_confirmation: true,
            sensitive_actions_require_confirmation: true,
            enable_audit_log: true,
            audit_log_path: "logs/audit.log".to_string(),
            confirmation_ttl_secs: 3600,
        }
    }
}

impl SecurityConfig {
    pub fn level(&self) -> PermissionLevel {
        PermissionLevel::parse_lenient(&self.permission_level)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// When non-empty, application logs go to a daily rolling file here.
    pub log_dir: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub security: SecurityConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load from a TOML file (missing file → defaults), then apply the
    /// environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(value) = env_string("OLLAMA_HOST") {
            self.llm.ollama_host = value;
        }
        if let Some(value) = env_string("DEFAULT_TEXT_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = env_string("PERMISSION_LEVEL") {
            self.security.permission_level = value;
        }
        if let Some(value) = env_bool("REQUIRE_CONFIRMATION") {
            self.security.require_confirmation = value;
        }
        if let Some(value) = env_bool("ENABLE_AUDIT_LOG") {
            self.security.enable_audit_log = value;
        }
        if let Some(value) = env_string("AUDIT_LOG_PATH") {
            self.security.audit_log_path = value;
        }
        if let Some(value) = env_parse("MAX_CHAT_HISTORY") {
            self.agent.max_chat_history = value;
        }
        if let Some(value) = env_parse("TOOL_EXECUTION_TIMEOUT") {
            self.agent.tool_execution_timeout_secs = value;
        }
        if let Some(value) = env_string("LOG_LEVEL") {
            self.telemetry.log_level = value.to_lowercase();
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|value| value.trim().eq_ignore_ascii_case("true"))
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|value| value.trim().parse().ok())
}

// ── Tests ────────────────────────────────────────────────────────────────────
