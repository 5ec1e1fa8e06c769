use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RuleguardError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries `RULEGUARD_{PROFILE}_{KEY}` first, falls back
/// to `RULEGUARD_{KEY}`.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("RULEGUARD_{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(&format!("RULEGUARD_{}", key))
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).as_deref() {
        Some("true") | Some("1") | Some("yes") => true,
        Some("false") | Some("0") | Some("no") => false,
        _ => default,
    }
}

// ── Analysis config ───────────────────────────────────────────

/// Timing, budget and cache settings consumed by the analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    /// Debounce before the fast tier runs after an edit.
    pub static_debounce_ms: u64,
    /// Delay before the expensive tier runs after a resource is opened.
    pub ai_delay_on_open_ms: u64,
    /// Delay before the expensive tier runs after an edit.
    pub ai_delay_on_edit_ms: u64,
    /// Minimum interval between expensive runs on unchanged content.
    pub ai_cooldown_ms: u64,
    /// Upper bound for a single expensive invocation.
    pub ai_timeout_ms: u64,
    pub max_ai_requests_per_minute: u32,
    pub max_file_size_for_ai_kb: u64,
    pub cache_ttl_ms: u64,
    pub cache_max_entries: usize,
    /// Master switch for the expensive tier.
    pub ai_enabled: bool,
    pub ai: AiBackendConfig,
}

impl AnalysisConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RULEGUARD_PROFILE`.
    pub fn from_env() -> Self {
        let profile = env_or("RULEGUARD_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let d = Self::default();
        Self {
            profile: p.to_string(),
            static_debounce_ms: profiled_env_u64(p, "STATIC_DEBOUNCE_MS", d.static_debounce_ms),
            ai_delay_on_open_ms: profiled_env_u64(p, "AI_DELAY_ON_OPEN_MS", d.ai_delay_on_open_ms),
            ai_delay_on_edit_ms: profiled_env_u64(p, "AI_DELAY_ON_EDIT_MS", d.ai_delay_on_edit_ms),
            ai_cooldown_ms: profiled_env_u64(p, "AI_COOLDOWN_MS", d.ai_cooldown_ms),
            ai_timeout_ms: profiled_env_u64(p, "AI_TIMEOUT_MS", d.ai_timeout_ms),
            max_ai_requests_per_minute: profiled_env_u32(
                p,
                "MAX_AI_REQUESTS_PER_MINUTE",
                d.max_ai_requests_per_minute,
            ),
            max_file_size_for_ai_kb: profiled_env_u64(
                p,
                "MAX_FILE_SIZE_FOR_AI_KB",
                d.max_file_size_for_ai_kb,
            ),
            cache_ttl_ms: profiled_env_u64(p, "CACHE_TTL_MS", d.cache_ttl_ms),
            cache_max_entries: profiled_env_u64(p, "CACHE_MAX_ENTRIES", d.cache_max_entries as u64)
                as usize,
            ai_enabled: profiled_env_bool(p, "AI_ENABLED", d.ai_enabled),
            ai: AiBackendConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    pub fn static_debounce(&self) -> Duration {
        Duration::from_millis(self.static_debounce_ms)
    }

    pub fn ai_delay_on_open(&self) -> Duration {
        Duration::from_millis(self.ai_delay_on_open_ms)
    }

    pub fn ai_delay_on_edit(&self) -> Duration {
        Duration::from_millis(self.ai_delay_on_edit_ms)
    }

    pub fn ai_cooldown(&self) -> Duration {
        Duration::from_millis(self.ai_cooldown_ms)
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_millis(self.ai_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Size ceiling for the expensive tier, in bytes.
    pub fn max_ai_bytes(&self) -> usize {
        (self.max_file_size_for_ai_kb as usize).saturating_mul(1024)
    }

    /// Reject settings the engine cannot operate with.
    pub fn validate(&self) -> Result<(), RuleguardError> {
        if self.max_ai_requests_per_minute == 0 {
            return Err(RuleguardError::Config(
                "max_ai_requests_per_minute must be at least 1".to_string(),
            ));
        }
        if self.ai_timeout_ms == 0 {
            return Err(RuleguardError::Config("ai_timeout_ms must be positive".to_string()));
        }
        if self.cache_max_entries == 0 {
            return Err(RuleguardError::Config(
                "cache_max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  timing:   static_debounce={}ms, ai_open={}ms, ai_edit={}ms, cooldown={}ms, timeout={}ms",
            self.static_debounce_ms,
            self.ai_delay_on_open_ms,
            self.ai_delay_on_edit_ms,
            self.ai_cooldown_ms,
            self.ai_timeout_ms
        );
        tracing::info!(
            "  budget:   {}/min, max_file={}KB",
            self.max_ai_requests_per_minute,
            self.max_file_size_for_ai_kb
        );
        tracing::info!(
            "  cache:    ttl={}ms, max_entries={}",
            self.cache_ttl_ms,
            self.cache_max_entries
        );
        tracing::info!(
            "  ai:       enabled={}, backend={}, model_family={}, tool={}, api_key={}",
            self.ai_enabled,
            self.ai.backend,
            self.ai.model_family,
            self.ai.external_tool,
            if self.ai.api_key.is_some() { "(set)" } else { "(none)" }
        );
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            static_debounce_ms: 500,
            ai_delay_on_open_ms: 2_000,
            ai_delay_on_edit_ms: 30_000,
            ai_cooldown_ms: 60_000,
            ai_timeout_ms: 120_000,
            max_ai_requests_per_minute: 6,
            max_file_size_for_ai_kb: 100,
            cache_ttl_ms: 30 * 60 * 1_000,
            cache_max_entries: 200,
            ai_enabled: true,
            ai: AiBackendConfig::default(),
        }
    }
}

// ── AI backend ────────────────────────────────────────────────

/// Which backend executes the expensive tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Streamed HTTP call to a model API from inside this process.
    InProcess,
    /// A spawned CLI tool fed through stdin.
    ExternalProcess,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::InProcess => write!(f, "in-process"),
            BackendKind::ExternalProcess => write!(f, "external-process"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = RuleguardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in-process" | "inprocess" | "api" => Ok(BackendKind::InProcess),
            "external-process" | "external" | "cli" => Ok(BackendKind::ExternalProcess),
            other => Err(RuleguardError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiBackendConfig {
    pub backend: BackendKind,
    /// Model used by the in-process backend.
    pub model_family: String,
    /// Executable name or path for the external-process backend.
    pub external_tool: String,
    /// Model identifier passed to the external tool (tool default if unset).
    pub external_model: Option<String>,
    /// API key for the in-process backend. Never serialized.
    #[serde(skip)]
    pub api_key: Option<String>,
    pub api_base_url: String,
}

impl AiBackendConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        let backend = profiled_env_opt(p, "AI_BACKEND")
            .and_then(|v| match v.parse() {
                Ok(kind) => Some(kind),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring RULEGUARD_AI_BACKEND");
                    None
                }
            })
            .unwrap_or(d.backend);
        Self {
            backend,
            model_family: profiled_env_or(p, "AI_MODEL_FAMILY", &d.model_family),
            external_tool: profiled_env_or(p, "AI_EXTERNAL_TOOL", &d.external_tool),
            external_model: profiled_env_opt(p, "AI_EXTERNAL_MODEL"),
            api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY")
                .or_else(|| env_opt("ANTHROPIC_API_KEY")),
            api_base_url: profiled_env_or(p, "AI_BASE_URL", &d.api_base_url),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.backend {
            BackendKind::InProcess => self.api_key.is_some(),
            BackendKind::ExternalProcess => !self.external_tool.is_empty(),
        }
    }
}

impl Default for AiBackendConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::ExternalProcess,
            model_family: "claude-sonnet-4-20250514".to_string(),
            external_tool: "claude".to_string(),
            external_model: None,
            api_key: None,
            api_base_url: "https://api.anthropic.com".to_string(),
        }
    }
}
