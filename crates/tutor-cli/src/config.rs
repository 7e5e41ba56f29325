use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::warn;
use tutor_core::Label;
use tutor_core::handler::QUERY_PLACEHOLDER;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorConfig {
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

// ── Backends ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default = "default_academic_backend")]
    pub academic: BackendConfig,
    #[serde(default = "default_coding_backend")]
    pub coding: BackendConfig,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            academic: default_academic_backend(),
            coding: default_coding_backend(),
        }
    }
}

impl BackendsConfig {
    pub fn get(&self, label: Label) -> &BackendConfig {
        match label {
            Label::Academic => &self.academic,
            Label::Coding => &self.coding,
        }
    }
}

/// One OpenAI-compatible chat-completions endpoint
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Framing template, must contain `{query}`
    #[serde(default)]
    pub prompt: Option<String>,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &mask_secret(&self.api_key))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("prompt", &self.prompt)
            .finish()
    }
}

impl BackendConfig {
    fn validate(&self, section: &str) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("[{}] name must not be empty", section);
        }
        if self.base_url.trim().is_empty() {
            bail!("[{}] base_url must not be empty", section);
        }
        if self.model.trim().is_empty() {
            bail!(
                "[{}] model is empty. Set it in the config or through the referenced env var",
                section
            );
        }
        if self.timeout_secs == 0 {
            bail!("[{}] timeout_secs must be greater than zero", section);
        }
        if let Some(prompt) = &self.prompt {
            if !prompt.contains(QUERY_PLACEHOLDER) {
                bail!(
                    "[{}] prompt must contain the {} placeholder",
                    section,
                    QUERY_PLACEHOLDER
                );
            }
        }
        Ok(())
    }
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_academic_backend() -> BackendConfig {
    BackendConfig {
        name: "groq".to_string(),
        base_url: "https://api.groq.com/openai/v1".to_string(),
        api_key: String::new(),
        model: "llama-3.3-70b-versatile".to_string(),
        max_tokens: None,
        timeout_secs: default_timeout_secs(),
        prompt: None,
    }
}

fn default_coding_backend() -> BackendConfig {
    BackendConfig {
        name: "openrouter".to_string(),
        base_url: "https://openrouter.ai/api/v1".to_string(),
        api_key: String::new(),
        model: String::new(),
        max_tokens: None,
        timeout_secs: default_timeout_secs(),
        prompt: None,
    }
}

// ── Classifier ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierMode {
    #[default]
    Keyword,
    Model,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub mode: ClassifierMode,
    /// Label used when classification fails
    #[serde(default)]
    pub fallback: Label,
    /// Replaces the built-in coding signal terms
    #[serde(default)]
    pub coding_terms: Option<Vec<String>>,
    #[serde(default)]
    pub model: Option<BackendConfig>,
}

// ── History ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_history_path")]
    pub path: String,
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    /// Prune older interactions when the gateway starts
    #[serde(default)]
    pub retain_days: Option<u32>,
}

fn default_true() -> bool {
    true
}

fn default_history_path() -> String {
    "~/.tutor/history.db".to_string()
}

fn default_recent_limit() -> usize {
    10
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_history_path(),
            recent_limit: default_recent_limit(),
            retain_days: None,
        }
    }
}

// ── Gateway ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
        }
    }
}

impl GatewayConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("Invalid gateway address {}:{}", self.bind, self.port))
    }
}

/// Mask a secret string for safe display in Debug output / logs.
/// Shows first 3 and last 4 chars for keys longer than 7 chars, otherwise "***".
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tutor")
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

impl TutorConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        // The file holds API keys
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow::anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `tutor init` first.",
                path.display()
            )
        })?;

        Self::parse(&content).with_context(|| format!("Invalid config at {}", path.display()))
    }

    /// Parse config text, expanding `${VAR}` from the process environment
    pub fn parse(content: &str) -> Result<Self> {
        Self::parse_with(content, |name| std::env::var(name).ok())
    }

    pub fn parse_with<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        for section in hardcoded_key_sections(content) {
            warn!(
                "API key for [{}] is hardcoded in config file. For security, use environment variables: api_key = \"${{VAR}}\"",
                section
            );
        }

        let expanded = expand_env_vars(content, lookup);
        let config: Self = toml::from_str(&expanded).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.backends.academic.validate("backends.academic")?;
        self.backends.coding.validate("backends.coding")?;

        if self.classifier.mode == ClassifierMode::Model {
            match &self.classifier.model {
                Some(model) => model.validate("classifier.model")?,
                None => bail!("classifier mode is \"model\" but [classifier.model] is missing"),
            }
        }

        if let Some(terms) = &self.classifier.coding_terms {
            if terms.iter().all(|t| t.trim().is_empty()) {
                bail!("classifier.coding_terms must contain at least one term");
            }
        }

        Ok(())
    }
}

/// Sections whose `api_key` is a literal rather than a `${VAR}` reference
fn hardcoded_key_sections(raw: &str) -> Vec<String> {
    let Ok(table) = raw.parse::<toml::Table>() else {
        return Vec::new();
    };

    let mut sections = Vec::new();
    let mut check = |section: &str, value: Option<&toml::Value>| {
        if let Some(key) = value
            .and_then(|v| v.get("api_key"))
            .and_then(|v| v.as_str())
        {
            if !key.is_empty() && !key.contains("${") {
                sections.push(section.to_string());
            }
        }
    };

    let backends = table.get("backends");
    check("backends.academic", backends.and_then(|b| b.get("academic")));
    check("backends.coding", backends.and_then(|b| b.get("coding")));
    check(
        "classifier.model",
        table.get("classifier").and_then(|c| c.get("model")),
    );
    sections
}

/// Allowlist of environment variable names that may be expanded in config files.
/// This prevents an attacker who can modify the config from reading arbitrary env vars.
const ALLOWED_ENV_VARS: &[&str] = &[
    "GROQ_API_KEY",
    "OPENROUTER_API_KEY",
    "OPENROUTER_MODEL",
    "TUTOR_CLASSIFIER_API_KEY",
    "HOME",
    "USER",
];

fn expand_env_vars<F>(s: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = lookup(&var_name).unwrap_or_default();
        let value_len = value.len();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value_len;
    }
    result
}
