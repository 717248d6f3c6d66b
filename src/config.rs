use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the per-project config file looked up by [`load_config`].
pub const CONFIG_FILE_NAME: &str = ".callpath-context.json";

/// Token ceiling for the assembled source context of one call path.
pub const DEFAULT_BUDGET_TOKENS: usize = 130_000;

/// Module designation the profiler records for MPI runtime regions.
pub const DEFAULT_VENDOR_MODULE: &str = "MPI";

/// One `(source-prefix, destination-prefix)` pair.
///
/// Rules are kept in the order given; the first rule whose `from` is a prefix
/// of a module path decides where that file lives on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRewriteRule {
    pub from: String,
    pub to: String,
}

impl PathRewriteRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Parse the CLI form `SRC=DST`.
    pub fn parse(mapping: &str) -> Result<Self> {
        let Some((from, to)) = mapping.split_once('=') else {
            bail!("invalid path mapping {mapping:?}: expected SRC=DST");
        };
        if from.is_empty() {
            bail!("invalid path mapping {mapping:?}: empty source prefix");
        }
        Ok(Self::new(from, to))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenCounterKind {
    /// BPE encoding via tiktoken.
    Tiktoken,
    /// Bytes divided by `chars_per_token`, rounded up.
    CharRatio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenCounterConfig {
    pub kind: TokenCounterKind,
    /// tiktoken encoding name (`o200k_base`, `cl100k_base`, `p50k_base`, `r50k_base`).
    pub encoding: String,
    /// Only used by [`TokenCounterKind::CharRatio`].
    pub chars_per_token: usize,
}

impl Default for TokenCounterConfig {
    fn default() -> Self {
        Self {
            kind: TokenCounterKind::Tiktoken,
            encoding: "o200k_base".to_string(),
            chars_per_token: 4,
        }
    }
}

/// Settings for the OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// Base URL including the API version segment, e.g. `http://localhost:8000/v1`.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Model id. When absent the first model listed by the server is used.
    pub model: Option<String>,
    /// Answers shorter than this are re-requested.
    pub min_answer_chars: usize,
    pub max_attempts: usize,
    pub timeout_secs: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: None,
            min_answer_chars: 10,
            max_attempts: 5,
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ordered module-path rewrites (recording machine -> this machine).
    pub rewrite_rules: Vec<PathRewriteRule>,
    pub budget_tokens: usize,
    /// Demangle region names before building call paths.
    pub demangle: bool,
    /// Regions whose module equals this value get a placeholder instead of source.
    pub vendor_module: String,
    pub token_counter: TokenCounterConfig,
    pub reasoning: ReasoningConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rewrite_rules: vec![],
            budget_tokens: DEFAULT_BUDGET_TOKENS,
            demangle: true,
            vendor_module: DEFAULT_VENDOR_MODULE.to_string(),
            token_counter: TokenCounterConfig::default(),
            reasoning: ReasoningConfig::default(),
        }
    }
}

/// Load `{dir}/.callpath-context.json`, or defaults when the file is absent.
///
/// A file that exists but cannot be read or parsed is an error: silently
/// dropping the path mappings would turn every ancestor into a "not found"
/// warning. Rules with an empty `from` would match every path and are rejected.
pub fn load_config(dir: &Path) -> Result<Config> {
    let path = dir.join(CONFIG_FILE_NAME);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read config: {}", path.display()))
        }
    };

    let cfg = serde_json::from_str::<Config>(&text)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    if let Some(i) = cfg.rewrite_rules.iter().position(|r| r.from.is_empty()) {
        bail!(
            "invalid path mapping #{} in {}: empty source prefix",
            i + 1,
            path.display()
        );
    }
    Ok(cfg)
}
