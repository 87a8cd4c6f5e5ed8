use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use ragdesk_core::models::UserId;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory for the persisted snapshot. In-memory only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: None,
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama host, or an OpenAI-compatible endpoint).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_embed_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_embed_timeout_secs(),
            max_retries: default_embed_max_retries(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_embed_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_completion_max_retries")]
    pub max_retries: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_completion_model(),
            temperature: default_temperature(),
            url: None,
            timeout_secs: default_completion_timeout_secs(),
            max_retries: default_completion_max_retries(),
        }
    }
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    1.0
}
fn default_completion_timeout_secs() -> u64 {
    60
}
fn default_completion_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    /// Most recent exchanges kept per user; 0 keeps everything.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
        }
    }
}

fn default_max_history() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdmissionConfig {
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_support_keyword")]
    pub support_keyword: String,
    #[serde(default = "default_end_support_keyword")]
    pub end_support_keyword: String,
    #[serde(default = "default_topic_keyword")]
    pub topic_keyword: String,
    /// Users allowed to send non-text messages (document uploads).
    #[serde(default)]
    pub privileged_users: Vec<UserId>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            support_keyword: default_support_keyword(),
            end_support_keyword: default_end_support_keyword(),
            topic_keyword: default_topic_keyword(),
            privileged_users: Vec::new(),
        }
    }
}

fn default_daily_limit() -> u32 {
    10
}
fn default_support_keyword() -> String {
    "/support".to_string()
}
fn default_end_support_keyword() -> String {
    "/end_support".to_string()
}
fn default_topic_keyword() -> String {
    "/topic".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a TOML configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.index.batch_size < 1 {
        bail!("index.batch_size must be >= 1");
    }

    // Validate admission
    let admission = &config.admission;
    if admission.daily_limit < 1 {
        bail!("admission.daily_limit must be >= 1");
    }
    let keywords = [
        &admission.support_keyword,
        &admission.end_support_keyword,
        &admission.topic_keyword,
    ];
    if keywords.iter().any(|k| k.trim().is_empty()) {
        bail!("admission keywords must not be empty");
    }
    if keywords[0] == keywords[1] || keywords[0] == keywords[2] || keywords[1] == keywords[2] {
        bail!("admission keywords must be distinct");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.completion.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown completion provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/ragdesk.sqlite"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.chunking.max_chars, 1000);
        assert_eq!(config.chunking.overlap_chars, 100);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.admission.daily_limit, 10);
        assert_eq!(config.admission.support_keyword, "/support");
        assert_eq!(config.conversation.max_history, 20);
        assert!(!config.embedding.is_enabled());
        assert!(config.index.dir.is_none());
    }

    #[test]
    fn test_rejects_overlap_not_below_max() {
        let toml = format!("{}\n[chunking]\nmax_chars = 100\noverlap_chars = 100\n", MINIMAL);
        assert!(parse_config(&toml).is_err());
    }

    #[test]
    fn test_rejects_duplicate_keywords() {
        let toml = format!(
            "{}\n[admission]\nsupport_keyword = \"/help\"\nend_support_keyword = \"/help\"\n",
            MINIMAL
        );
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("distinct"));
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let toml = format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL);
        assert!(parse_config(&toml).is_err());

        let toml = format!(
            "{}\n[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n",
            MINIMAL
        );
        assert!(parse_config(&toml).unwrap().embedding.is_enabled());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let toml = format!("{}\n[completion]\nprovider = \"magic\"\n", MINIMAL);
        assert!(parse_config(&toml).is_err());
    }
}
