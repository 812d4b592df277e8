use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::env;

pub type Number = f32;

#[derive(Deserialize)]
pub struct RagdexConfig {
    pub path: Option<String>,
    pub metadata_path: Option<String>,
    pub docs_dir: Option<String>,
    pub dimensions: Option<usize>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub top_k: Option<usize>,
    pub embed_endpoint: Option<String>,
    pub embed_model: Option<String>,
    pub chat_endpoint: Option<String>,
    pub chat_model: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub max_answer_tokens: Option<u32>,
}

impl RagdexConfig {
    pub fn try_from(config: &Config) -> Result<Self, ConfigError> {
        Ok(RagdexConfig {
            path: config.get("path").ok(),
            metadata_path: config.get("metadata_path").ok(),
            docs_dir: config.get("docs_dir").ok(),
            dimensions: config.get("dimensions").ok(),
            chunk_size: config.get("chunk_size").ok(),
            chunk_overlap: config.get("chunk_overlap").ok(),
            top_k: config.get("top_k").ok(),
            embed_endpoint: config.get("embed_endpoint").ok(),
            embed_model: config.get("embed_model").ok(),
            chat_endpoint: config.get("chat_endpoint").ok(),
            chat_model: config.get("chat_model").ok(),
            request_timeout_secs: config.get("request_timeout_secs").ok(),
            max_answer_tokens: config.get("max_answer_tokens").ok(),
        })
    }
}

/// Fully resolved runtime settings, built once at startup from the optional
/// `ragdex_config` file merged with the `RAGDEX_*` environment.
pub struct State {
    pub path: String,
    pub metadata_path: String,
    pub docs_dir: String,
    pub dimensions: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub embed_endpoint: String,
    pub embed_model: String,
    pub chat_endpoint: String,
    pub chat_model: String,
    pub request_timeout_secs: u64,
    pub max_answer_tokens: u32,
}

impl State {
    pub fn new() -> Result<Self> {
        let mut config = Config::default();
        #[allow(deprecated)]
        {
            config.merge(ConfigFile::with_name("ragdex_config").required(false))?;
            config.merge(Environment::with_prefix("RAGDEX"))?;
        }

        let ragdex_config = RagdexConfig::try_from(&config)?;

        let path = ragdex_config
            .path
            .or_else(|| env::var("RAGDEX_PATH").ok())
            .context("RAGDEX_PATH not set in config or environment")?;

        let metadata_path = ragdex_config
            .metadata_path
            .or_else(|| env::var("RAGDEX_METADATA_PATH").ok())
            .unwrap_or_else(|| format!("{}.meta.json", path));

        let docs_dir = ragdex_config
            .docs_dir
            .or_else(|| env::var("RAGDEX_DOCS_DIR").ok())
            .unwrap_or_else(|| "data/docs".to_string());

        let dimensions = ragdex_config
            .dimensions
            .or_else(|| env::var("RAGDEX_DIMENSIONS").ok().and_then(|s| s.parse().ok()))
            .context("RAGDEX_DIMENSIONS not set in config or environment")?;

        let chunk_size = ragdex_config
            .chunk_size
            .or_else(|| env::var("RAGDEX_CHUNK_SIZE").ok().and_then(|s| s.parse().ok()))
            .unwrap_or(100);

        let chunk_overlap = ragdex_config
            .chunk_overlap
            .or_else(|| env::var("RAGDEX_CHUNK_OVERLAP").ok().and_then(|s| s.parse().ok()))
            .unwrap_or(20);

        let top_k = ragdex_config
            .top_k
            .or_else(|| env::var("RAGDEX_TOP_K").ok().and_then(|s| s.parse().ok()))
            .unwrap_or(6);

        let embed_endpoint = ragdex_config
            .embed_endpoint
            .or_else(|| env::var("RAGDEX_EMBED_ENDPOINT").ok())
            .context("RAGDEX_EMBED_ENDPOINT not set in config or environment")?;

        let embed_model = ragdex_config
            .embed_model
            .or_else(|| env::var("RAGDEX_EMBED_MODEL").ok())
            .unwrap_or_else(|| "nomic-embed-text".to_string());

        let chat_endpoint = ragdex_config
            .chat_endpoint
            .or_else(|| env::var("RAGDEX_CHAT_ENDPOINT").ok())
            .context("RAGDEX_CHAT_ENDPOINT not set in config or environment")?;

        let chat_model = ragdex_config
            .chat_model
            .or_else(|| env::var("RAGDEX_CHAT_MODEL").ok())
            .unwrap_or_else(|| "llama3.2".to_string());

        let request_timeout_secs = ragdex_config
            .request_timeout_secs
            .or_else(|| {
                env::var("RAGDEX_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or(30);

        let max_answer_tokens = ragdex_config
            .max_answer_tokens
            .or_else(|| {
                env::var("RAGDEX_MAX_ANSWER_TOKENS")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or(512);

        if dimensions == 0 {
            anyhow::bail!("RAGDEX_DIMENSIONS must be at least 1.");
        }
        if chunk_size == 0 {
            anyhow::bail!("RAGDEX_CHUNK_SIZE must be at least 1.");
        }
        if chunk_overlap >= chunk_size {
            anyhow::bail!("RAGDEX_CHUNK_OVERLAP must be smaller than RAGDEX_CHUNK_SIZE.");
        }

        Ok(Self {
            path,
            metadata_path,
            docs_dir,
            dimensions,
            chunk_size,
            chunk_overlap,
            top_k,
            embed_endpoint,
            embed_model,
            chat_endpoint,
            chat_model,
            request_timeout_secs,
            max_answer_tokens,
        })
    }

    pub fn print_config(&self) {
        println!("path={}", self.path);
        println!("metadata_path={}", self.metadata_path);
        println!("docs_dir={}", self.docs_dir);
        println!("dimensions={}", self.dimensions);
        println!("chunk_size={}", self.chunk_size);
        println!("chunk_overlap={}", self.chunk_overlap);
        println!("top_k={}", self.top_k);
        println!("embed_endpoint={}", self.embed_endpoint);
        println!("embed_model={}", self.embed_model);
        println!("chat_endpoint={}", self.chat_endpoint);
        println!("chat_model={}", self.chat_model);
        println!("request_timeout_secs={}", self.request_timeout_secs);
        println!("max_answer_tokens={}", self.max_answer_tokens);
    }
}
