//! Environment-driven configuration.
//!
//! Everything has a default so `Config::from_env()` never fails; components
//! that cannot operate without a credential surface that at construction or
//! call time instead.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

/// Default iteration budget for the verify-refine loop.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Configuration for the chat-completions generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Base URL of an OpenAI-compatible API (no trailing `/v1`).
    pub base_url: String,
    /// Bearer token for the API.
    pub api_key: Option<SecretString>,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature. Low by default: scripts, not prose.
    pub temperature: f32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            timeout: Duration::from_secs(120),
        }
    }
}

impl GeneratorConfig {
    /// Load from `PATCHWRIGHT_GENERATOR_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_string("PATCHWRIGHT_GENERATOR_BASE_URL", defaults.base_url),
            api_key: std::env::var("PATCHWRIGHT_GENERATOR_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            model: env_string("PATCHWRIGHT_GENERATOR_MODEL", defaults.model),
            temperature: env_parsed("PATCHWRIGHT_GENERATOR_TEMPERATURE", defaults.temperature),
            timeout: Duration::from_secs(env_parsed(
                "PATCHWRIGHT_GENERATOR_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )),
        }
    }
}

/// Configuration for the embeddings client backing the knowledge index.
#[derive(Debug, Clone)]
pub struct EmbeddingsConfig {
    /// Base URL of an OpenAI-compatible API (no trailing `/v1`).
    pub base_url: String,
    /// Bearer token for the API.
    pub api_key: Option<SecretString>,
    /// Embedding model identifier.
    pub model: String,
    /// Vector dimension the model produces.
    pub dimension: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
        }
    }
}

impl EmbeddingsConfig {
    /// Load from `PATCHWRIGHT_EMBEDDINGS_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_string("PATCHWRIGHT_EMBEDDINGS_BASE_URL", defaults.base_url),
            api_key: std::env::var("PATCHWRIGHT_EMBEDDINGS_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            model: env_string("PATCHWRIGHT_EMBEDDINGS_MODEL", defaults.model),
            dimension: env_parsed("PATCHWRIGHT_EMBEDDINGS_DIMENSION", defaults.dimension),
        }
    }
}

/// Configuration for the structural verifier subprocess.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// The `spatch`-compatible binary to invoke.
    pub program: PathBuf,
    /// Hard timeout per invocation. A hung verifier must not stall a session.
    pub timeout: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("spatch"),
            timeout: Duration::from_secs(60),
        }
    }
}

impl VerifierConfig {
    /// Load from `PATCHWRIGHT_VERIFIER_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            program: std::env::var("PATCHWRIGHT_VERIFIER_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.program),
            timeout: Duration::from_secs(env_parsed(
                "PATCHWRIGHT_VERIFIER_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )),
        }
    }
}

/// Configuration for knowledge retrieval.
#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    /// Pre-built corpus file (JSON array of documents). None means an empty
    /// index; the session still runs, just ungrounded.
    pub corpus_path: Option<PathBuf>,
    /// Results per bundle half.
    pub top_k: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            corpus_path: None,
            top_k: 3,
        }
    }
}

impl KnowledgeConfig {
    /// Load from `PATCHWRIGHT_CORPUS` / `PATCHWRIGHT_TOP_K`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            corpus_path: std::env::var("PATCHWRIGHT_CORPUS").ok().map(PathBuf::from),
            top_k: env_parsed("PATCHWRIGHT_TOP_K", defaults.top_k),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub generator: GeneratorConfig,
    pub embeddings: EmbeddingsConfig,
    pub verifier: VerifierConfig,
    pub knowledge: KnowledgeConfig,
}

impl Config {
    /// Load the full configuration from the environment.
    pub fn from_env() -> Self {
        Self {
            generator: GeneratorConfig::from_env(),
            embeddings: EmbeddingsConfig::from_env(),
            verifier: VerifierConfig::from_env(),
            knowledge: KnowledgeConfig::from_env(),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparseable env value, using default");
            default
        }),
        Err(_) => default,
    }
}
