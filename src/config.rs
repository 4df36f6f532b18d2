//! Environment-based configuration.
//!
//! Settings are read once at startup from process environment variables,
//! optionally seeded from a `.env` file in the working directory. Every
//! optional setting has a default; values that are present but unusable fail
//! fast with [`Error::InvalidConfiguration`].
//!
//! Required settings are only checked when the component that needs them is
//! built: [`Settings::engine`] for the RAG engine and [`Settings::langsmith`]
//! for the LangSmith client. This lets the shell start with a partial
//! configuration and report what is missing per menu option.

use std::path::PathBuf;

use carebot_core::error::{Error, Result};

/// Secrets are displayed with at most this many leading characters.
const SECRET_PREFIX_LEN: usize = 5;

#[derive(Debug, Clone)]
pub struct Settings {
    pub mistral_api_key: Option<String>,
    pub pinecone_api_key: Option<String>,
    pub pinecone_index_name: Option<String>,
    pub pinecone_environment: Option<String>,
    pub langchain_api_key: Option<String>,
    pub huggingface_token: Option<String>,
    pub model_name: String,
    pub temperature: f32,
    pub embedding_model: String,
    pub data_dir: PathBuf,
    pub langchain_project: String,
    pub retrieval_k: usize,
    pub embedding_batch_size: usize,
    pub allow_index_recreate: bool,
    pub http_timeout_secs: u64,
    pub endpoints: Endpoints,
}

/// Base URLs of the hosted services.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub pinecone_controller: String,
    pub mistral: String,
    pub embedding: String,
    pub langsmith: String,
}

/// Everything needed to build the RAG engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub mistral_api_key: String,
    pub pinecone_api_key: String,
    pub index_name: String,
    pub region: String,
}

/// Everything needed to build the LangSmith client.
#[derive(Debug, Clone)]
pub struct LangSmithSettings {
    pub api_key: String,
    pub project: String,
}

fn default_model_name() -> String {
    "mistral-tiny".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_embedding_model() -> String {
    "sentence-transformers/all-mpnet-base-v2".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_project() -> String {
    "engine".to_string()
}
fn default_retrieval_k() -> usize {
    7
}
fn default_batch_size() -> usize {
    32
}
fn default_allow_recreate() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_pinecone_controller() -> String {
    "https://api.pinecone.io".to_string()
}
fn default_mistral_url() -> String {
    "https://api.mistral.ai".to_string()
}
fn default_embedding_url() -> String {
    "https://api-inference.huggingface.co".to_string()
}
fn default_langsmith_url() -> String {
    "https://api.smith.langchain.com".to_string()
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let temperature = match get("TEMPERATURE") {
            Some(raw) => raw.parse::<f32>().map_err(|_| {
                Error::invalid_config("TEMPERATURE", format!("'{}' is not a number", raw))
            })?,
            None => default_temperature(),
        };
        if !(0.0..=2.0).contains(&temperature) {
            return Err(Error::invalid_config(
                "TEMPERATURE",
                format!("{} must be in [0.0, 2.0]", temperature),
            ));
        }

        let settings = Settings {
            mistral_api_key: get("MISTRAL_API_KEY"),
            pinecone_api_key: get("PINECONE_API_KEY"),
            pinecone_index_name: get("PINECONE_INDEX_NAME"),
            pinecone_environment: get("PINECONE_ENVIRONMENT"),
            langchain_api_key: get("LANGCHAIN_API_KEY"),
            huggingface_token: get("HUGGINGFACEHUB_API_TOKEN"),
            model_name: get("MODEL_NAME").unwrap_or_else(default_model_name),
            temperature,
            embedding_model: get("EMBEDDING_MODEL").unwrap_or_else(default_embedding_model),
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or_else(default_data_dir),
            langchain_project: get("LANGCHAIN_PROJECT").unwrap_or_else(default_project),
            retrieval_k: parse_positive(&get, "RETRIEVAL_K", default_retrieval_k())?,
            embedding_batch_size: parse_positive(
                &get,
                "EMBEDDING_BATCH_SIZE",
                default_batch_size(),
            )?,
            allow_index_recreate: match get("ALLOW_INDEX_RECREATE") {
                Some(raw) => parse_bool("ALLOW_INDEX_RECREATE", &raw)?,
                None => default_allow_recreate(),
            },
            http_timeout_secs: parse_positive(
                &get,
                "HTTP_TIMEOUT_SECS",
                default_timeout_secs() as usize,
            )? as u64,
            endpoints: Endpoints {
                pinecone_controller: get("PINECONE_CONTROLLER_URL")
                    .unwrap_or_else(default_pinecone_controller),
                mistral: get("MISTRAL_API_URL").unwrap_or_else(default_mistral_url),
                embedding: get("EMBEDDING_API_URL").unwrap_or_else(default_embedding_url),
                langsmith: get("LANGCHAIN_ENDPOINT").unwrap_or_else(default_langsmith_url),
            },
        };

        Ok(settings)
    }

    /// Settings for the RAG engine, or every missing required variable.
    pub fn engine(&self) -> Result<EngineSettings> {
        let required = [
            ("MISTRAL_API_KEY", &self.mistral_api_key),
            ("PINECONE_API_KEY", &self.pinecone_api_key),
            ("PINECONE_INDEX_NAME", &self.pinecone_index_name),
            ("PINECONE_ENVIRONMENT", &self.pinecone_environment),
        ];
        let missing: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(key, _)| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingConfiguration(missing));
        }

        Ok(EngineSettings {
            mistral_api_key: self.mistral_api_key.clone().unwrap_or_default(),
            pinecone_api_key: self.pinecone_api_key.clone().unwrap_or_default(),
            index_name: self.pinecone_index_name.clone().unwrap_or_default(),
            region: self.pinecone_environment.clone().unwrap_or_default(),
        })
    }

    /// Settings for the LangSmith client.
    pub fn langsmith(&self) -> Result<LangSmithSettings> {
        match &self.langchain_api_key {
            Some(key) => Ok(LangSmithSettings {
                api_key: key.clone(),
                project: self.langchain_project.clone(),
            }),
            None => Err(Error::MissingConfiguration(vec![
                "LANGCHAIN_API_KEY".to_string(),
            ])),
        }
    }
}

fn parse_positive<G>(get: &G, key: &str, default: usize) -> Result<usize>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.parse::<usize>() {
            Ok(0) => Err(Error::invalid_config(key, "must be > 0")),
            Ok(n) => Ok(n),
            Err(_) => Err(Error::invalid_config(
                key,
                format!("'{}' is not a positive integer", raw),
            )),
        },
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::invalid_config(
            key,
            format!("'{}' is not a boolean", raw),
        )),
    }
}

/// Shorten a secret for display: the first few characters followed by `...`.
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(SECRET_PREFIX_LEN).collect();
    format!("{}...", prefix)
}
