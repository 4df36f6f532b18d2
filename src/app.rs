//! Application initialization.
//!
//! Builds the hosted-service clients once and wires them into the RAG engine
//! and the monitor. A component that cannot be built (missing configuration,
//! unreachable service, dimension mismatch) is kept as
//! [`Component::Unavailable`] with the reason, so the shell can still start
//! and report the problem when the component is used.

use std::path::PathBuf;
use std::sync::Arc;

use carebot_core::engine::{EngineOptions, RagEngine};
use carebot_core::error::Result;
use carebot_core::index::{ensure_index, EnsureOutcome, IndexControl, IndexTarget};
use carebot_core::monitor::Monitor;
use carebot_core::trace::TraceStore;
use reqwest::Client;

use crate::config::{mask_secret, Settings};
use crate::embedding::HuggingFaceEmbedder;
use crate::http::build_client;
use crate::langsmith::LangSmithClient;
use crate::mistral::MistralChat;
use crate::pinecone::PineconeControl;

/// A service that is either usable or explains why it is not.
pub enum Component<T> {
    Ready(T),
    Unavailable(String),
}

impl<T> Component<T> {
    pub fn get(&self) -> std::result::Result<&T, &str> {
        match self {
            Component::Ready(value) => Ok(value),
            Component::Unavailable(reason) => Err(reason),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Component::Ready(_))
    }
}

impl<T> From<Result<T>> for Component<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Component::Ready(value),
            Err(e) => Component::Unavailable(e.to_string()),
        }
    }
}

/// Everything the shell drives.
pub struct App {
    pub engine: Component<RagEngine>,
    pub monitor: Component<Monitor>,
    pub data_dir: PathBuf,
}

impl App {
    pub fn new(
        engine: Component<RagEngine>,
        monitor: Component<Monitor>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            engine,
            monitor,
            data_dir,
        }
    }

    /// Build every component from `settings`. Never fails as a whole.
    pub async fn initialize(settings: &Settings) -> Self {
        let client = match build_client(settings.http_timeout_secs) {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "failed to build HTTP client");
                return Self::new(
                    Component::Unavailable(e.to_string()),
                    Component::Unavailable(e.to_string()),
                    settings.data_dir.clone(),
                );
            }
        };

        let tracer = build_tracer(&client, settings);
        let monitor: Component<Monitor> = match &tracer {
            Ok(store) => Component::Ready(Monitor::new(
                store.clone(),
                settings.langchain_project.clone(),
            )),
            Err(reason) => Component::Unavailable(reason.clone()),
        };
        if let Err(reason) = &tracer {
            tracing::warn!(reason = %reason, "trace store unavailable, runs will not be logged");
        }

        tracing::info!("initializing RAG engine");
        let engine: Component<RagEngine> =
            build_engine(&client, settings, tracer.ok()).await.into();
        match &engine {
            Component::Ready(engine) => {
                tracing::info!(index = engine.index_name(), "RAG engine initialized")
            }
            Component::Unavailable(reason) => {
                tracing::error!(reason = %reason, "RAG engine unavailable")
            }
        }

        Self::new(engine, monitor, settings.data_dir.clone())
    }
}

fn build_tracer(
    client: &Client,
    settings: &Settings,
) -> std::result::Result<Arc<dyn TraceStore>, String> {
    let langsmith = settings.langsmith().map_err(|e| e.to_string())?;
    tracing::info!(
        api_key = %mask_secret(&langsmith.api_key),
        project = %langsmith.project,
        "using LangSmith"
    );
    Ok(Arc::new(LangSmithClient::new(
        client.clone(),
        &settings.endpoints.langsmith,
        &langsmith.api_key,
    )))
}

async fn build_engine(
    client: &Client,
    settings: &Settings,
    tracer: Option<Arc<dyn TraceStore>>,
) -> Result<RagEngine> {
    let engine_settings = settings.engine()?;

    let embedder = Arc::new(HuggingFaceEmbedder::new(
        client.clone(),
        &settings.endpoints.embedding,
        &settings.embedding_model,
        settings.huggingface_token.clone(),
    ));
    let control = PineconeControl::new(
        client.clone(),
        &settings.endpoints.pinecone_controller,
        &engine_settings.pinecone_api_key,
    );
    let target = IndexTarget {
        name: engine_settings.index_name.clone(),
        region: engine_settings.region.clone(),
        allow_recreate: settings.allow_index_recreate,
    };

    let handle = ensure_index(&control, embedder.as_ref(), &target).await?;
    if let EnsureOutcome::Recreated { previous_dimension } = handle.outcome {
        tracing::warn!(
            index = %target.name,
            previous_dimension,
            dimension = handle.description.dimension,
            "index was recreated, re-ingest documents"
        );
    }
    let index = control.open(&handle.description)?;

    tracing::info!(
        api_key = %mask_secret(&engine_settings.mistral_api_key),
        model = %settings.model_name,
        "using Mistral"
    );
    let chat = Arc::new(MistralChat::new(
        client.clone(),
        &settings.endpoints.mistral,
        &engine_settings.mistral_api_key,
        &settings.model_name,
        settings.temperature,
    ));

    Ok(RagEngine::new(
        embedder,
        index,
        chat,
        tracer,
        EngineOptions {
            top_k: settings.retrieval_k,
            batch_size: settings.embedding_batch_size,
            project: settings.langchain_project.clone(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use carebot_core::error::Error;

    #[test]
    fn test_component_from_result() {
        let ready: Component<u32> = Ok(3).into();
        assert_eq!(ready.get(), Ok(&3));

        let missing: Component<u32> =
            Err(Error::MissingConfiguration(vec!["PINECONE_API_KEY".to_string()])).into();
        assert!(!missing.is_ready());
        assert!(missing.get().unwrap_err().contains("PINECONE_API_KEY"));
    }

    #[tokio::test]
    async fn test_initialize_without_configuration() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        let app = App::initialize(&settings).await;

        assert!(app
            .engine
            .get()
            .err()
            .unwrap()
            .contains("MISTRAL_API_KEY"));
        assert!(app
            .monitor
            .get()
            .err()
            .unwrap()
            .contains("LANGCHAIN_API_KEY"));
    }
}
