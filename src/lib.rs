use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod settings;

use application::services::{
    EmbeddingEngine, MetricsRecorder, MetricsStore, PolicyGate, VectorStore,
};
use application::{AnswerService, IngestService};
use infrastructure::{OpenAiClient, SimpleEmbedEngine, SledStore};
use settings::{AppConfig, EmbeddingBackend};

const ENV_DATA_DIR: &str = "GATED_RAG_DATA_DIR";
const ENV_LOG: &str = "GATED_RAG_LOG";

/// Services and settings assembled once at process start.
pub struct AppHandles {
    pub answer: Arc<AnswerService>,
    pub ingest: Arc<IngestService>,
    pub config: AppConfig,
    pub data_dir: PathBuf,
}

/// Install the global tracing subscriber. Safe to call more than once.
pub fn init_tracing() {
    init_tracing_with_writer(std::io::stderr);
}

fn init_tracing_with_writer<W>(make_writer: fn() -> W)
where
    W: std::io::Write + Send + Sync + 'static,
{
    static INIT: std::sync::OnceLock<()> = std::sync::OnceLock::new();

    let _ = INIT.get_or_init(|| {
        let filter = std::env::var(ENV_LOG).unwrap_or_else(|_| "info".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(make_writer)
            .compact()
            .try_init();
    });
}

/// Load settings and wire the model client, store and services together.
pub fn build_environment() -> Result<AppHandles> {
    // a missing .env file is fine; real environment variables still apply
    let _ = dotenvy::dotenv();

    let data_dir = resolve_data_dir()?;
    let config = AppConfig::load(&data_dir).context("failed to load configuration")?;

    build_environment_with(config, data_dir)
}

/// Wire services from an explicit configuration and data directory.
pub fn build_environment_with(config: AppConfig, data_dir: PathBuf) -> Result<AppHandles> {
    config.validate().context("invalid configuration")?;
    let service_config = config.service_config();

    let store_path = data_dir.join("store");
    let store_impl =
        Arc::new(SledStore::open(&store_path).context("failed to open embedded store")?);
    let store: Arc<dyn VectorStore> = store_impl.clone();
    let metrics: Arc<dyn MetricsStore> = store_impl;

    let api_key = config.openai.api_key.clone().unwrap_or_else(|| {
        warn!(
            target: "gated_rag",
            "OPENAI_API_KEY is not set; remote model calls will be rejected"
        );
        String::new()
    });
    let client = Arc::new(OpenAiClient::new(
        config.openai.base_url.clone(),
        api_key,
        Duration::from_secs(config.openai.timeout_secs.max(1)),
    ));

    let embedder = init_embedder(&config.embedding, &client)
        .context("failed to initialise embedding backend")?;

    let gate = PolicyGate::new(client.clone(), service_config.moderation_model.clone())
        .context("failed to build policy gate")?;

    let answer = Arc::new(AnswerService::new(
        gate,
        Arc::clone(&embedder),
        Arc::clone(&store),
        client,
        MetricsRecorder::new(metrics),
        service_config.clone(),
    ));
    let ingest = Arc::new(IngestService::new(embedder, store, service_config));

    info!(
        target: "gated_rag",
        data_dir = %data_dir.display(),
        embedding_backend = config.embedding.id(),
        generation_model = %config.models.generation,
        "environment ready"
    );

    Ok(AppHandles {
        answer,
        ingest,
        config,
        data_dir,
    })
}

fn init_embedder(
    backend: &EmbeddingBackend,
    client: &Arc<OpenAiClient>,
) -> Result<Arc<dyn EmbeddingEngine>> {
    match backend {
        EmbeddingBackend::OpenAi => Ok(client.clone()),
        EmbeddingBackend::Simple { model, dimensions } => {
            let engine = SimpleEmbedEngine::try_new(model.clone(), *dimensions)
                .context("invalid simple embedding settings")?;
            info!(
                target: "gated_rag",
                model = engine.model_name(),
                dimensions = engine.dims(model).unwrap_or_default(),
                "using offline hash embeddings"
            );
            Ok(Arc::new(engine))
        }
    }
}

fn resolve_data_dir() -> Result<PathBuf> {
    let dir = match std::env::var(ENV_DATA_DIR) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => directories::ProjectDirs::from("dev", "gated-rag", "GatedRag")
            .ok_or_else(|| anyhow!("unable to determine OS data dir"))?
            .data_dir()
            .to_path_buf(),
    };
    std::fs::create_dir_all(&dir).context("failed to create data directory")?;
    Ok(dir)
}
