use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use voxkb_rag::{
    Chunker, EmbeddingService, KnowledgeBase, OpenAIChatModel, OpenAIEmbeddingProvider,
    ParagraphChunker, RagConfig, RagPipeline, SqliteVectorStore, decode_text, ingest_passages,
};

use crate::cli::{Cli, Commands};
use crate::repl;

/// Execute one parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let knowledge = open_knowledge(&config, cli.embedding_native_dim).await?;

    match cli.command {
        Commands::Ingest { file, source } => ingest_file(&knowledge, &file, source).await,
        Commands::Add { texts } => {
            let report = ingest_passages(&knowledge, &texts, None).await;
            print_json(&report)?;
            if !report.success {
                bail!(report.message);
            }
            Ok(())
        }
        Commands::Ask { query, conversation, system_prompt } => {
            let pipeline = pipeline(knowledge, &config)?;
            let answer = pipeline
                .generate_response(&query, conversation.as_deref(), system_prompt.as_deref())
                .await?;
            print_json(&answer)
        }
        Commands::Chat { conversation, system_prompt } => {
            let pipeline = pipeline(knowledge, &config)?;
            let conversation =
                conversation.unwrap_or_else(|| config.default_conversation_id.clone());
            repl::run(&pipeline, &conversation, system_prompt.as_deref()).await
        }
        Commands::Search { query, top_k } => {
            let results = knowledge.search(&query, top_k.unwrap_or(config.top_k)).await?;
            print_json(&results)
        }
        Commands::Stats => print_json(&knowledge.stats().await?),
        Commands::Reset { yes } => {
            if !yes {
                bail!("reset deletes every stored passage; pass --yes to confirm");
            }
            knowledge.reset().await?;
            print_json(&json!({ "reset": true, "stats": knowledge.stats().await? }))
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<RagConfig> {
    let mut config = RagConfig::from_env().context("invalid configuration")?;
    if let Some(db) = &cli.db {
        config.persist_path = db.clone();
    }
    Ok(config)
}

async fn open_knowledge(
    config: &RagConfig,
    native_dim: Option<usize>,
) -> anyhow::Result<Arc<KnowledgeBase>> {
    let provider = OpenAIEmbeddingProvider::from_env()
        .context("embedding provider")?
        .with_model(&config.embedding_model)
        .with_dimensions(native_dim.unwrap_or(config.embedding_dimension));
    let embeddings = EmbeddingService::new(Arc::new(provider), config)?;

    let store = SqliteVectorStore::open(&config.persist_path)
        .await
        .with_context(|| format!("opening {}", config.persist_path.display()))?;

    let knowledge = KnowledgeBase::open(config.clone(), embeddings, Arc::new(store)).await?;
    Ok(Arc::new(knowledge))
}

fn pipeline(knowledge: Arc<KnowledgeBase>, config: &RagConfig) -> anyhow::Result<RagPipeline> {
    let model = OpenAIChatModel::from_env(&config.chat_model).context("chat model")?;
    Ok(RagPipeline::builder().knowledge_base(knowledge).chat_model(Arc::new(model)).build()?)
}

async fn ingest_file(
    knowledge: &KnowledgeBase,
    file: &Path,
    source: Option<String>,
) -> anyhow::Result<()> {
    let bytes =
        tokio::fs::read(file).await.with_context(|| format!("reading {}", file.display()))?;
    let source = source.unwrap_or_else(|| {
        file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    });
    info!(file = %file.display(), bytes = bytes.len(), "processing file");

    let text = decode_text(&bytes);
    let passages = ParagraphChunker::default().chunk(&text, &source)?;
    let chunks_added = passages.len();
    let (documents, metadatas) = ParagraphChunker::into_parts(passages);

    let report = ingest_passages(knowledge, &documents, Some(metadatas)).await;
    print_json(&json!({
        "message": format!("Processed {source}"),
        "chunks_added": chunks_added,
        "file_size_kb": bytes.len() as f64 / 1024.0,
        "result": &report,
    }))?;
    if !report.success {
        bail!(report.message);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
