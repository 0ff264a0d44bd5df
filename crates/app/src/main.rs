use archive_search_core::{
    index_documents, ArchiveAliases, Chapter, Chunker, ChunkingOptions, Cl100kTokenizer,
    DocumentContent, EmbeddingProvider, FilterValue, HttpReranker, ItemMetadata, OllamaEmbeddings,
    OpenAiEmbeddings, PineconeStore, SearchPipeline, SearchRequest, SearchResult, SourceDocument,
    VectorStore,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "archive-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Pinecone index endpoint, e.g. https://my-index-abc123.svc.us-east-1.pinecone.io
    #[arg(long, env = "PINECONE_ENDPOINT")]
    pinecone_endpoint: String,

    /// Pinecone API key
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pinecone_api_key: String,

    /// Embedding backend: openai or ollama
    #[arg(long, env = "EMBEDDING_PROVIDER", default_value = "openai")]
    embedding_provider: String,

    /// OpenAI API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com")]
    openai_url: String,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    openai_api_key: String,

    /// OpenAI embedding model
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Embedding dimension for the OpenAI backend
    #[arg(long, env = "EMBEDDING_DIMENSION", default_value = "1536")]
    embedding_dimension: usize,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Ollama embedding model
    #[arg(long, env = "OLLAMA_EMBED_MODEL", default_value = "nomic-embed-text")]
    ollama_model: String,

    /// Reranker service base URL; reranking is skipped when unset
    #[arg(long, env = "RERANK_URL")]
    rerank_url: Option<String>,

    /// Archive alias table, written during indexing and read during search
    #[arg(long, default_value = "archive_aliases.json")]
    aliases_file: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Index a folder of extracted documents into the vector store.
    Index {
        /// Folder scanned recursively for <key>.json metadata files with
        /// <key>.txt, <key>.chapters.json, or <key>.note.txt content beside them.
        #[arg(long)]
        folder: PathBuf,
    },
    /// Embed a query and search the index.
    Search {
        /// Query text, with shorthand filters like type:hearing or by:Volcker.
        #[arg(long)]
        query: String,
        /// Number of results to return.
        #[arg(long, default_value = "10")]
        top_k: usize,
        /// Filter by item type (prefix the value with = for exact matching).
        #[arg(long)]
        item_type: Option<String>,
        /// Filter by author name.
        #[arg(long)]
        author: Option<String>,
        /// Filter by tag.
        #[arg(long)]
        tag: Option<String>,
        /// Filter by collection name.
        #[arg(long)]
        collection: Option<String>,
        /// Filter by archive collection name or acronym alias.
        #[arg(long)]
        archive: Option<String>,
        /// Earliest date, inclusive (e.g. 1981 or 1981-05).
        #[arg(long)]
        date_from: Option<String>,
        /// Latest date, inclusive.
        #[arg(long)]
        date_to: Option<String>,
    },
    /// Remove every chunk of one item from the index.
    Delete {
        /// Item key whose chunks are deleted.
        #[arg(long)]
        item_key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "archive-search boot"
    );

    if cli.embedding_provider.eq_ignore_ascii_case("ollama") {
        let embedder = OllamaEmbeddings::connect(&cli.ollama_url, &cli.ollama_model)
            .await
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
        info!(
            model = %cli.ollama_model,
            dimension = embedder.dimension(),
            "using ollama embeddings"
        );
        run(cli, embedder).await
    } else {
        let embedder = OpenAiEmbeddings::new(
            &cli.openai_url,
            &cli.openai_api_key,
            &cli.embedding_model,
            cli.embedding_dimension,
        );
        info!(model = %cli.embedding_model, "using openai embeddings");
        run(cli, embedder).await
    }
}

async fn run<E>(cli: Cli, embedder: E) -> anyhow::Result<()>
where
    E: EmbeddingProvider + Send + Sync,
{
    let store = PineconeStore::new(
        &cli.pinecone_endpoint,
        &cli.pinecone_api_key,
        embedder.dimension(),
    )
    .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    match cli.command {
        Command::Index { folder } => {
            let documents = load_documents(&folder)?;
            if documents.is_empty() {
                println!("0 documents found under {}", folder.display());
                return Ok(());
            }

            let aliases = ArchiveAliases::from_collections(documents.iter().flat_map(|document| {
                document.metadata.collections.iter().map(move |collection| {
                    (
                        collection.as_str(),
                        document.metadata.archive_collection.as_str(),
                    )
                })
            }))
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            if !aliases.is_empty() {
                aliases
                    .save(&cli.aliases_file)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                info!(
                    aliases = aliases.len(),
                    file = %cli.aliases_file.display(),
                    "archive aliases saved"
                );
            }

            let tokenizer =
                Cl100kTokenizer::new().map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let chunker = Chunker::new(tokenizer, ChunkingOptions::default())
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let report = index_documents(&chunker, &embedder, &store, &documents)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            for skipped in &report.items_skipped {
                warn!(item_key = %skipped.item_key, reason = %skipped.reason, "item skipped");
            }
            println!(
                "{} items indexed, {} skipped, {} chunks upserted at {}",
                report.items_indexed,
                report.items_skipped.len(),
                report.chunks_upserted,
                Utc::now().to_rfc3339()
            );
        }
        Command::Search {
            query,
            top_k,
            item_type,
            author,
            tag,
            collection,
            archive,
            date_from,
            date_to,
        } => {
            let aliases = if cli.aliases_file.exists() {
                ArchiveAliases::load(&cli.aliases_file)
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?
            } else {
                ArchiveAliases::new()
            };
            let reranker = cli.rerank_url.as_deref().map(HttpReranker::new);
            let pipeline = SearchPipeline::new(embedder, store, reranker, aliases);

            let mut request = SearchRequest::new(query);
            request.top_k = top_k;
            request.filters.item_type = item_type.map(filter_value);
            request.filters.author = author.map(filter_value);
            request.filters.tag = tag.map(filter_value);
            request.filters.collection = collection.map(filter_value);
            request.filters.archive = archive.map(filter_value);
            request.filters.date_from = date_from;
            request.filters.date_to = date_to;

            let results = pipeline
                .run(&request)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            print_results(&request.text, &results);
        }
        Command::Delete { item_key } => {
            store
                .delete_by_item(&item_key)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("deleted chunks for {item_key}");
        }
    }

    Ok(())
}

fn filter_value(raw: String) -> FilterValue {
    match raw.strip_prefix('=') {
        Some(exact) => FilterValue::exact(exact),
        None => FilterValue::fuzzy(raw),
    }
}

fn load_documents(folder: &Path) -> anyhow::Result<Vec<SourceDocument>> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(folder).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let name = match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if !name.ends_with(".json") || name.ends_with(".chapters.json") {
            continue;
        }

        let mut metadata: ItemMetadata = match File::open(path)
            .map_err(anyhow::Error::from)
            .and_then(|file| serde_json::from_reader(BufReader::new(file)).map_err(Into::into))
        {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!(path = %path.display(), %error, "unreadable metadata, skipping");
                continue;
            }
        };
        if metadata.item_key.is_empty() {
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                metadata.item_key = stem.to_string();
            }
        }

        let content = load_content(path)?;
        documents.push(SourceDocument { metadata, content });
    }

    info!(documents = documents.len(), folder = %folder.display(), "documents discovered");
    Ok(documents)
}

fn load_content(metadata_path: &Path) -> anyhow::Result<DocumentContent> {
    let chapters_path = metadata_path.with_extension("chapters.json");
    if chapters_path.exists() {
        let chapters: Vec<Chapter> =
            serde_json::from_reader(BufReader::new(File::open(&chapters_path)?))?;
        return Ok(DocumentContent::Chapters(chapters));
    }

    let text_path = metadata_path.with_extension("txt");
    if text_path.exists() {
        return Ok(DocumentContent::Text(std::fs::read_to_string(&text_path)?));
    }

    let note_path = metadata_path.with_extension("note.txt");
    if note_path.exists() {
        return Ok(DocumentContent::Note {
            text: std::fs::read_to_string(&note_path)?,
            source_type: "child_note".to_string(),
        });
    }

    Ok(DocumentContent::Empty)
}

fn print_results(query: &str, results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    println!("Search: \"{query}\"");
    println!("{} results", results.len());
    println!();

    for (number, result) in results.iter().enumerate() {
        let meta = &result.metadata;

        let title = if meta.title.is_empty() {
            "Untitled"
        } else {
            meta.title.as_str()
        };
        let authors = if meta.authors.is_empty() {
            "Unknown".to_string()
        } else {
            meta.authors.join(", ")
        };

        let pages = if meta.page_start > 0 {
            if meta.page_end > meta.page_start {
                format!(", pp. {}-{}", meta.page_start, meta.page_end)
            } else {
                format!(", p. {}", meta.page_start)
            }
        } else {
            String::new()
        };

        let mut scores = format!("Embed: {:.3}", result.score);
        if let Some(rerank) = result.rerank_score {
            scores.push_str(&format!(" | Rerank: {rerank:.3}"));
        }

        println!("[{}] {}", number + 1, title);
        println!(
            "    {} ({}) -- {}{}",
            authors, meta.date, meta.item_type, pages
        );
        println!("    {scores}");
        if !meta.archive.is_empty() {
            if meta.archive_location.is_empty() {
                println!("    Archive: {}", meta.archive);
            } else {
                println!("    Archive: {}, {}", meta.archive, meta.archive_location);
            }
        }

        let trimmed = meta.text.trim();
        let preview: String = trimmed.chars().take(600).collect();
        if preview.len() < trimmed.len() {
            println!("    {preview}...");
        } else {
            println!("    {preview}");
        }
        println!();
    }
}
