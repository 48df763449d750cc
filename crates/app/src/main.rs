use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_roster_core::genai::{DEFAULT_API_BASE, DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL};
use pdf_roster_core::{
    delete_document, saved_answer, DocumentStore, Durability, Embedder, ExportError,
    FallbackExtractor, GeminiClient, GeminiConfig, IngestPipeline, IngestionOutcome,
    JsonFileStore, LocalNgramEmbedder, PipelineOptions, QueryAnswerer, ReportExporter,
    ResponseStore,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-roster", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON file holding document chunks and embeddings
    #[arg(long, env = "PDF_ROSTER_DOCUMENTS", default_value = "embeddings_store.json")]
    documents_store: PathBuf,

    /// JSON file holding the latest answer per document
    #[arg(long, env = "PDF_ROSTER_RESPONSES", default_value = "responses_store.json")]
    responses_store: PathBuf,

    /// Directory uploaded PDFs are copied into
    #[arg(long, env = "PDF_ROSTER_UPLOADS", default_value = "uploads")]
    uploads_dir: PathBuf,

    /// Characters per chunk
    #[arg(long, default_value_t = pdf_roster_core::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Rewrite store files through a temp file and rename
    #[arg(long, default_value_t = false)]
    atomic_writes: bool,

    /// Gemini API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini API base URL
    #[arg(long, env = "GEMINI_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Embedding model name
    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Generation model name
    #[arg(long, default_value = DEFAULT_GENERATION_MODEL)]
    generation_model: String,
}

#[derive(Subcommand)]
enum Command {
    /// Upload one PDF, or every PDF below a folder, and embed its chunks.
    Ingest {
        /// PDF file to ingest.
        #[arg(long, required_unless_present = "folder", conflicts_with = "folder")]
        file: Option<PathBuf>,
        /// Folder searched recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Use the local trigram embedder instead of the Gemini service.
        #[arg(long, default_value_t = false)]
        offline_embeddings: bool,
    },
    /// Ask for the committee members of one document.
    Ask {
        #[arg(long)]
        document: String,
    },
    /// Ask every stored document, or only the listed ones.
    AskAll {
        #[arg(long = "document")]
        documents: Vec<String>,
    },
    /// Print the saved answer of a document.
    Show {
        #[arg(long)]
        document: String,
    },
    /// List ingested documents.
    List,
    /// Remove a document, its answer and its uploaded file.
    Delete {
        #[arg(long)]
        document: String,
    },
    /// Write the member report as a tab-separated file.
    Export {
        /// Directory the report is written into.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
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
        "pdf-roster boot"
    );

    // the pipeline does blocking file and HTTP I/O
    tokio::task::spawn_blocking(move || run(cli)).await?
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let durability = if cli.atomic_writes {
        Durability::AtomicRename
    } else {
        Durability::Overwrite
    };

    let mut documents: DocumentStore = JsonFileStore::open(&cli.documents_store, durability)?;
    let mut responses: ResponseStore = JsonFileStore::open(&cli.responses_store, durability)?;

    let options = PipelineOptions {
        chunk_size: cli.chunk_size,
        ..PipelineOptions::default()
    };
    let gemini = GeminiConfig::new(&cli.api_base, cli.api_key.clone())?
        .with_models(cli.embedding_model.clone(), cli.generation_model.clone());

    match cli.command {
        Command::Ingest {
            file,
            folder,
            offline_embeddings,
        } => {
            if offline_embeddings {
                let pipeline = IngestPipeline::new(
                    FallbackExtractor::default(),
                    LocalNgramEmbedder::default(),
                    options,
                );
                ingest(&pipeline, &mut documents, file, folder, &cli.uploads_dir)?;
            } else {
                let pipeline = IngestPipeline::new(
                    FallbackExtractor::default(),
                    GeminiClient::new(gemini)?,
                    options,
                );
                ingest(&pipeline, &mut documents, file, folder, &cli.uploads_dir)?;
            }
        }
        Command::Ask { document } => {
            let answerer = QueryAnswerer::new(GeminiClient::new(gemini)?, options.prompt_template);
            let answer = answerer.answer(&documents, &mut responses, &document)?;
            println!("{answer}");
        }
        Command::AskAll { documents: subset } => {
            let answerer = QueryAnswerer::new(GeminiClient::new(gemini)?, options.prompt_template);
            let subset = (!subset.is_empty()).then_some(subset);
            let answers = answerer.answer_all(&documents, &mut responses, subset.as_deref())?;
            for (document, answer) in answers {
                println!("== {document}\n{answer}");
            }
        }
        Command::Show { document } => match saved_answer(&responses, &document) {
            Some(answer) => println!("{answer}"),
            None => println!("No saved response found."),
        },
        Command::List => {
            for id in documents.ids() {
                let chunks = documents.get(&id).map_or(0, |record| record.chunks.len());
                let answered = if responses.contains(&id) { "answered" } else { "pending" };
                println!("{id}\tchunks={chunks}\t{answered}");
            }
        }
        Command::Delete { document } => {
            let outcome =
                delete_document(&mut documents, &mut responses, &cli.uploads_dir, &document)?;
            if !outcome.document_removed && !outcome.response_removed {
                warn!(document = %document, "nothing stored under this id");
            }
            println!(
                "deleted {document}: document={} response={} file={}",
                outcome.document_removed, outcome.response_removed, outcome.file_removed
            );
        }
        Command::Export { out_dir } => {
            let exporter = ReportExporter::new(&options)?;
            match exporter.export(&responses, Utc::now()) {
                Ok(report) => {
                    std::fs::create_dir_all(&out_dir)?;
                    let path = out_dir.join(&report.filename);
                    std::fs::write(&path, &report.bytes)?;
                    println!("{} rows exported to {}", report.rows, path.display());
                }
                Err(ExportError::NoValidData) => println!("No hay datos válidos para exportar"),
                Err(error) => return Err(error.into()),
            }
        }
    }

    Ok(())
}

fn ingest<E: Embedder>(
    pipeline: &IngestPipeline<FallbackExtractor, E>,
    documents: &mut DocumentStore,
    file: Option<PathBuf>,
    folder: Option<PathBuf>,
    uploads_dir: &Path,
) -> anyhow::Result<()> {
    let outcomes = match (file, folder) {
        (Some(file), _) => vec![pipeline.ingest_upload(documents, &file, uploads_dir)?],
        (None, Some(folder)) => {
            let report = pipeline.ingest_folder_best_effort(documents, &folder, uploads_dir)?;

            if !report.skipped_files.is_empty() {
                warn!(
                    "skipped_files={} for folder={}",
                    report.skipped_files.len(),
                    folder.display()
                );
                for skipped in report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                }
            }
            report.ingested
        }
        (None, None) => anyhow::bail!("either --file or --folder is required"),
    };

    print_outcomes(&outcomes);
    Ok(())
}

fn print_outcomes(outcomes: &[IngestionOutcome]) {
    for outcome in outcomes {
        if outcome.stored {
            println!(
                "{}: {} of {} chunks embedded at {}",
                outcome.document_id,
                outcome.stored_chunks,
                outcome.raw_chunks,
                Utc::now().to_rfc3339()
            );
        } else {
            println!(
                "{}: 0 of {} chunks embedded, document not stored",
                outcome.document_id, outcome.raw_chunks
            );
        }
    }
}
