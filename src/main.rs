//! finrag CLI
//!
//! Ingest financial reports, ask questions about them, and evaluate answers
//! against a saved test set.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use finrag::{
    config::{Config, Provider},
    document::is_supported,
    eval::TestSetStore,
    llm::{Embedder, EmbeddingClient, LlmClient},
    logging::init_logging,
    rag::RagResponse,
    session::Session,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

/// Characters of each source chunk shown under an answer.
const SOURCE_PREVIEW_CHARS: usize = 200;

/// finrag - Question answering and hallucination evaluation for financial reports
#[derive(Parser)]
#[command(name = "finrag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Service preset (openai, dashscope, other)
    #[arg(long, global = true)]
    provider: Option<Provider>,

    /// API base URL including the version path
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Chat model name
    #[arg(long, global = true)]
    chat_model: Option<String>,

    /// Embedding model name
    #[arg(long, global = true)]
    embed_model: Option<String>,

    /// Log filter (e.g. "debug", "finrag=trace"); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Disable colored log output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question from the ingested reports
    Ask {
        /// The question
        question: String,
    },

    /// Interactive question loop
    Chat,

    /// Add a report file, or every supported file in a directory
    Ingest {
        /// Path to a .pdf/.txt file or a directory
        path: PathBuf,
    },

    /// Manage the evaluation test set
    Cases {
        #[command(subcommand)]
        action: CasesCommand,
    },

    /// Answer and score every test case
    Eval {
        /// Write the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show configuration and collection statistics
    Info,

    /// Delete the vector collection
    Reset,

    /// Test chat and embedding connectivity
    Test,
}

#[derive(Subcommand)]
enum CasesCommand {
    /// Add a test case
    Add {
        /// The question
        question: String,

        /// Expected answer
        #[arg(short, long, default_value = "")]
        ground_truth: String,

        /// Name of a document the answer should come from (repeatable)
        #[arg(short, long = "reference-doc")]
        reference_docs: Vec<String>,
    },

    /// List test cases
    List,

    /// Delete test cases by id
    Delete {
        /// Test case id
        id: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref(), cli.no_color).context("Failed to init logging")?;

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Ask { question } => cmd_ask(service_session(config)?, &question).await,
        Commands::Chat => cmd_chat(service_session(config)?).await,
        Commands::Ingest { path } => cmd_ingest(service_session(config)?, &path).await,
        Commands::Cases { action } => cmd_cases(&config, action),
        Commands::Eval { output } => cmd_eval(service_session(config)?, output).await,
        Commands::Info => cmd_info(Session::new(config)).await,
        Commands::Reset => cmd_reset(Session::new(config)).await,
        Commands::Test => cmd_test(config).await,
    }
}

/// Layer command-line overrides on the loaded configuration.
///
/// `--provider` switches the preset first; the explicit URL and model flags
/// then override it.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load().context("Failed to load configuration")?;

    if let Some(provider) = cli.provider {
        config.apply_provider(provider);
    }
    if let Some(base_url) = &cli.base_url {
        config.llm.api_base = base_url.clone();
    }
    if let Some(model) = &cli.chat_model {
        config.llm.model = model.clone();
    }
    if let Some(model) = &cli.embed_model {
        config.embedding.model = model.clone();
    }

    Ok(config)
}

/// A session for commands that call the model services.
fn service_session(config: Config) -> Result<Session> {
    config.validate().context("Invalid configuration")?;
    Ok(Session::new(config))
}

fn print_response(response: &RagResponse) {
    println!("Answer:");
    println!("{}", response.answer.trim());
    println!();

    if response.source_documents.is_empty() {
        println!("No source documents retrieved.");
        return;
    }

    println!("Sources:");
    println!("{}", "─".repeat(60));
    for (i, source) in response.source_documents.iter().enumerate() {
        let preview: String = source.chars().take(SOURCE_PREVIEW_CHARS).collect();
        print!("{:>2}. {}", i + 1, preview);
        if source.chars().count() > SOURCE_PREVIEW_CHARS {
            print!("...");
        }
        println!();
    }
    println!("{}", "─".repeat(60));
}

async fn cmd_ask(mut session: Session, question: &str) -> Result<()> {
    let start = Instant::now();
    let response = session
        .ask(question)
        .await
        .context("Failed to generate answer")?;

    print_response(&response);
    println!("Answered in {:.2?}", start.elapsed());
    Ok(())
}

async fn cmd_chat(mut session: Session) -> Result<()> {
    println!("Ask about the ingested reports. Type 'exit' to quit.\n");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush().ok();

        let Some(line) = lines.next() else {
            break;
        };
        let question = line.context("Failed to read input")?;
        let question = question.trim();

        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        match session.ask(question).await {
            Ok(response) => print_response(&response),
            Err(e) => println!("Error: {}", e),
        }
        println!();
    }

    Ok(())
}

/// Files to ingest for `path`: the file itself, or supported files under a directory.
fn ingest_targets(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        anyhow::bail!("Path not found: '{}'", path.display());
    }

    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_supported(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    Ok(files)
}

async fn cmd_ingest(mut session: Session, path: &Path) -> Result<()> {
    let files = ingest_targets(path)?;
    if files.is_empty() {
        println!("No supported files (.pdf, .txt) found in '{}'.", path.display());
        return Ok(());
    }

    println!("Ingesting {} file(s)...\n", files.len());
    let start = Instant::now();
    let mut total_chunks = 0;
    let mut failures = 0;

    for file in &files {
        match session.ingest_file(file).await {
            Ok(report) => {
                total_chunks += report.chunks_added;
                println!(
                    "  {}: {} chunks added ({} chars)",
                    file.display(),
                    report.chunks_added,
                    report.characters
                );
            }
            Err(e) => {
                failures += 1;
                println!("  {}: failed: {}", file.display(), e);
            }
        }
    }

    println!();
    println!(
        "Added {} chunks from {} file(s) in {:.2?}",
        total_chunks,
        files.len() - failures,
        start.elapsed()
    );
    if failures > 0 {
        println!("{} file(s) failed.", failures);
    }
    Ok(())
}

fn cmd_cases(config: &Config, action: CasesCommand) -> Result<()> {
    let mut store = TestSetStore::open(&config.storage.test_set_path);

    match action {
        CasesCommand::Add {
            question,
            ground_truth,
            reference_docs,
        } => {
            let case = store
                .add(question, ground_truth, reference_docs)
                .context("Failed to save test case")?;
            println!("Added test case {}: {}", case.id, case.question);
        }
        CasesCommand::List => {
            if store.is_empty() {
                println!("No test cases. Add one with 'finrag cases add <question>'.");
                return Ok(());
            }

            println!("Test cases ({}):", store.len());
            println!("{}", "─".repeat(60));
            for case in store.all() {
                println!("{:>4}. {}", case.id, case.question);
                if !case.ground_truth.is_empty() {
                    println!("      Ground truth: {}", case.ground_truth);
                }
                if !case.reference_docs.is_empty() {
                    println!("      References:   {}", case.reference_docs.join(", "));
                }
            }
        }
        CasesCommand::Delete { id } => {
            let removed = store.delete(id).context("Failed to save test set")?;
            if removed == 0 {
                println!("No test case with id {}.", id);
            } else {
                println!("Deleted test case {}.", id);
            }
        }
    }

    Ok(())
}

async fn cmd_eval(mut session: Session, output: Option<PathBuf>) -> Result<()> {
    let cases = session.test_set().all().to_vec();
    if cases.is_empty() {
        println!("Test set is empty. Add cases with 'finrag cases add <question>'.");
        return Ok(());
    }

    println!(
        "Evaluating {} case(s) with {}...",
        cases.len(),
        session.config().llm.model
    );

    let report = session
        .evaluate(&cases)
        .await
        .context("Evaluation failed")?;
    report.print_summary();

    if let Some(path) = output {
        report.save_json(&path).context("Failed to write report")?;
        println!("Report saved to: {}", path.display());
    }

    Ok(())
}

async fn cmd_info(mut session: Session) -> Result<()> {
    let config = session.config().clone();

    println!("Configuration");
    println!("{}", "─".repeat(40));
    println!("  Provider:        {}", config.provider);
    println!("  API base:        {}", config.llm.api_base);
    println!("  Chat model:      {}", config.llm.model);
    println!("  Embedding model: {}", config.embedding.model);
    println!(
        "  Chunking:        {} chars, {} overlap",
        config.chunking.chunk_size, config.chunking.chunk_overlap
    );
    println!("  Top k:           {}", config.retrieval.top_k);
    if let Some(path) = Config::config_file_path() {
        println!("  Config file:     {}", path.display());
    }
    println!();

    let stats = session
        .vector_store()?
        .stats()
        .await
        .context("Failed to read vector collection")?;

    println!("Vector Collection");
    println!("{}", "─".repeat(40));
    println!("  Path:            {}", stats.path.display());
    println!("  Chunks:          {}", stats.records);
    if !stats.embedding_model.is_empty() {
        println!("  Built with:      {}", stats.embedding_model);
    }
    match stats.size_bytes {
        Some(size) => println!("  File size:       {:.1} KB", size as f64 / 1024.0),
        None => println!("  File size:       (not created yet)"),
    }
    println!();

    let test_set = session.test_set();
    println!("Test Set");
    println!("{}", "─".repeat(40));
    println!("  Path:            {}", test_set.path().display());
    println!("  Cases:           {}", test_set.len());

    Ok(())
}

async fn cmd_reset(mut session: Session) -> Result<()> {
    let store = session.vector_store()?;
    store
        .reset()
        .await
        .context("Failed to delete vector collection")?;
    println!("Vector collection deleted: {}", store.collection_path().display());
    Ok(())
}

async fn cmd_test(config: Config) -> Result<()> {
    println!("Testing service connections...\n");

    let key_prefix: String = config.llm.api_key.chars().take(8).collect();
    println!("Configuration:");
    println!("  Provider:        {}", config.provider);
    println!("  API Base:        {}", config.llm.api_base);
    println!("  Chat model:      {}", config.llm.model);
    println!("  Embedding model: {}", config.embedding.model);
    println!("  API Key:         {}...", key_prefix);
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    println!("Sending chat request...");
    let client = LlmClient::new(config.llm.clone())?;
    match client.test_connection().await {
        Ok(reply) => println!("  Chat OK: {}", reply.trim()),
        Err(e) => println!("  Chat failed: {}", e),
    }

    println!("Sending embedding request...");
    let embedder = EmbeddingClient::new(&config.llm, config.embedding.model.clone())?;
    match embedder.embed("connectivity check").await {
        Ok(vector) => println!("  Embedding OK: {} dimensions", vector.len()),
        Err(e) => println!("  Embedding failed: {}", e),
    }

    Ok(())
}
