mod display;

use std::collections::BTreeSet;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use lexcase_agent::{AgentConfig, AgentError, AgentOrchestrator, AgentResult, ErrorKind, StylePreference};
use lexcase_ai::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use lexcase_ai::{
    BackendError, ChatClient, ChunkSink, Embed, HashingEmbedder, IssueSpotter, PrecedentRetriever,
    ResponseMode, VectorIndex,
};
use lexcase_core::{
    ConfigError, EmbeddingError, IssueTag, Query, RetrievalConfig, RetrievalError, ScoreWeights,
};
use lexcase_store::{FeedbackStore, StoreError, load_corpus};
use tracing::info;
#[cfg(not(feature = "onnx"))]
use tracing::warn;

#[derive(Parser)]
#[command(name = "lexcase", version)]
#[command(about = "Precedent retrieval and argument drafting for constitutional cases")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full agent: issues, precedents, plan, both arguments and a verdict.
    Ask {
        #[command(flatten)]
        case: CaseArgs,
        #[command(flatten)]
        retrieval: RetrievalArgs,
        #[command(flatten)]
        llm: LlmArgs,
        /// Print the result as JSON instead of a card.
        #[arg(long)]
        json: bool,
        /// Print the stage trace after the card.
        #[arg(long)]
        trace: bool,
        /// Write JSON and text snapshots of the result into this directory.
        #[arg(long, env = "LEXCASE_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,
        /// Skip the interactive thumbs-up/down prompt.
        #[arg(long)]
        no_feedback: bool,
    },
    /// Retrieve and score precedents without calling the model.
    Search {
        #[command(flatten)]
        case: CaseArgs,
        #[command(flatten)]
        retrieval: RetrievalArgs,
        #[arg(long)]
        json: bool,
    },
    /// List the issues spotted in a piece of text.
    Issues {
        /// Text to analyse (joined with spaces).
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Print the corpus as an Arrow table.
    Corpus {
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
    /// Record or inspect ranking feedback.
    Feedback {
        #[arg(long, env = "LEXCASE_FEEDBACK_PATH", default_value = "legal_feedback.json")]
        feedback_path: PathBuf,
        #[command(subcommand)]
        action: FeedbackAction,
    },
}

#[derive(Subcommand)]
enum FeedbackAction {
    /// Thumbs up for the documents used in an answer.
    Up {
        #[arg(required = true)]
        documents: Vec<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Thumbs down for the documents used in an answer.
    Down {
        #[arg(required = true)]
        documents: Vec<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Nudge one document's boost by a signed delta.
    Boost {
        document: String,
        #[arg(allow_hyphen_values = true)]
        delta: f32,
        #[arg(long)]
        note: Option<String>,
    },
    /// Show style flags, recent notes and a document's boost.
    Show { document: Option<String> },
}

#[derive(Args)]
struct CaseArgs {
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "")]
    facts: String,
    /// Issue tag to include regardless of the text (repeatable).
    #[arg(long = "issue")]
    issues: Vec<String>,
}

impl CaseArgs {
    fn query(&self) -> anyhow::Result<Query> {
        let hints = self
            .issues
            .iter()
            .map(|s| s.parse::<IssueTag>().map_err(|e| ConfigError::Other(e.to_string())))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Query::new(&self.title, &self.facts).with_hints(hints))
    }
}

#[derive(Args)]
struct RetrievalArgs {
    #[arg(long, env = "LEXCASE_CORPUS", default_value = "data/corpus.json")]
    corpus: PathBuf,
    #[arg(long, env = "LEXCASE_FEEDBACK_PATH", default_value = "legal_feedback.json")]
    feedback_path: PathBuf,
    /// ONNX sentence-transformers directory; the hashing embedder is used without it.
    #[arg(long, env = "LEXCASE_MODEL_DIR")]
    model_dir: Option<PathBuf>,
    #[arg(long, env = "LEXCASE_TOP_K", default_value_t = 5)]
    top_k: usize,
    /// Score weights "similarity,recency,court,issue_overlap".
    #[arg(long, env = "LEXCASE_WEIGHTS")]
    weights: Option<String>,
    /// Reference year for recency (defaults to the current year).
    #[arg(long, env = "LEXCASE_CURRENT_YEAR")]
    current_year: Option<i32>,
}

impl RetrievalArgs {
    fn config(&self) -> Result<RetrievalConfig, ConfigError> {
        let weights = match &self.weights {
            Some(raw) => raw.parse::<ScoreWeights>()?,
            None => ScoreWeights::default(),
        };
        let config = RetrievalConfig {
            weights,
            top_k: self.top_k,
            current_year: self.current_year,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    fn retriever(&self) -> anyhow::Result<PrecedentRetriever> {
        let config = self.config()?;
        let documents = load_corpus(&self.corpus)?;
        let embedder = embedder(self.model_dir.as_deref())?;
        let index = VectorIndex::build(documents, embedder.as_ref())
            .map_err(RetrievalError::from)
            .context("building precedent index")?;
        let feedback = FeedbackStore::load(&self.feedback_path).with_bound(config.boost_bound);
        Ok(PrecedentRetriever::new(
            Arc::new(index),
            embedder,
            Arc::new(feedback),
            config,
        )?)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Args)]
struct LlmArgs {
    #[arg(long, env = "LEXCASE_MODEL", default_value = DEFAULT_MODEL)]
    model: String,
    #[arg(long, env = "LEXCASE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,
    #[arg(long, env = "NVIDIA_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, env = "LEXCASE_TEMPERATURE", default_value_t = 0.35)]
    temperature: f32,
    #[arg(long, env = "LEXCASE_MAX_TOKENS", default_value_t = 1700)]
    max_tokens: u32,
    /// Force streaming on or off; by default it follows whether stdout is a terminal.
    #[arg(long, env = "LEXCASE_STREAM", value_enum)]
    stream: Option<Switch>,
    /// Answer layout: bullets or prose.
    #[arg(long, env = "LEXCASE_STYLE")]
    style: Option<String>,
    #[arg(long, env = "LEXCASE_TIMEOUT_SECS", default_value_t = 120)]
    timeout_secs: u64,
}

impl LlmArgs {
    fn mode(&self, json: bool) -> ResponseMode {
        let streaming = match self.stream {
            Some(Switch::On) => true,
            Some(Switch::Off) => false,
            None => !json && io::stdout().is_terminal(),
        };
        if streaming {
            ResponseMode::Streaming
        } else {
            ResponseMode::Buffered
        }
    }

    fn style(&self) -> Result<Option<StylePreference>, ConfigError> {
        self.style
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse().map_err(ConfigError::Other))
            .transpose()
    }
}

/// Prints streamed model output as it arrives.
struct StdoutSink;

impl ChunkSink for StdoutSink {
    fn on_chunk(&self, chunk: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(chunk.as_bytes());
        let _ = out.flush();
    }

    fn on_finish(&self) {
        println!("\n");
    }
}

fn embedder(model_dir: Option<&Path>) -> anyhow::Result<Arc<dyn Embed>> {
    match model_dir {
        #[cfg(feature = "onnx")]
        Some(dir) => {
            let onnx = lexcase_ai::OnnxEmbedder::load(dir)
                .map_err(|e| ConfigError::Other(format!("loading embedding model: {e:#}")))?;
            Ok(Arc::new(onnx))
        }
        #[cfg(not(feature = "onnx"))]
        Some(dir) => {
            warn!(dir = %dir.display(), "built without the onnx feature, using the hashing embedder");
            Ok(Arc::new(HashingEmbedder::default()))
        }
        None => {
            info!("no model directory set, using the hashing embedder");
            Ok(Arc::new(HashingEmbedder::default()))
        }
    }
}

/// Process exit code for a failure: 2 config, 3 retrieval, 4 drafting,
/// 5 backend, 1 anything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<AgentError>() {
            return match e.kind() {
                ErrorKind::Retrieval => 3,
                ErrorKind::Drafting => 4,
                ErrorKind::Backend => 5,
            };
        }
        if cause.is::<ConfigError>() {
            return 2;
        }
        if let Some(StoreError::CorpusNotFound(_)) = cause.downcast_ref::<StoreError>() {
            return 2;
        }
        if cause.is::<RetrievalError>() || cause.is::<EmbeddingError>() {
            return 3;
        }
        if cause.is::<BackendError>() {
            return 5;
        }
    }
    1
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Ask {
            case,
            retrieval,
            llm,
            json,
            trace,
            output_dir,
            no_feedback,
        } => {
            let query = case.query()?;
            let retriever = Arc::new(retrieval.retriever()?);
            let feedback = retriever.feedback().clone();
            let backend = ChatClient::with_timeout(
                llm.base_url.clone(),
                llm.api_key.clone(),
                llm.model.clone(),
                llm.timeout_secs,
            )?;
            let mode = llm.mode(json);
            let config = AgentConfig {
                top_k: retrieval.top_k,
                temperature: llm.temperature,
                max_tokens: llm.max_tokens,
                mode,
                style: llm.style()?,
                ..Default::default()
            };
            info!(model = %llm.model, ?mode, "starting agent run");
            let orchestrator = AgentOrchestrator::new(retriever, Arc::new(backend), config);

            let run = orchestrator.run(&query, &StdoutSink).await;
            let trace_text = display::trace_lines(&run.trace);
            let result = run.into_result()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                let streamed = mode == ResponseMode::Streaming;
                print!("{}", display::result_card(&result, &query.title, !streamed));
                if trace {
                    print!("{trace_text}");
                }
            }

            if let Some(dir) = output_dir {
                save_snapshot(&dir, &result)?;
            }
            if !json && !no_feedback && io::stdin().is_terminal() {
                ask_feedback(&feedback, &result)?;
            }
        }
        Command::Search {
            case,
            retrieval,
            json,
        } => {
            let query = case.query()?;
            let retriever = retrieval.retriever()?;
            let issues = IssueSpotter::new().spot(&query);
            let precedents = retriever.retrieve_with_issues(&query, &issues, retrieval.top_k)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&precedents)?);
            } else {
                print!("{}", display::precedent_table(&precedents, &issues));
            }
        }
        Command::Issues { text } => {
            let issues = IssueSpotter::new().spot_text(&text.join(" "));
            print!("{}", display::issue_list(&issues));
        }
        Command::Corpus { retrieval } => {
            let documents = load_corpus(&retrieval.corpus)?;
            let embedder = embedder(retrieval.model_dir.as_deref())?;
            let index = VectorIndex::build(documents, embedder.as_ref()).map_err(RetrievalError::from)?;
            let batch = index.to_record_batch()?;
            // Embedding column last; leave it out of the table.
            let table = batch.project(&(0..batch.num_columns() - 1).collect::<Vec<_>>())?;
            println!("{}", arrow::util::pretty::pretty_format_batches(&[table])?);
        }
        Command::Feedback {
            feedback_path,
            action,
        } => {
            let store = FeedbackStore::try_load(&feedback_path)?;
            match action {
                FeedbackAction::Up { documents, note } => {
                    let flags = store.record_verdict(true, &documents, note.as_deref())?;
                    println!("recorded thumbs up for {} documents; style {flags:?}", documents.len());
                }
                FeedbackAction::Down { documents, note } => {
                    let flags = store.record_verdict(false, &documents, note.as_deref())?;
                    println!("recorded thumbs down for {} documents; style {flags:?}", documents.len());
                }
                FeedbackAction::Boost {
                    document,
                    delta,
                    note,
                } => {
                    let boost = store.record(&document, delta, note.as_deref())?;
                    println!("{document}: boost {boost:+.2}");
                }
                FeedbackAction::Show { document } => {
                    println!("{:<26} {:?}", "style", store.style_flags());
                    println!("{:<26} {}", "entries", store.len());
                    for hint in store.style_hints() {
                        println!("{:<26} {hint}", "note");
                    }
                    if let Some(id) = document {
                        println!("{id:<26} {:+.2}", store.get_boost(&id));
                    }
                }
            }
        }
    }
    Ok(())
}

fn save_snapshot(dir: &Path, result: &AgentResult) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    let stamp = snapshot_stem(dir, chrono::Utc::now());
    let json_path = dir.join(format!("{stamp}.json"));
    std::fs::write(&json_path, serde_json::to_string_pretty(result)?)?;
    let text = format!(
        "PETITIONER ARGUMENTS\n{}\n\nSTATE ARGUMENTS\n{}\n\nVERDICT\n{}\nConfidence: {:.2}\n",
        result.petitioner_argument,
        result.state_argument,
        result.verdict.text,
        result.verdict.confidence
    );
    std::fs::write(dir.join(format!("{stamp}.txt")), text)?;
    info!(path = %json_path.display(), "saved result snapshot");
    Ok(())
}

/// `result_<UTC millis>`, suffixed with a counter if that name is taken.
fn snapshot_stem(dir: &Path, now: chrono::DateTime<chrono::Utc>) -> String {
    let base = format!("result_{}", now.format("%Y%m%d_%H%M%S_%3f"));
    let taken = |stem: &str| dir.join(format!("{stem}.json")).exists();
    if !taken(&base) {
        return base;
    }
    let mut n = 1;
    loop {
        let stem = format!("{base}_{n}");
        if !taken(&stem) {
            return stem;
        }
        n += 1;
    }
}

/// Interactive thumbs-up/down after an answer. Enter means yes.
fn ask_feedback(store: &FeedbackStore, result: &AgentResult) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut line = String::new();
    print!("Was this helpful? [Y/n] ");
    io::stdout().flush()?;
    stdin.lock().read_line(&mut line)?;
    let answer = line.trim().to_ascii_lowercase();
    let thumbs_up = answer.is_empty() || answer.starts_with('y');

    let mut note = String::new();
    if thumbs_up {
        print!("Any brief notes to keep improving? (Enter to skip): ");
        io::stdout().flush()?;
        stdin.lock().read_line(&mut note)?;
    }
    let note = Some(note.trim()).filter(|n| !n.is_empty());
    store.record_verdict(thumbs_up, &result.used_document_ids, note)?;
    println!("Feedback recorded.");
    Ok(())
}
