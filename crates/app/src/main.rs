use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use regcheck_core::{
    chunk_documents, load_documents_from_dir, CertPipeline, ChatCompletionClassifier,
    ChunkingConfig, ClassifierConfig, ClassifierScheme, ComplianceVerdict, DistanceMetric,
    EmbeddingIndex, HashedNgramEmbedder, HttpCrossEncoderReranker, Reranker, RetrievalContext,
    RetrievalOptions, TermOverlapReranker,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "regcheck", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the persisted embedding index.
    #[arg(long, default_value = "db/index")]
    index_dir: PathBuf,

    /// Directory holding the regulatory source documents (txt, docx, pdf).
    #[arg(long, default_value = "RegDocs")]
    docs_dir: PathBuf,

    /// Chunk size in characters.
    #[arg(long, default_value = "150")]
    chunk_size: usize,

    /// Overlap between consecutive chunks, in characters.
    #[arg(long, default_value = "70")]
    chunk_overlap: usize,

    /// Similarity metric the index is built and queried with.
    #[arg(long, default_value = "cosine")]
    metric: String,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the document folder and build a fresh index, replacing any
    /// existing one.
    Ingest,
    /// Retrieve the most relevant regulation chunks for a query.
    Search {
        /// Search query.
        #[arg(long)]
        query: String,
        /// Number of candidates to return.
        #[arg(long, default_value = "6")]
        top_k: usize,
        /// Rerank the candidates with a pairwise scorer.
        #[arg(long, default_value_t = false)]
        rerank: bool,
        /// Cross-encoder scoring endpoint; without it, --rerank falls back
        /// to the local term-overlap scorer.
        #[arg(long, env = "COMPLIANCE_RERANK_ENDPOINT")]
        rerank_endpoint: Option<String>,
    },
    /// Check one or more use cases for regulatory compliance.
    Check {
        /// Use case text, inline.
        #[arg(long, conflicts_with = "use_case_file")]
        use_case: Option<String>,
        /// File with use cases, separated by lines containing only `---`.
        #[arg(long)]
        use_case_file: Option<PathBuf>,
        /// Number of candidates retrieved before any reranking.
        #[arg(long, default_value = "6")]
        top_k: usize,
        /// Number of segments kept for the classifier after reranking.
        #[arg(long, default_value = "2")]
        keep_top: usize,
        /// Rerank the candidates before classification.
        #[arg(long, default_value_t = false)]
        rerank: bool,
        /// Cross-encoder scoring endpoint; without it, --rerank falls back
        /// to the local term-overlap scorer.
        #[arg(long, env = "COMPLIANCE_RERANK_ENDPOINT")]
        rerank_endpoint: Option<String>,
        /// Chat-completions endpoint of the compliance classifier.
        #[arg(long)]
        llm_endpoint: Option<String>,
        /// Model name sent to the classifier endpoint.
        #[arg(long, default_value = "gpt-4o-mini")]
        llm_model: String,
        /// Response scheme: typed (0-3 check) or verdict (compliant /
        /// non-compliant).
        #[arg(long, default_value = "typed")]
        scheme: String,
    },
}

fn parse_metric(value: &str) -> anyhow::Result<DistanceMetric> {
    match value {
        "cosine" => Ok(DistanceMetric::Cosine),
        "euclidean" => Ok(DistanceMetric::Euclidean),
        other => bail!("unknown metric {other:?}, expected cosine or euclidean"),
    }
}

fn parse_scheme(value: &str) -> anyhow::Result<ClassifierScheme> {
    match value {
        "typed" => Ok(ClassifierScheme::TypedCheck),
        "verdict" => Ok(ClassifierScheme::VerdictCheck),
        other => bail!("unknown scheme {other:?}, expected typed or verdict"),
    }
}

fn build_reranker(
    rerank: bool,
    endpoint: Option<String>,
) -> anyhow::Result<Option<Box<dyn Reranker + Send + Sync>>> {
    if !rerank {
        return Ok(None);
    }

    match endpoint {
        Some(endpoint) => Ok(Some(Box::new(HttpCrossEncoderReranker::new(
            endpoint, None,
        )?))),
        None => Ok(Some(Box::new(TermOverlapReranker))),
    }
}

fn print_verdict(verdict: &ComplianceVerdict) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(verdict)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let chunking = ChunkingConfig::new(cli.chunk_size, cli.chunk_overlap)?;
    let metric = parse_metric(&cli.metric)?;
    let embedder = HashedNgramEmbedder::default();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "regcheck boot"
    );

    match cli.command {
        Command::Ingest => {
            let report = load_documents_from_dir(&cli.docs_dir);

            for skipped in &report.skipped {
                warn!(name = %skipped.name, reason = %skipped.reason, "skipped document");
            }
            if report.documents.is_empty() {
                bail!(
                    "no readable documents found in {}",
                    cli.docs_dir.display()
                );
            }

            let chunks = chunk_documents(&report.documents, &chunking);
            let index = EmbeddingIndex::build(&chunks, &embedder, metric);
            index.persist(&cli.index_dir)?;

            println!(
                "{} chunks from {} documents indexed at {}",
                index.len(),
                report.documents.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Search {
            query,
            top_k,
            rerank,
            rerank_endpoint,
        } => {
            let (context, report) = RetrievalContext::open_or_build(
                &cli.index_dir,
                &cli.docs_dir,
                &chunking,
                embedder,
                metric,
            )?;
            log_open_report(&report);

            let hits = context.search(&query, top_k)?;
            let mut segments: Vec<String> = hits.iter().map(|hit| hit.text.clone()).collect();

            if let Some(reranker) = build_reranker(rerank, rerank_endpoint)? {
                segments = reranker.rerank(&query, &segments).await?;
            }

            println!("query: {query}");
            for (position, segment) in segments.iter().enumerate() {
                if let Some(hit) = hits.iter().find(|hit| hit.text == *segment) {
                    println!(
                        "[{}] score={:.4} chunk={} source={}",
                        position + 1,
                        hit.score,
                        hit.chunk_id,
                        hit.source_id
                    );
                }
                println!("  {segment}");
            }
        }
        Command::Check {
            use_case,
            use_case_file,
            top_k,
            keep_top,
            rerank,
            rerank_endpoint,
            llm_endpoint,
            llm_model,
            scheme,
        } => {
            let use_cases: Vec<String> = match (use_case, use_case_file) {
                (Some(text), None) => vec![text],
                (None, Some(path)) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    raw.split("\n---\n")
                        .map(str::trim)
                        .filter(|block| !block.is_empty())
                        .map(str::to_string)
                        .collect()
                }
                _ => bail!("provide exactly one of --use-case or --use-case-file"),
            };
            if use_cases.is_empty() {
                bail!("the use case file contained no use cases");
            }

            let config = match llm_endpoint {
                Some(endpoint) => ClassifierConfig {
                    endpoint,
                    api_key: std::env::var("COMPLIANCE_LLM_API_KEY").ok(),
                    model: llm_model,
                    temperature: 0.05,
                    scheme: parse_scheme(&scheme)?,
                },
                None => {
                    let mut config = ClassifierConfig::from_env().context(
                        "no classifier configured: pass --llm-endpoint or set COMPLIANCE_LLM_ENDPOINT",
                    )?;
                    config.scheme = parse_scheme(&scheme)?;
                    config
                }
            };
            let classifier = ChatCompletionClassifier::new(config)?;

            let (context, report) = RetrievalContext::open_or_build(
                &cli.index_dir,
                &cli.docs_dir,
                &chunking,
                embedder,
                metric,
            )?;
            log_open_report(&report);

            let mut pipeline = CertPipeline::new(context, classifier)
                .with_options(RetrievalOptions { top_k, keep_top });
            if let Some(reranker) = build_reranker(rerank, rerank_endpoint)? {
                pipeline = pipeline.with_reranker(reranker);
            }

            let outcomes = pipeline.check_batch(&use_cases).await?;
            for (use_case, outcome) in use_cases.iter().zip(&outcomes) {
                println!("use case: {use_case}");
                for segment in &outcome.segments {
                    println!("{segment}");
                    println!("================================================");
                }
                print_verdict(&outcome.verdict)?;
            }
        }
    }

    Ok(())
}

fn log_open_report(report: &regcheck_core::OpenReport) {
    if report.rebuilt {
        info!(
            documents = report.document_count,
            "no usable persisted index, built a fresh one"
        );
    }
    for skipped in &report.skipped {
        warn!(name = %skipped.name, reason = %skipped.reason, "skipped document");
    }
}
