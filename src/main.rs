//! rarepath CLI: rare-node evidence paths and QA synthesis.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use miette::Result;

use rarepath::config::{GraphSource, PipelineConfig};
use rarepath::corpus::{self, JsonlWriter, PathRecord};
use rarepath::graph::GatewaySource;
use rarepath::graph::index::SnapshotGraph;
use rarepath::graph::neo4j::Neo4jSource;
use rarepath::graph::rarity::RareNodeSet;
use rarepath::llm::OpenAiClient;
use rarepath::pipeline::{BatchWalker, RunSummary, score_graph};
use rarepath::qa::{QaGenerator, QuestionRecord};

#[derive(Parser)]
#[command(name = "rarepath", version, about = "Rare-node evidence paths over legal knowledge graphs")]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every node and write the ranked table and seed list.
    Score {
        #[command(flatten)]
        graph: GraphArgs,
        #[command(flatten)]
        score: ScoreArgs,
    },

    /// Walk backward from each seed and write accepted paths as JSONL.
    Walk {
        #[command(flatten)]
        graph: GraphArgs,
        /// Seed file: one element id per line, or a ranked `.jsonl` table.
        #[arg(long)]
        seeds: PathBuf,
        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Score, then walk the selected seeds.
    Run {
        #[command(flatten)]
        graph: GraphArgs,
        #[command(flatten)]
        score: ScoreArgs,
        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Generate one question per path record.
    Questions {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "questions.jsonl")]
        output: PathBuf,
    },

    /// Generate one answer per generated question.
    Answers {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "qa.jsonl")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct GraphArgs {
    /// Read the graph from a JSON snapshot instead of the configured source.
    #[arg(long)]
    graph: Option<PathBuf>,
}

#[derive(Args)]
struct ScoreArgs {
    /// Fraction of ranked nodes kept as seeds, in (0, 1].
    #[arg(long)]
    top_percent: Option<f64>,
    /// Minimum total degree for a node to be scored.
    #[arg(long)]
    min_degree: Option<usize>,
    /// Ranked-node table output.
    #[arg(long, default_value = "rare_nodes.jsonl")]
    ranked: PathBuf,
    /// Seed id list output.
    #[arg(long, default_value = "rare_node_element_ids.txt")]
    seeds: PathBuf,
}

#[derive(Args)]
struct WalkArgs {
    /// Path corpus output.
    #[arg(long, default_value = "sft_paths_full.jsonl")]
    output: PathBuf,
    /// Append to the output instead of truncating it.
    #[arg(long)]
    append: bool,
    #[arg(long)]
    workers: Option<usize>,
    /// Base RNG seed for reproducible walks.
    #[arg(long)]
    rng_seed: Option<u64>,
    #[arg(long)]
    min_length: Option<usize>,
    #[arg(long)]
    max_length: Option<usize>,
}

/// The configured graph backend.
enum Backend {
    Snapshot(SnapshotGraph),
    Neo4j(Neo4jSource),
}

impl Backend {
    fn open(source: &GraphSource, snapshot: Option<&Path>) -> Result<Self> {
        let backend = match (snapshot, source) {
            (Some(path), _) => Backend::Snapshot(SnapshotGraph::load(path)?),
            (None, GraphSource::Snapshot { path }) => Backend::Snapshot(SnapshotGraph::load(path)?),
            (None, GraphSource::Neo4j(config)) => {
                tracing::info!(uri = %config.uri, database = %config.database, "using neo4j");
                Backend::Neo4j(Neo4jSource::new(config.clone()))
            }
        };
        Ok(backend)
    }

    fn score(&self, config: &PipelineConfig) -> Result<RareNodeSet> {
        let ranked = match self {
            Backend::Snapshot(graph) => score_graph(graph, &config.scoring)?,
            Backend::Neo4j(source) => score_graph(&source.open_session()?, &config.scoring)?,
        };
        Ok(ranked)
    }

    fn walk(
        &self,
        config: &PipelineConfig,
        seeds: &[String],
        args: &WalkArgs,
    ) -> Result<RunSummary> {
        let mut writer = if args.append {
            JsonlWriter::append(&args.output)?
        } else {
            JsonlWriter::create(&args.output)?
        };
        let walker = BatchWalker::new(&config.walk, &config.batch);
        let summary = match self {
            Backend::Snapshot(graph) => walker.run(&graph, seeds, &mut writer)?,
            Backend::Neo4j(source) => walker.run(source, seeds, &mut writer)?,
        };
        writer.finish()?;
        Ok(summary)
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    Ok(config)
}

fn apply_score_args(config: &mut PipelineConfig, args: &ScoreArgs) {
    if let Some(p) = args.top_percent {
        config.scoring.top_percent = p;
    }
    if let Some(d) = args.min_degree {
        config.scoring.min_degree = d;
    }
}

fn apply_walk_args(config: &mut PipelineConfig, args: &WalkArgs) {
    if let Some(w) = args.workers {
        config.batch.workers = w;
    }
    if args.rng_seed.is_some() {
        config.batch.rng_seed = args.rng_seed;
    }
    if let Some(n) = args.min_length {
        config.walk.min_path_length = n;
    }
    if let Some(n) = args.max_length {
        config.walk.max_path_length = n;
    }
}

/// Score, write both seed files, and return the selected seed ids.
fn score_and_write(
    backend: &Backend,
    config: &PipelineConfig,
    args: &ScoreArgs,
) -> Result<Vec<String>> {
    let ranked = backend.score(config)?;
    let selected = ranked.select_top(config.scoring.top_percent);

    corpus::write_ranked(&args.ranked, selected)?;
    corpus::write_seed_ids(&args.seeds, selected)?;

    println!("Qualified nodes: {}", ranked.len());
    println!(
        "Selected seeds:  {} (top {:.0}%)",
        selected.len(),
        config.scoring.top_percent * 100.0
    );
    println!("Ranked table:    {}", args.ranked.display());
    println!("Seed ids:        {}", args.seeds.display());
    for (i, node) in selected.iter().take(5).enumerate() {
        println!(
            "  {}. {} [{}] degree={} score={:.4}",
            i + 1,
            node.name,
            node.label,
            node.total_degree,
            node.score
        );
    }
    Ok(selected.iter().map(|n| n.element_id.clone()).collect())
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Score { graph, score } => {
            apply_score_args(&mut config, &score);
            config.validate()?;
            let backend = Backend::open(&config.graph, graph.graph.as_deref())?;
            score_and_write(&backend, &config, &score)?;
        }

        Commands::Walk { graph, seeds, walk } => {
            apply_walk_args(&mut config, &walk);
            config.validate()?;
            let seed_ids = corpus::read_seed_ids(&seeds)?;
            let backend = Backend::open(&config.graph, graph.graph.as_deref())?;
            let summary = backend.walk(&config, &seed_ids, &walk)?;
            println!("Output: {}", walk.output.display());
            print!("{summary}");
        }

        Commands::Run { graph, score, walk } => {
            apply_score_args(&mut config, &score);
            apply_walk_args(&mut config, &walk);
            config.validate()?;
            let backend = Backend::open(&config.graph, graph.graph.as_deref())?;
            let seed_ids = score_and_write(&backend, &config, &score)?;
            let summary = backend.walk(&config, &seed_ids, &walk)?;
            println!("Output: {}", walk.output.display());
            print!("{summary}");
        }

        Commands::Questions { input, output } => {
            config.validate()?;
            let records: Vec<PathRecord> = corpus::read_jsonl(&input)?;
            let client = OpenAiClient::new(config.llm.clone());
            let (questions, stats) = QaGenerator::new(&client, &config.llm).questions(records)?;

            let mut writer = JsonlWriter::create(&output)?;
            for q in &questions {
                writer.write(q)?;
            }
            writer.finish()?;
            println!("Questions written: {}", output.display());
            println!("  succeeded: {}", stats.succeeded);
            println!("  failed:    {}", stats.failed);
        }

        Commands::Answers { input, output } => {
            config.validate()?;
            let records: Vec<QuestionRecord> = corpus::read_jsonl(&input)?;
            let client = OpenAiClient::new(config.llm.clone());
            let (answers, stats) = QaGenerator::new(&client, &config.llm).answers(records)?;

            let mut writer = JsonlWriter::create(&output)?;
            for a in &answers {
                writer.write(a)?;
            }
            writer.finish()?;
            println!("Answers written: {}", output.display());
            println!("  succeeded: {}", stats.succeeded);
            println!("  failed:    {}", stats.failed);
            println!("  skipped:   {}", stats.skipped);
        }
    }

    Ok(())
}
