/// Benchmark CLI for the lexical retrieval engine.
///
/// Loads the configured corpus and a question set with known relevant passage ids,
/// runs one or all lexical configurations, prints and saves the reports.
/// CI integration via --subset (first N questions) and --min-recall (exit code threshold).

use clap::Parser;
use std::path::PathBuf;

use ragfuse::benchmark::dataset::{load_dataset, unknown_ids};
use ragfuse::benchmark::default_configs;
use ragfuse::benchmark::report::{self, BenchmarkReport};
use ragfuse::benchmark::runner::run_benchmark;
use ragfuse::config::Config;
use ragfuse::corpus::LoadedPayloads;

#[derive(Parser)]
#[command(name = "ragfuse-benchmark", about = "Lexical retrieval benchmark for ragfuse")]
struct Cli {
    /// Path to the question set JSON
    #[arg(long, default_value = "data/benchmark/questions.json")]
    dataset: PathBuf,

    /// Lexical configuration: "default", "bigram", "wide-prefilter", or "all" for comparison
    #[arg(long, default_value = "default")]
    config: String,

    /// Cut-off for hit and recall
    #[arg(long, default_value_t = 5)]
    k: usize,

    /// Run only the first N questions
    #[arg(long)]
    subset: Option<usize>,

    /// Minimum mean recall@k to pass (CI threshold, e.g. 0.60 for 60%)
    #[arg(long)]
    min_recall: Option<f64>,

    /// Output directory for reports
    #[arg(long, default_value = "data/benchmark/results")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?;

    tracing::info!(path = %cli.dataset.display(), "Loading dataset");
    let mut questions = load_dataset(&cli.dataset)?;
    if let Some(n) = cli.subset {
        questions.truncate(n);
        tracing::info!(subset = n, "Applied subset");
    }

    let corpus = LoadedPayloads::load(&config.corpus)?.corpus()?;
    for (question_id, id) in unknown_ids(&questions, &corpus) {
        tracing::warn!(question_id, id, "Relevant id not found in corpus");
    }

    println!("=== Lexical Retrieval Benchmark ===");
    println!("Dataset: {}", cli.dataset.display());
    println!("Questions: {}", questions.len());
    println!("Passages: {}", corpus.len());
    println!();

    std::fs::create_dir_all(&cli.output_dir)?;

    let all_configs = default_configs();
    let configs_to_run: Vec<_> = if cli.config == "all" {
        all_configs.iter().collect()
    } else {
        let found = all_configs
            .iter()
            .find(|c| c.name == cli.config)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown config '{}'. Valid options: default, bigram, wide-prefilter, all",
                    cli.config
                )
            })?;
        vec![found]
    };

    let mut reports: Vec<BenchmarkReport> = Vec::new();
    for bench in &configs_to_run {
        println!("--- Running config: {} ---", bench.name);
        let results = run_benchmark(&questions, &corpus, &config.lexical, bench, cli.k)?;
        let report = report::generate_report(&bench.name, cli.k, &results);
        report::print_report(&report);
        println!();

        let report_path = cli.output_dir.join(format!("{}_report.json", bench.name));
        report::save_report(&report, &report_path)?;
        tracing::info!(path = %report_path.display(), "Report saved");
        reports.push(report);
    }

    if reports.len() > 1 {
        report::print_comparison(&reports);
        println!();
    }

    if let (Some(threshold), Some(last)) = (cli.min_recall, reports.last()) {
        if last.mean_recall < threshold {
            eprintln!(
                "FAIL: recall@{} {:.1}% < threshold {:.1}%",
                last.k,
                last.mean_recall * 100.0,
                threshold * 100.0
            );
            std::process::exit(1);
        }
        println!(
            "PASS: recall@{} {:.1}% >= threshold {:.1}%",
            last.k,
            last.mean_recall * 100.0,
            threshold * 100.0
        );
    }

    Ok(())
}
