/// Benchmark reporting: aggregate metrics, console tables and JSON output.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::QuestionResult;

/// Per-category retrieval metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub total: usize,
    pub hit_rate: f64,
    pub mrr: f64,
}

/// Full benchmark report for a single configuration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub config_name: String,
    pub timestamp: DateTime<Utc>,
    pub k: usize,
    pub total_questions: usize,
    pub hit_rate: f64,
    pub mean_recall: f64,
    pub mrr: f64,
    pub categories: BTreeMap<String, CategoryMetrics>,
    pub mean_latency_us: u64,
    pub p95_latency_us: u64,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Generate a BenchmarkReport from a set of QuestionResults.
pub fn generate_report(config_name: &str, k: usize, results: &[QuestionResult]) -> BenchmarkReport {
    let hit_value = |r: &QuestionResult| if r.hit { 1.0 } else { 0.0 };

    let mut grouped: BTreeMap<String, Vec<&QuestionResult>> = BTreeMap::new();
    for r in results {
        grouped.entry(r.category.clone()).or_default().push(r);
    }
    let categories = grouped
        .into_iter()
        .map(|(cat, rs)| {
            let metrics = CategoryMetrics {
                total: rs.len(),
                hit_rate: mean(rs.iter().map(|r| hit_value(r))),
                mrr: mean(rs.iter().map(|r| r.reciprocal_rank)),
            };
            (cat, metrics)
        })
        .collect();

    let mut latencies: Vec<u64> = results.iter().map(|r| r.latency_us).collect();
    let mean_latency_us = if latencies.is_empty() {
        0
    } else {
        latencies.iter().sum::<u64>() / latencies.len() as u64
    };
    let p95_latency_us = if latencies.is_empty() {
        0
    } else {
        latencies.sort_unstable();
        let idx = ((0.95 * latencies.len() as f64).ceil() as usize).saturating_sub(1);
        latencies[idx.min(latencies.len() - 1)]
    };

    BenchmarkReport {
        config_name: config_name.to_string(),
        timestamp: Utc::now(),
        k,
        total_questions: results.len(),
        hit_rate: mean(results.iter().map(hit_value)),
        mean_recall: mean(results.iter().map(|r| r.recall)),
        mrr: mean(results.iter().map(|r| r.reciprocal_rank)),
        categories,
        mean_latency_us,
        p95_latency_us,
    }
}

/// Print a formatted report to stdout.
pub fn print_report(report: &BenchmarkReport) {
    println!("=== Benchmark Report: {} ===", report.config_name);
    println!("Date: {}", report.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Questions: {}", report.total_questions);
    println!("Hit@{}: {:.1}%", report.k, report.hit_rate * 100.0);
    println!("Recall@{}: {:.1}%", report.k, report.mean_recall * 100.0);
    println!("MRR: {:.3}", report.mrr);
    println!();
    println!("Per-Category Breakdown:");
    for (cat, m) in &report.categories {
        println!(
            "  {:<25}  n={:<5} hit={:.1}%  mrr={:.3}",
            format!("{}:", cat),
            m.total,
            m.hit_rate * 100.0,
            m.mrr
        );
    }
    println!();
    println!(
        "Latency: mean={}us, p95={}us",
        report.mean_latency_us, report.p95_latency_us
    );
}

/// Print a side-by-side comparison of multiple reports.
pub fn print_comparison(reports: &[BenchmarkReport]) {
    if reports.is_empty() {
        return;
    }
    let col_width = 14usize;
    let label_width = 16usize;

    println!("=== Configuration Comparison ===");
    println!();
    let header: Vec<String> = reports
        .iter()
        .map(|r| format!("{:>col_width$}", r.config_name))
        .collect();
    println!("{:<label_width$}| {}", "Metric", header.join(" | "));
    let sep: Vec<String> = reports.iter().map(|_| "-".repeat(col_width)).collect();
    println!("{}|-{}", "-".repeat(label_width), sep.join("-|-"));

    let rows: [(&str, fn(&BenchmarkReport) -> String); 4] = [
        ("Hit@k", |r| format!("{:.1}%", r.hit_rate * 100.0)),
        ("Recall@k", |r| format!("{:.1}%", r.mean_recall * 100.0)),
        ("MRR", |r| format!("{:.3}", r.mrr)),
        ("p95 latency", |r| format!("{}us", r.p95_latency_us)),
    ];
    for (label, value) in rows {
        let values: Vec<String> = reports
            .iter()
            .map(|r| format!("{:>col_width$}", value(r)))
            .collect();
        println!("{:<label_width$}| {}", label, values.join(" | "));
    }
}

/// Save report as JSON to a file path.
pub fn save_report(report: &BenchmarkReport, path: &std::path::Path) -> Result<(), anyhow::Error> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}
