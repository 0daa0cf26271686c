use std::{path::PathBuf, process, time::Instant};

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use snomed_clusters::{ClusterBuilder, ClusterDefinition, Project, ResolvedCluster};
use tracing::instrument;

use super::terminal::{Colorize, format_elapsed, is_narrow};

#[derive(Debug, Parser, Default)]
#[command(about = "Build every cluster and write the CSV, text files and report")]
pub struct Build {
    /// Only build the named clusters (can be specified multiple times)
    #[arg(long = "cluster", value_name = "NAME")]
    clusters: Vec<String>,

    /// Build and summarize without writing any files
    #[arg(long)]
    dry_run: bool,

    /// Exit with status 2 if any cluster dropped codes or has unknown parents
    #[arg(long)]
    strict: bool,

    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Build {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let start = Instant::now();
        let project = Project::open(root)?;
        let definitions = self.select(project.clusters()?)?;

        let tables = project
            .load_tables()
            .context("Failed to load terminology tables")?;
        let builder = ClusterBuilder::new(&tables, project.config().build_options());

        let progress = match self.output {
            OutputFormat::Table => ProgressBar::new(definitions.len() as u64),
            OutputFormat::Json => ProgressBar::hidden(),
        };
        progress.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );

        let clusters = builder.build_all_with(&definitions, |cluster| {
            progress.set_message(cluster.name().to_string());
            progress.inc(1);
        })?;
        progress.finish_and_clear();

        let total: usize = clusters.iter().map(|c| c.codes().len()).sum();
        tracing::info!(
            "Completed creating clusters with {total} total codes across {} clusters.",
            clusters.len()
        );

        let written = if self.dry_run {
            None
        } else {
            let summary = project
                .exporter()
                .export(&clusters, &tables)
                .context("Failed to export clusters")?;
            Some(summary)
        };

        match self.output {
            OutputFormat::Json => output_json(&clusters, total)?,
            OutputFormat::Table => {
                output_table(&clusters, total);
                if let Some(summary) = &written {
                    let csv = format!("Wrote {} rows to {}", summary.rows, summary.csv.display());
                    println!();
                    println!("{}", csv.dim());
                    println!("{}", format!("Wrote workbook to {}", summary.xlsx.display()).dim());
                    if let Some(dir) = summary.text_files.first().and_then(|p| p.parent()) {
                        let count = summary.text_files.len();
                        println!("{}", format!("Wrote {count} text files to {}", dir.display()).dim());
                    }
                    println!("{}", format!("Wrote report to {}", summary.report.display()).dim());
                }
            }
        }

        tracing::info!("Run completed in {}", format_elapsed(start.elapsed()));

        let has_problems = clusters.iter().any(|c| c.diagnostics().has_problems());
        if self.strict && has_problems {
            process::exit(2);
        }

        Ok(())
    }

    fn select(&self, definitions: Vec<ClusterDefinition>) -> anyhow::Result<Vec<ClusterDefinition>> {
        if self.clusters.is_empty() {
            return Ok(definitions);
        }

        for name in &self.clusters {
            if !definitions.iter().any(|d| d.name.as_str() == name) {
                anyhow::bail!("No cluster named '{name}'");
            }
        }

        Ok(definitions
            .into_iter()
            .filter(|d| self.clusters.iter().any(|name| d.name.as_str() == name))
            .collect())
    }
}

fn output_json(clusters: &[ResolvedCluster], total: usize) -> anyhow::Result<()> {
    use serde_json::json;

    let entries: Vec<_> = clusters
        .iter()
        .map(|cluster| {
            json!({
                "name": cluster.name(),
                "codes": cluster.codes(),
                "fingerprint": cluster.fingerprint(),
                "diagnostics": cluster.diagnostics(),
            })
        })
        .collect();

    let output = json!({
        "total": total,
        "clusters": entries,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn output_table(clusters: &[ResolvedCluster], total: usize) {
    let narrow = is_narrow();
    let width = clusters
        .iter()
        .map(|c| c.name().as_str().len())
        .max()
        .unwrap_or(0)
        .max("Cluster".len());

    println!("Clusters");
    println!("{}", "────────".dim());

    if narrow {
        for cluster in clusters {
            println!("{:<width$}  {}", cluster.name(), cluster.codes().len());
        }
    } else {
        println!(
            "{}",
            format!(
                "{:<width$}  {:>7}  {:>8}  {:>7}  {:>7}",
                "Cluster", "Codes", "Replaced", "Dropped", "Unknown"
            )
            .dim()
        );
        for cluster in clusters {
            let diagnostics = cluster.diagnostics();
            let line = format!(
                "{:<width$}  {:>7}  {:>8}  {:>7}  {:>7}",
                cluster.name(),
                cluster.codes().len(),
                diagnostics.replacements.len(),
                diagnostics.unresolvable.len(),
                diagnostics.unknown_parents.len(),
            );
            if diagnostics.has_problems() {
                println!("{}", line.warning());
            } else {
                println!("{line}");
            }
        }
    }

    println!("{}", "────────".dim());
    println!("{:<width$}  {total:>7}", "Total");

    let with_problems: Vec<_> = clusters
        .iter()
        .filter(|c| c.diagnostics().has_problems())
        .collect();

    if with_problems.is_empty() {
        println!();
        println!("{}", "✅ Every code resolved.".success());
        return;
    }

    for cluster in with_problems {
        let diagnostics = cluster.diagnostics();
        println!();
        println!("{}", format!("⚠️  {}", cluster.name()).warning());
        for parent in &diagnostics.unknown_parents {
            println!("  unknown parent {parent}");
        }
        for unresolvable in &diagnostics.unresolvable {
            println!("  dropped {}: {}", unresolvable.code, unresolvable.reason);
        }
    }
}
