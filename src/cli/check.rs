use std::{path::PathBuf, process};

use anyhow::Context;
use clap::Parser;
use snomed_clusters::{
    ClusterName, Code, Project,
    domain::{
        audit::RetirementAudit,
        closure::{Expander, Expansion},
    },
};
use tracing::instrument;

use super::terminal::Colorize;

#[derive(Debug, Parser, Default)]
#[command(about = "Audit the history table and cluster parents")]
pub struct Check {
    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Suppress headers and format for scripting
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Check {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let project = Project::open(root)?;
        let definitions = project.clusters()?;
        let tables = project
            .load_tables()
            .context("Failed to load terminology tables")?;

        let audit = RetirementAudit::of(tables.retirements());

        let expander = Expander::new(&tables, project.config().build_options().expander);
        let mut unknown_parents: Vec<(ClusterName, Code)> = Vec::new();
        for definition in &definitions {
            for parent in definition.parents.iter() {
                if matches!(expander.expand(parent)?, Expansion::UnknownParent) {
                    unknown_parents.push((definition.name.clone(), parent.clone()));
                }
            }
        }

        match self.output {
            OutputFormat::Json => output_json(&audit, &unknown_parents)?,
            OutputFormat::Table if self.quiet => println!(
                "cycles={} dead_ends={} unknown_parents={}",
                audit.cycles.len(),
                audit.dead_ends.len(),
                unknown_parents.len()
            ),
            OutputFormat::Table => output_table(&audit, &unknown_parents),
        }

        // Cycles leave codes unresolvable whichever cluster reaches them.
        let mut exit_code = 0;
        if !audit.cycles.is_empty() {
            exit_code = exit_code.max(3);
        }
        if !audit.dead_ends.is_empty() || !unknown_parents.is_empty() {
            exit_code = exit_code.max(2);
        }

        if exit_code != 0 {
            process::exit(exit_code);
        }

        Ok(())
    }
}

fn output_json(audit: &RetirementAudit, unknown_parents: &[(ClusterName, Code)]) -> anyhow::Result<()> {
    use serde_json::json;

    let unknown: Vec<_> = unknown_parents
        .iter()
        .map(|(cluster, code)| json!({ "cluster": cluster, "code": code }))
        .collect();

    let output = json!({
        "cycles": audit.cycles,
        "dead_ends": audit.dead_ends,
        "unknown_parents": unknown,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn output_table(audit: &RetirementAudit, unknown_parents: &[(ClusterName, Code)]) {
    const MAX_DISPLAY: usize = 10;

    println!("Retirement history");
    println!("{}", "──────────────────".dim());
    println!("{:<16} {:>6}", "Cycles", audit.cycles.len());
    println!("{:<16} {:>6}", "Dead ends", audit.dead_ends.len());
    println!("{:<16} {:>6}", "Unknown parents", unknown_parents.len());

    if !audit.cycles.is_empty() {
        println!();
        println!("{}", "Replacement cycles".error());
        for cycle in audit.cycles.iter().take(MAX_DISPLAY) {
            let members: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            println!("  {}", members.join(" → "));
        }
        if audit.cycles.len() > MAX_DISPLAY {
            println!("  … and {} more", audit.cycles.len() - MAX_DISPLAY);
        }
    }

    if !audit.dead_ends.is_empty() {
        println!();
        println!("{}", "Retired without replacement".warning());
        for code in audit.dead_ends.iter().take(MAX_DISPLAY) {
            println!("  {code}");
        }
        if audit.dead_ends.len() > MAX_DISPLAY {
            println!("  … and {} more", audit.dead_ends.len() - MAX_DISPLAY);
        }
    }

    if !unknown_parents.is_empty() {
        println!();
        println!("{}", "Parents missing from the closure table".warning());
        for (cluster, code) in unknown_parents {
            println!("  {cluster}: {code}");
        }
    }

    if audit.is_clean() && unknown_parents.is_empty() {
        println!();
        println!("{}", "✅ No problems found.".success());
    }
}
