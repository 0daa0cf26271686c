use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use snomed_clusters::{
    Code, Project, Terminology,
    domain::retirement::{Resolution, Resolver},
};
use tracing::instrument;

use super::terminal::Colorize;

#[derive(Debug, Parser)]
pub struct Resolve {
    /// The codes to resolve
    #[arg(required = true, value_name = "CODE")]
    codes: Vec<Code>,
}

impl Resolve {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let project = Project::open(root)?;
        let tables = project
            .load_tables()
            .context("Failed to load terminology tables")?;
        let resolver = Resolver::new(&tables, project.config().build_options().resolver);

        for code in &self.codes {
            let line = match resolver.resolve(code)? {
                Resolution::Current(code) => {
                    format!("{code} is current{}", term_suffix(&tables, &code)?)
                }
                Resolution::Replaced { from, to, hops } => {
                    let hops = if hops == 1 { "1 hop".to_string() } else { format!("{hops} hops") };
                    format!("{from} → {to} ({hops}){}", term_suffix(&tables, &to)?).success()
                }
                Resolution::Unresolvable(unresolvable) => unresolvable.to_string().error(),
            };
            println!("{line}");
        }

        Ok(())
    }
}

fn term_suffix(terminology: &impl Terminology, code: &Code) -> anyhow::Result<String> {
    Ok(terminology
        .lookup_term(code)?
        .map(|term| format!(" |{term}|"))
        .unwrap_or_default())
}
