use std::{collections::BTreeSet, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use nonempty::NonEmpty;
use snomed_clusters::{
    ClusterBuilder, ClusterDefinition, ClusterName, Code, Project, Terminology,
    domain::{
        SourceError, TextStyle,
        closure::{Expander, Expansion},
    },
    storage::export::render_codes,
};
use tracing::instrument;

use super::terminal::Colorize;

#[derive(Debug, Parser)]
pub struct Expand {
    /// The parent codes to expand, merged into one deduplicated set
    #[arg(required = true, value_name = "CODE")]
    parents: Vec<Code>,

    /// Build the parents as a cluster, replacing retired codes
    #[arg(long)]
    resolve: bool,

    /// Print codes as a quoted, comma-separated list
    #[arg(long)]
    quoted: bool,
}

impl Expand {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let project = Project::open(root)?;
        let tables = project
            .load_tables()
            .context("Failed to load terminology tables")?;
        let options = project.config().build_options();
        let style = if self.quoted {
            TextStyle::QuotedList
        } else {
            TextStyle::Lines
        };

        if self.resolve {
            let Some(parents) = NonEmpty::from_vec(self.parents) else {
                anyhow::bail!("At least one parent code is required");
            };
            let definition = ClusterDefinition::new(ClusterName::try_from("expand")?, parents);
            let cluster = ClusterBuilder::new(&tables, options).build(&definition)?;

            print!("{}", render_codes(cluster.codes().iter(), style));
            for parent in &cluster.diagnostics().unknown_parents {
                eprintln!("{}", format!("unknown parent {parent}").warning());
            }
            for unresolvable in &cluster.diagnostics().unresolvable {
                eprintln!("{}", format!("dropped {unresolvable}").warning());
            }
            return Ok(());
        }

        let expander = Expander::new(&tables, options.expander);
        let (codes, unknown_parents) = expand_all(&expander, &self.parents)?;

        print!("{}", render_codes(codes.iter(), style));
        for parent in &unknown_parents {
            eprintln!("{}", format!("unknown parent {parent}").warning());
        }

        Ok(())
    }
}

/// Unions the expansions of `parents`, returning the codes and the parents
/// missing from the closure table.
fn expand_all<T: Terminology + ?Sized>(
    expander: &Expander<'_, T>,
    parents: &[Code],
) -> Result<(BTreeSet<Code>, Vec<Code>), SourceError> {
    let mut codes = BTreeSet::new();
    let mut unknown = Vec::new();
    for parent in parents {
        match expander.expand(parent)? {
            Expansion::Descendants(descendants) => codes.extend(descendants),
            Expansion::UnknownParent => unknown.push(parent.clone()),
        }
    }
    Ok((codes, unknown))
}

#[cfg(test)]
mod tests {
    use snomed_clusters::{Tables, domain::closure::ExpanderOptions};

    use super::*;

    fn code(s: &str) -> Code {
        Code::try_from(s).unwrap()
    }

    #[test]
    fn several_parents_print_as_one_set() {
        let mut tables = Tables::default();
        for (parent, child) in [("1", "10"), ("1", "11"), ("2", "11"), ("2", "20")] {
            tables.insert_closure(code(parent), code(child));
        }
        let expander = Expander::new(&tables, ExpanderOptions::default());

        let (codes, unknown) = expand_all(&expander, &[code("1"), code("2"), code("3")]).unwrap();

        assert_eq!(
            render_codes(codes.iter(), TextStyle::QuotedList),
            "'10','11','20'\n"
        );
        assert_eq!(unknown, vec![code("3")]);
    }
}
