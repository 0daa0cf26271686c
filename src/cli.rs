use std::path::PathBuf;

mod build;
mod check;
mod expand;
mod init;
mod resolve;
mod terminal;

use build::Build;
use check::Check;
use clap::ArgAction;
use expand::Expand;
use init::Init;
use resolve::Resolve;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global=true)]
    verbose: u8,

    /// The path to the project directory containing clusters.toml
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        self.command
            .unwrap_or_else(|| Command::Build(Build::default()))
            .run(self.root)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Build every cluster and write the exports (default)
    Build(Build),

    /// Create a starter clusters.toml
    Init(Init),

    /// Show how codes resolve through the retirement history
    ///
    /// Retired codes are followed to their current replacement.
    Resolve(Resolve),

    /// List the descendants of parent codes
    Expand(Expand),

    /// Audit the history table and cluster definitions
    ///
    /// Reports replacement cycles, dead-end retirements, and parent codes
    /// missing from the closure table.
    Check(Check),
}

impl Command {
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        match self {
            Self::Build(command) => command.run(root)?,
            Self::Init(command) => command.run(&root)?,
            Self::Resolve(command) => command.run(root)?,
            Self::Expand(command) => command.run(root)?,
            Self::Check(command) => command.run(root)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_is_the_default_command() {
        let cli = Cli::try_parse_from(["clusters"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_resolve_codes() {
        let cli = Cli::try_parse_from(["clusters", "-r", "proj", "resolve", "1", "2"]).unwrap();
        assert_eq!(cli.root, PathBuf::from("proj"));
        assert!(matches!(cli.command, Some(Command::Resolve(_))));
    }

    #[test]
    fn rejects_invalid_codes() {
        assert!(Cli::try_parse_from(["clusters", "expand", "12ab"]).is_err());
    }
}
