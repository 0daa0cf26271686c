//! A cluster project on disk
//!
//! A project is a directory holding a `clusters.toml` configuration. Paths in
//! the configuration (terminology tables, outputs, an external cluster file)
//! are resolved against the project root.

use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::{
    domain::{ClusterConfigError, ClusterDefinition, ClusterEntries, Config},
    storage::{Exporter, Tables, tables::TableLoadError},
};

/// The name of the configuration file at the project root.
pub const CONFIG_FILE: &str = "clusters.toml";

/// Errors that can occur when opening a project or reading its clusters.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// The configuration file could not be loaded.
    #[error("{}: {message}", path.display())]
    Config {
        /// The configuration file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The external cluster file could not be read or parsed.
    #[error("failed to load cluster file {}: {message}", path.display())]
    ClustersFile {
        /// The cluster file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// A cluster definition is invalid.
    #[error(transparent)]
    Clusters(#[from] ClusterConfigError),

    /// No clusters are defined.
    #[error("no clusters are defined")]
    NoClusters,
}

/// A directory containing a cluster configuration.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens the project rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if `clusters.toml` cannot be read or parsed.
    pub fn open(root: PathBuf) -> Result<Self, ProjectError> {
        let path = root.join(CONFIG_FILE);
        let config = Config::load(&path).map_err(|message| ProjectError::Config { path, message })?;
        Ok(Self { root, config })
    }

    /// Creates a project from an already loaded configuration.
    #[must_use]
    pub const fn with_config(root: PathBuf, config: Config) -> Self {
        Self { root, config }
    }

    /// The project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The project configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Resolves a configured path against the project root.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    /// Loads the terminology tables named in the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any table cannot be loaded.
    pub fn load_tables(&self) -> Result<Tables, TableLoadError> {
        let sources = &self.config.sources;
        let descriptions = sources.descriptions.as_deref().map(|p| self.resolve(p));
        Tables::load(
            &self.resolve(&sources.closure),
            &self.resolve(&sources.history),
            descriptions.as_deref(),
        )
    }

    /// The cluster definitions of the project, in the order they were
    /// written.
    ///
    /// Read from `clusters_file` when it is set, otherwise from the inline
    /// `[clusters]` table. A cluster file ending in `.yaml` or `.yml` is
    /// parsed as YAML, anything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster file cannot be read, a definition is
    /// invalid, or no clusters are defined.
    #[instrument(skip(self))]
    pub fn clusters(&self) -> Result<Vec<ClusterDefinition>, ProjectError> {
        let definitions = match &self.config.clusters_file {
            Some(file) => load_cluster_file(&self.resolve(file))?.definitions()?,
            None => self.config.clusters()?,
        };

        if definitions.is_empty() {
            return Err(ProjectError::NoClusters);
        }

        tracing::info!("Found {} clusters to create.", definitions.len());
        Ok(definitions)
    }

    /// An exporter writing to the configured outputs.
    #[must_use]
    pub fn exporter(&self) -> Exporter {
        let output = &self.config.output;
        Exporter {
            csv: self.resolve(&output.csv),
            xlsx: self.resolve(&output.xlsx),
            clusters_dir: self.resolve(&output.clusters_dir),
            report: self.resolve(&output.report),
            text_style: self.config.text_style,
        }
    }
}

fn load_cluster_file(path: &Path) -> Result<ClusterEntries, ProjectError> {
    let error = |message: String| ProjectError::ClustersFile {
        path: path.to_path_buf(),
        message,
    };

    let content = std::fs::read_to_string(path).map_err(|e| error(e.to_string()))?;
    let is_yaml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    if is_yaml {
        serde_yaml::from_str(&content).map_err(|e| error(e.to_string()))
    } else {
        toml::from_str(&content).map_err(|e| error(e.to_string()))
    }
}
