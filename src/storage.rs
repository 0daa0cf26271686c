pub mod export;
pub mod project;
pub mod tables;

pub use export::{ExportError, ExportSummary, Exporter};
pub use project::{CONFIG_FILE, Project, ProjectError};
pub use tables::{TableLoadError, Tables};
