//! Hierarchical SNOMED code clusters
//!
//! Clusters are built from parent codes by walking a precomputed transitive
//! closure table, then normalizing retired codes to their current
//! replacements.

pub mod domain;
pub use domain::{
    ClusterDefinition, ClusterName, Code, Config, Diagnostics, ResolvedCluster, RetirementRecord,
    Terminology,
    builder::{BuildOptions, ClusterBuildFailure, ClusterBuilder},
};

/// Terminology tables, projects and exports on the filesystem.
pub mod storage;
pub use storage::{Exporter, Project, Tables};
