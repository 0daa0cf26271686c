//! Domain models for building code clusters.
//!
//! This module contains the terminology codes, the closure expansion and
//! retirement resolution that normalize them, and the cluster builder that
//! combines both.

/// Terminology codes.
pub mod code;
pub use code::{Code, InvalidCodeError};

mod config;
pub use config::{ClusterConfigError, ClusterEntries, Config, Output, Sources, TextStyle};

pub mod audit;
pub mod builder;
pub mod closure;

/// Cluster definitions and resolved clusters.
pub mod cluster;
pub use cluster::{ClusterDefinition, ClusterName, Diagnostics, ResolvedCluster};

pub mod retirement;
pub mod terminology;
pub use terminology::{RetirementRecord, SourceError, Terminology};
