//! Read-only access to the terminology tables a cluster run depends on.
//!
//! The cluster pipeline only ever needs point lookups, so the [`Terminology`]
//! trait is narrow. It knows nothing about files or databases;
//! see [`crate::storage::Tables`] for the delimited-file implementation.

use std::collections::BTreeSet;

use crate::domain::Code;

/// The retirement status of a single code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetirementRecord {
    /// The code is current.
    Active,

    /// The code has been retired.
    ///
    /// The replacement, if present, may itself be retired.
    Retired {
        /// The code that replaced this one, if any.
        replacement: Option<Code>,
    },
}

impl RetirementRecord {
    /// A retired code pointing at its replacement.
    #[must_use]
    pub const fn replaced_by(replacement: Code) -> Self {
        Self::Retired {
            replacement: Some(replacement),
        }
    }

    /// A retired code with no replacement.
    #[must_use]
    pub const fn dead_end() -> Self {
        Self::Retired { replacement: None }
    }
}

/// A structural failure of the terminology source.
///
/// Unlike unknown or unresolvable codes, this means no lookup result can be
/// trusted.
#[derive(Debug, thiserror::Error)]
#[error("terminology source failure: {0}")]
pub struct SourceError(pub String);

/// Point lookups against the closure, history and description tables.
///
/// Implementations must be shareable across threads, since clusters are
/// built concurrently.
pub trait Terminology: Sync {
    /// Returns every descendant recorded under `parent` in the closure table,
    /// or `None` if the parent has no entry.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] if the source cannot be queried.
    fn lookup_closure(&self, parent: &Code) -> Result<Option<BTreeSet<Code>>, SourceError>;

    /// Returns the retirement record for `code`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] if the source cannot be queried.
    fn lookup_retirement(&self, code: &Code) -> Result<Option<RetirementRecord>, SourceError>;

    /// Returns the preferred term for `code`, if the source carries one.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] if the source cannot be queried.
    fn lookup_term(&self, _code: &Code) -> Result<Option<String>, SourceError> {
        Ok(None)
    }

    /// The number of retirement records in the source.
    ///
    /// Used as the default bound on replacement chain length.
    fn retirement_count(&self) -> usize;
}
