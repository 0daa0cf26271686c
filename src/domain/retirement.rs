//! Normalization of retired codes to their current replacements.
//!
//! The [`Resolver`] walks replacement chains (`A → B → C`) until it reaches an
//! active code. The walk is bounded and remembers every code it has visited,
//! so cyclic or very long chains in the history table cannot hang a run.

use std::{collections::HashSet, fmt, num::NonZeroUsize};

use serde::Serialize;
use tracing::instrument;

use crate::domain::{
    Code,
    terminology::{RetirementRecord, SourceError, Terminology},
};

/// Why a code could not be resolved to an active code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnresolvableReason {
    /// The replacement chain revisits a code.
    Cycle {
        /// The chain as walked, starting at the original code and ending with
        /// the repeated code.
        chain: Vec<Code>,
    },

    /// A retired code in the chain has no replacement.
    DeadEnd {
        /// The retired code with no replacement.
        at: Code,
    },

    /// The chain is longer than the configured hop bound.
    HopLimit {
        /// The bound that was exceeded.
        limit: usize,
    },

    /// The code has no retirement record and unknown codes are not treated as
    /// active.
    NotFound,
}

impl fmt::Display for UnresolvableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cycle { chain } => {
                let chain: Vec<_> = chain.iter().map(Code::as_str).collect();
                write!(f, "replacement cycle {}", chain.join(" → "))
            }
            Self::DeadEnd { at } => write!(f, "retired code {at} has no replacement"),
            Self::HopLimit { limit } => write!(f, "replacement chain exceeds {limit} hops"),
            Self::NotFound => write!(f, "no record for code"),
        }
    }
}

/// A code whose replacement chain does not end at an active code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("code {code} is unresolvable: {reason}")]
pub struct UnresolvableCode {
    /// The code that was being resolved.
    pub code: Code,
    /// Why resolution failed.
    #[serde(flatten)]
    pub reason: UnresolvableReason,
}

/// The outcome of resolving a single code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The code is active and is returned unchanged.
    Current(Code),

    /// The code was retired and has been replaced.
    Replaced {
        /// The retired code.
        from: Code,
        /// The active code at the end of the chain.
        to: Code,
        /// The number of replacement pointers followed.
        hops: usize,
    },

    /// The chain could not be resolved.
    Unresolvable(UnresolvableCode),
}

impl Resolution {
    /// The active code this resolution ends at, if any.
    #[must_use]
    pub const fn code(&self) -> Option<&Code> {
        match self {
            Self::Current(code) | Self::Replaced { to: code, .. } => Some(code),
            Self::Unresolvable(_) => None,
        }
    }
}

/// Options controlling chain resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Maximum number of replacement pointers to follow.
    ///
    /// `None` uses the number of retirement records in the source, which an
    /// acyclic chain can never exceed.
    pub max_hops: Option<NonZeroUsize>,

    /// Whether a code with no retirement record counts as active.
    pub unknown_codes_active: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_hops: None,
            unknown_codes_active: true,
        }
    }
}

/// Resolves codes against the retirement relation of a [`Terminology`].
#[derive(Debug)]
pub struct Resolver<'a, T: ?Sized> {
    source: &'a T,
    max_hops: usize,
    unknown_codes_active: bool,
}

impl<'a, T: Terminology + ?Sized> Resolver<'a, T> {
    /// Creates a resolver over `source`.
    pub fn new(source: &'a T, options: ResolverOptions) -> Self {
        let max_hops = options
            .max_hops
            .map_or_else(|| source.retirement_count(), NonZeroUsize::get);
        Self {
            source,
            max_hops,
            unknown_codes_active: options.unknown_codes_active,
        }
    }

    /// The effective hop bound.
    #[must_use]
    pub const fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// Resolves `code` to the active code at the end of its replacement chain.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] if the terminology source fails. Unresolvable
    /// chains are not errors; they are reported as
    /// [`Resolution::Unresolvable`].
    #[instrument(level = "trace", skip(self))]
    pub fn resolve(&self, code: &Code) -> Result<Resolution, SourceError> {
        let mut visited = HashSet::from([code.clone()]);
        let mut chain = vec![code.clone()];
        let mut current = code.clone();

        loop {
            let unresolvable = |reason| {
                Ok(Resolution::Unresolvable(UnresolvableCode {
                    code: code.clone(),
                    reason,
                }))
            };

            let replacement = match self.source.lookup_retirement(&current)? {
                Some(RetirementRecord::Active) => break,
                None if self.unknown_codes_active => break,
                None => return unresolvable(UnresolvableReason::NotFound),
                Some(RetirementRecord::Retired { replacement: None }) => {
                    return unresolvable(UnresolvableReason::DeadEnd { at: current });
                }
                Some(RetirementRecord::Retired {
                    replacement: Some(replacement),
                }) => replacement,
            };

            if chain.len() > self.max_hops {
                return unresolvable(UnresolvableReason::HopLimit {
                    limit: self.max_hops,
                });
            }

            chain.push(replacement.clone());
            if !visited.insert(replacement.clone()) {
                return unresolvable(UnresolvableReason::Cycle { chain });
            }
            current = replacement;
        }

        let hops = chain.len() - 1;
        if hops == 0 {
            Ok(Resolution::Current(current))
        } else {
            tracing::trace!("{code} replaced by {current} after {hops} hop(s)");
            Ok(Resolution::Replaced {
                from: code.clone(),
                to: current,
                hops,
            })
        }
    }
}
