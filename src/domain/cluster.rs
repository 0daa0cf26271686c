use std::{collections::BTreeSet, fmt, str::FromStr};

use non_empty_string::NonEmptyString;
use nonempty::NonEmpty;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::{Code, retirement::UnresolvableCode};

/// The name of a cluster, for example `dm_cod`.
///
/// Names are case-sensitive and must be non-empty. They are used as file
/// names by the exporter, so path separators are rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct ClusterName(NonEmptyString);

impl ClusterName {
    /// Creates a new cluster name.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidClusterNameError`] if the name is empty, has leading
    /// or trailing whitespace, or contains a path separator.
    pub fn new(s: String) -> Result<Self, InvalidClusterNameError> {
        if s.trim() != s || s.contains(['/', '\\']) {
            return Err(InvalidClusterNameError(s));
        }
        NonEmptyString::new(s)
            .map(Self)
            .map_err(InvalidClusterNameError)
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Error returned when a string is not a valid cluster name.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid cluster name '{0}': must be non-empty, untrimmed and free of path separators")]
pub struct InvalidClusterNameError(String);

impl TryFrom<&str> for ClusterName {
    type Error = InvalidClusterNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl FromStr for ClusterName {
    type Err = InvalidClusterNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl From<ClusterName> for String {
    fn from(name: ClusterName) -> Self {
        name.as_str().to_owned()
    }
}

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// An operator-supplied cluster: a name and the root codes it is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDefinition {
    /// The cluster name.
    pub name: ClusterName,

    /// The parent codes, in the order they were configured.
    pub parents: NonEmpty<Code>,

    /// Codes removed from the cluster before retirement resolution.
    ///
    /// When the closure is iterated, excluded codes are also not expanded.
    pub exclude: BTreeSet<Code>,
}

impl ClusterDefinition {
    /// Creates a definition with no exclusions.
    #[must_use]
    pub fn new(name: ClusterName, parents: NonEmpty<Code>) -> Self {
        Self {
            name,
            parents,
            exclude: BTreeSet::new(),
        }
    }

    /// Adds codes to exclude from the cluster.
    #[must_use]
    pub fn excluding(mut self, codes: impl IntoIterator<Item = Code>) -> Self {
        self.exclude.extend(codes);
        self
    }
}

/// A retired code that was substituted by its current replacement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Replacement {
    /// The retired code found in the closure.
    pub from: Code,
    /// The active code it was replaced with.
    pub to: Code,
}

/// Non-fatal problems found while building a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Parent codes with no entry in the closure table.
    pub unknown_parents: Vec<Code>,

    /// Codes dropped because their replacement chain could not be resolved.
    pub unresolvable: Vec<UnresolvableCode>,

    /// Retired codes that were replaced.
    pub replacements: Vec<Replacement>,
}

impl Diagnostics {
    /// Whether anything was dropped or could not be found.
    ///
    /// Replacements are routine and do not count.
    #[must_use]
    pub const fn has_problems(&self) -> bool {
        !self.unknown_parents.is_empty() || !self.unresolvable.is_empty()
    }
}

/// The finalized, deduplicated code set of one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCluster {
    name: ClusterName,
    codes: BTreeSet<Code>,
    diagnostics: Diagnostics,
}

impl ResolvedCluster {
    pub(crate) const fn new(
        name: ClusterName,
        codes: BTreeSet<Code>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            name,
            codes,
            diagnostics,
        }
    }

    /// The cluster name.
    #[must_use]
    pub const fn name(&self) -> &ClusterName {
        &self.name
    }

    /// The final codes, sorted.
    #[must_use]
    pub const fn codes(&self) -> &BTreeSet<Code> {
        &self.codes
    }

    /// Problems found while building the cluster.
    #[must_use]
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// SHA-256 of the sorted codes, one per line.
    ///
    /// Two runs that produce the same code set produce the same fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for code in &self.codes {
            hasher.update(code.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn cluster(codes: &[&str]) -> ResolvedCluster {
        ResolvedCluster::new(
            ClusterName::try_from("demo").unwrap(),
            codes.iter().map(|c| Code::try_from(*c).unwrap()).collect(),
            Diagnostics::default(),
        )
    }

    #[test_case("dm_cod"; "snake case")]
    #[test_case("FH CVD"; "inner space")]
    fn accepts_cluster_names(name: &str) {
        assert_eq!(ClusterName::try_from(name).unwrap().as_str(), name);
    }

    #[test_case(""; "empty")]
    #[test_case(" padded"; "leading whitespace")]
    #[test_case("a/b"; "path separator")]
    #[test_case("a\\b"; "windows separator")]
    fn rejects_cluster_names(name: &str) {
        assert!(ClusterName::try_from(name).is_err());
    }

    #[test]
    fn fingerprint_depends_only_on_codes() {
        assert_eq!(
            cluster(&["1", "2"]).fingerprint(),
            cluster(&["2", "1"]).fingerprint()
        );
        assert_ne!(
            cluster(&["1", "2"]).fingerprint(),
            cluster(&["12"]).fingerprint()
        );
    }

    #[test]
    fn replacements_are_not_problems() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.replacements.push(Replacement {
            from: Code::try_from("1").unwrap(),
            to: Code::try_from("2").unwrap(),
        });
        assert!(!diagnostics.has_problems());

        diagnostics
            .unknown_parents
            .push(Code::try_from("3").unwrap());
        assert!(diagnostics.has_problems());
    }
}
