//! Assembly of resolved clusters from cluster definitions.
//!
//! The [`ClusterBuilder`] ties the [`Expander`] and [`Resolver`] together:
//!
//! 1. expand every parent and union the descendants (plus the parents
//!    themselves, unless configured otherwise)
//! 2. drop excluded codes
//! 3. resolve every remaining code, replacing retired codes and recording the
//!    ones that cannot be resolved
//!
//! Problems with individual codes never abort a build. Only a failure of the
//! terminology source does.

use std::collections::BTreeSet;

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::instrument;

use crate::domain::{
    Code,
    closure::{Expander, ExpanderOptions, Expansion},
    cluster::{ClusterDefinition, ClusterName, Diagnostics, Replacement, ResolvedCluster},
    retirement::{Resolution, Resolver, ResolverOptions},
    terminology::{SourceError, Terminology},
};

/// A fatal failure while building a cluster.
#[derive(Debug, thiserror::Error)]
#[error("failed to build cluster '{cluster}'")]
pub struct ClusterBuildFailure {
    /// The cluster being built when the source failed.
    pub cluster: ClusterName,
    /// The underlying failure.
    #[source]
    pub error: SourceError,
}

/// Options controlling how clusters are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Whether each parent code is a member of its own cluster.
    pub include_parents: bool,
    /// Closure expansion options.
    pub expander: ExpanderOptions,
    /// Retirement resolution options.
    pub resolver: ResolverOptions,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            include_parents: true,
            expander: ExpanderOptions::default(),
            resolver: ResolverOptions::default(),
        }
    }
}

/// Builds [`ResolvedCluster`]s against a [`Terminology`].
#[derive(Debug)]
pub struct ClusterBuilder<'a, T: ?Sized> {
    expander: Expander<'a, T>,
    resolver: Resolver<'a, T>,
    include_parents: bool,
}

impl<'a, T: Terminology + ?Sized> ClusterBuilder<'a, T> {
    /// Creates a builder over `source`.
    pub fn new(source: &'a T, options: BuildOptions) -> Self {
        Self {
            expander: Expander::new(source, options.expander),
            resolver: Resolver::new(source, options.resolver),
            include_parents: options.include_parents,
        }
    }

    /// Builds a single cluster.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterBuildFailure`] if the terminology source fails.
    /// Unknown parents and unresolvable codes are recorded in the cluster's
    /// [`Diagnostics`] instead.
    #[instrument(level = "debug", skip(self, definition), fields(cluster = %definition.name))]
    pub fn build(&self, definition: &ClusterDefinition) -> Result<ResolvedCluster, ClusterBuildFailure> {
        let fail = |error| ClusterBuildFailure {
            cluster: definition.name.clone(),
            error,
        };

        let mut diagnostics = Diagnostics::default();
        let mut union = BTreeSet::new();

        for parent in definition.parents.iter() {
            match self
                .expander
                .expand_excluding(parent, &definition.exclude)
                .map_err(fail)?
            {
                Expansion::Descendants(codes) => union.extend(codes),
                Expansion::UnknownParent => {
                    tracing::warn!(
                        "cluster '{}': parent code {parent} not found in closure table",
                        definition.name
                    );
                    if !diagnostics.unknown_parents.contains(parent) {
                        diagnostics.unknown_parents.push(parent.clone());
                    }
                }
            }
            if self.include_parents {
                union.insert(parent.clone());
            }
        }

        union.retain(|code| !definition.exclude.contains(code));
        tracing::debug!("{} code(s) before resolution", union.len());

        let mut codes: BTreeSet<Code> = BTreeSet::new();
        for code in union {
            match self.resolver.resolve(&code).map_err(fail)? {
                Resolution::Current(code) => {
                    codes.insert(code);
                }
                Resolution::Replaced { from, to, .. } => {
                    codes.insert(to.clone());
                    diagnostics.replacements.push(Replacement { from, to });
                }
                Resolution::Unresolvable(unresolvable) => {
                    tracing::warn!("cluster '{}': {unresolvable}", definition.name);
                    diagnostics.unresolvable.push(unresolvable);
                }
            }
        }

        tracing::info!(
            "Cluster '{}' created with {} codes.",
            definition.name,
            codes.len()
        );

        Ok(ResolvedCluster::new(
            definition.name.clone(),
            codes,
            diagnostics,
        ))
    }

    /// Builds every cluster, concurrently.
    ///
    /// Results are returned in the order of `definitions`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ClusterBuildFailure`] encountered. No partial
    /// results are returned.
    pub fn build_all(
        &self,
        definitions: &[ClusterDefinition],
    ) -> Result<Vec<ResolvedCluster>, ClusterBuildFailure> {
        self.build_all_with(definitions, |_| {})
    }

    /// Builds every cluster, calling `on_built` as each one completes.
    ///
    /// # Errors
    ///
    /// Returns the first [`ClusterBuildFailure`] encountered.
    pub fn build_all_with<F>(
        &self,
        definitions: &[ClusterDefinition],
        on_built: F,
    ) -> Result<Vec<ResolvedCluster>, ClusterBuildFailure>
    where
        F: Fn(&ResolvedCluster) + Sync,
    {
        definitions
            .par_iter()
            .map(|definition| {
                let cluster = self.build(definition)?;
                on_built(&cluster);
                Ok(cluster)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use nonempty::{NonEmpty, nonempty};

    use super::*;
    use crate::{
        domain::{retirement::UnresolvableReason, terminology::RetirementRecord},
        storage::Tables,
    };

    fn code(s: &str) -> Code {
        Code::try_from(s).unwrap()
    }

    fn codes(items: &[&str]) -> BTreeSet<Code> {
        items.iter().map(|c| code(c)).collect()
    }

    fn definition(name: &str, parents: &[&str]) -> ClusterDefinition {
        let parents = parents.iter().map(|c| code(c)).collect();
        ClusterDefinition::new(
            ClusterName::try_from(name).unwrap(),
            NonEmpty::from_vec(parents).unwrap(),
        )
    }

    fn closure(tables: &mut Tables, parent: &str, children: &[&str]) {
        for child in children {
            tables.insert_closure(code(parent), code(child));
        }
    }

    #[test]
    fn demo_cluster_end_to_end() {
        let mut tables = Tables::default();
        closure(&mut tables, "100", &["200", "300"]);
        tables.insert_retirement(code("300"), RetirementRecord::replaced_by(code("400")));
        tables.insert_retirement(code("400"), RetirementRecord::Active);

        let builder = ClusterBuilder::new(&tables, BuildOptions::default());
        let cluster = builder.build(&definition("Demo", &["100"])).unwrap();

        assert_eq!(cluster.name().as_str(), "Demo");
        assert_eq!(cluster.codes(), &codes(&["100", "200", "400"]));
        assert!(!cluster.diagnostics().has_problems());
        assert_eq!(
            cluster.diagnostics().replacements,
            vec![Replacement {
                from: code("300"),
                to: code("400"),
            }]
        );
    }

    #[test]
    fn union_of_overlapping_parents() {
        let mut tables = Tables::default();
        closure(&mut tables, "1", &["10", "11", "12"]);
        closure(&mut tables, "2", &["12", "13"]);

        let builder = ClusterBuilder::new(&tables, BuildOptions::default());
        let cluster = builder.build(&definition("u", &["1", "2"])).unwrap();
        assert_eq!(
            cluster.codes(),
            &codes(&["1", "2", "10", "11", "12", "13"])
        );

        let options = BuildOptions {
            include_parents: false,
            ..BuildOptions::default()
        };
        let builder = ClusterBuilder::new(&tables, options);
        let cluster = builder.build(&definition("u", &["1", "2"])).unwrap();
        assert_eq!(cluster.codes(), &codes(&["10", "11", "12", "13"]));
    }

    #[test]
    fn replacements_converging_on_one_code_are_deduplicated() {
        let mut tables = Tables::default();
        closure(&mut tables, "1", &["10", "11", "12"]);
        tables.insert_retirement(code("10"), RetirementRecord::replaced_by(code("12")));
        tables.insert_retirement(code("11"), RetirementRecord::replaced_by(code("12")));

        let options = BuildOptions {
            include_parents: false,
            ..BuildOptions::default()
        };
        let builder = ClusterBuilder::new(&tables, options);
        let cluster = builder.build(&definition("d", &["1"])).unwrap();

        assert_eq!(cluster.codes(), &codes(&["12"]));
        assert_eq!(cluster.diagnostics().replacements.len(), 2);
    }

    #[test]
    fn unknown_parent_does_not_spoil_valid_parent() {
        let mut tables = Tables::default();
        closure(&mut tables, "1", &["10"]);

        let builder = ClusterBuilder::new(&tables, BuildOptions::default());
        let cluster = builder.build(&definition("p", &["1", "999"])).unwrap();

        assert!(cluster.codes().contains(&code("10")));
        assert_eq!(cluster.diagnostics().unknown_parents, vec![code("999")]);
        assert!(cluster.diagnostics().has_problems());
    }

    #[test]
    fn unresolvable_codes_are_dropped_and_recorded() {
        let mut tables = Tables::default();
        closure(&mut tables, "1", &["10", "11", "12"]);
        tables.insert_retirement(code("10"), RetirementRecord::dead_end());
        tables.insert_retirement(code("11"), RetirementRecord::replaced_by(code("13")));
        tables.insert_retirement(code("13"), RetirementRecord::replaced_by(code("11")));

        let builder = ClusterBuilder::new(&tables, BuildOptions::default());
        let cluster = builder.build(&definition("x", &["1"])).unwrap();

        assert_eq!(cluster.codes(), &codes(&["1", "12"]));
        let reasons: Vec<_> = cluster
            .diagnostics()
            .unresolvable
            .iter()
            .map(|u| (u.code.clone(), u.reason.clone()))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (code("10"), UnresolvableReason::DeadEnd { at: code("10") }),
                (
                    code("11"),
                    UnresolvableReason::Cycle {
                        chain: vec![code("11"), code("13"), code("11")]
                    }
                ),
            ]
        );
    }

    #[test]
    fn excluded_codes_are_removed_before_resolution() {
        let mut tables = Tables::default();
        closure(&mut tables, "1", &["10", "11"]);
        tables.insert_retirement(code("11"), RetirementRecord::dead_end());

        let builder = ClusterBuilder::new(&tables, BuildOptions::default());
        let cluster = builder
            .build(&definition("e", &["1"]).excluding([code("11")]))
            .unwrap();

        assert_eq!(cluster.codes(), &codes(&["1", "10"]));
        assert!(cluster.diagnostics().unresolvable.is_empty());
    }

    #[test]
    fn retired_parent_is_replaced_like_any_other_member() {
        let mut tables = Tables::default();
        closure(&mut tables, "1", &["10"]);
        tables.insert_retirement(code("1"), RetirementRecord::replaced_by(code("2")));

        let builder = ClusterBuilder::new(&tables, BuildOptions::default());
        let cluster = builder.build(&definition("r", &["1"])).unwrap();

        assert_eq!(cluster.codes(), &codes(&["2", "10"]));
    }

    #[test]
    fn build_all_preserves_definition_order_and_isolates_diagnostics() {
        let mut tables = Tables::default();
        closure(&mut tables, "1", &["10"]);
        closure(&mut tables, "2", &["20"]);
        tables.insert_retirement(code("20"), RetirementRecord::dead_end());

        let definitions = vec![
            definition("b", &["2"]),
            definition("a", &["1", "3"]),
            ClusterDefinition::new(ClusterName::try_from("c").unwrap(), nonempty![code("1")]),
        ];

        let builder = ClusterBuilder::new(&tables, BuildOptions::default());
        let clusters = builder.build_all(&definitions).unwrap();

        let names: Vec<_> = clusters.iter().map(|c| c.name().as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);

        assert_eq!(clusters[0].diagnostics().unresolvable.len(), 1);
        assert!(clusters[0].diagnostics().unknown_parents.is_empty());
        assert_eq!(clusters[1].diagnostics().unknown_parents, vec![code("3")]);
        assert!(clusters[1].diagnostics().unresolvable.is_empty());
        assert!(!clusters[2].diagnostics().has_problems());
    }

    #[test]
    fn hop_bound_flows_through_build_options() {
        let mut tables = Tables::default();
        closure(&mut tables, "1", &["10"]);
        tables.insert_retirement(code("10"), RetirementRecord::replaced_by(code("11")));
        tables.insert_retirement(code("11"), RetirementRecord::replaced_by(code("12")));

        let options = BuildOptions {
            resolver: ResolverOptions {
                max_hops: NonZeroUsize::new(1),
                ..ResolverOptions::default()
            },
            ..BuildOptions::default()
        };
        let builder = ClusterBuilder::new(&tables, options);
        let cluster = builder.build(&definition("h", &["1"])).unwrap();

        assert_eq!(cluster.codes(), &codes(&["1"]));
        assert_eq!(
            cluster.diagnostics().unresolvable[0].reason,
            UnresolvableReason::HopLimit { limit: 1 }
        );
    }

    struct BrokenSource;

    impl Terminology for BrokenSource {
        fn lookup_closure(&self, _: &Code) -> Result<Option<BTreeSet<Code>>, SourceError> {
            Err(SourceError("closure table is unreadable".to_string()))
        }

        fn lookup_retirement(&self, _: &Code) -> Result<Option<RetirementRecord>, SourceError> {
            Ok(None)
        }

        fn retirement_count(&self) -> usize {
            0
        }
    }

    #[test]
    fn source_failure_is_fatal() {
        let builder = ClusterBuilder::new(&BrokenSource, BuildOptions::default());
        let error = builder
            .build_all(&[definition("f", &["1"])])
            .unwrap_err();

        assert_eq!(error.cluster.as_str(), "f");
        assert_eq!(error.to_string(), "failed to build cluster 'f'");
    }
}
