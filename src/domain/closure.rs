//! Expansion of parent codes into their descendants.

use std::collections::BTreeSet;

use tracing::instrument;

use crate::domain::{
    Code,
    terminology::{SourceError, Terminology},
};

/// The result of expanding a single parent code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// The parent was found in the closure table.
    Descendants(BTreeSet<Code>),

    /// The parent has no entry in the closure table.
    UnknownParent,
}

impl Expansion {
    /// The descendant codes, empty for an unknown parent.
    #[must_use]
    pub fn into_codes(self) -> BTreeSet<Code> {
        match self {
            Self::Descendants(codes) => codes,
            Self::UnknownParent => BTreeSet::new(),
        }
    }
}

/// Options controlling closure expansion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpanderOptions {
    /// Whether the parent belongs to its own expansion.
    ///
    /// Closure tables differ on whether they are reflexive. When `true` the
    /// parent is always included; when `false` it is always removed.
    pub include_self: bool,

    /// Keep looking up newly discovered codes until no new codes appear.
    ///
    /// Needed when the table only records direct children rather than the
    /// full transitive closure.
    pub iterate: bool,
}

/// Looks up descendants in the closure relation of a [`Terminology`].
#[derive(Debug)]
pub struct Expander<'a, T: ?Sized> {
    source: &'a T,
    options: ExpanderOptions,
}

impl<'a, T: Terminology + ?Sized> Expander<'a, T> {
    /// Creates an expander over `source`.
    pub const fn new(source: &'a T, options: ExpanderOptions) -> Self {
        Self { source, options }
    }

    /// Expands `parent` into its descendants.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] if the terminology source fails.
    pub fn expand(&self, parent: &Code) -> Result<Expansion, SourceError> {
        self.expand_excluding(parent, &BTreeSet::new())
    }

    /// Expands `parent`, never walking through codes in `exclude`.
    ///
    /// Excluded codes are still returned if the table lists them; removing
    /// them from a cluster is the builder's job. They are only skipped as
    /// starting points when the closure is iterated.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] if the terminology source fails.
    #[instrument(level = "debug", skip(self, exclude))]
    pub fn expand_excluding(
        &self,
        parent: &Code,
        exclude: &BTreeSet<Code>,
    ) -> Result<Expansion, SourceError> {
        let Some(mut codes) = self.source.lookup_closure(parent)? else {
            tracing::debug!("no closure entry for {parent}");
            return Ok(Expansion::UnknownParent);
        };

        if self.options.iterate {
            let mut frontier: Vec<Code> = codes
                .iter()
                .filter(|code| *code != parent && !exclude.contains(*code))
                .cloned()
                .collect();

            while let Some(code) = frontier.pop() {
                let Some(children) = self.source.lookup_closure(&code)? else {
                    continue;
                };
                for child in children {
                    if child == *parent || exclude.contains(&child) {
                        codes.insert(child);
                        continue;
                    }
                    if codes.insert(child.clone()) {
                        frontier.push(child);
                    }
                }
            }
        }

        if self.options.include_self {
            codes.insert(parent.clone());
        } else {
            codes.remove(parent);
        }

        tracing::debug!("{parent} expands to {} code(s)", codes.len());
        Ok(Expansion::Descendants(codes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Tables;

    fn code(s: &str) -> Code {
        Code::try_from(s).unwrap()
    }

    fn codes(items: &[&str]) -> BTreeSet<Code> {
        items.iter().map(|c| code(c)).collect()
    }

    fn closure(pairs: &[(&str, &str)]) -> Tables {
        let mut tables = Tables::default();
        for (parent, child) in pairs {
            tables.insert_closure(code(parent), code(child));
        }
        tables
    }

    #[test]
    fn returns_descendants() {
        let tables = closure(&[("10", "11"), ("10", "12"), ("11", "12")]);
        let expander = Expander::new(&tables, ExpanderOptions::default());

        assert_eq!(
            expander.expand(&code("10")).unwrap(),
            Expansion::Descendants(codes(&["11", "12"]))
        );
    }

    #[test]
    fn unknown_parent_is_reported_not_failed() {
        let tables = closure(&[("10", "11")]);
        let expander = Expander::new(&tables, ExpanderOptions::default());

        let expansion = expander.expand(&code("99")).unwrap();
        assert_eq!(expansion, Expansion::UnknownParent);
        assert!(expansion.into_codes().is_empty());
    }

    #[test]
    fn reflexive_table_entry_is_removed_without_include_self() {
        let tables = closure(&[("10", "10"), ("10", "11")]);
        let expander = Expander::new(&tables, ExpanderOptions::default());

        assert_eq!(
            expander.expand(&code("10")).unwrap().into_codes(),
            codes(&["11"])
        );
    }

    #[test]
    fn include_self_adds_the_parent() {
        let tables = closure(&[("10", "11")]);
        let options = ExpanderOptions {
            include_self: true,
            ..ExpanderOptions::default()
        };
        let expander = Expander::new(&tables, options);

        assert_eq!(
            expander.expand(&code("10")).unwrap().into_codes(),
            codes(&["10", "11"])
        );
    }

    #[test]
    fn direct_children_table_needs_iteration() {
        let tables = closure(&[("1", "2"), ("2", "3"), ("3", "4"), ("5", "6")]);

        let flat = Expander::new(&tables, ExpanderOptions::default());
        assert_eq!(flat.expand(&code("1")).unwrap().into_codes(), codes(&["2"]));

        let options = ExpanderOptions {
            iterate: true,
            ..ExpanderOptions::default()
        };
        let iterated = Expander::new(&tables, options);
        assert_eq!(
            iterated.expand(&code("1")).unwrap().into_codes(),
            codes(&["2", "3", "4"])
        );
    }

    #[test]
    fn iteration_does_not_walk_through_excluded_codes() {
        let tables = closure(&[("1", "2"), ("1", "5"), ("2", "3"), ("5", "6")]);
        let options = ExpanderOptions {
            iterate: true,
            ..ExpanderOptions::default()
        };
        let expander = Expander::new(&tables, options);

        let expansion = expander
            .expand_excluding(&code("1"), &codes(&["2"]))
            .unwrap();
        assert_eq!(expansion.into_codes(), codes(&["2", "5", "6"]));
    }

    #[test]
    fn iteration_terminates_on_cyclic_tables() {
        let tables = closure(&[("1", "2"), ("2", "1"), ("2", "3")]);
        let options = ExpanderOptions {
            iterate: true,
            ..ExpanderOptions::default()
        };
        let expander = Expander::new(&tables, options);

        assert_eq!(
            expander.expand(&code("1")).unwrap().into_codes(),
            codes(&["2", "3"])
        );
    }
}
