//! Whole-table checks of the retirement history.
//!
//! The resolver detects problems one chain at a time. This module looks at the
//! entire history table at once so operators can see every cycle and dead end
//! before a run, not just the ones their clusters happen to reach.

use petgraph::{algo::tarjan_scc, graphmap::DiGraphMap};
use serde::Serialize;

use crate::domain::{Code, terminology::RetirementRecord};

/// Problems found in a retirement history table.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RetirementAudit {
    /// Groups of codes whose replacement pointers form a cycle.
    ///
    /// Each group is sorted, and the groups are sorted.
    pub cycles: Vec<Vec<Code>>,

    /// Retired codes with no replacement, sorted.
    pub dead_ends: Vec<Code>,
}

impl RetirementAudit {
    /// Audits every record in `records`.
    pub fn of<'a>(records: impl IntoIterator<Item = (&'a Code, &'a RetirementRecord)>) -> Self {
        let mut graph: DiGraphMap<&Code, ()> = DiGraphMap::new();
        let mut dead_ends = Vec::new();

        for (code, record) in records {
            match record {
                RetirementRecord::Active => {}
                RetirementRecord::Retired { replacement: None } => dead_ends.push(code.clone()),
                RetirementRecord::Retired {
                    replacement: Some(replacement),
                } => {
                    graph.add_edge(code, replacement, ());
                }
            }
        }

        let mut cycles = Vec::new();
        for component in tarjan_scc(&graph) {
            if component.len() > 1 {
                let mut codes: Vec<Code> = component.into_iter().cloned().collect();
                codes.sort();
                cycles.push(codes);
                continue;
            }

            let Some(&node) = component.first() else {
                continue;
            };

            if graph.contains_edge(node, node) {
                cycles.push(vec![node.clone()]);
            }
        }

        cycles.sort();
        dead_ends.sort();
        Self { cycles, dead_ends }
    }

    /// Whether the table is free of cycles and dead ends.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.cycles.is_empty() && self.dead_ends.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> Code {
        Code::try_from(s).unwrap()
    }

    #[test]
    fn finds_cycles_and_dead_ends() {
        let records = vec![
            (code("1"), RetirementRecord::replaced_by(code("2"))),
            (code("2"), RetirementRecord::replaced_by(code("1"))),
            (code("3"), RetirementRecord::replaced_by(code("3"))),
            (code("4"), RetirementRecord::replaced_by(code("5"))),
            (code("6"), RetirementRecord::dead_end()),
            (code("5"), RetirementRecord::Active),
        ];

        let audit = RetirementAudit::of(records.iter().map(|(c, r)| (c, r)));

        assert_eq!(
            audit.cycles,
            vec![vec![code("1"), code("2")], vec![code("3")]]
        );
        assert_eq!(audit.dead_ends, vec![code("6")]);
        assert!(!audit.is_clean());
    }

    #[test]
    fn chains_without_cycles_are_clean() {
        let records = vec![
            (code("1"), RetirementRecord::replaced_by(code("2"))),
            (code("2"), RetirementRecord::replaced_by(code("3"))),
        ];

        let audit = RetirementAudit::of(records.iter().map(|(c, r)| (c, r)));
        assert!(audit.is_clean());
    }
}
