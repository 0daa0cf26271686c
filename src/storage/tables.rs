//! In-memory terminology tables loaded from delimited exports
//!
//! [`Tables`] holds the closure, history and description tables of a
//! terminology release and implements [`Terminology`] over them. Files are
//! tab-delimited unless their extension is `.csv`, and must have a header
//! row. Column names are matched case-insensitively, and both the RF2-style
//! names (`supertypeId`, `oldId`, `conceptId`) and the data-migration
//! workbench names (`SuperTypeID`, `OLDCUI`, `CUI`) are accepted.

use std::{
    collections::{BTreeSet, HashMap},
    fs::File,
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, StringRecord};
use tracing::instrument;

use crate::domain::{
    Code, InvalidCodeError,
    terminology::{RetirementRecord, SourceError, Terminology},
};

const CLOSURE_PARENT: Column = Column::new("supertypeId", &["supertypeid"]);
const CLOSURE_CHILD: Column = Column::new("subtypeId", &["subtypeid"]);
const HISTORY_OLD: Column = Column::new("oldId", &["oldid", "oldcui"]);
const HISTORY_NEW: Column = Column::new("newId", &["newid", "newcui"]);
const DESCRIPTION_CODE: Column = Column::new("conceptId", &["conceptid", "cui"]);
const DESCRIPTION_TERM: Column = Column::new("term", &["term"]);

/// A named column and the lowercase header spellings that select it.
struct Column {
    name: &'static str,
    aliases: &'static [&'static str],
}

impl Column {
    const fn new(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { name, aliases }
    }

    fn position(&self, path: &Path, headers: &StringRecord) -> Result<usize, TableLoadError> {
        headers
            .iter()
            .position(|header| {
                let header = header.trim().to_lowercase();
                self.aliases.contains(&header.as_str())
            })
            .ok_or_else(|| TableLoadError::MissingColumn {
                path: path.to_path_buf(),
                column: self.name,
            })
    }
}

/// Errors that can occur when loading terminology tables.
#[derive(Debug, thiserror::Error)]
pub enum TableLoadError {
    /// The file could not be opened or read as delimited text.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// The table file.
        path: PathBuf,
        /// The underlying failure.
        source: csv::Error,
    },

    /// The header row lacks a required column.
    #[error("{}: missing column '{column}'", path.display())]
    MissingColumn {
        /// The table file.
        path: PathBuf,
        /// The canonical name of the missing column.
        column: &'static str,
    },

    /// A row holds a value that is not a valid code.
    #[error("{}, line {line}: {error}", path.display())]
    InvalidCode {
        /// The table file.
        path: PathBuf,
        /// The one-based line number of the row.
        line: u64,
        /// The parse failure.
        error: InvalidCodeError,
    },
}

impl From<TableLoadError> for SourceError {
    fn from(error: TableLoadError) -> Self {
        Self(error.to_string())
    }
}

/// The closure, history and description tables of a terminology release.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Tables {
    /// Descendants, keyed by parent.
    closure: HashMap<Code, BTreeSet<Code>>,

    /// Retirement records, keyed by retired code.
    history: HashMap<Code, RetirementRecord>,

    /// Preferred terms, keyed by code.
    ///
    /// Codes listed here are known concepts.
    terms: HashMap<Code, String>,
}

impl Tables {
    /// Loads the tables from delimited files.
    ///
    /// The closure and history tables are read concurrently.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read, lacks a required column, or
    /// contains an invalid code. Any of these leaves the source untrustworthy,
    /// so no partial result is returned.
    #[instrument]
    pub fn load(
        closure: &Path,
        history: &Path,
        descriptions: Option<&Path>,
    ) -> Result<Self, TableLoadError> {
        let mut tables = Self::default();

        let (closure_rows, history_rows) = rayon::join(
            || read_pairs(closure, &CLOSURE_PARENT, &CLOSURE_CHILD),
            || read_pairs(history, &HISTORY_OLD, &HISTORY_NEW),
        );

        for (parent, child) in closure_rows? {
            let parent = parse_code(closure, &parent)?;
            let child = parse_code(closure, &child)?;
            tables.insert_closure(parent, child);
        }

        for (old, new) in history_rows? {
            let old_code = parse_code(history, &old)?;
            let record = if new.1.trim().is_empty() {
                RetirementRecord::dead_end()
            } else {
                RetirementRecord::replaced_by(parse_code(history, &new)?)
            };
            if tables.history.contains_key(&old_code) {
                tracing::debug!("ignoring repeated history row for {old_code}");
                continue;
            }
            tables.insert_retirement(old_code, record);
        }

        if let Some(descriptions) = descriptions {
            for (code, term) in read_pairs(descriptions, &DESCRIPTION_CODE, &DESCRIPTION_TERM)? {
                let code = parse_code(descriptions, &code)?;
                tables.terms.entry(code).or_insert(term.1);
            }
        }

        tracing::info!(
            "loaded {} closure parents, {} history records and {} terms",
            tables.closure.len(),
            tables.history.len(),
            tables.terms.len()
        );

        Ok(tables)
    }

    /// Records `child` as a descendant of `parent`.
    pub fn insert_closure(&mut self, parent: Code, child: Code) {
        self.closure.entry(parent).or_default().insert(child);
    }

    /// Records the retirement status of `code`, replacing any existing record.
    pub fn insert_retirement(&mut self, code: Code, record: RetirementRecord) {
        self.history.insert(code, record);
    }

    /// Records the preferred term of `code`.
    pub fn insert_term(&mut self, code: Code, term: impl Into<String>) {
        self.terms.insert(code, term.into());
    }

    /// Every retirement record, in no particular order.
    pub fn retirements(&self) -> impl Iterator<Item = (&Code, &RetirementRecord)> {
        self.history.iter()
    }
}

impl Terminology for Tables {
    fn lookup_closure(&self, parent: &Code) -> Result<Option<BTreeSet<Code>>, SourceError> {
        Ok(self.closure.get(parent).cloned())
    }

    fn lookup_retirement(&self, code: &Code) -> Result<Option<RetirementRecord>, SourceError> {
        if let Some(record) = self.history.get(code) {
            return Ok(Some(record.clone()));
        }
        Ok(self
            .terms
            .contains_key(code)
            .then_some(RetirementRecord::Active))
    }

    fn lookup_term(&self, code: &Code) -> Result<Option<String>, SourceError> {
        Ok(self.terms.get(code).cloned())
    }

    fn retirement_count(&self) -> usize {
        self.history.len()
    }
}

/// A cell value with the line it came from.
type Cell = (u64, String);

/// Reads two columns from a delimited file.
fn read_pairs(
    path: &Path,
    first: &Column,
    second: &Column,
) -> Result<Vec<(Cell, Cell)>, TableLoadError> {
    let read_error = |source| TableLoadError::Read {
        path: path.to_path_buf(),
        source,
    };

    let delimiter = if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
        b','
    } else {
        b'\t'
    };

    let file = File::open(path).map_err(|e| read_error(csv::Error::from(e)))?;
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .quoting(delimiter == b',')
        .flexible(true)
        .from_reader(file);

    let headers = reader.headers().map_err(read_error)?.clone();
    let first_index = first.position(path, &headers)?;
    let second_index = second.position(path, &headers)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(read_error)?;
        let line = record.position().map_or(0, csv::Position::line);
        let cell = |index| (line, record.get(index).unwrap_or_default().to_string());
        rows.push((cell(first_index), cell(second_index)));
    }

    tracing::debug!("read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

fn parse_code(path: &Path, (line, value): &Cell) -> Result<Code, TableLoadError> {
    value.parse().map_err(|error| TableLoadError::InvalidCode {
        path: path.to_path_buf(),
        line: *line,
        error,
    })
}
