//! Writing resolved clusters to disk
//!
//! The [`Exporter`] produces four artifacts:
//!
//! - a CSV with one row per cluster member (`Cluster ID`, `Concept ID`,
//!   `Term`), written with a UTF-8 byte-order mark
//! - the same rows as an xlsx workbook: a `Clusters` sheet holding a styled
//!   `ClusterTable`, with concept IDs stored as text
//! - one text file per cluster, named after the cluster
//! - a JSON report of each cluster's diagnostics

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Format, Table, TableColumn, TableStyle, Workbook, XlsxError};
use serde::Serialize;
use tracing::instrument;

use crate::domain::{
    Code, Diagnostics, ResolvedCluster, TextStyle,
    terminology::{SourceError, Terminology},
};

/// The term written for codes the description table does not cover.
pub const UNKNOWN_TERM: &str = "Unknown";

const CSV_HEADERS: [&str; 3] = ["Cluster ID", "Concept ID", "Term"];

const SHEET_NAME: &str = "Clusters";
const TABLE_NAME: &str = "ClusterTable";

/// Errors that can occur when exporting clusters.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// A file or directory could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        /// The file or directory being written.
        path: PathBuf,
        /// The underlying failure.
        source: io::Error,
    },

    /// The CSV could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Csv {
        /// The CSV file.
        path: PathBuf,
        /// The underlying failure.
        source: csv::Error,
    },

    /// The workbook could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Xlsx {
        /// The workbook file.
        path: PathBuf,
        /// The underlying failure.
        source: XlsxError,
    },

    /// The report could not be serialized.
    #[error("failed to write {}: {source}", path.display())]
    Json {
        /// The report file.
        path: PathBuf,
        /// The underlying failure.
        source: serde_json::Error,
    },

    /// A term lookup failed.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Writes clusters to their output artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exporter {
    /// The CSV of every cluster member.
    pub csv: PathBuf,
    /// The workbook of every cluster member.
    pub xlsx: PathBuf,
    /// The directory of per-cluster text files.
    pub clusters_dir: PathBuf,
    /// The JSON diagnostics report.
    pub report: PathBuf,
    /// The layout of the per-cluster text files.
    pub text_style: TextStyle,
}

/// Paths of the files written by an export.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// The CSV file.
    pub csv: PathBuf,
    /// The workbook.
    pub xlsx: PathBuf,
    /// The per-cluster text files, in cluster order.
    pub text_files: Vec<PathBuf>,
    /// The diagnostics report.
    pub report: PathBuf,
    /// The number of member rows written to the CSV and the workbook.
    pub rows: usize,
}

impl Exporter {
    /// Writes every artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be written, or a term lookup
    /// fails.
    #[instrument(skip_all)]
    pub fn export<T: Terminology + ?Sized>(
        &self,
        clusters: &[ResolvedCluster],
        terminology: &T,
    ) -> Result<ExportSummary, ExportError> {
        let rows = self.write_csv(clusters, terminology)?;
        self.write_xlsx(clusters, terminology)?;
        let text_files = self.write_text_files(clusters)?;
        self.write_report(clusters, Utc::now())?;

        Ok(ExportSummary {
            csv: self.csv.clone(),
            xlsx: self.xlsx.clone(),
            text_files,
            report: self.report.clone(),
            rows,
        })
    }

    /// Writes the CSV of every cluster member, returning the number of rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written, or a term lookup fails.
    pub fn write_csv<T: Terminology + ?Sized>(
        &self,
        clusters: &[ResolvedCluster],
        terminology: &T,
    ) -> Result<usize, ExportError> {
        let csv_error = |source| ExportError::Csv {
            path: self.csv.clone(),
            source,
        };

        let mut file = create(&self.csv)?;
        file.write_all("\u{feff}".as_bytes())
            .map_err(|source| io_error(&self.csv, source))?;

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_HEADERS).map_err(csv_error)?;

        let mut rows = 0;
        for cluster in clusters {
            for code in cluster.codes() {
                let term = terminology.lookup_term(code)?;
                let term = term.as_deref().unwrap_or(UNKNOWN_TERM);
                writer
                    .write_record([cluster.name().as_str(), code.as_str(), term])
                    .map_err(csv_error)?;
                rows += 1;
            }
        }
        writer
            .flush()
            .map_err(|source| io_error(&self.csv, source))?;

        tracing::info!("Csv file '{}' created.", self.csv.display());
        Ok(rows)
    }

    /// Writes the member rows to an xlsx workbook.
    ///
    /// The rows sit in a table named `ClusterTable` on a `Clusters` sheet.
    /// The `Concept ID` column is text formatted so spreadsheet applications
    /// do not turn long identifiers into numbers.
    ///
    /// # Errors
    ///
    /// Returns an error if the workbook cannot be written, or a term lookup
    /// fails.
    pub fn write_xlsx<T: Terminology + ?Sized>(
        &self,
        clusters: &[ResolvedCluster],
        terminology: &T,
    ) -> Result<(), ExportError> {
        let xlsx_error = |source| ExportError::Xlsx {
            path: self.xlsx.clone(),
            source,
        };

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(SHEET_NAME).map_err(xlsx_error)?;

        let text = Format::new().set_num_format("@");
        worksheet.set_column_format(1, &text).map_err(xlsx_error)?;
        for (col, header) in (0u16..).zip(CSV_HEADERS) {
            worksheet.write_string(0, col, header).map_err(xlsx_error)?;
        }

        let mut row = 0u32;
        for cluster in clusters {
            for code in cluster.codes() {
                row += 1;
                let term = terminology.lookup_term(code)?;
                worksheet
                    .write_string(row, 0, cluster.name().as_str())
                    .map_err(xlsx_error)?;
                worksheet
                    .write_string_with_format(row, 1, code.as_str(), &text)
                    .map_err(xlsx_error)?;
                worksheet
                    .write_string(row, 2, term.as_deref().unwrap_or(UNKNOWN_TERM))
                    .map_err(xlsx_error)?;
            }
        }

        // a table needs at least one data row
        if row > 0 {
            let columns = CSV_HEADERS.map(|header| TableColumn::new().set_header(header));
            let table = Table::new()
                .set_name(TABLE_NAME)
                .set_style(TableStyle::Medium9)
                .set_columns(&columns);
            worksheet
                .add_table(0, 0, row, 2, &table)
                .map_err(xlsx_error)?;
        }
        worksheet.autofit();

        if let Some(parent) = self.xlsx.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }
        workbook.save(&self.xlsx).map_err(xlsx_error)?;

        tracing::info!("Xlsx file '{}' created.", self.xlsx.display());
        Ok(())
    }

    /// Writes one text file per cluster, returning their paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a file cannot be written.
    pub fn write_text_files(&self, clusters: &[ResolvedCluster]) -> Result<Vec<PathBuf>, ExportError> {
        fs::create_dir_all(&self.clusters_dir)
            .map_err(|source| io_error(&self.clusters_dir, source))?;

        clusters
            .iter()
            .map(|cluster| {
                let path = self.clusters_dir.join(format!("{}.txt", cluster.name()));
                let content = render_codes(cluster.codes().iter(), self.text_style);
                fs::write(&path, content).map_err(|source| io_error(&path, source))?;
                tracing::info!("Txt file '{}' created.", path.display());
                Ok(path)
            })
            .collect()
    }

    /// Writes the JSON diagnostics report.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_report(
        &self,
        clusters: &[ResolvedCluster],
        generated_at: DateTime<Utc>,
    ) -> Result<(), ExportError> {
        let report = Report::new(clusters, generated_at);
        let mut writer = BufWriter::new(create(&self.report)?);
        serde_json::to_writer_pretty(&mut writer, &report).map_err(|source| ExportError::Json {
            path: self.report.clone(),
            source,
        })?;
        writer
            .flush()
            .map_err(|source| io_error(&self.report, source))?;
        tracing::info!("Report '{}' created.", self.report.display());
        Ok(())
    }
}

/// The diagnostics report of a run.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// The total number of codes across all clusters.
    pub total_codes: usize,
    /// One entry per cluster, in cluster order.
    pub clusters: Vec<ClusterReport<'a>>,
}

/// The report entry of a single cluster.
#[derive(Debug, Serialize)]
pub struct ClusterReport<'a> {
    /// The cluster name.
    pub name: &'a str,
    /// The number of codes in the cluster.
    pub codes: usize,
    /// SHA-256 of the cluster's sorted codes.
    pub fingerprint: String,
    /// What went wrong, and what was replaced.
    #[serde(flatten)]
    pub diagnostics: &'a Diagnostics,
}

impl<'a> Report<'a> {
    /// Summarizes `clusters`.
    #[must_use]
    pub fn new(clusters: &'a [ResolvedCluster], generated_at: DateTime<Utc>) -> Self {
        let clusters: Vec<_> = clusters
            .iter()
            .map(|cluster| ClusterReport {
                name: cluster.name().as_str(),
                codes: cluster.codes().len(),
                fingerprint: cluster.fingerprint(),
                diagnostics: cluster.diagnostics(),
            })
            .collect();
        Self {
            generated_at,
            total_codes: clusters.iter().map(|c| c.codes).sum(),
            clusters,
        }
    }
}

/// Renders codes in the given text style, with a trailing newline.
#[must_use]
pub fn render_codes<'a>(codes: impl Iterator<Item = &'a Code>, style: TextStyle) -> String {
    let mut out = match style {
        TextStyle::Lines => codes.map(Code::as_str).collect::<Vec<_>>().join("\n"),
        TextStyle::QuotedList => codes
            .map(|code| format!("'{code}'"))
            .collect::<Vec<_>>()
            .join(","),
    };
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn create(path: &Path) -> Result<File, ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    File::create(path).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: io::Error) -> ExportError {
    ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}
