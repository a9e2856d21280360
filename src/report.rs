//! Input sheet reading and result/citation report writing.

use crate::extract::{element_text, has_class, next_sibling_element};
use crate::fetch::{FetchError, Fetcher};
use crate::species::SpeciesRecord;
use scraper::{Html, Selector};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

const RESULT_HEADER: [&str; 9] = [
    "Input Name",
    "Input Formula",
    "NIST Name",
    "NIST Formula",
    "Molecular Weight",
    "InChI",
    "CAS Registry Number",
    "Structure Image",
    "IR Spectrum Peak Wavenumbers / cm^-1",
];

/// Errors surfaced while reading the input sheet or writing reports.
#[derive(Debug)]
pub enum ReportError {
    /// A report file could not be written.
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying filesystem error.
        source: std::io::Error,
    },
    /// The input sheet could not be read or a row was malformed.
    Csv {
        /// File path.
        path: PathBuf,
        /// Underlying reader/writer error.
        source: csv::Error,
    },
    /// The input sheet lacks a required column.
    MissingColumn {
        /// File path.
        path: PathBuf,
        /// Column header.
        column: &'static str,
    },
    /// Results failed to serialize.
    Json(serde_json::Error),
    /// A citation page fetch failed.
    Fetch(FetchError),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "could not write {}: {source}", path.display())
            }
            Self::Csv { path, source } => write!(f, "csv error in {}: {source}", path.display()),
            Self::MissingColumn { path, column } => {
                write!(f, "{} has no {column:?} column", path.display())
            }
            Self::Json(source) => write!(f, "could not serialize results: {source}"),
            Self::Fetch(source) => source.fmt(f),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json(source) => Some(source),
            Self::Fetch(source) => Some(source),
            Self::MissingColumn { .. } => None,
        }
    }
}

impl From<FetchError> for ReportError {
    fn from(source: FetchError) -> Self {
        Self::Fetch(source)
    }
}

/// One row of the input sheet: the queried name and formula.
#[derive(Debug, Clone)]
pub struct InputRow {
    /// Value of the `Name` column.
    pub name: String,
    /// Value of the `Formula` column.
    pub formula: String,
}

/// A query's outcome retained for reporting.
#[derive(Debug)]
pub struct QueryResult {
    /// The input row that produced the records.
    pub input: InputRow,
    /// Records resolved for the row, never empty once collected.
    pub species: Vec<SpeciesRecord>,
}

/// Reads the input sheet, locating the `Name` and `Formula` columns by
/// header.
pub fn read_input(path: &Path) -> Result<Vec<InputRow>, ReportError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    let headers = reader
        .headers()
        .map_err(|source| ReportError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    let name_index = column(&headers, "Name", path)?;
    let formula_index = column(&headers, "Formula", path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| ReportError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(InputRow {
            name: record.get(name_index).unwrap_or("").to_string(),
            formula: record.get(formula_index).unwrap_or("").to_string(),
        });
    }
    Ok(rows)
}

fn column(
    headers: &csv::StringRecord,
    column: &'static str,
    path: &Path,
) -> Result<usize, ReportError> {
    headers
        .iter()
        .position(|header| header == column)
        .ok_or_else(|| ReportError::MissingColumn {
            path: path.to_path_buf(),
            column,
        })
}

/// Writes the flat result sheet: one row per record, peak wavenumbers
/// appended as trailing columns.
pub fn write_results_csv(path: &Path, results: &[QueryResult]) -> Result<PathBuf, ReportError> {
    let csv_error = |source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    writer.write_record(RESULT_HEADER).map_err(csv_error)?;
    for result in results {
        for species in &result.species {
            let mut row = vec![
                result.input.name.clone(),
                result.input.formula.clone(),
                species.name.clone(),
                species.formula.clone(),
                species.molecular_weight.to_string(),
                species.inchi.clone(),
                species.cas_registry_number.clone(),
                species.structure_image_url.to_string(),
            ];
            row.extend(species.ir_peak_wavenumbers.iter().map(i64::to_string));
            writer.write_record(&row).map_err(csv_error)?;
        }
    }
    writer.flush().map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}

/// Writes the full results as pretty-printed JSON, one record list per query.
pub fn write_results_json(path: &Path, results: &[QueryResult]) -> Result<PathBuf, ReportError> {
    let species: Vec<&Vec<SpeciesRecord>> = results.iter().map(|result| &result.species).collect();
    let json = serde_json::to_string_pretty(&species).map_err(ReportError::Json)?;
    fs::write(path, json).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}

/// Writes the citation report: each registered href is resolved against the
/// base URL and its page's citation paragraphs are copied out, one per line.
pub async fn write_citations(
    path: &Path,
    fetcher: &Fetcher,
    base: &Url,
    hrefs: &[String],
) -> Result<PathBuf, ReportError> {
    let paragraph = Selector::parse("p").expect("paragraph selector");
    let mut lines = Vec::new();
    for href in hrefs {
        let Ok(url) = base.join(href) else {
            continue;
        };
        let page = fetcher.document(url).await?;
        lines.extend(citation_lines(&page, &paragraph));
    }
    fs::write(path, lines.join("\n")).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}

/// The indented paragraphs following each "The citation for data from"
/// marker.
fn citation_lines(page: &Html, paragraph: &Selector) -> Vec<String> {
    let mut lines = Vec::new();
    for para in page.select(paragraph) {
        if !element_text(para).contains("The citation for data from") {
            continue;
        }
        let Some(next) = next_sibling_element(para) else {
            continue;
        };
        if next.value().name() != "p" || !has_class(next, "indented") {
            continue;
        }
        let text = element_text(next);
        if !text.is_empty() {
            lines.push(text);
        }
    }
    lines
}
