#![warn(missing_docs)]
//! Core library entry points for the nistcrawl scraper.

pub mod citations;
pub mod controls;
pub mod extract;
pub mod fetch;
pub mod jcamp;
pub mod report;
pub mod resolve;
pub mod species;

pub use citations::CitationRegistry;
pub use controls::{Cli, FetchControls};
pub use extract::{ExtractError, RecordExtractor};
pub use fetch::{FetchError, Fetcher};
pub use jcamp::{peak_wavenumber, JcampError};
pub use report::{InputRow, QueryResult, ReportError};
pub use resolve::{normalize_formula, resolve_pages, PageSet, ResolveError, Resolver, NIST_BASE};
pub use species::SpeciesRecord;
