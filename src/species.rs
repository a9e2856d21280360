//! Resolved species records and their identity rule.

use serde::Serialize;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use url::Url;

/// One chemical species resolved from a record page.
///
/// Identity is the InChI string alone: records fetched twice may differ in any
/// other field (transient page content), so equality and hashing ignore
/// everything else.
#[derive(Debug, Clone, Serialize)]
pub struct SpeciesRecord {
    /// Display name as shown on the record page.
    pub name: String,
    /// Chemical formula.
    pub formula: String,
    /// Molecular weight in g/mol.
    pub molecular_weight: f64,
    /// IUPAC structural identifier, `InChI=` prefix stripped.
    pub inchi: String,
    /// CAS registry number.
    pub cas_registry_number: String,
    /// Source of the downloadable structure image.
    pub structure_image_url: Url,
    /// Where the structure image was saved locally.
    pub structure_image: PathBuf,
    /// Canonical record page URL.
    pub url: Url,
    /// Peak wavenumbers (cm⁻¹), one per qualifying spectrum source, in
    /// candidate discovery order. Never empty in a collected record.
    pub ir_peak_wavenumbers: Vec<i64>,
}

impl PartialEq for SpeciesRecord {
    fn eq(&self, other: &Self) -> bool {
        self.inchi == other.inchi
    }
}

impl Eq for SpeciesRecord {}

impl Hash for SpeciesRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inchi.hash(state);
    }
}

/// Derives the structure-image filename for a record.
///
/// Whitespace and path separators are stripped from both parts so two records
/// never collide on disk and the name stays a single path component.
pub fn structure_image_name(name: &str, inchi: &str) -> String {
    format!("{}_{}.png", strip_path_chars(name), strip_path_chars(inchi))
}

fn strip_path_chars(part: &str) -> String {
    part.chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '/' && *ch != '\\')
        .collect()
}
