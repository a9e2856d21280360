//! Species extraction from WebBook record pages.

use crate::citations::CitationRegistry;
use crate::fetch::{FetchError, Fetcher};
use crate::jcamp::{self, JcampError};
use crate::species::{structure_image_name, SpeciesRecord};
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Errors surfaced while extracting a species record.
#[derive(Debug)]
pub enum ExtractError {
    /// A required record field was absent from the page.
    MissingField {
        /// Field label.
        field: &'static str,
        /// Record page URL.
        url: String,
    },
    /// A numeric field did not parse.
    InvalidNumber {
        /// Field label.
        field: &'static str,
        /// Offending text.
        value: String,
    },
    /// A href on the page did not resolve against the base URL.
    BadHref {
        /// Offending href.
        href: String,
    },
    /// A candidate or spectrum fetch failed.
    Fetch(FetchError),
    /// A spectrum document failed to decode; fatal for the species.
    Spectrum {
        /// Spectrum document URL.
        url: String,
        /// Decode failure.
        source: JcampError,
    },
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field, url } => write!(f, "no {field} field on {url}"),
            Self::InvalidNumber { field, value } => {
                write!(f, "{field} value {value:?} is not a number")
            }
            Self::BadHref { href } => write!(f, "unresolvable href {href:?}"),
            Self::Fetch(source) => source.fmt(f),
            Self::Spectrum { url, source } => write!(f, "bad spectrum at {url}: {source}"),
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fetch(source) => Some(source),
            Self::Spectrum { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<FetchError> for ExtractError {
    fn from(source: FetchError) -> Self {
        Self::Fetch(source)
    }
}

/// Extracts [`SpeciesRecord`]s from record pages, resolving each page's
/// spectrum candidates down to peak wavenumbers.
pub struct RecordExtractor {
    selectors: RecordSelectors,
    base: Url,
    structures_dir: PathBuf,
}

impl RecordExtractor {
    /// Builds an extractor resolving hrefs against `base` and saving structure
    /// images under `structures_dir`.
    pub fn new(base: Url, structures_dir: PathBuf) -> Self {
        Self {
            selectors: RecordSelectors::new(),
            base,
            structures_dir,
        }
    }

    /// Extracts the species on `page`, or `None` when no qualifying spectrum
    /// source exists (gas-phase IR only).
    ///
    /// Missing record fields and malformed spectra are errors; a record is
    /// never emitted partially.
    pub async fn extract(
        &self,
        fetcher: &Fetcher,
        page: &Html,
        url: &Url,
        citations: &mut CitationRegistry,
    ) -> Result<Option<SpeciesRecord>, ExtractError> {
        let name = self
            .heading_text(page)
            .ok_or_else(|| missing("name", url))?;
        let inchi = self.inchi(page).ok_or_else(|| missing("InChI", url))?;
        let formula = self
            .labelled_item(page, "Formula")
            .ok_or_else(|| missing("Formula", url))?;
        let weight_text = self
            .labelled_item(page, "Molecular weight")
            .ok_or_else(|| missing("Molecular weight", url))?;
        let molecular_weight: f64 = weight_text.parse().map_err(|_| ExtractError::InvalidNumber {
            field: "Molecular weight",
            value: weight_text,
        })?;
        let cas_registry_number = self
            .labelled_item(page, "CAS Registry Number")
            .ok_or_else(|| missing("CAS Registry Number", url))?;
        let image_href = self
            .structure_image_src(page)
            .ok_or_else(|| missing("Chemical structure", url))?;
        let structure_image_url = self
            .base
            .join(&image_href)
            .map_err(|_| ExtractError::BadHref { href: image_href })?;

        let structure_image = self
            .structures_dir
            .join(structure_image_name(&name, &inchi));
        fetcher
            .download(structure_image_url.clone(), &structure_image)
            .await?;

        let peaks = self.peak_wavenumbers(fetcher, page, citations).await?;
        if peaks.is_empty() {
            return Ok(None);
        }

        Ok(Some(SpeciesRecord {
            name,
            formula,
            molecular_weight,
            inchi,
            cas_registry_number,
            structure_image_url,
            structure_image,
            url: url.clone(),
            ir_peak_wavenumbers: peaks,
        }))
    }

    /// Resolves every spectrum candidate on `page` to a peak wavenumber, in
    /// discovery order. Candidates without a gas-phase section contribute
    /// nothing.
    async fn peak_wavenumbers(
        &self,
        fetcher: &Fetcher,
        page: &Html,
        citations: &mut CitationRegistry,
    ) -> Result<Vec<i64>, ExtractError> {
        let candidates = self.spectrum_candidates(page);
        let mut peaks = Vec::new();
        if candidates.is_empty() {
            // Some record pages embed the spectrum links directly.
            if let Some(peak) = self.candidate_peak(fetcher, page, citations).await? {
                peaks.push(peak);
            }
        } else {
            for candidate in candidates {
                let body = fetcher.document(candidate).await?;
                if let Some(peak) = self.candidate_peak(fetcher, &body, citations).await? {
                    peaks.push(peak);
                }
            }
        }
        Ok(peaks)
    }

    /// Decodes the gas-phase spectrum linked from one candidate page, if any,
    /// registering the candidate's citation source as a side effect.
    async fn candidate_peak(
        &self,
        fetcher: &Fetcher,
        body: &Html,
        citations: &mut CitationRegistry,
    ) -> Result<Option<i64>, ExtractError> {
        let Some(href) = self.gas_phase_jdx_href(body) else {
            return Ok(None);
        };
        if let Some(citation) = self.citation_href(body) {
            citations.register(&citation);
        }
        let jdx_url = self
            .base
            .join(&href)
            .map_err(|_| ExtractError::BadHref { href })?;
        let jdx = fetcher.text(jdx_url.clone()).await?;
        let peak = jcamp::peak_wavenumber(&jdx).map_err(|source| ExtractError::Spectrum {
            url: jdx_url.to_string(),
            source,
        })?;
        Ok(Some(peak))
    }

    fn heading_text(&self, page: &Html) -> Option<String> {
        page.select(&self.selectors.heading)
            .next()
            .map(element_text)
            .filter(|text| !text.is_empty())
    }

    fn inchi(&self, page: &Html) -> Option<String> {
        for item in page.select(&self.selectors.heading_items) {
            let text = element_text(item);
            if !text.contains("IUPAC Standard InChI") || text.contains("InChIKey") {
                continue;
            }
            let span = item.select(&self.selectors.inchi_value).next()?;
            let value = element_text(span);
            let value = value.strip_prefix("InChI=").unwrap_or(&value).to_string();
            return Some(value).filter(|value| !value.is_empty());
        }
        None
    }

    /// Finds the record-summary list item carrying `label` and returns its
    /// text with the leading `label: ` part stripped.
    fn labelled_item(&self, page: &Html, label: &str) -> Option<String> {
        for item in page.select(&self.selectors.heading_items) {
            let text = element_text(item);
            if !text.contains(label) {
                continue;
            }
            return text.rsplit_once(": ").map(|(_, value)| value.to_string());
        }
        None
    }

    fn structure_image_src(&self, page: &Html) -> Option<String> {
        for item in page.select(&self.selectors.heading_items) {
            if !element_text(item).contains("Chemical structure") {
                continue;
            }
            let image = item.select(&self.selectors.image).next()?;
            return image.value().attr("src").map(str::to_string);
        }
        None
    }

    /// Spectrum candidate URLs: per compiled-by list item, the last listed
    /// hyperlink (the highest-resolution rendering), blank hrefs discarded.
    fn spectrum_candidates(&self, page: &Html) -> Vec<Url> {
        let mut candidates = Vec::new();
        for head in page.select(&self.selectors.section_head) {
            if !element_text(head).contains("Data compiled by:") {
                continue;
            }
            let Some(list) = next_sibling_element(head) else {
                continue;
            };
            if list.value().name() != "ul" {
                continue;
            }
            for item in list.children().filter_map(ElementRef::wrap) {
                if item.value().name() != "li" {
                    continue;
                }
                let Some(anchor) = item.select(&self.selectors.anchor).last() else {
                    continue;
                };
                let href = anchor.value().attr("href").unwrap_or("").trim();
                if href.is_empty() {
                    continue;
                }
                if let Ok(candidate) = self.base.join(href) {
                    candidates.push(candidate);
                }
            }
        }
        candidates
    }

    /// The JCAMP-DX link inside the gas-phase subsection, if the page has
    /// one. Liquid and solid phase sections never qualify.
    fn gas_phase_jdx_href(&self, page: &Html) -> Option<String> {
        for heading in page.select(&self.selectors.subsection) {
            if !element_text(heading).contains("Gas Phase") {
                continue;
            }
            for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
                if sibling.value().name() == "h3" {
                    break;
                }
                if sibling.value().name() != "div" || !has_class(sibling, "indented") {
                    continue;
                }
                for para in sibling.children().filter_map(ElementRef::wrap) {
                    if para.value().name() != "p"
                        || !element_text(para).contains("JCAMP-DX format")
                    {
                        continue;
                    }
                    if let Some(anchor) = para.select(&self.selectors.anchor).next() {
                        let href = anchor.value().attr("href").unwrap_or("").trim();
                        if !href.is_empty() {
                            return Some(href.to_string());
                        }
                    }
                }
            }
        }
        None
    }

    /// The citation-source anchor directly inside the compiled-by section
    /// head.
    fn citation_href(&self, page: &Html) -> Option<String> {
        for head in page.select(&self.selectors.section_head) {
            if !element_text(head).contains("Data compiled by:") {
                continue;
            }
            for child in head.children().filter_map(ElementRef::wrap) {
                if child.value().name() != "a" {
                    continue;
                }
                if let Some(href) = child.value().attr("href") {
                    let href = href.trim();
                    if !href.is_empty() {
                        return Some(href.to_string());
                    }
                }
            }
        }
        None
    }
}

fn missing(field: &'static str, url: &Url) -> ExtractError {
    ExtractError::MissingField {
        field,
        url: url.to_string(),
    }
}

struct RecordSelectors {
    heading: Selector,
    heading_items: Selector,
    inchi_value: Selector,
    image: Selector,
    section_head: Selector,
    anchor: Selector,
    subsection: Selector,
}

impl RecordSelectors {
    fn new() -> Self {
        Self {
            heading: Selector::parse("h1#Top").expect("heading selector"),
            heading_items: Selector::parse("h1#Top + ul > li").expect("heading items selector"),
            inchi_value: Selector::parse("div > div > span").expect("inchi value selector"),
            image: Selector::parse("img[src]").expect("image selector"),
            section_head: Selector::parse("p.section-head").expect("section head selector"),
            anchor: Selector::parse("a[href]").expect("anchor selector"),
            subsection: Selector::parse("h3").expect("subsection selector"),
        }
    }
}

/// Visible text of an element with whitespace collapsed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for piece in element.text() {
        raw.push_str(piece);
    }
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The nearest following sibling that is an element.
pub(crate) fn next_sibling_element<'a>(element: ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.next_siblings().find_map(ElementRef::wrap)
}

pub(crate) fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|candidate| candidate == class)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD_PAGE: &str = r#"
        <html><head><title>1-Butene</title></head><body>
        <h1 id="Top">1-Butene</h1>
        <ul>
          <li><strong>Formula:</strong> C4H8</li>
          <li><strong>Molecular weight:</strong> 56.1063</li>
          <li>IUPAC Standard InChI: <div><div><span>InChI=1S/C4H8/c1-3-4-2/h3H,1,4H2,2H3</span></div></div></li>
          <li>IUPAC Standard InChIKey: <div><div><span>VXNZUUAINFGPBY-UHFFFAOYSA-N</span></div></div></li>
          <li><strong>CAS Registry Number:</strong> 106-98-9</li>
          <li>Chemical structure: <img src="/cgi/cbook.cgi?Struct=C106989" alt="C4H8"></li>
        </ul>
        <p class="section-head">Data compiled by: <a href="/cgi/cbook.cgi?Contrib=COB">Coblentz Society</a></p>
        <ul>
          <li><a href="/cgi/cbook.cgi?ID=C106989&amp;Index=0&amp;Type=IR">small</a>
              <a href="/cgi/cbook.cgi?ID=C106989&amp;Index=0&amp;Type=IR&amp;Large=on">large</a></li>
          <li><a href="   ">blank</a></li>
          <li><a href="/cgi/cbook.cgi?ID=C106989&amp;Index=1&amp;Type=IR&amp;Large=on">only</a></li>
        </ul>
        </body></html>
    "#;

    const GAS_PHASE_PAGE: &str = r#"
        <html><body>
        <p class="section-head">Data compiled by: <a href="/cgi/cbook.cgi?Contrib=COB">Coblentz Society</a></p>
        <h3>Gas Phase Spectrum</h3>
        <div class="indented">
          <p>Download <a href="/cgi/cbook.cgi?JCAMP=C106989&amp;Index=0&amp;Type=IR">spectrum</a> in JCAMP-DX format.</p>
        </div>
        <h3>Liquid Phase Spectrum</h3>
        <div class="indented">
          <p>Download <a href="/cgi/cbook.cgi?JCAMP=C106989&amp;Index=9&amp;Type=IR">spectrum</a> in JCAMP-DX format.</p>
        </div>
        </body></html>
    "#;

    const LIQUID_ONLY_PAGE: &str = r#"
        <html><body>
        <p class="section-head">Data compiled by: <a href="/cgi/cbook.cgi?Contrib=COB">Coblentz Society</a></p>
        <h3>Liquid Phase Spectrum</h3>
        <div class="indented">
          <p>Download <a href="/cgi/cbook.cgi?JCAMP=C106989&amp;Index=9&amp;Type=IR">spectrum</a> in JCAMP-DX format.</p>
        </div>
        </body></html>
    "#;

    fn extractor() -> RecordExtractor {
        RecordExtractor::new(
            Url::parse("https://webbook.nist.gov/").expect("base url"),
            PathBuf::from("results/structures"),
        )
    }

    #[test]
    fn record_fields_parse_from_their_labelled_items() {
        let page = Html::parse_document(RECORD_PAGE);
        let extractor = extractor();
        assert_eq!(extractor.heading_text(&page).as_deref(), Some("1-Butene"));
        assert_eq!(
            extractor.labelled_item(&page, "Formula").as_deref(),
            Some("C4H8"),
        );
        assert_eq!(
            extractor.labelled_item(&page, "Molecular weight").as_deref(),
            Some("56.1063"),
        );
        assert_eq!(
            extractor
                .labelled_item(&page, "CAS Registry Number")
                .as_deref(),
            Some("106-98-9"),
        );
        assert_eq!(
            extractor.structure_image_src(&page).as_deref(),
            Some("/cgi/cbook.cgi?Struct=C106989"),
        );
    }

    #[test]
    fn inchi_strips_the_prefix_and_skips_the_key_item() {
        let page = Html::parse_document(RECORD_PAGE);
        assert_eq!(
            extractor().inchi(&page).as_deref(),
            Some("1S/C4H8/c1-3-4-2/h3H,1,4H2,2H3"),
        );
    }

    #[test]
    fn candidates_take_the_last_anchor_per_item_and_drop_blanks() {
        let page = Html::parse_document(RECORD_PAGE);
        let candidates = extractor().spectrum_candidates(&page);
        let urls: Vec<String> = candidates.iter().map(Url::to_string).collect();
        assert_eq!(
            urls,
            [
                "https://webbook.nist.gov/cgi/cbook.cgi?ID=C106989&Index=0&Type=IR&Large=on",
                "https://webbook.nist.gov/cgi/cbook.cgi?ID=C106989&Index=1&Type=IR&Large=on",
            ],
        );
    }

    #[test]
    fn gas_phase_link_is_found_within_its_own_subsection() {
        let page = Html::parse_document(GAS_PHASE_PAGE);
        assert_eq!(
            extractor().gas_phase_jdx_href(&page).as_deref(),
            Some("/cgi/cbook.cgi?JCAMP=C106989&Index=0&Type=IR"),
        );
    }

    #[test]
    fn liquid_only_pages_have_no_qualifying_spectrum() {
        let page = Html::parse_document(LIQUID_ONLY_PAGE);
        assert_eq!(extractor().gas_phase_jdx_href(&page), None);
    }

    #[test]
    fn citation_href_comes_from_the_section_head_anchor() {
        let page = Html::parse_document(GAS_PHASE_PAGE);
        assert_eq!(
            extractor().citation_href(&page).as_deref(),
            Some("/cgi/cbook.cgi?Contrib=COB"),
        );
    }
}
