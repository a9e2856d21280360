//! Recursive search resolution against the WebBook.

use crate::citations::CitationRegistry;
use crate::controls::FetchControls;
use crate::extract::{element_text, next_sibling_element, ExtractError, RecordExtractor};
use crate::fetch::{FetchError, Fetcher};
use crate::species::SpeciesRecord;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::OnceLock;
use url::Url;

/// Base site URL every relative href resolves against.
pub const NIST_BASE: &str = "https://webbook.nist.gov/";

/// Fixed search template: isotope matching on, ions excluded, SI units, IR
/// data required.
const SEARCH_TEMPLATE: &str = "cgi/cbook.cgi?MatchIso=on&NoIon=on&Units=SI&cIR=on";

/// Errors surfaced while resolving a query into species records.
#[derive(Debug)]
pub enum ResolveError {
    /// A page fetch failed.
    Fetch(FetchError),
    /// A resolved record page could not be extracted.
    Extract(ExtractError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(source) => source.fmt(f),
            Self::Extract(source) => source.fmt(f),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fetch(source) => Some(source),
            Self::Extract(source) => Some(source),
        }
    }
}

impl From<FetchError> for ResolveError {
    fn from(source: FetchError) -> Self {
        Self::Fetch(source)
    }
}

impl From<ExtractError> for ResolveError {
    fn from(source: ExtractError) -> Self {
        Self::Extract(source)
    }
}

/// Insertion-ordered set of resolved record pages keyed by canonical URL.
///
/// Keys are unique; preserving insertion order keeps downstream extraction,
/// and with it citation registration, on the depth-first discovery order.
#[derive(Default)]
pub struct PageSet {
    entries: Vec<(Url, Html)>,
    seen: HashSet<Url>,
}

impl PageSet {
    /// Inserts a page unless its URL is already present. Returns whether the
    /// page was added.
    pub fn insert(&mut self, url: Url, page: Html) -> bool {
        if !self.seen.insert(url.clone()) {
            return false;
        }
        self.entries.push((url, page));
        true
    }

    /// Number of distinct pages held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set holds no pages.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pages in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Url, &Html)> {
        self.entries.iter().map(|(url, page)| (url, page))
    }
}

/// Classification of a fetched search response.
enum PageKind {
    /// "Not Found" / "Unable to Perform Search" — nothing to resolve.
    Miss,
    /// A results listing whose entries need further expansion.
    Listing(Vec<Url>),
    /// A canonical record page.
    Record,
}

/// Expands `query` into the set of record pages it denotes.
///
/// Listing pages are walked depth-first, left-to-right, via an explicit
/// worklist; a visited set guarantees every URL is fetched at most once, so
/// listings that link back into the tree terminate instead of recursing.
pub async fn resolve_pages<F, Fut>(
    query: Url,
    base: &Url,
    mut fetch: F,
) -> Result<PageSet, FetchError>
where
    F: FnMut(Url) -> Fut,
    Fut: Future<Output = Result<Html, FetchError>>,
{
    let selectors = SearchSelectors::new();
    let mut pages = PageSet::default();
    let mut visited: HashSet<Url> = HashSet::new();
    let mut worklist = vec![query];

    while let Some(url) = worklist.pop() {
        if !visited.insert(url.clone()) {
            continue;
        }
        let document = fetch(url.clone()).await?;
        match classify(&document, base, &selectors) {
            PageKind::Miss => {}
            PageKind::Listing(links) => {
                // Reversed so the leftmost entry comes off the stack first.
                for link in links.into_iter().rev() {
                    if !visited.contains(&link) {
                        worklist.push(link);
                    }
                }
            }
            PageKind::Record => {
                pages.insert(url, document);
            }
        }
    }

    Ok(pages)
}

fn classify(document: &Html, base: &Url, selectors: &SearchSelectors) -> PageKind {
    let title = document
        .select(&selectors.title)
        .next()
        .map(element_text)
        .unwrap_or_default();
    if title.contains("Not Found") || title.contains("Unable to Perform Search") {
        return PageKind::Miss;
    }
    if title == "Search Results" {
        return PageKind::Listing(result_links(document, base, selectors));
    }
    PageKind::Record
}

/// Result hyperlinks of a search listing, resolved against the base URL.
fn result_links(document: &Html, base: &Url, selectors: &SearchSelectors) -> Vec<Url> {
    let mut links = Vec::new();
    for para in document.select(&selectors.paragraph) {
        if !element_text(para).contains("Click on the name to see more data.") {
            continue;
        }
        let Some(list) = next_sibling_element(para) else {
            continue;
        };
        if list.value().name() != "ol" {
            continue;
        }
        for item in list.children().filter_map(ElementRef::wrap) {
            if item.value().name() != "li" {
                continue;
            }
            for anchor in item.children().filter_map(ElementRef::wrap) {
                if anchor.value().name() != "a" {
                    continue;
                }
                if let Some(href) = anchor.value().attr("href") {
                    if let Ok(link) = base.join(href) {
                        links.push(link);
                    }
                }
            }
        }
    }
    links
}

/// Reduces a formula to the gross element composition the search matches on:
/// stereo and cyclic descriptor tokens, separators, and a leading chain
/// prefix letter are dropped.
pub fn normalize_formula(formula: &str) -> String {
    static STRIP: OnceLock<Regex> = OnceLock::new();
    let pattern =
        STRIP.get_or_init(|| Regex::new(r"cyc|\([EZ]\)|trans|[-= ]").expect("formula pattern"));
    let stripped = pattern.replace_all(formula, "");
    stripped
        .strip_prefix(['n', 'c'])
        .unwrap_or(&stripped)
        .to_string()
}

struct SearchSelectors {
    title: Selector,
    paragraph: Selector,
}

impl SearchSelectors {
    fn new() -> Self {
        Self {
            title: Selector::parse("title").expect("title selector"),
            paragraph: Selector::parse("p").expect("paragraph selector"),
        }
    }
}

/// Resolution front end owning the fetch client, the record extractor, and
/// the citation registry.
pub struct Resolver {
    fetcher: Fetcher,
    extractor: RecordExtractor,
    base: Url,
    search: Url,
    citations: CitationRegistry,
}

impl Resolver {
    /// Builds a resolver targeting the WebBook, saving structure images under
    /// `structures_dir`.
    pub fn new(controls: FetchControls, structures_dir: PathBuf) -> Result<Self, reqwest::Error> {
        let base = Url::parse(NIST_BASE).expect("base url");
        let search = base.join(SEARCH_TEMPLATE).expect("search template url");
        Ok(Self {
            fetcher: Fetcher::new(controls)?,
            extractor: RecordExtractor::new(base.clone(), structures_dir),
            base,
            search,
            citations: CitationRegistry::new(),
        })
    }

    /// Resolves a formula query. Only the gross element composition is
    /// matched, so the formula is normalized first.
    pub async fn by_formula(&mut self, formula: &str) -> Result<Vec<SpeciesRecord>, ResolveError> {
        self.species_for("Formula", &normalize_formula(formula)).await
    }

    /// Resolves a name query, submitted verbatim.
    pub async fn by_name(&mut self, name: &str) -> Result<Vec<SpeciesRecord>, ResolveError> {
        self.species_for("Name", name).await
    }

    /// Empties the citation registry, yielding hrefs in first-seen order.
    /// Called once after all queries complete.
    pub fn drain_citations(&mut self) -> Vec<String> {
        self.citations.drain()
    }

    /// The fetch client, shared with report writers.
    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// The base URL citation hrefs resolve against.
    pub fn base(&self) -> &Url {
        &self.base
    }

    async fn species_for(
        &mut self,
        key: &str,
        value: &str,
    ) -> Result<Vec<SpeciesRecord>, ResolveError> {
        let mut query = self.search.clone();
        query.query_pairs_mut().append_pair(key, value);

        let fetcher = &self.fetcher;
        let pages = resolve_pages(query, &self.base, |url| fetcher.document(url)).await?;

        let mut species = Vec::new();
        for (url, page) in pages.iter() {
            let record = self
                .extractor
                .extract(&self.fetcher, page, url, &mut self.citations)
                .await?;
            if let Some(record) = record {
                species.push(record);
            }
        }
        Ok(species)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MISS_PAGE: &str =
        "<html><head><title>Name Not Found</title></head><body></body></html>";

    const RECORD_PAGE: &str =
        "<html><head><title>1-Butene</title></head><body><h1 id=\"Top\">1-Butene</h1></body></html>";

    fn listing(entries: &[&str]) -> String {
        let items: String = entries
            .iter()
            .map(|href| format!("<li><a href=\"{href}\">entry</a></li>"))
            .collect();
        format!(
            "<html><head><title>Search Results</title></head><body>\
             <p>Click on the name to see more data.</p><ol>{items}</ol></body></html>"
        )
    }

    fn base() -> Url {
        Url::parse(NIST_BASE).expect("base url")
    }

    async fn resolve_store(query: &str, store: &HashMap<Url, String>) -> PageSet {
        let query = base().join(query).expect("query url");
        resolve_pages(query, &base(), |url| {
            let body = store
                .get(&url)
                .cloned()
                .unwrap_or_else(|| MISS_PAGE.to_string());
            async move { Ok::<_, FetchError>(Html::parse_document(&body)) }
        })
        .await
        .expect("resolve")
    }

    fn page_urls(pages: &PageSet) -> Vec<String> {
        pages.iter().map(|(url, _)| url.to_string()).collect()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn misses_resolve_to_an_empty_set() {
        let store = HashMap::new();
        let pages = resolve_store("cgi/cbook.cgi?Formula=XYZ", &store).await;
        assert!(pages.is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn single_record_is_keyed_by_the_query_url() {
        let mut store = HashMap::new();
        store.insert(
            base().join("cgi/cbook.cgi?ID=C106989").expect("url"),
            RECORD_PAGE.to_string(),
        );
        let pages = resolve_store("cgi/cbook.cgi?ID=C106989", &store).await;
        assert_eq!(
            page_urls(&pages),
            ["https://webbook.nist.gov/cgi/cbook.cgi?ID=C106989"],
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn listings_expand_depth_first_left_to_right() {
        let mut store = HashMap::new();
        store.insert(
            base().join("cgi/cbook.cgi?Formula=C4H8").expect("url"),
            listing(&["/cgi/cbook.cgi?ID=C106989", "/cgi/cbook.cgi?ID=C590181"]),
        );
        store.insert(
            base().join("cgi/cbook.cgi?ID=C106989").expect("url"),
            RECORD_PAGE.to_string(),
        );
        store.insert(
            base().join("cgi/cbook.cgi?ID=C590181").expect("url"),
            RECORD_PAGE.to_string(),
        );
        let pages = resolve_store("cgi/cbook.cgi?Formula=C4H8", &store).await;
        assert_eq!(
            page_urls(&pages),
            [
                "https://webbook.nist.gov/cgi/cbook.cgi?ID=C106989",
                "https://webbook.nist.gov/cgi/cbook.cgi?ID=C590181",
            ],
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn listing_cycles_terminate_without_duplicates() {
        let mut store = HashMap::new();
        store.insert(
            base().join("cgi/cbook.cgi?Formula=C4H8").expect("url"),
            listing(&["/cgi/cbook.cgi?List=2", "/cgi/cbook.cgi?ID=C106989"]),
        );
        store.insert(
            base().join("cgi/cbook.cgi?List=2").expect("url"),
            listing(&["/cgi/cbook.cgi?Formula=C4H8", "/cgi/cbook.cgi?ID=C106989"]),
        );
        store.insert(
            base().join("cgi/cbook.cgi?ID=C106989").expect("url"),
            RECORD_PAGE.to_string(),
        );
        let pages = resolve_store("cgi/cbook.cgi?Formula=C4H8", &store).await;
        assert_eq!(
            page_urls(&pages),
            ["https://webbook.nist.gov/cgi/cbook.cgi?ID=C106989"],
        );
    }

    #[test]
    fn formula_normalization_strips_descriptor_tokens() {
        assert_eq!(normalize_formula("trans-(E)-C4H8"), "C4H8");
        assert_eq!(normalize_formula("cyc-C6H12"), "C6H12");
        assert_eq!(normalize_formula("n-C4H10"), "C4H10");
        assert_eq!(normalize_formula("(Z)-C2H2Cl2"), "C2H2Cl2");
        assert_eq!(normalize_formula("CH4"), "CH4");
    }
}
