//! Listing-page crawler: pagination discovery and report-anchor extraction.

use std::sync::Arc;

use reqwest::Url;
use scraper::{Html, Selector};
use tracing::debug;

use crate::dates::date_in_name;
use crate::models::{CandidateFile, FetchError};
use crate::scrapers::http::HttpSource;

/// Anchors of interest point at daily oil-products reports.
pub const REPORT_PATH_PREFIX: &str = "/upload/reports/oil_xls/oil_xls_";

const SPREADSHEET_EXTENSIONS: [&str; 2] = [".xls", ".xlsx"];

/// Enumerates listing pages and yields candidate report files.
pub struct ListingClient<S> {
    source: Arc<S>,
    base_url: String,
}

impl<S: HttpSource> ListingClient<S> {
    pub fn new(source: Arc<S>, base_url: impl Into<String>) -> Self {
        Self {
            source,
            base_url: base_url.into(),
        }
    }

    /// Total page count from the listing root's pagination control.
    ///
    /// A missing control means a single page; a failed fetch of the root is
    /// the run's only fatal error and is propagated to the caller.
    pub async fn total_pages(&self) -> Result<usize, FetchError> {
        let body = self.source.get(&self.base_url).await?;
        let pages = parse_total_pages(&String::from_utf8_lossy(&body));
        debug!("listing root reports {pages} page(s)");
        Ok(pages)
    }

    /// Candidate report files on page `page` (1-based).
    pub async fn fetch_page(&self, page: usize) -> Result<Vec<CandidateFile>, FetchError> {
        let url = format!("{}?page=page-{}", self.base_url, page);
        let body = self.source.get(&url).await?;
        let candidates = extract_candidates(&String::from_utf8_lossy(&body), &self.base_url);
        debug!("page {page}: {} report link(s)", candidates.len());
        Ok(candidates)
    }
}

/// Highest page number shown in the `bx-pagination` control, defaulting to 1.
pub fn parse_total_pages(html: &str) -> usize {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse("div.bx-pagination li a span").expect("static pagination selector");

    document
        .select(&selector)
        .filter_map(|span| span.text().collect::<String>().trim().parse::<usize>().ok())
        .max()
        .unwrap_or(1)
}

/// Report anchors on one listing page, resolved to absolute URLs.
///
/// Query strings are stripped before use; anchors that do not carry a
/// spreadsheet extension are ignored.
pub fn extract_candidates(html: &str, base_url: &str) -> Vec<CandidateFile> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("static anchor selector");

    let base = match Url::parse(base_url) {
        Ok(url) => url,
        Err(_) => return Vec::new(),
    };

    document
        .select(&selector)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter(|href| href.starts_with(REPORT_PATH_PREFIX))
        .map(|href| href.split('?').next().unwrap_or(href))
        .filter(|href| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|ext| href.ends_with(ext))
        })
        .filter_map(|href| base.join(href).ok())
        .map(|url| {
            let inferred_date = date_in_name(url.path());
            CandidateFile {
                url: url.to_string(),
                inferred_date,
            }
        })
        .collect()
}
