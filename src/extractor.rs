//! Link extraction from harvested HTML.
//!
//! A message yields one title and every anchor pointing at the configured
//! [`DownloadTarget`]. Zero or several matches are not errors: the result
//! carries an [`ExtractionStatus`] the caller can log.

use crate::config::DownloadTarget;
use crate::matcher::Matcher;
use chrono::NaiveDate;
use scraper::{ElementRef, Html};
use tracing::{debug, warn};
use url::Url;

/// Date format used for fallback titles and date folders.
pub const DATE_FORMAT: &str = "%Y.%m.%d";

/// A download link paired with the title of the message it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    /// Base of the downloaded file's name; never empty.
    pub title: String,
    /// Link whose host and path match the target.
    pub uri: Url,
}

/// Where a title came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleSource {
    /// The configured pattern matched.
    Pattern,
    /// Nothing matched; today's date was used.
    Date,
}

/// Advisory status of an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    /// No anchor matched the target.
    NoMatch,
    /// Exactly one anchor matched.
    Single,
    /// More than one anchor matched; all are kept.
    Ambiguous,
}

/// Outcome of extracting links from one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Title shared by all links.
    pub title: String,
    /// How the title was obtained.
    pub title_source: TitleSource,
    /// Matching links in document order.
    pub links: Vec<LinkInfo>,
    /// Advisory status derived from the number of links.
    pub status: ExtractionStatus,
}

/// Derives a title from `text`, falling back to `today` formatted as `yyyy.MM.dd`.
///
/// Surrounding whitespace and trailing dots are stripped from a matched title.
pub fn derive_title(text: &str, matcher: &dyn Matcher, today: NaiveDate) -> (String, TitleSource) {
    let matched = matcher
        .find_match(text)
        .map(|m| m.trim().trim_end_matches('.').trim().to_string())
        .filter(|m| !m.is_empty());

    match matched {
        Some(title) => (title, TitleSource::Pattern),
        None => (today.format(DATE_FORMAT).to_string(), TitleSource::Date),
    }
}

/// Finds download links in HTML message bodies.
#[derive(Debug, Clone)]
pub struct LinkExtractor<M> {
    target: DownloadTarget,
    matcher: M,
}

impl<M: Matcher> LinkExtractor<M> {
    /// Creates an extractor for `target` using `matcher` to derive titles.
    #[must_use]
    pub fn new(target: DownloadTarget, matcher: M) -> Self {
        Self { target, matcher }
    }

    /// Returns the target links must match.
    #[must_use]
    pub fn target(&self) -> &DownloadTarget {
        &self.target
    }

    /// Extracts the title and every link to the target from `html`.
    ///
    /// `today` is used for the title when the pattern finds nothing.
    pub fn extract(&self, html: &str, today: NaiveDate) -> Extraction {
        debug!("Extracting link from message");

        let (title, title_source) = derive_title(html, &self.matcher, today);
        if title_source == TitleSource::Date {
            warn!(title = %title, "Title not found in message text, using current date");
        }

        let links: Vec<LinkInfo> = anchor_targets(html)
            .into_iter()
            .filter(|uri| self.target.matches(uri))
            .map(|uri| LinkInfo {
                title: title.clone(),
                uri,
            })
            .collect();

        let status = match links.len() {
            0 => {
                warn!(target = %self.target, "No matching link found in message");
                ExtractionStatus::NoMatch
            }
            1 => ExtractionStatus::Single,
            count => {
                warn!(count, target = %self.target, "More than one matching link found");
                ExtractionStatus::Ambiguous
            }
        };

        Extraction {
            title,
            title_source,
            links,
            status,
        }
    }
}

/// Parses `html` and returns every anchor `href` that is an absolute URL.
///
/// Malformed or relative references are skipped.
#[must_use]
pub fn anchor_targets(html: &str) -> Vec<Url> {
    let document = Html::parse_document(html);

    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().name().eq_ignore_ascii_case("a"))
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| {
            let href = href.trim();
            match Url::parse(href) {
                Ok(url) => Some(url),
                Err(e) => {
                    debug!(href = %href, error = %e, "Skipping unparseable link");
                    None
                }
            }
        })
        .collect()
}
