//! Pattern matching used to derive a title from message text.
//!
//! This module provides a small [`Matcher`] trait and the regex-backed
//! implementation configured through `title_pattern`.
//!
//! # Example
//!
//! ```
//! use mail_harvest::matcher::{Matcher, RegexMatcher};
//!
//! let matcher = RegexMatcher::case_insensitive(r"заявка\s*№\s*(?P<title>[\d.]+)").unwrap();
//! assert_eq!(
//!     matcher.find_match("Заявка № 2024.05.01 готова").as_deref(),
//!     Some("2024.05.01")
//! );
//! ```

use regex::{Regex, RegexBuilder};
use std::borrow::Cow;

/// Name of the capture group that carries the title.
pub const TITLE_GROUP: &str = "title";

/// Trait for extracting a piece of text from a message body.
///
/// Implement this trait to plug custom title logic into
/// [`LinkExtractor`](crate::extractor::LinkExtractor).
pub trait Matcher: Send + Sync {
    /// Attempts to find and extract matching content from the text.
    ///
    /// Returns `Some(matched_value)` if found, `None` otherwise.
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>>;

    /// Returns a human-readable description of what this matcher looks for.
    fn description(&self) -> &str;
}

/// Regex-based matcher.
///
/// Extracts the named group `title` when the pattern defines one, otherwise
/// the first capture group, otherwise the whole match.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
    description: String,
}

impl RegexMatcher {
    /// Creates a new case-sensitive regex matcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::build(pattern, false)
    }

    /// Creates a new regex matcher that ignores case.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn case_insensitive(pattern: &str) -> Result<Self, regex::Error> {
        Self::build(pattern, true)
    }

    fn build(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()?;
        Ok(Self {
            description: format!("regex pattern: {pattern}"),
            regex,
        })
    }

    /// Returns the source pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

impl Matcher for RegexMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        let caps = self.regex.captures(text)?;
        caps.name(TITLE_GROUP)
            .or_else(|| caps.get(1))
            .or_else(|| caps.get(0))
            .map(|m| Cow::Borrowed(m.as_str()))
    }

    fn description(&self) -> &str {
        &self.description
    }
}
