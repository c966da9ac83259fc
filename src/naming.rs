//! Collision-free, filesystem-safe names for downloaded files.

use crate::extractor::DATE_FORMAT;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Character substituted for anything not allowed in a file name.
pub const PLACEHOLDER: char = '_';

/// Extension of downloaded files.
pub const EXTENSION: &str = "zip";

/// Replaces characters that are illegal in a file name on any common platform.
///
/// Path separators are replaced too, so the result is always a single path
/// component. The mapping is one-way.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| if is_forbidden(c) { PLACEHOLDER } else { c })
        .collect();

    let stem = sanitized.split('.').next().unwrap_or_default();
    if is_reserved_windows_name(stem.trim_end()) {
        let stem_len = stem.len();
        sanitized.insert(stem_len, PLACEHOLDER);
    }

    sanitized
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}' | '\u{7F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// Directory downloads go to: `base`, or `base/yyyy.MM.dd` when grouping by date.
#[must_use]
pub fn destination_dir(base: &Path, group_by_date: bool, today: NaiveDate) -> PathBuf {
    if group_by_date {
        base.join(today.format(DATE_FORMAT).to_string())
    } else {
        base.to_path_buf()
    }
}

/// Hands out destination paths that neither exist on disk nor were handed
/// out before by this namer.
///
/// The existence check is only a hint; the downloader creates files with
/// create-new semantics and asks for another name on a collision.
#[derive(Debug, Default)]
pub struct FileNamer {
    issued: HashSet<PathBuf>,
}

impl FileNamer {
    /// Creates a namer with no reservations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Path for `title` with disambiguating `index` (0 means none).
    #[must_use]
    pub fn candidate(dir: &Path, title: &str, index: u32) -> PathBuf {
        let name = if index == 0 {
            format!("{title}.{EXTENSION}")
        } else {
            format!("{title} ({index}).{EXTENSION}")
        };
        dir.join(sanitize_file_name(&name))
    }

    /// Returns the first free `{title}.zip`, `{title} (1).zip`, … in `dir`.
    pub fn next_path(&mut self, dir: &Path, title: &str) -> PathBuf {
        let mut index = 0;
        loop {
            let path = Self::candidate(dir, title, index);
            // A metadata lookup only; the download itself creates the file
            // with create-new and reports a collision if this check is stale.
            if !self.issued.contains(&path) && !path.exists() {
                self.issued.insert(path.clone());
                return path;
            }
            index += 1;
        }
    }
}
