//! Job key derivation
//!
//! A job key names one pagination stream. It namespaces checkpoint,
//! journal and output files, so it also knows how to turn itself into a
//! filesystem-safe file stem.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Identifier of one pagination stream (a catalog, category or register)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    /// Creates a job key from an explicit identifier (e.g. a category id)
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives a job key from a base URL
    ///
    /// The key is the last non-empty path segment, ignoring any trailing
    /// slash and query string. URLs without a path segment map to `main`.
    ///
    /// # Example
    ///
    /// ```
    /// use catalog_harvest::state::JobKey;
    ///
    /// let key = JobKey::from_base_url("https://shop.example/cell-phones/");
    /// assert_eq!(key.as_str(), "cell-phones");
    /// ```
    pub fn from_base_url(base_url: &str) -> Self {
        let segment = match Url::parse(base_url) {
            Ok(url) => url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(str::to_string),
            Err(_) => base_url
                .split('?')
                .next()
                .and_then(|path| path.split('/').filter(|s| !s.is_empty()).last())
                .map(str::to_string),
        };

        Self(segment.unwrap_or_else(|| "main".to_string()))
    }

    /// Returns the raw key
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a filesystem-safe stem for files belonging to this job
    ///
    /// Characters outside `[A-Za-z0-9_-]` are replaced with `_` and the empty
    /// key becomes `main`. When either happened, the first 8 hex digits of
    /// the key's SHA-256 are appended so two different keys never share a
    /// stem.
    pub fn file_stem(&self) -> String {
        let mut replaced = self.0.is_empty();
        let mut sanitized: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    replaced = true;
                    '_'
                }
            })
            .collect();

        if sanitized.is_empty() {
            sanitized.push_str("main");
        }

        if !replaced {
            return sanitized;
        }

        let digest = Sha256::digest(self.0.as_bytes());
        format!("{}_{}", sanitized, &hex::encode(digest)[..8])
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_base_url_last_segment() {
        let key = JobKey::from_base_url("https://shop.example/android-phones");
        assert_eq!(key.as_str(), "android-phones");
    }

    #[test]
    fn test_from_base_url_trailing_slash() {
        let key = JobKey::from_base_url("https://shop.example/ipads/");
        assert_eq!(key.as_str(), "ipads");
    }

    #[test]
    fn test_from_base_url_ignores_query() {
        let key = JobKey::from_base_url("https://shop.example/category/office-5649?page=1");
        assert_eq!(key.as_str(), "office-5649");
    }

    #[test]
    fn test_from_base_url_without_path() {
        let key = JobKey::from_base_url("https://shop.example/");
        assert_eq!(key.as_str(), "main");
    }

    #[test]
    fn test_from_unparseable_url() {
        let key = JobKey::from_base_url("catalog/tablets/");
        assert_eq!(key.as_str(), "tablets");
    }

    #[test]
    fn test_file_stem_passthrough() {
        let key = JobKey::new("rugged_phone-2");
        assert_eq!(key.file_stem(), "rugged_phone-2");
    }

    #[test]
    fn test_file_stem_sanitizes_and_disambiguates() {
        let a = JobKey::new("a/b");
        let b = JobKey::new("a:b");

        assert!(a.file_stem().starts_with("a_b_"));
        assert!(b.file_stem().starts_with("a_b_"));
        assert_ne!(a.file_stem(), b.file_stem());
        assert_eq!(a.file_stem().len(), "a_b_".len() + 8);
    }

    #[test]
    fn test_file_stem_empty_key_is_distinct_from_main() {
        let empty = JobKey::new("").file_stem();

        assert!(empty.starts_with("main_"));
        assert_ne!(empty, JobKey::new("main").file_stem());
        assert_eq!(JobKey::new("main").file_stem(), "main");
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", JobKey::new("firms")), "firms");
    }
}
