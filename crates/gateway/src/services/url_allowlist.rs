//! Outbound navigation allow-list, compared by URL origin
//! (scheme, host and port).

use reqwest::Url;

#[derive(Debug, Clone, Default)]
pub struct UrlAllowList {
    origins: Vec<String>,
}

impl UrlAllowList {
    /// Unparsable entries are logged and skipped.
    pub fn new(allowed: &[String]) -> Self {
        let origins = allowed
            .iter()
            .filter_map(|raw| match origin_of(raw) {
                Some(origin) => Some(origin),
                None => {
                    tracing::warn!(origin = %raw, "ignoring invalid allow-list origin");
                    None
                }
            })
            .collect();
        Self { origins }
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// An empty list denies everything, as does an unparsable URL.
    pub fn is_allowed(&self, url: &str) -> bool {
        match origin_of(url) {
            Some(origin) => self.origins.iter().any(|o| *o == origin),
            None => false,
        }
    }
}

fn origin_of(raw: &str) -> Option<String> {
    let origin = Url::parse(raw.trim()).ok()?.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(origins: &[&str]) -> UrlAllowList {
        let owned: Vec<String> = origins.iter().map(|s| s.to_string()).collect();
        UrlAllowList::new(&owned)
    }

    #[test]
    fn matches_by_origin_not_path() {
        let allow = list(&["https://example.com"]);
        assert!(allow.is_allowed("https://example.com/some/page?q=1"));
        assert!(allow.is_allowed("https://example.com:443/"));
        assert!(!allow.is_allowed("http://example.com/"));
        assert!(!allow.is_allowed("https://example.com:8443/"));
        assert!(!allow.is_allowed("https://sub.example.com/"));
    }

    #[test]
    fn empty_list_denies() {
        let allow = list(&[]);
        assert!(allow.is_empty());
        assert!(!allow.is_allowed("https://example.com"));
    }

    #[test]
    fn garbage_is_denied_and_skipped() {
        let allow = list(&["not a url", "https://ok.test"]);
        assert!(!allow.is_allowed("::::"));
        assert!(allow.is_allowed("https://ok.test/x"));
        assert!(!allow.is_allowed("data:text/plain,hi"));
    }
}
