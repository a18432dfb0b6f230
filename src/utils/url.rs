//! URL utilities for consistent URL handling

use std::path::Path;
use url::Url;

/// URL utilities for consistent URL handling
pub struct UrlUtils;

impl UrlUtils {
    /// True if `url` parses and uses the `http` or `https` scheme
    pub fn is_http_url(url: &str) -> bool {
        Url::parse(url.trim())
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    /// Extension of the URL's final path segment, including the dot.
    ///
    /// Returns an empty string when the segment has no extension. The query
    /// string and fragment never contribute.
    pub fn last_segment_extension(url: &Url) -> String {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|segment| Path::new(segment).extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default()
    }

    /// Hide user credentials embedded in a URL before it is logged
    pub fn obfuscate_credentials(url: &str) -> String {
        match Url::parse(url) {
            Ok(parsed) if !parsed.username().is_empty() || parsed.password().is_some() => {
                let mut masked = parsed;
                let _ = masked.set_username("****");
                let _ = masked.set_password(Some("****"));
                masked.to_string()
            }
            _ => url.to_string(),
        }
    }
}
