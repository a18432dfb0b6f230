//! Cache key derivation
//!
//! A cached file is named after the lowercase hex MD5 of the complete source
//! URL (query string included) followed by the extension of the URL's last
//! path segment.

use url::Url;

use crate::errors::{CacheError, CacheResult};
use crate::utils::UrlUtils;

/// File name under the cache directory for `url`
pub fn cache_file_name(url: &str) -> CacheResult<String> {
    let parsed = Url::parse(url).map_err(|e| CacheError::invalid_url(url, e.to_string()))?;
    let digest = md5::compute(url.as_bytes());
    Ok(format!(
        "{:x}{}",
        digest,
        UrlUtils::last_segment_extension(&parsed)
    ))
}
