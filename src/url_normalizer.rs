//! Canonical job URLs, used as the dedup key in every sink.
//!
//! A posting is identified by scheme + host + path. The provider hangs
//! tracking data (`refId`, `trackingId`, `position`, `pageNum`, `utm_*`) off
//! the query string, so the whole query and the fragment are dropped.

use url::{ParseError, Url};

use crate::error::NormalizationError;

/// Origin used to resolve root-relative links found in result cards.
pub const PROVIDER_ORIGIN: &str = "https://www.linkedin.com";

pub fn normalize(raw: &str) -> Result<String, NormalizationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NormalizationError::Empty);
    }

    let mut parsed = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(ParseError::RelativeUrlWithoutBase) if trimmed.starts_with('/') => {
            resolve_relative(trimmed)?
        }
        Err(e) => {
            return Err(NormalizationError::Malformed {
                url: trimmed.to_string(),
                reason: e.to_string(),
            })
        }
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(NormalizationError::UnsupportedScheme {
            url: trimmed.to_string(),
            scheme: parsed.scheme().to_string(),
        });
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(NormalizationError::MissingHost {
            url: trimmed.to_string(),
        });
    }

    // Host is lower-cased and default ports elided by the parser itself.
    parsed.set_query(None);
    parsed.set_fragment(None);
    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);

    let mut key = parsed.to_string();
    while key.ends_with('/') {
        key.pop();
    }
    Ok(key)
}

fn resolve_relative(path: &str) -> Result<Url, NormalizationError> {
    let malformed = |e: ParseError| NormalizationError::Malformed {
        url: path.to_string(),
        reason: e.to_string(),
    };
    let base = Url::parse(PROVIDER_ORIGIN).map_err(malformed)?;
    base.join(path).map_err(malformed)
}
