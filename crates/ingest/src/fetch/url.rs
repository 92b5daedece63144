//! URL normalization and scheme/port policy for outbound fetches

use teammeet_core::{IngestError, IngestResult};
use url::Url;

use super::FetchPolicy;

/// Normalize an untrusted URL before fetching
///
/// Lowercases scheme and host (the parser does this for http/https),
/// strips the fragment, rewrites `webcal:` to `https:`, and rejects
/// anything that is not plain http(s) on an allowed port. Path and query
/// are left intact. Idempotent: normalizing a normalized URL is a no-op.
pub fn normalize_url(raw: &str, policy: &FetchPolicy) -> IngestResult<Url> {
    let trimmed = raw.trim();
    let rewritten = if let Some(rest) = trimmed.strip_prefix("webcal://") {
        format!("https://{rest}")
    } else {
        trimmed.to_string()
    };

    let mut url =
        Url::parse(&rewritten).map_err(|e| IngestError::InvalidUrl(format!("{rewritten}: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(IngestError::InvalidUrl(format!(
                "unsupported scheme: {other}"
            )));
        }
    }

    if url.host_str().is_none() {
        return Err(IngestError::InvalidUrl(format!("{rewritten}: missing host")));
    }

    url.set_fragment(None);

    // The parser already drops scheme-default ports; anything still
    // explicit must be on the allowed list.
    if let Some(port) = url.port() {
        if !policy.port_allowed(port) {
            return Err(IngestError::InvalidPort(port));
        }
    }

    Ok(url)
}

/// Resolve a redirect `Location` against the current URL and re-apply the
/// scheme and port policy to the target
pub fn resolve_redirect(current: &Url, location: &str, policy: &FetchPolicy) -> IngestResult<Url> {
    let target = current
        .join(location)
        .map_err(|e| IngestError::InvalidUrl(format!("redirect target {location}: {e}")))?;
    normalize_url(target.as_str(), policy)
}
