use crate::UrlError;
use url::Url;

/// List of tracking query parameters to remove during normalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
    "ref",
    "source",
];

/// Normalizes a URL before it is queued or requested
///
/// # Arguments
///
/// * `url_str` - An absolute URL
///
/// # Returns
///
/// The normalized URL, or a [`UrlError`] for malformed or non-HTTP(S) input
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Lowercase the host, keeping any `www.` prefix since some sites only
///    answer on that host
/// 3. Normalize path:
///    - Remove dot segments (. and ..) and empty segments
///    - Remove trailing slash (except for root /)
/// 4. Remove fragment (everything after #)
/// 5. Remove tracking query parameters
/// 6. Sort remaining query parameters alphabetically
/// 7. Remove empty query string (trailing ?)
///
/// The scheme is kept as-is so plain-HTTP sites stay reachable. The result is
/// idempotent: normalizing a normalized URL returns it unchanged. Use
/// [`comparison_key`] to compare URLs across `www.` variants.
///
/// # Examples
///
/// ```
/// use schedule_scout::url::normalize_url;
///
/// let url = normalize_url("https://WWW.EXAMPLE.COM/page/?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://www.example.com/page");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .map(str::to_lowercase)
        .ok_or(UrlError::MissingDomain)?;
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Normalizes a site base URL into the discovery cache key
///
/// Forces the scheme to https, lowercases the host, strips `www.`, drops the
/// query and fragment, and removes any trailing slash. A bare host such as
/// `example.org` is accepted.
///
/// ```
/// use schedule_scout::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://www.Example.org/").unwrap(), "https://example.org");
/// ```
pub fn normalize_base_url(input: &str) -> Result<String, UrlError> {
    let trimmed = input.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&with_scheme).map_err(|e| UrlError::Parse(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url
        .host_str()
        .map(strip_www)
        .ok_or(UrlError::MissingDomain)?;
    let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
    let path = normalize_path(url.path());
    let path = path.trim_end_matches('/');

    Ok(format!("https://{}{}{}", host, port, path))
}

/// De-duplication key for a normalized URL
///
/// The URL with any `www.` host prefix removed, so `https://www.stmary.org/mass`
/// and `https://stmary.org/mass` compare equal. Input that does not parse is
/// returned unchanged.
///
/// # Arguments
///
/// * `url` - A URL, normally already passed through [`normalize_url`]
///
/// # Returns
///
/// The comparison key; never used as a request target
pub fn comparison_key(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let Some(host) = parsed.host_str().map(strip_www) else {
        return url.to_string();
    };
    if parsed.set_host(Some(&host)).is_err() {
        return url.to_string();
    }
    parsed.to_string()
}

fn strip_www(host: &str) -> String {
    let lower = host.to_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => lower,
    }
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
