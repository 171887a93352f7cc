use std::net::IpAddr;
use url::Url;

/// Second-level labels that act as public suffixes under a country code
/// (e.g. `co.uk`), so the registrable domain keeps one more label.
const SECOND_LEVEL_SUFFIXES: &[&str] = &[
    "co", "com", "org", "net", "ac", "gov", "edu", "or", "ne", "gob", "nom",
];

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use schedule_scout::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the registrable domain of a host
///
/// `www.stmary.org` and `events.stmary.org` both map to `stmary.org`, and
/// `parish.example.co.uk` maps to `example.co.uk`. IP addresses and single-label
/// hosts are returned unchanged.
///
/// # Arguments
///
/// * `host` - A host name, in any case
///
/// # Returns
///
/// The lowercase registrable domain
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();

    if host.parse::<IpAddr>().is_ok() || host.starts_with('[') {
        return host;
    }

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }

    let n = labels.len();
    let tld = labels[n - 1];
    let second = labels[n - 2];
    let keep = if tld.len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&second) {
        3
    } else {
        2
    };

    labels[n - keep..].join(".")
}

/// Returns true if both URLs belong to the same registrable domain
pub fn same_site(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(x), Some(y)) => registrable_domain(x) == registrable_domain(y),
        _ => false,
    }
}
