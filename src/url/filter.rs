use crate::url::domain::registrable_domain;
use url::Url;

/// File extensions that never hold schedule text
const STATIC_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "svg", "webp", "ico", "bmp", "tif", "tiff", "css", "js", "json",
    "xml", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "zip", "rar", "gz", "tar", "mp3",
    "mp4", "m4a", "mov", "avi", "wav", "webm", "woff", "woff2", "ttf", "eot", "ics",
];

/// Path segments for admin, auth, checkout and social-sharing areas
const EXCLUDED_SEGMENTS: &[&str] = &[
    "admin",
    "wp-admin",
    "wp-login.php",
    "login",
    "logout",
    "signin",
    "sign-in",
    "signup",
    "sign-up",
    "register",
    "account",
    "my-account",
    "cart",
    "checkout",
    "basket",
    "share",
    "sharer",
    "sharer.php",
    "feed",
    "wp-json",
    "xmlrpc.php",
];

/// Why a discovered link was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRejection {
    UnsupportedScheme,
    OffDomain,
    StaticAsset,
    ExcludedPath,
}

/// Decides whether a link is worth queueing for a site
///
/// # Arguments
///
/// * `url` - The normalized link
/// * `site_domain` - The site's registrable domain
///
/// # Returns
///
/// * `None` - The link passes every filter
/// * `Some(LinkRejection)` - The first filter the link failed
pub fn link_rejection(url: &Url, site_domain: &str) -> Option<LinkRejection> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Some(LinkRejection::UnsupportedScheme);
    }

    match url.host_str() {
        Some(host) if registrable_domain(host) == site_domain => {}
        _ => return Some(LinkRejection::OffDomain),
    }

    let path = url.path().to_lowercase();

    if let Some(last) = path.rsplit('/').next() {
        if let Some((_, ext)) = last.rsplit_once('.') {
            if STATIC_EXTENSIONS.contains(&ext) {
                return Some(LinkRejection::StaticAsset);
            }
        }
    }

    if path
        .split('/')
        .any(|segment| EXCLUDED_SEGMENTS.contains(&segment))
    {
        return Some(LinkRejection::ExcludedPath);
    }

    None
}

/// Convenience wrapper over [`link_rejection`]
pub fn is_crawlable_link(url: &Url, site_domain: &str) -> bool {
    link_rejection(url, site_domain).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(url: &str) -> Option<LinkRejection> {
        link_rejection(&Url::parse(url).unwrap(), "stmary.org")
    }

    #[test]
    fn test_accepts_schedule_pages() {
        assert_eq!(check("https://stmary.org/confession-times"), None);
        assert_eq!(check("https://www.stmary.org/sacraments/adoration"), None);
        assert_eq!(check("http://events.stmary.org/mass.html"), None);
    }

    #[test]
    fn test_rejects_off_domain() {
        assert_eq!(
            check("https://facebook.com/stmary"),
            Some(LinkRejection::OffDomain)
        );
    }

    #[test]
    fn test_rejects_static_assets() {
        assert_eq!(
            check("https://stmary.org/bulletin/2024.pdf"),
            Some(LinkRejection::StaticAsset)
        );
        assert_eq!(
            check("https://stmary.org/img/LOGO.PNG"),
            Some(LinkRejection::StaticAsset)
        );
    }

    #[test]
    fn test_rejects_admin_and_checkout() {
        assert_eq!(
            check("https://stmary.org/wp-admin/options.php"),
            Some(LinkRejection::ExcludedPath)
        );
        assert_eq!(
            check("https://stmary.org/shop/checkout"),
            Some(LinkRejection::ExcludedPath)
        );
        assert_eq!(
            check("https://stmary.org/login"),
            Some(LinkRejection::ExcludedPath)
        );
    }

    #[test]
    fn test_rejects_unsupported_scheme() {
        assert_eq!(
            check("mailto:office@stmary.org"),
            Some(LinkRejection::UnsupportedScheme)
        );
    }
}
