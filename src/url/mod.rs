//! URL handling module for Schedule Scout
//!
//! This module provides URL normalization, registrable-domain extraction, and
//! the link filter applied to everything the frontier discovers.

mod domain;
mod filter;
mod normalize;

pub use domain::{extract_domain, registrable_domain, same_site};
pub use filter::{is_crawlable_link, link_rejection, LinkRejection};
pub use normalize::{comparison_key, normalize_base_url, normalize_url};

use url::Url;

/// Returns the origin key (`scheme://host[:port]`) used by per-origin state
pub fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Number of non-empty path segments
pub fn path_depth(url: &Url) -> usize {
    url.path().split('/').filter(|s| !s.is_empty()).count()
}
