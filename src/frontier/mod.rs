//! URL frontier
//!
//! Seeds come from [`Discovery`]; every URL is scored by the
//! [`Prioritizer`] from keyword weights and pushed into a per-site
//! max-priority [`Frontier`]. [`PageBudget`] bounds how many pages a
//! session may fetch.

mod budget;
mod discovery;
mod keywords;
mod prioritizer;
mod queue;

pub use budget::PageBudget;
pub use discovery::{
    parse_sitemap, Discovery, DiscoveryCache, DiscoveryFetch, DiscoveryResult, DiscoveryRun,
    DiscoverySource,
};
pub use keywords::{
    fallback_records, load_keyword_file, load_keywords, KeywordError, KeywordRecord,
    KeywordScope, KeywordSet, WeightedKeyword,
};
pub use prioritizer::Prioritizer;
pub use queue::{CrawlCandidate, Frontier, FORCED_PRIORITY};
