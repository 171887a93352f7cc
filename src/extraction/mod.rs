//! Schedule extraction
//!
//! Three stages run in order for each schedule type: AI analysis accepted
//! against an adaptive per-page threshold, keyword-context snippets, and a
//! single-paragraph scan. [`ExtractionChain`] stitches them together and
//! tracks which stages keep failing.

pub mod ai;
mod chain;
pub mod keyword;
pub mod legacy;
pub mod patterns;
pub mod threshold;
mod types;

pub use ai::{AiAnswer, AiBackend, AiError, OpenAiBackend};
pub use chain::ExtractionChain;
pub use keyword::{extract_keyword, keyword_pass};
pub use legacy::extract_legacy;
pub use threshold::{adaptive_threshold, keyword_density};
pub use types::{
    ExtractionMethod, ExtractionOutcome, ExtractionResult, NotFoundReason, ScheduleFinding,
    ScheduleType, NOT_FOUND_TEXT,
};
