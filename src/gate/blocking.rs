//! Blocking classification
//!
//! Signals come from the HTTP status, response headers, and body markers.
//! Every matching signal is kept as evidence; the first classification seen
//! becomes the assessment's `blocking_type`.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bodies at or below this size are always scanned for challenge phrases;
/// larger 2xx bodies are ordinary pages that merely mention e.g. a captcha.
const SMALL_BODY_BYTES: usize = 4096;

/// Kind of blocking detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockingType {
    #[serde(rename = "forbidden_403")]
    Forbidden403,
    #[serde(rename = "rate_limited_429")]
    RateLimited429,
    #[serde(rename = "service_unavailable_503")]
    ServiceUnavailable503,
    #[serde(rename = "cloudflare_protection")]
    CloudflareProtection,
    #[serde(rename = "captcha")]
    Captcha,
    #[serde(rename = "robots_disallowed")]
    RobotsDisallowed,
    #[serde(rename = "other")]
    Other,
}

impl BlockingType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Forbidden403 => "forbidden_403",
            Self::RateLimited429 => "rate_limited_429",
            Self::ServiceUnavailable503 => "service_unavailable_503",
            Self::CloudflareProtection => "cloudflare_protection",
            Self::Captcha => "captcha",
            Self::RobotsDisallowed => "robots_disallowed",
            Self::Other => "other",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "forbidden_403" => Some(Self::Forbidden403),
            "rate_limited_429" => Some(Self::RateLimited429),
            "service_unavailable_503" => Some(Self::ServiceUnavailable503),
            "cloudflare_protection" => Some(Self::CloudflareProtection),
            "captcha" => Some(Self::Captcha),
            "robots_disallowed" => Some(Self::RobotsDisallowed),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// True for signatures a headless browser may get past
    pub fn is_bot_protection(&self) -> bool {
        matches!(
            self,
            Self::Forbidden403 | Self::CloudflareProtection | Self::Captcha
        )
    }
}

impl fmt::Display for BlockingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Outcome of the robots.txt check for the assessed URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RobotsDecision {
    Allowed,
    Disallowed,
    #[default]
    NotChecked,
}

impl RobotsDecision {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Disallowed => "disallowed",
            Self::NotChecked => "not_checked",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "allowed" => Some(Self::Allowed),
            "disallowed" => Some(Self::Disallowed),
            "not_checked" => Some(Self::NotChecked),
            _ => None,
        }
    }
}

/// Blocking verdict for one fetch
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockingAssessment {
    pub is_blocked: bool,
    pub blocking_type: Option<BlockingType>,
    pub evidence: Vec<String>,
    pub status_code: Option<u16>,
    pub robots_decision: RobotsDecision,
}

impl BlockingAssessment {
    /// An assessment with no blocking signals
    pub fn clear(status_code: Option<u16>, robots_decision: RobotsDecision) -> Self {
        Self {
            status_code,
            robots_decision,
            ..Default::default()
        }
    }

    /// Assessment for a URL robots.txt forbids; no request was made
    pub fn robots_disallowed(url: &str) -> Self {
        let mut assessment = Self::clear(None, RobotsDecision::Disallowed);
        assessment.record(
            BlockingType::RobotsDisallowed,
            format!("robots.txt disallows {}", url),
        );
        assessment
    }

    /// Adds a signal; the first one fixes the blocking type
    pub fn record(&mut self, kind: BlockingType, evidence: impl Into<String>) {
        self.is_blocked = true;
        if self.blocking_type.is_none() {
            self.blocking_type = Some(kind);
        }
        self.evidence.push(evidence.into());
    }
}

struct HeaderSignature {
    header: &'static str,
    /// Lowercase substring the value must contain; empty matches any value
    contains: &'static str,
    kind: BlockingType,
    /// Only counts on an error status
    error_only: bool,
}

const HEADER_SIGNATURES: &[HeaderSignature] = &[
    HeaderSignature {
        header: "cf-mitigated",
        contains: "",
        kind: BlockingType::CloudflareProtection,
        error_only: false,
    },
    HeaderSignature {
        header: "server",
        contains: "cloudflare",
        kind: BlockingType::CloudflareProtection,
        error_only: true,
    },
    HeaderSignature {
        header: "x-sucuri-block",
        contains: "",
        kind: BlockingType::Other,
        error_only: false,
    },
    HeaderSignature {
        header: "server",
        contains: "ddos-guard",
        kind: BlockingType::Other,
        error_only: true,
    },
    HeaderSignature {
        header: "x-datadome",
        contains: "",
        kind: BlockingType::Captcha,
        error_only: true,
    },
    HeaderSignature {
        header: "server",
        contains: "akamaighost",
        kind: BlockingType::Other,
        error_only: true,
    },
];

const BODY_MARKERS: &[(&str, BlockingType)] = &[
    ("cf-browser-verification", BlockingType::CloudflareProtection),
    ("checking your browser before accessing", BlockingType::CloudflareProtection),
    ("attention required! | cloudflare", BlockingType::CloudflareProtection),
    ("cf-challenge", BlockingType::CloudflareProtection),
    ("just a moment...", BlockingType::CloudflareProtection),
    ("g-recaptcha", BlockingType::Captcha),
    ("h-captcha", BlockingType::Captcha),
    ("cf-turnstile", BlockingType::Captcha),
    ("verify you are human", BlockingType::Captcha),
    ("verify you are a human", BlockingType::Captcha),
    ("are you a robot", BlockingType::Captcha),
    ("unusual traffic from your", BlockingType::Other),
    ("request blocked", BlockingType::Other),
    ("bot protection", BlockingType::Other),
    ("access denied", BlockingType::Other),
];

/// Classifies a response from its status, headers, and body
pub fn assess_response(
    status: u16,
    headers: &HeaderMap,
    body: &str,
    robots_decision: RobotsDecision,
) -> BlockingAssessment {
    let mut assessment = BlockingAssessment::clear(Some(status), robots_decision);
    let is_error = status >= 400;

    match status {
        403 => assessment.record(BlockingType::Forbidden403, "HTTP 403 Forbidden"),
        429 => assessment.record(BlockingType::RateLimited429, "HTTP 429 Too Many Requests"),
        503 => assessment.record(
            BlockingType::ServiceUnavailable503,
            "HTTP 503 Service Unavailable",
        ),
        _ => {}
    }

    for sig in HEADER_SIGNATURES {
        if sig.error_only && !is_error {
            continue;
        }
        let Some(value) = headers.get(sig.header).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        if value.to_lowercase().contains(sig.contains) {
            assessment.record(sig.kind, format!("header {}: {}", sig.header, value));
        }
    }

    if !(200..300).contains(&status) || body.len() <= SMALL_BODY_BYTES {
        let lower = body.to_lowercase();
        for (marker, kind) in BODY_MARKERS {
            if lower.contains(marker) {
                assessment.record(*kind, format!("body marker: {}", marker));
            }
        }
    }

    assessment
}
