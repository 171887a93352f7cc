//! AI → keyword → legacy extraction chain

use crate::breaker::{backoff_delay, BreakerError, CircuitBreaker, ErrorClass, MethodErrorHistory};
use crate::config::ExtractionConfig;
use crate::extraction::ai::{AiAnswer, AiBackend};
use crate::extraction::keyword::extract_keyword;
use crate::extraction::legacy::extract_legacy;
use crate::extraction::threshold::{adaptive_threshold, keyword_density};
use crate::extraction::{ExtractionMethod, ExtractionOutcome, NotFoundReason, ScheduleType};
use crate::frontier::KeywordSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Extra AI rounds after a rate-limit or timeout
const AI_BACKOFF_ROUNDS: u32 = 1;

/// Runs the extraction stages for one site session
///
/// Owns the session's error history, so AI that keeps failing one way is
/// skipped for the rest of the session.
pub struct ExtractionChain {
    ai: Option<Arc<dyn AiBackend>>,
    breaker: Arc<CircuitBreaker>,
    config: ExtractionConfig,
    keywords: Arc<KeywordSet>,
    history: MethodErrorHistory,
}

impl ExtractionChain {
    pub fn new(
        ai: Option<Arc<dyn AiBackend>>,
        breaker: Arc<CircuitBreaker>,
        config: ExtractionConfig,
        keywords: Arc<KeywordSet>,
    ) -> Self {
        Self {
            ai,
            breaker,
            config,
            keywords,
            history: MethodErrorHistory::new(),
        }
    }

    pub fn history(&self) -> &MethodErrorHistory {
        &self.history
    }

    /// Extracts one schedule type from a page
    ///
    /// `html` is the raw page, `text` its cleaned text. The first stage that
    /// finds something wins.
    pub async fn extract(
        &mut self,
        html: &str,
        text: &str,
        schedule_type: ScheduleType,
    ) -> ExtractionOutcome {
        let ai = self.try_ai(text, schedule_type).await;
        if ai.is_found() {
            return ai;
        }
        if let ExtractionOutcome::NotFound(reason) = &ai {
            debug!(%schedule_type, ?reason, "AI extraction gave no result, falling back");
        }

        if let Some(finding) = extract_keyword(html, schedule_type) {
            self.history.record_success(ExtractionMethod::Keyword);
            return ExtractionOutcome::Found {
                method: ExtractionMethod::Keyword,
                finding,
            };
        }

        if let Some(finding) = extract_legacy(html, schedule_type) {
            self.history.record_success(ExtractionMethod::Legacy);
            return ExtractionOutcome::Found {
                method: ExtractionMethod::Legacy,
                finding,
            };
        }

        ExtractionOutcome::NotFound(NotFoundReason::NoMatch)
    }

    /// The AI stage alone, with breaker, error-history and threshold checks
    pub async fn try_ai(&mut self, text: &str, schedule_type: ScheduleType) -> ExtractionOutcome {
        let Some(ai) = self.ai.clone() else {
            return skipped("no AI backend configured");
        };
        if self.history.should_skip(ExtractionMethod::Ai) {
            return skipped("AI skipped after repeated errors");
        }

        let mut round = 0;
        loop {
            let result = self.breaker.call(|| ai.analyze(text, schedule_type)).await;
            let (class, message) = match result {
                Ok(answer) => {
                    self.history.record_success(ExtractionMethod::Ai);
                    return self.judge(answer, text, schedule_type);
                }
                Err(BreakerError::Open(_)) => return skipped("AI circuit open"),
                Err(e @ BreakerError::Timeout { .. }) => (ErrorClass::Timeout, e.to_string()),
                Err(BreakerError::Failed(e)) => (e.class(), e.to_string()),
            };

            self.history.record_error(ExtractionMethod::Ai, class);
            warn!(%schedule_type, error = %message, "AI extraction failed");

            let transient = matches!(class, ErrorClass::RateLimited | ErrorClass::Timeout);
            if !transient
                || round >= AI_BACKOFF_ROUNDS
                || self.history.should_skip(ExtractionMethod::Ai)
            {
                return ExtractionOutcome::NotFound(NotFoundReason::Failed(message));
            }

            tokio::time::sleep(backoff_delay(class, round)).await;
            round += 1;
        }
    }

    /// Accepts an answer only at or above the page's adaptive threshold
    fn judge(&self, answer: AiAnswer, text: &str, schedule_type: ScheduleType) -> ExtractionOutcome {
        if !answer.found || answer.schedule_text.trim().is_empty() {
            return ExtractionOutcome::NotFound(NotFoundReason::NoMatch);
        }

        let terms: Vec<&str> = self
            .keywords
            .positive(schedule_type)
            .iter()
            .map(|k| k.keyword.as_str())
            .collect();
        let density = keyword_density(text, &terms);
        let threshold = adaptive_threshold(text, density, &self.config);

        let confidence = answer.confidence_pct();
        if f64::from(confidence) < threshold {
            debug!(%schedule_type, confidence, threshold, "AI answer below threshold");
            return ExtractionOutcome::NotFound(NotFoundReason::BelowThreshold {
                confidence,
                threshold,
            });
        }

        ExtractionOutcome::Found {
            method: ExtractionMethod::Ai,
            finding: answer.into_finding(),
        }
    }
}

fn skipped(reason: &str) -> ExtractionOutcome {
    ExtractionOutcome::NotFound(NotFoundReason::Skipped(reason.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerConfig, OperationType};
    use crate::extraction::ai::AiError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FixedAi {
        answer: Result<AiAnswer, String>,
        calls: AtomicU32,
    }

    impl FixedAi {
        fn answering(answer: AiAnswer) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(answer),
                calls: AtomicU32::new(0),
            })
        }

        fn malformed() -> Arc<Self> {
            Arc::new(Self {
                answer: Err("not json".to_string()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl AiBackend for FixedAi {
        async fn analyze(&self, _text: &str, _t: ScheduleType) -> Result<AiAnswer, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone().map_err(AiError::Malformed)
        }
    }

    fn breaker(failure_threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            OperationType::AiContentAnalysis,
            BreakerConfig {
                failure_threshold,
                recovery_timeout: Duration::from_secs(600),
                success_threshold: 1,
                request_timeout: Duration::from_secs(5),
                max_retries: 0,
                retry_delay: Duration::ZERO,
            },
        ))
    }

    fn chain(ai: Option<Arc<dyn AiBackend>>, breaker: Arc<CircuitBreaker>) -> ExtractionChain {
        ExtractionChain::new(
            ai,
            breaker,
            ExtractionConfig::default(),
            Arc::new(KeywordSet::fallback()),
        )
    }

    fn answer(confidence: f64) -> AiAnswer {
        AiAnswer {
            found: true,
            days: vec!["Saturday".to_string()],
            times: vec!["3pm".to_string()],
            frequency: None,
            schedule_text: "Saturday 3pm".to_string(),
            confidence,
        }
    }

    const PAGE: &str = "<body><h2>Confession</h2><p>Saturday 3pm to 4pm</p></body>";
    const TEXT: &str = "Confession\nSaturday 3pm to 4pm";

    #[tokio::test]
    async fn test_confident_ai_answer_wins() {
        let ai = FixedAi::answering(answer(95.0));
        let mut chain = chain(Some(ai.clone()), breaker(5));
        let outcome = chain.extract(PAGE, TEXT, ScheduleType::Reconciliation).await;

        match outcome {
            ExtractionOutcome::Found { method, finding } => {
                assert_eq!(method, ExtractionMethod::Ai);
                assert_eq!(finding.confidence, 95);
                assert_eq!(finding.schedule_text, "Saturday 3pm");
            }
            other => panic!("expected AI finding, got {:?}", other),
        }
        assert_eq!(ai.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_low_confidence_ai_falls_back_to_keyword() {
        let mut chain = chain(Some(FixedAi::answering(answer(45.0))), breaker(5));
        assert!(matches!(
            chain.try_ai(TEXT, ScheduleType::Reconciliation).await,
            ExtractionOutcome::NotFound(NotFoundReason::BelowThreshold { confidence: 45, .. })
        ));

        let outcome = chain.extract(PAGE, TEXT, ScheduleType::Reconciliation).await;
        assert!(matches!(
            outcome,
            ExtractionOutcome::Found {
                method: ExtractionMethod::Keyword,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_open_breaker_skips_ai_without_calling() {
        let ai = FixedAi::answering(answer(99.0));
        let b = breaker(1);
        b.record_failure(std::time::Instant::now());

        let mut chain = chain(Some(ai.clone()), b);
        let outcome = chain.try_ai(TEXT, ScheduleType::Reconciliation).await;
        assert!(matches!(
            outcome,
            ExtractionOutcome::NotFound(NotFoundReason::Skipped(_))
        ));
        assert_eq!(ai.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeated_malformed_answers_stop_ai_calls() {
        let ai = FixedAi::malformed();
        let mut chain = chain(Some(ai.clone()), breaker(100));

        for _ in 0..6 {
            let outcome = chain.extract(PAGE, TEXT, ScheduleType::Reconciliation).await;
            assert!(outcome.is_found());
        }
        // Skipped once Parse failures exceed the AI threshold of 3
        assert_eq!(ai.calls.load(Ordering::SeqCst), 4);
        assert!(chain.history().should_skip(ExtractionMethod::Ai));
    }

    #[tokio::test]
    async fn test_nothing_found_anywhere() {
        let mut chain = chain(None, breaker(5));
        let outcome = chain
            .extract("<p>Parish picnic</p>", "Parish picnic", ScheduleType::Adoration)
            .await;
        assert_eq!(outcome, ExtractionOutcome::NotFound(NotFoundReason::NoMatch));
    }

    #[tokio::test]
    async fn test_not_found_answer_is_no_match() {
        let mut chain = chain(
            Some(FixedAi::answering(AiAnswer::default())),
            breaker(5),
        );
        assert_eq!(
            chain.try_ai(TEXT, ScheduleType::Mass).await,
            ExtractionOutcome::NotFound(NotFoundReason::NoMatch)
        );
    }
}
