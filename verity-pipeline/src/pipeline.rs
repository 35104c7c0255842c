use crate::classifier::{ClassificationVerdict, Classifier};
use crate::plausibility::PlausibilityGate;
use serde::Serialize;
use std::sync::Arc;
use verity_common::{GenerationParams, PrimingExchange, Result, VerityError};
use verity_llm::traits::{priming_history, ChatTurn, ExtractionProvider, NO_SCRIPT_GENERATED};

/// Literal some models answer with instead of setting a safety flag.
pub const SAFETY_SENTINEL: &str = "safety";

/// Successful pipeline result. `result` is absent when the extraction was
/// not trusted enough to classify.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub news_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ClassificationVerdict>,
}

/// Why an extraction was not forwarded to the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vacuity {
    Empty,
    Placeholder,
    Implausible,
}

/// Extract, vet, then classify. Holds no per-request state; share it behind
/// an `Arc`.
pub struct Pipeline {
    provider: Arc<dyn ExtractionProvider + Send + Sync>,
    classifier: Arc<dyn Classifier + Send + Sync>,
    history: Vec<ChatTurn>,
    generation: GenerationParams,
    gate: PlausibilityGate,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn ExtractionProvider + Send + Sync>,
        classifier: Arc<dyn Classifier + Send + Sync>,
    ) -> Self {
        Self {
            provider,
            classifier,
            history: priming_history(&PrimingExchange::default()),
            generation: GenerationParams::default(),
            gate: PlausibilityGate::default(),
        }
    }

    pub fn with_priming(mut self, priming: &PrimingExchange) -> Self {
        self.history = priming_history(priming);
        self
    }

    pub fn with_generation(mut self, generation: GenerationParams) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_gate(mut self, gate: PlausibilityGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &PlausibilityGate {
        &self.gate
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    #[tracing::instrument(
        name = "pipeline.run",
        skip_all,
        fields(prompt_len = prompt.len(), provider = self.provider.provider_name())
    )]
    pub async fn run(&self, prompt: &str) -> Result<PipelineOutcome> {
        if prompt.trim().is_empty() {
            return Err(VerityError::InputMissing);
        }

        let extraction = self
            .provider
            .complete(&self.history, prompt, &self.generation)
            .await?;
        tracing::debug!(
            model = extraction.model.as_deref().unwrap_or(self.provider.model_name()),
            tokens_used = ?extraction.tokens_used,
            extracted = %extraction.text,
            "extraction returned"
        );

        let news_content = extraction.text.trim().to_string();
        if extraction.flagged || news_content.eq_ignore_ascii_case(SAFETY_SENTINEL) {
            tracing::warn!(flagged = extraction.flagged, "extraction rejected by safety filter");
            return Err(VerityError::ContentFlagged);
        }

        if let Some(reason) = self.vacuity(&news_content, prompt) {
            tracing::info!(?reason, "extraction not classified");
            return Ok(PipelineOutcome {
                news_content,
                result: None,
            });
        }

        let verdict = self.classifier.classify(&news_content).await?;
        tracing::info!(
            classifier = self.classifier.name(),
            verdict = %verdict.as_value(),
            "classification returned"
        );

        Ok(PipelineOutcome {
            news_content,
            result: Some(verdict),
        })
    }

    fn vacuity(&self, extracted: &str, prompt: &str) -> Option<Vacuity> {
        if extracted.is_empty() {
            return Some(Vacuity::Empty);
        }
        if extracted == NO_SCRIPT_GENERATED {
            return Some(Vacuity::Placeholder);
        }
        let report = self.gate.assess(extracted, prompt);
        tracing::debug!(
            token_count = report.token_count,
            overlap_ratio = ?report.overlap_ratio,
            "plausibility assessed"
        );
        if !report.plausible {
            return Some(Vacuity::Implausible);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use verity_llm::traits::{ExtractionResult, Role};

    const ARTICLE: &str = "City council approves new budget for public parks after a long debate on Tuesday evening";

    enum Reply {
        Text(&'static str),
        Flagged,
        Fail,
    }

    struct MockProvider {
        reply: Reply,
        calls: AtomicUsize,
        last_history_len: Mutex<Option<usize>>,
    }

    impl MockProvider {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                last_history_len: Mutex::new(None),
            })
        }
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExtractionProvider for MockProvider {
        async fn complete(
            &self,
            history: &[ChatTurn],
            _prompt: &str,
            _params: &GenerationParams,
        ) -> Result<ExtractionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_history_len.lock().unwrap() = Some(history.len());
            match self.reply {
                Reply::Text(text) => Ok(ExtractionResult::from_text(text)),
                Reply::Flagged => Ok(ExtractionResult::flagged()),
                Reply::Fail => Err(VerityError::Upstream("gemini: boom".into())),
            }
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }

        fn provider_name(&self) -> &'static str {
            "mock"
        }
    }

    struct MockClassifier {
        fail: bool,
        seen: Mutex<Vec<String>>,
    }

    impl MockClassifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                seen: Mutex::new(Vec::new()),
            })
        }
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                seen: Mutex::new(Vec::new()),
            })
        }
        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Classifier for MockClassifier {
        async fn classify(&self, text: &str) -> Result<ClassificationVerdict> {
            self.seen.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err(VerityError::Upstream("classifier: 502".into()));
            }
            Ok(ClassificationVerdict(json!({"label": "real", "score": 0.91})))
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn pipeline(provider: &Arc<MockProvider>, classifier: &Arc<MockClassifier>) -> Pipeline {
        Pipeline::new(provider.clone(), classifier.clone())
    }

    #[tokio::test]
    async fn blank_prompt_makes_no_calls() {
        let provider = MockProvider::new(Reply::Text(ARTICLE));
        let classifier = MockClassifier::new();
        let p = pipeline(&provider, &classifier);

        for prompt in ["", "   ", "\n\t"] {
            let err = p.run(prompt).await.unwrap_err();
            assert!(matches!(err, VerityError::InputMissing));
        }
        assert_eq!(provider.calls(), 0);
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn safety_sentinel_is_flagged_without_classifying() {
        for reply in [Reply::Text("safety"), Reply::Text("  SAFETY \n"), Reply::Flagged] {
            let provider = MockProvider::new(reply);
            let classifier = MockClassifier::new();
            let err = pipeline(&provider, &classifier).run(ARTICLE).await.unwrap_err();
            assert!(matches!(err, VerityError::ContentFlagged));
            assert_eq!(provider.calls(), 1);
            assert_eq!(classifier.calls(), 0);
        }
    }

    #[tokio::test]
    async fn short_extraction_returns_content_only() {
        let provider = MockProvider::new(Reply::Text("council approves new budget today"));
        let classifier = MockClassifier::new();
        let outcome = pipeline(&provider, &classifier).run(ARTICLE).await.unwrap();

        assert_eq!(outcome.news_content, "council approves new budget today");
        assert!(outcome.result.is_none());
        assert_eq!(classifier.calls(), 0);
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"newsContent": "council approves new budget today"})
        );
    }

    #[tokio::test]
    async fn placeholder_and_empty_replies_are_not_classified() {
        for reply in [Reply::Text(NO_SCRIPT_GENERATED), Reply::Text("   ")] {
            let provider = MockProvider::new(reply);
            let classifier = MockClassifier::new();
            let outcome = pipeline(&provider, &classifier).run(ARTICLE).await.unwrap();
            assert!(outcome.result.is_none());
            assert_eq!(classifier.calls(), 0);
        }
    }

    #[tokio::test]
    async fn drifting_extraction_is_not_classified() {
        let provider = MockProvider::new(Reply::Text(
            "Here is a summary of the article you sent me about how money gets spent",
        ));
        let classifier = MockClassifier::new();
        let outcome = pipeline(&provider, &classifier).run(ARTICLE).await.unwrap();
        assert!(outcome.result.is_none());
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn faithful_extraction_is_classified_once() {
        let prompt = format!("Please check this for me: {ARTICLE}");
        let provider = MockProvider::new(Reply::Text(ARTICLE));
        let classifier = MockClassifier::new();
        let outcome = pipeline(&provider, &classifier).run(&prompt).await.unwrap();

        assert_eq!(provider.calls(), 1);
        assert_eq!(*classifier.seen.lock().unwrap(), vec![ARTICLE.to_string()]);
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"newsContent": ARTICLE, "result": {"label": "real", "score": 0.91}})
        );
    }

    #[tokio::test]
    async fn priming_turns_precede_the_prompt() {
        let provider = MockProvider::new(Reply::Text(ARTICLE));
        let classifier = MockClassifier::new();
        let p = pipeline(&provider, &classifier).with_priming(&PrimingExchange {
            instruction: "extract".into(),
            acknowledgement: "ok".into(),
        });
        assert_eq!(p.history[0].role, Role::User);
        assert_eq!(p.history[1].role, Role::Model);

        p.run(ARTICLE).await.unwrap();
        assert_eq!(*provider.last_history_len.lock().unwrap(), Some(2));
    }

    #[tokio::test]
    async fn upstream_failures_propagate() {
        let provider = MockProvider::new(Reply::Fail);
        let classifier = MockClassifier::new();
        let err = pipeline(&provider, &classifier).run(ARTICLE).await.unwrap_err();
        assert!(matches!(err, VerityError::Upstream(_)));
        assert_eq!(classifier.calls(), 0);

        let provider = MockProvider::new(Reply::Text(ARTICLE));
        let classifier = MockClassifier::failing();
        let err = pipeline(&provider, &classifier).run(ARTICLE).await.unwrap_err();
        assert!(matches!(err, VerityError::Upstream(_)));
        assert_eq!(classifier.calls(), 1);
    }

    #[tokio::test]
    async fn stricter_gate_skips_classification() {
        let provider = MockProvider::new(Reply::Text(ARTICLE));
        let classifier = MockClassifier::new();
        let p = pipeline(&provider, &classifier).with_gate(PlausibilityGate::new(50, 0.85));
        let outcome = p.run(ARTICLE).await.unwrap();
        assert!(outcome.result.is_none());
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn repeated_runs_serialize_identically() {
        let provider = MockProvider::new(Reply::Text(ARTICLE));
        let classifier = MockClassifier::new();
        let p = pipeline(&provider, &classifier);

        let first = serde_json::to_vec(&p.run(ARTICLE).await.unwrap()).unwrap();
        for _ in 0..5 {
            let again = serde_json::to_vec(&p.run(ARTICLE).await.unwrap()).unwrap();
            assert_eq!(first, again);
        }
        assert_eq!(provider.calls(), 6);
        assert_eq!(classifier.calls(), 6);
    }
}
