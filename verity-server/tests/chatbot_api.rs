use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;
use verity_common::{GenerationParams, Result, VerityError};
use verity_config::VerityConfigLoader;
use verity_llm::traits::{ChatTurn, ExtractionProvider, ExtractionResult};
use verity_pipeline::{ClassificationVerdict, Classifier, Pipeline};
use verity_server::{AppState, build_pipeline, error::GENERIC_ERROR, router};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLE: &str = "The central bank held interest rates steady on Wednesday citing cooling inflation and a stable labour market";

#[derive(Clone, Copy)]
enum Canned {
    Text(&'static str),
    Fails(fn() -> VerityError),
}

struct CannedProvider {
    reply: Canned,
    calls: AtomicUsize,
}

#[async_trait]
impl ExtractionProvider for CannedProvider {
    async fn complete(
        &self,
        _history: &[ChatTurn],
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<ExtractionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.reply {
            Canned::Text(text) => Ok(ExtractionResult::from_text(text)),
            Canned::Fails(make) => Err(make()),
        }
    }

    fn model_name(&self) -> &str {
        "canned"
    }

    fn provider_name(&self) -> &'static str {
        "canned"
    }
}

#[derive(Default)]
struct CountingClassifier {
    calls: AtomicUsize,
}

#[async_trait]
impl Classifier for CountingClassifier {
    async fn classify(&self, _text: &str) -> Result<ClassificationVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ClassificationVerdict(json!("REAL")))
    }

    fn name(&self) -> &str {
        "counting"
    }
}

struct Harness {
    app: axum::Router,
    provider: Arc<CannedProvider>,
    classifier: Arc<CountingClassifier>,
}

fn harness(reply: Canned) -> Harness {
    let provider = Arc::new(CannedProvider {
        reply,
        calls: AtomicUsize::new(0),
    });
    let classifier = Arc::new(CountingClassifier::default());
    let pipeline = Pipeline::new(provider.clone(), classifier.clone());
    Harness {
        app: router(AppState::new(pipeline)),
        provider,
        classifier,
    }
}

fn post_chatbot(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chatbot")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

async fn send(app: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness(Canned::Text(ARTICLE));
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn preflight_is_allowed_from_any_origin() {
    let h = harness(Canned::Text(ARTICLE));
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/api/chatbot")
        .header(header::ORIGIN, "https://ui.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();

    let response = h.app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn responses_carry_cors_header() {
    let h = harness(Canned::Text("too short to classify"));
    let req = Request::builder()
        .method("POST")
        .uri("/api/chatbot")
        .header(header::ORIGIN, "https://ui.example")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"prompt": ARTICLE}).to_string()))
        .unwrap();

    let response = h.app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

#[tokio::test]
async fn missing_input_is_400_without_outbound_calls() {
    let bodies = [
        json!({"prompt": ""}).to_string(),
        json!({"prompt": "   "}).to_string(),
        json!({}).to_string(),
        json!({"prompt": null}).to_string(),
        json!({"prompt": 7}).to_string(),
        "not json at all".to_string(),
    ];

    for body in bodies {
        let h = harness(Canned::Text(ARTICLE));
        let (status, json_body) = send(h.app, post_chatbot(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(json_body, json!({"error": "No input provided"}));
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.classifier.calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn missing_content_type_is_missing_input() {
    let h = harness(Canned::Text(ARTICLE));
    let req = Request::builder()
        .method("POST")
        .uri("/api/chatbot")
        .body(Body::from(json!({"prompt": ARTICLE}).to_string()))
        .unwrap();
    let (status, body) = send(h.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No input provided");
}

#[tokio::test]
async fn safety_reply_is_400_and_skips_classifier() {
    let h = harness(Canned::Text("Safety"));
    let (status, body) = send(h.app, post_chatbot(json!({"prompt": ARTICLE}).to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"error": "The input was flagged as potentially unsafe. Please provide a different input."})
    );
    assert_eq!(h.classifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn short_extraction_is_200_without_result() {
    let h = harness(Canned::Text("rates held steady on Wednesday"));
    let (status, body) = send(h.app, post_chatbot(json!({"prompt": ARTICLE}).to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"newsContent": "rates held steady on Wednesday"}));
    assert_eq!(h.classifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn faithful_extraction_is_classified() {
    let h = harness(Canned::Text(ARTICLE));
    let prompt = format!("Can you check this? {ARTICLE}");
    let (status, body) = send(h.app, post_chatbot(json!({"prompt": prompt}).to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"newsContent": ARTICLE, "result": "REAL"}));
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.classifier.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upstream_failure_is_generic_500() {
    fn boom() -> VerityError {
        VerityError::Upstream("gemini: 401 API key not valid".into())
    }
    let h = harness(Canned::Fails(boom));
    let (status, body) = send(h.app, post_chatbot(json!({"prompt": ARTICLE}).to_string())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": GENERIC_ERROR}));
}

#[tokio::test]
async fn timeout_is_generic_500() {
    fn timed_out() -> VerityError {
        VerityError::Timeout
    }
    let h = harness(Canned::Fails(timed_out));
    let (status, body) = send(h.app, post_chatbot(json!({"prompt": ARTICLE}).to_string())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], GENERIC_ERROR);
}

#[tokio::test]
async fn configured_pipeline_talks_to_both_upstreams() {
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": ARTICLE}, "finish_reason": "stop"}]
        })))
        .expect(1)
        .mount(&llm)
        .await;

    let hf = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/predict"))
        .and(query_param("text", ARTICLE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"label": "REAL"}})))
        .expect(1)
        .mount(&hf)
        .await;

    let yaml = format!(
        r#"
extraction:
  provider: openai
  model: gpt-4o-mini
  api_key: sk-test
  base_url: "{}/v1"
classifier:
  endpoint: "{}/predict"
  auth_token: hf-test
"#,
        llm.uri(),
        hf.uri()
    );
    let cfg = VerityConfigLoader::new().with_yaml_str(&yaml).load().unwrap();
    let app = router(AppState::new(build_pipeline(&cfg).unwrap()));

    let (status, body) = send(app, post_chatbot(json!({"prompt": ARTICLE}).to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"newsContent": ARTICLE, "result": {"label": "REAL"}}));
}
