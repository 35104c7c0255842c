use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;
use verity_common::{Result, VerityError};
use verity_http::{Auth, HttpClient, HttpError, RequestOpts};

/// Whatever the classifier returned under `result`, passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationVerdict(pub Value);

impl ClassificationVerdict {
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Scores a piece of text for reliability.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<ClassificationVerdict>;

    /// Short identifier for logs.
    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    result: Option<Value>,
}

/// Classifier reached over HTTP: `GET <endpoint>?<query_param>=<text>`,
/// answered with `{"result": ...}`.
pub struct HttpClassifier {
    client: HttpClient,
    query_param: String,
    auth_token: Option<String>,
}

impl HttpClassifier {
    pub fn new(
        endpoint: &str,
        query_param: impl Into<String>,
        auth_token: Option<String>,
    ) -> Result<Self> {
        let client = HttpClient::new(endpoint)
            .map_err(|e| VerityError::Config(format!("classifier endpoint rejected: {e}")))?;
        Ok(Self {
            client,
            query_param: query_param.into(),
            auth_token,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<ClassificationVerdict> {
        let opts = RequestOpts {
            auth: self.auth_token.as_deref().map(Auth::Bearer),
            query: Some(vec![(self.query_param.as_str(), Cow::Borrowed(text))]),
            ..Default::default()
        };

        tracing::debug!(endpoint = %self.client.base(), text_len = text.len(), "classifier.predict");

        let resp: PredictResponse = self
            .client
            .get_json("", opts)
            .await
            .map_err(classifier_error)?;

        match resp.result {
            Some(result) => Ok(ClassificationVerdict(result)),
            None => Err(VerityError::Upstream(
                "classifier: response has no `result` field".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn classifier_error(e: HttpError) -> VerityError {
    match e {
        HttpError::Timeout(_) => VerityError::Timeout,
        other => VerityError::Upstream(format!("classifier: {other}")),
    }
}
