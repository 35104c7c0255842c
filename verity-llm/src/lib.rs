//! Provider-agnostic extraction-model integration for Verity.
//!
//! This crate exposes a common [`traits::ExtractionProvider`] interface and
//! concrete implementations for Gemini and OpenAI-compatible chat endpoints.
//! It also provides a convenience function to build a provider from a
//! [`verity_common::ProviderConfig`].
//!
//! # Examples
//! ```no_run
//! use std::time::Duration;
//! use verity_common::{ProviderConfig, Result};
//! use verity_llm::build_provider;
//!
//! # fn main() -> Result<()> {
//! let cfg = ProviderConfig::Gemini {
//!     api_key: "key".into(),
//!     model: "gemini-2.0-flash".into(),
//!     base_url: None,
//! };
//! let provider = build_provider(&cfg, Duration::from_secs(30))?;
//! assert_eq!(provider.model_name(), "gemini-2.0-flash");
//! # Ok(())
//! # }
//! ```
pub mod gemini;
pub mod openai;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;
use verity_common::{ProviderConfig, VerityError};
use verity_http::HttpError;

#[cfg(feature = "gemini")]
use gemini::GeminiProvider;
#[cfg(feature = "openai")]
use openai::OpenAiCompatProvider;
use traits::ExtractionProvider;

/// Build the configured extraction provider.
///
/// Fails with [`VerityError::Config`] when the key or model is blank.
pub fn build_provider(
    config: &ProviderConfig,
    timeout: Duration,
) -> verity_common::Result<Arc<dyn ExtractionProvider + Send + Sync + 'static>> {
    if config.api_key().trim().is_empty() {
        return Err(VerityError::Config(
            "extraction provider api_key is empty".to_string(),
        ));
    }
    if config.model().trim().is_empty() {
        return Err(VerityError::Config(
            "extraction provider model is empty".to_string(),
        ));
    }

    match config {
        #[cfg(feature = "gemini")]
        ProviderConfig::Gemini {
            api_key,
            model,
            base_url,
        } => {
            let provider = GeminiProvider::new(api_key.clone(), model.clone(), base_url.as_deref())?
                .with_timeout(timeout);
            Ok(Arc::new(provider))
        }
        #[cfg(feature = "openai")]
        ProviderConfig::OpenAi {
            api_key,
            model,
            base_url,
        } => {
            let provider =
                OpenAiCompatProvider::new(api_key.clone(), model.clone(), base_url.as_deref())?
                    .with_timeout(timeout);
            Ok(Arc::new(provider))
        }
        #[allow(unreachable_patterns)]
        _ => Err(VerityError::Config(
            "extraction provider not enabled".to_string(),
        )),
    }
}

/// Fold a transport error into the shared taxonomy. Timeouts stay distinct;
/// everything else is an upstream failure tagged with the service name.
pub(crate) fn http_to_verity(service: &str, e: HttpError) -> VerityError {
    match e {
        HttpError::Timeout(_) => VerityError::Timeout,
        other => VerityError::Upstream(format!("{service}: {other}")),
    }
}

pub(crate) fn with_trailing_slash(base: &str) -> String {
    if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    }
}
