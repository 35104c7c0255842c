//! The extract → vet → classify flow behind the chatbot route.
//!
//! [`Pipeline::run`] asks the configured [`ExtractionProvider`] to pull the
//! news article out of a submission, rejects safety-filtered replies, and
//! forwards the extraction to a [`Classifier`] only when the
//! [`PlausibilityGate`] accepts it as a faithful excerpt.
//!
//! [`ExtractionProvider`]: verity_llm::traits::ExtractionProvider
pub mod classifier;
pub mod pipeline;
pub mod plausibility;

pub use classifier::{ClassificationVerdict, Classifier, HttpClassifier};
pub use pipeline::{Pipeline, PipelineOutcome, Vacuity, SAFETY_SENTINEL};
pub use plausibility::{Plausibility, PlausibilityGate};
