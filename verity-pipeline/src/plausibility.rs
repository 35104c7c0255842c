//! Token-overlap check deciding whether an extraction is a genuine excerpt of
//! the submitted text rather than a refusal, a drifting summary, or unrelated
//! generated content.

use std::collections::HashSet;

pub const DEFAULT_MIN_TOKENS: usize = 10;
pub const DEFAULT_MIN_OVERLAP: f64 = 0.85;

/// Thresholds for [`PlausibilityGate::is_plausible_extract`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlausibilityGate {
    /// Extractions with fewer whitespace tokens than this are rejected outright.
    pub min_tokens: usize,
    /// Minimum share of the extraction's distinct tokens that must also appear
    /// in the original text.
    pub min_overlap: f64,
}

impl Default for PlausibilityGate {
    fn default() -> Self {
        Self {
            min_tokens: DEFAULT_MIN_TOKENS,
            min_overlap: DEFAULT_MIN_OVERLAP,
        }
    }
}

/// Diagnostic view of one check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plausibility {
    /// Whitespace tokens in the extraction, duplicates included.
    pub token_count: usize,
    /// `None` when the length gate rejected the text before the ratio was computed.
    pub overlap_ratio: Option<f64>,
    pub plausible: bool,
}

impl PlausibilityGate {
    pub fn new(min_tokens: usize, min_overlap: f64) -> Self {
        Self {
            min_tokens,
            min_overlap,
        }
    }

    pub fn is_plausible_extract(&self, extracted: &str, original: &str) -> bool {
        self.assess(extracted, original).plausible
    }

    pub fn assess(&self, extracted: &str, original: &str) -> Plausibility {
        let token_count = extracted.split_whitespace().count();
        if token_count < self.min_tokens {
            return Plausibility {
                token_count,
                overlap_ratio: None,
                plausible: false,
            };
        }

        let extracted_tokens = lowercase_tokens(extracted);
        // An empty set only gets past the length gate when `min_tokens` is 0.
        if extracted_tokens.is_empty() {
            return Plausibility {
                token_count,
                overlap_ratio: None,
                plausible: false,
            };
        }

        let original_tokens = lowercase_tokens(original);
        let shared = extracted_tokens.intersection(&original_tokens).count();
        let ratio = shared as f64 / extracted_tokens.len() as f64;

        Plausibility {
            token_count,
            overlap_ratio: Some(ratio),
            plausible: ratio >= self.min_overlap,
        }
    }
}

fn lowercase_tokens(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}
