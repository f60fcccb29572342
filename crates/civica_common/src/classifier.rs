//! Judgment classification over retrieval evidence.
//!
//! The verification tool attaches a typed, advisory judgment suggestion to
//! its result. The suggestion never touches a record directly; the model
//! makes the actual judgment call through `update_verification_status`.

use crate::model::{Confidence, VerificationStatus};
use crate::retrieval::RetrievalResponse;

/// A typed judgment suggestion
#[derive(Debug, Clone, PartialEq)]
pub struct Judgment {
    pub status: VerificationStatus,
    pub confidence: Confidence,
    pub rationale: String,
}

/// Seam for deriving a judgment suggestion from evidence
pub trait JudgmentClassifier: Send + Sync {
    fn classify(&self, claim: &str, evidence: &RetrievalResponse) -> Judgment;
}

/// Default rule-based classifier.
///
/// Stance markers in the evidence text pick the status; match scores pick
/// the confidence. Weak or absent evidence suggests UNVERIFIED.
pub struct RuleBasedClassifier;

const REFUTING_MARKERS: &[&str] = &[
    "false",
    "not true",
    "no evidence",
    "debunked",
    "misleading",
    "fabricated",
    "hoax",
];

const SUPPORTING_MARKERS: &[&str] = &[
    "confirmed",
    "official",
    "announced",
    "gazetted",
    "in effect",
    "signed into law",
];

impl RuleBasedClassifier {
    fn confidence_from_scores(evidence: &RetrievalResponse) -> Confidence {
        let top = evidence
            .matches
            .iter()
            .map(|m| m.score)
            .fold(0.0_f64, f64::max);
        if top >= 0.8 {
            Confidence::High
        } else if top >= 0.5 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

impl JudgmentClassifier for RuleBasedClassifier {
    fn classify(&self, _claim: &str, evidence: &RetrievalResponse) -> Judgment {
        if evidence.is_empty() {
            return Judgment {
                status: VerificationStatus::Unverified,
                confidence: Confidence::Low,
                rationale: "No official content covers this claim.".to_string(),
            };
        }

        let text = evidence.combined_text().to_ascii_lowercase();
        let refutes = REFUTING_MARKERS.iter().any(|m| text.contains(m));
        let supports = SUPPORTING_MARKERS.iter().any(|m| text.contains(m));
        let confidence = Self::confidence_from_scores(evidence);

        let (status, rationale) = match (refutes, supports) {
            (true, false) => (
                VerificationStatus::False,
                "Official sources contradict the claim.",
            ),
            (false, true) => (
                VerificationStatus::Verified,
                "Official sources support the claim.",
            ),
            (true, true) => (
                VerificationStatus::PartiallyTrue,
                "Official sources both support and contradict parts of the claim.",
            ),
            (false, false) => (
                VerificationStatus::Unverified,
                "Official sources mention the topic without a clear stance.",
            ),
        };

        Judgment {
            status,
            confidence,
            rationale: rationale.to_string(),
        }
    }
}
