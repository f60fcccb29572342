//! Domain types for the civic-service knowledge base.
//!
//! Closed enums (verification lifecycle, claim categories, threat taxonomy,
//! escalation priority) plus the row structs persisted by [`crate::db`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Topics longer than this are truncated before being used as an
/// information-request key, so repeated long claims collapse onto one row.
pub const MAX_TOPIC_LEN: usize = 200;

/// Truncate a free-text topic to the bounded key length (char-safe).
pub fn truncate_topic(topic: &str) -> String {
    if topic.chars().count() <= MAX_TOPIC_LEN {
        topic.to_string()
    } else {
        topic.chars().take(MAX_TOPIC_LEN).collect()
    }
}

// ============================================================================
// Verification lifecycle
// ============================================================================

/// Lifecycle status of a verification record.
///
/// `Pending` is the only initial state. Exactly one terminal state is set by
/// the judgment tool; no transition back to `Pending` exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Verified,
    False,
    PartiallyTrue,
    Unverified,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Verified => "VERIFIED",
            Self::False => "FALSE",
            Self::PartiallyTrue => "PARTIALLY_TRUE",
            Self::Unverified => "UNVERIFIED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "VERIFIED" => Some(Self::Verified),
            "FALSE" => Some(Self::False),
            "PARTIALLY_TRUE" => Some(Self::PartiallyTrue),
            "UNVERIFIED" => Some(Self::Unverified),
            _ => None,
        }
    }

    /// Terminal states are everything except `Pending`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Confidence attached to a judgment, set only at judgment time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Some(Self::High),
            "MEDIUM" => Some(Self::Medium),
            "LOW" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Closed category set for claims and information requests.
///
/// Free text from the model maps onto this set; anything unrecognized lands
/// in `Other` rather than growing the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimCategory {
    GovernmentPolicy,
    Health,
    Security,
    Economy,
    Education,
    Elections,
    Infrastructure,
    Other,
}

impl ClaimCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GovernmentPolicy => "Government Policy",
            Self::Health => "Health",
            Self::Security => "Security",
            Self::Economy => "Economy",
            Self::Education => "Education",
            Self::Elections => "Elections",
            Self::Infrastructure => "Infrastructure",
            Self::Other => "Other",
        }
    }

    /// Map free text (model output or stored value) onto the closed set.
    pub fn from_text(s: &str) -> Self {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "government policy" | "policy" | "government" => Self::GovernmentPolicy,
            "health" | "public health" => Self::Health,
            "security" | "safety" => Self::Security,
            "economy" | "economic" | "finance" => Self::Economy,
            "education" => Self::Education,
            "elections" | "election" | "electoral" => Self::Elections,
            "infrastructure" | "transport" | "roads" => Self::Infrastructure,
            _ => Self::Other,
        }
    }
}

// ============================================================================
// Escalation priority
// ============================================================================

/// Priority of an information request. Ordered: `Normal < High < Urgent`.
/// Repeated requests may only raise it, never lower it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NORMAL" => Some(Self::Normal),
            "HIGH" => Some(Self::High),
            "URGENT" => Some(Self::Urgent),
            _ => None,
        }
    }
}

// ============================================================================
// Cyber threats
// ============================================================================

/// Kind of cyber threat a citizen can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    Phishing,
    FinancialFraud,
    IdentityTheft,
    AccountHack,
    OnlineHarassment,
    FakeInvestment,
    Other,
}

impl ThreatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phishing => "phishing",
            Self::FinancialFraud => "financial_fraud",
            Self::IdentityTheft => "identity_theft",
            Self::AccountHack => "account_hack",
            Self::OnlineHarassment => "online_harassment",
            Self::FakeInvestment => "fake_investment",
            Self::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "phishing" => Self::Phishing,
            "financial_fraud" | "fraud" | "scam" => Self::FinancialFraud,
            "identity_theft" => Self::IdentityTheft,
            "account_hack" | "hacking" | "hack" => Self::AccountHack,
            "online_harassment" | "harassment" => Self::OnlineHarassment,
            "fake_investment" | "investment_scam" | "ponzi" => Self::FakeInvestment,
            _ => Self::Other,
        }
    }
}

/// Lifecycle status of a threat report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatStatus {
    Pending,
    Urgent,
    UnderInvestigation,
    Resolved,
    Closed,
}

impl ThreatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Urgent => "URGENT",
            Self::UnderInvestigation => "UNDER_INVESTIGATION",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "URGENT" => Some(Self::Urgent),
            "UNDER_INVESTIGATION" => Some(Self::UnderInvestigation),
            "RESOLVED" => Some(Self::Resolved),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }
}

// ============================================================================
// Row structs
// ============================================================================

/// A claim submitted for verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: i64,
    pub claim: String,
    pub category: ClaimCategory,
    pub status: VerificationStatus,
    pub confidence: Option<Confidence>,
    pub explanation: Option<String>,
    /// Raw text returned by the retrieval service
    pub retrieval_response: Option<String>,
    /// Source citations as a JSON array string
    pub sources: Option<String>,
    pub response_time_ms: Option<i64>,
    pub requester: String,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// A citizen request for official content, possibly a data gap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InformationRequest {
    pub id: i64,
    pub topic: String,
    pub category: ClaimCategory,
    pub ministry: Option<String>,
    pub priority: Priority,
    pub request_count: i64,
    pub was_answered: bool,
    pub is_data_gap: bool,
    pub first_requested: DateTime<Utc>,
    pub last_requested: DateTime<Utc>,
    pub last_requester: Option<String>,
}

/// A reported cyber threat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatReport {
    pub id: i64,
    pub threat_type: ThreatType,
    pub description: String,
    pub platform: Option<String>,
    /// Amount lost in whole currency units
    pub amount_lost: Option<i64>,
    pub perpetrator_contact: Option<String>,
    pub date_occurred: Option<String>,
    pub is_urgent: bool,
    pub status: ThreatStatus,
    /// Human-readable reference, backfilled from the row id after insert
    pub reference_number: Option<String>,
    pub reporter: String,
    pub evidence_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One mutable counter row per calendar day
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyStats {
    pub day: Option<NaiveDate>,
    pub total_verifications: i64,
    pub verified_count: i64,
    pub false_count: i64,
    pub partially_true_count: i64,
    pub unverified_count: i64,
    pub total_threats: i64,
    pub urgent_threats: i64,
    pub total_amount_lost: i64,
    pub active_users: i64,
    pub new_users: i64,
    pub avg_response_time_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for s in [
            VerificationStatus::Pending,
            VerificationStatus::Verified,
            VerificationStatus::False,
            VerificationStatus::PartiallyTrue,
            VerificationStatus::Unverified,
        ] {
            assert_eq!(VerificationStatus::from_str(s.as_str()), Some(s));
        }
        assert!(VerificationStatus::from_str("MAYBE").is_none());
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!VerificationStatus::Pending.is_terminal());
        assert!(VerificationStatus::False.is_terminal());
        assert!(VerificationStatus::Verified.is_terminal());
    }

    #[test]
    fn priority_is_ordered() {
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Urgent);
        assert_eq!(Priority::from_str("urgent"), Some(Priority::Urgent));
    }

    #[test]
    fn category_maps_free_text() {
        assert_eq!(
            ClaimCategory::from_text("Government Policy"),
            ClaimCategory::GovernmentPolicy
        );
        assert_eq!(ClaimCategory::from_text("ELECTION"), ClaimCategory::Elections);
        assert_eq!(ClaimCategory::from_text("astrology"), ClaimCategory::Other);
    }

    #[test]
    fn topic_truncation_is_stable() {
        let long: String = "x".repeat(500);
        let t1 = truncate_topic(&long);
        let t2 = truncate_topic(&t1);
        assert_eq!(t1.chars().count(), MAX_TOPIC_LEN);
        assert_eq!(t1, t2);
    }
}
