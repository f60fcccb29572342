//! Tool registry and execution contract.
//!
//! A tool is an immutable pair of a machine-readable definition (handed to
//! the model every turn) and a handler. Dispatch resolves the closed
//! [`ToolName`] set at compile time; an unregistered name is an explicit
//! `Unknown` variant, not a lookup miss. Handlers never let a failure escape:
//! every path returns a structured [`ToolOutcome`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, warn};

use crate::chat_protocol::{ToolCallRequest, ToolSchema};
use crate::classifier::JudgmentClassifier;
use crate::db::CivicDb;
use crate::gateway::{LocationContext, MediaContext, OutboundSender};
use crate::model::{
    truncate_topic, ClaimCategory, Confidence, Priority, ThreatType, VerificationStatus,
};
use crate::retrieval::RetrievalIndex;

/// Page size for `check_threat_patterns`
const THREAT_PATTERN_PAGE: usize = 5;

/// Reply used when the retrieval service is unreachable
const RETRIEVAL_DOWN_TEXT: &str =
    "Unable to verify this claim right now: the verification service could not be reached.";

/// Reply used when retrieval finds nothing
const DATA_GAP_TEXT: &str =
    "No official information was found on this topic in the knowledge base.";

/// The closed set of capabilities the model may invoke
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolName {
    VerifyInformation,
    UpdateVerificationStatus,
    ReportCyberThreat,
    CheckThreatPatterns,
    EscalateInformationRequest,
    /// Anything the catalog does not define
    Unknown(String),
}

impl ToolName {
    pub fn parse(name: &str) -> Self {
        match name {
            "verify_information" => Self::VerifyInformation,
            "update_verification_status" => Self::UpdateVerificationStatus,
            "report_cyber_threat" => Self::ReportCyberThreat,
            "check_threat_patterns" => Self::CheckThreatPatterns,
            "escalate_information_request" => Self::EscalateInformationRequest,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Everything a handler may touch beyond its own arguments
pub struct ToolContext<'a> {
    /// Phone-like identity of the citizen this turn belongs to
    pub caller: &'a str,
    pub location: Option<&'a LocationContext>,
    pub media: Option<&'a MediaContext>,
    pub db: &'a CivicDb,
    pub retrieval: &'a dyn RetrievalIndex,
    pub gateway: &'a dyn OutboundSender,
    pub classifier: &'a dyn JudgmentClassifier,
}

/// Structured result of one tool call.
///
/// Success carries domain fields plus a message; failure carries an error
/// code plus a message. Serialized as a flat JSON object.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl ToolOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            message: message.into(),
            fields: serde_json::Map::new(),
        }
    }

    pub fn fail(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            message: message.into(),
            fields: serde_json::Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        self.fields
            .insert(key.to_string(), json!(value));
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Wire form fed back to the model as a tool-role message.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"success":false,"message":"serialization failed"}"#.to_string())
    }
}

/// The fixed tool-definition catalog supplied to the model on every turn
pub fn catalog() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: "verify_information".to_string(),
            description: "Check a claim, rumor, or question against the official government \
                knowledge base. Use this whenever a citizen asks whether something is true, \
                shares a rumor, or asks about a policy, announcement, or public service."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "claim": {
                        "type": "string",
                        "description": "The claim or question to verify, in the citizen's words"
                    },
                    "category": {
                        "type": "string",
                        "description": "Topic area of the claim",
                        "enum": ["Government Policy", "Health", "Security", "Economy",
                                 "Education", "Elections", "Infrastructure", "Other"]
                    }
                },
                "required": ["claim", "category"]
            }),
        },
        ToolSchema {
            name: "update_verification_status".to_string(),
            description: "Record your judgment on a previously verified claim after analyzing \
                the retrieval results. Call this exactly once per verification, after \
                verify_information."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "verification_id": {
                        "type": "integer",
                        "description": "Id returned by verify_information"
                    },
                    "status": {
                        "type": "string",
                        "enum": ["VERIFIED", "FALSE", "PARTIALLY_TRUE", "UNVERIFIED"]
                    },
                    "confidence": {
                        "type": "string",
                        "enum": ["HIGH", "MEDIUM", "LOW"]
                    },
                    "explanation": {
                        "type": "string",
                        "description": "Short reasoning behind the judgment"
                    }
                },
                "required": ["verification_id", "status", "confidence"]
            }),
        },
        ToolSchema {
            name: "report_cyber_threat".to_string(),
            description: "File a cyber-threat report on behalf of the citizen: scams, phishing, \
                account hacks, fraud, harassment. Returns a reference number the citizen can \
                quote in follow-ups."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "threat_type": {
                        "type": "string",
                        "enum": ["phishing", "financial_fraud", "identity_theft", "account_hack",
                                 "online_harassment", "fake_investment", "other"]
                    },
                    "description": {
                        "type": "string",
                        "description": "What happened, in the citizen's words"
                    },
                    "platform": {
                        "type": "string",
                        "description": "Where it happened (WhatsApp, SMS, bank app, ...)"
                    },
                    "amount_lost": {
                        "type": "number",
                        "description": "Money lost, in whole naira, if any"
                    },
                    "perpetrator_contact": {
                        "type": "string",
                        "description": "Phone number, account, or handle of the perpetrator"
                    },
                    "date_occurred": {
                        "type": "string",
                        "description": "When it happened, as stated by the citizen"
                    },
                    "is_urgent": {
                        "type": "boolean",
                        "description": "True when money is actively at risk or the attack is ongoing"
                    }
                },
                "required": ["threat_type", "description"]
            }),
        },
        ToolSchema {
            name: "check_threat_patterns".to_string(),
            description: "Check whether a phone number, account, or handle already appears in \
                prior threat reports. Read-only; use before or after filing a report to warn \
                the citizen about known perpetrators."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "contact_info": {
                        "type": "string",
                        "description": "Contact string to look up"
                    }
                },
                "required": ["contact_info"]
            }),
        },
        ToolSchema {
            name: "escalate_information_request".to_string(),
            description: "Escalate a topic the knowledge base cannot answer so content teams \
                create official material for it. Use after verify_information reports a data \
                gap on a topic that matters to citizens."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "topic": {
                        "type": "string",
                        "description": "The unanswered topic"
                    },
                    "category": {
                        "type": "string",
                        "enum": ["Government Policy", "Health", "Security", "Economy",
                                 "Education", "Elections", "Infrastructure", "Other"]
                    },
                    "priority": {
                        "type": "string",
                        "enum": ["NORMAL", "HIGH", "URGENT"]
                    },
                    "ministry": {
                        "type": "string",
                        "description": "Ministry or agency likely to own the answer"
                    },
                    "reason": {
                        "type": "string",
                        "description": "Why this topic needs official content"
                    }
                },
                "required": ["topic", "category", "reason"]
            }),
        },
    ]
}

/// Execute one tool call. Never returns an error: argument parse failures,
/// unknown names, and handler faults all become structured failures so the
/// orchestration loop keeps going.
pub async fn dispatch(call: &ToolCallRequest, ctx: &ToolContext<'_>) -> ToolOutcome {
    let name = ToolName::parse(&call.function.name);
    debug!(tool = %call.function.name, call_id = %call.id, "Dispatching tool call");

    let args: Value = match serde_json::from_str(&call.function.arguments) {
        Ok(v) => v,
        Err(e) => {
            warn!(tool = %call.function.name, error = %e, "Malformed tool arguments");
            return ToolOutcome::fail(
                "invalid_arguments",
                format!("Arguments were not valid JSON: {}", e),
            );
        }
    };

    let result = match name {
        ToolName::VerifyInformation => verify_information(args, ctx).await,
        ToolName::UpdateVerificationStatus => update_verification_status(args, ctx).await,
        ToolName::ReportCyberThreat => report_cyber_threat(args, ctx).await,
        ToolName::CheckThreatPatterns => check_threat_patterns(args, ctx).await,
        ToolName::EscalateInformationRequest => escalate_information_request(args, ctx).await,
        ToolName::Unknown(other) => {
            return ToolOutcome::fail("unknown_tool", format!("Unknown operation: {}", other));
        }
    };

    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(tool = %call.function.name, error = %e, "Tool handler failed");
            ToolOutcome::fail("tool_failed", format!("The operation failed: {}", e))
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, ToolOutcome> {
    serde_json::from_value(args).map_err(|e| {
        ToolOutcome::fail(
            "invalid_arguments",
            format!("Arguments did not match the tool contract: {}", e),
        )
    })
}

// ============================================================================
// verify_information
// ============================================================================

#[derive(Debug, Deserialize)]
struct VerifyArgs {
    claim: String,
    #[serde(default)]
    category: Option<String>,
}

async fn verify_information(args: Value, ctx: &ToolContext<'_>) -> anyhow::Result<ToolOutcome> {
    let args: VerifyArgs = match parse_args(args) {
        Ok(a) => a,
        Err(outcome) => return Ok(outcome),
    };
    let category = ClaimCategory::from_text(args.category.as_deref().unwrap_or(""));

    let started = Instant::now();
    let retrieval = ctx.retrieval.query(&args.claim).await;
    let elapsed_ms = started.elapsed().as_millis() as i64;

    let (response_text, sources_json, is_data_gap, suggestion) = match retrieval {
        Ok(resp) if resp.is_empty() => {
            // Data gap: log the topic for content curation before replying
            let request = ctx.db.upsert_information_request(
                &truncate_topic(&args.claim),
                category,
                Priority::Normal,
                None,
                ctx.caller,
            )?;
            debug!(
                request_id = request.id,
                count = request.request_count,
                "Data gap recorded"
            );
            let suggestion = ctx.classifier.classify(&args.claim, &resp);
            (DATA_GAP_TEXT.to_string(), None, true, suggestion)
        }
        Ok(resp) => {
            let sources = resp.sources();
            let sources_json = if sources.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&sources)?)
            };
            let suggestion = ctx.classifier.classify(&args.claim, &resp);
            (resp.combined_text(), sources_json, false, suggestion)
        }
        Err(e) => {
            // Degrade: the citizen still gets a reply and the claim is still
            // recorded as PENDING for later follow-up.
            warn!(error = %e, "Retrieval service failure during verification");
            let empty = crate::retrieval::RetrievalResponse::default();
            let suggestion = ctx.classifier.classify(&args.claim, &empty);
            (RETRIEVAL_DOWN_TEXT.to_string(), None, false, suggestion)
        }
    };

    let id = ctx.db.insert_verification(
        &args.claim,
        category,
        Some(&response_text),
        sources_json.as_deref(),
        Some(elapsed_ms),
        ctx.caller,
    )?;
    ctx.db
        .record_verification(VerificationStatus::Pending, Some(elapsed_ms))?;

    let mut outcome = ToolOutcome::ok(response_text)
        .with("verification_id", id)
        .with("is_data_gap", is_data_gap)
        .with("suggested_status", suggestion.status.as_str())
        .with("suggested_confidence", suggestion.confidence.as_str())
        .with("suggestion_rationale", suggestion.rationale);
    if let Some(sources) = sources_json {
        outcome = outcome.with("sources", sources);
    }
    if is_data_gap {
        outcome = outcome.with(
            "instruction",
            "Tell the citizen this claim could not be checked against official sources. \
             If the topic looks important to many citizens, escalate it with \
             escalate_information_request.",
        );
    }
    Ok(outcome)
}

// ============================================================================
// update_verification_status
// ============================================================================

#[derive(Debug, Deserialize)]
struct JudgmentArgs {
    verification_id: i64,
    status: String,
    confidence: String,
    #[serde(default)]
    explanation: Option<String>,
}

async fn update_verification_status(
    args: Value,
    ctx: &ToolContext<'_>,
) -> anyhow::Result<ToolOutcome> {
    let args: JudgmentArgs = match parse_args(args) {
        Ok(a) => a,
        Err(outcome) => return Ok(outcome),
    };

    let status = match VerificationStatus::from_str(&args.status) {
        Some(s) if s.is_terminal() => s,
        _ => {
            return Ok(ToolOutcome::fail(
                "invalid_status",
                format!(
                    "Status must be one of VERIFIED, FALSE, PARTIALLY_TRUE, UNVERIFIED; got {}",
                    args.status
                ),
            ))
        }
    };
    let confidence = match Confidence::from_str(&args.confidence) {
        Some(c) => c,
        None => {
            return Ok(ToolOutcome::fail(
                "invalid_confidence",
                format!("Confidence must be HIGH, MEDIUM, or LOW; got {}", args.confidence),
            ))
        }
    };

    let found = ctx.db.set_judgment(
        args.verification_id,
        status,
        confidence,
        args.explanation.as_deref(),
    )?;
    if !found {
        return Ok(ToolOutcome::fail(
            "not_found",
            format!("No verification record with id {}", args.verification_id),
        ));
    }

    Ok(ToolOutcome::ok(format!(
        "Verification {} judged {} with {} confidence",
        args.verification_id,
        status.as_str(),
        confidence.as_str()
    ))
    .with("verification_id", args.verification_id)
    .with("status", status.as_str()))
}

// ============================================================================
// report_cyber_threat
// ============================================================================

#[derive(Debug, Deserialize)]
struct ThreatArgs {
    threat_type: String,
    description: String,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    amount_lost: Option<f64>,
    #[serde(default)]
    perpetrator_contact: Option<String>,
    #[serde(default)]
    date_occurred: Option<String>,
    #[serde(default)]
    is_urgent: Option<bool>,
}

async fn report_cyber_threat(args: Value, ctx: &ToolContext<'_>) -> anyhow::Result<ToolOutcome> {
    let args: ThreatArgs = match parse_args(args) {
        Ok(a) => a,
        Err(outcome) => return Ok(outcome),
    };
    let is_urgent = args.is_urgent.unwrap_or(false);
    let amount_lost = args.amount_lost.map(|a| a.round() as i64);
    let evidence_ref = ctx.media.map(|m| {
        m.filename
            .clone()
            .unwrap_or_else(|| format!("attachment ({})", m.mimetype))
    });

    let report = ctx.db.insert_threat_report(
        ThreatType::from_str(&args.threat_type),
        &args.description,
        args.platform.as_deref(),
        amount_lost,
        args.perpetrator_contact.as_deref(),
        args.date_occurred.as_deref(),
        is_urgent,
        ctx.caller,
        evidence_ref.as_deref(),
    )?;
    ctx.db.record_threat(is_urgent, amount_lost)?;

    let reference = report.reference_number.clone().unwrap_or_default();
    if is_urgent {
        // Immediate acknowledgment outside the model reply; best effort
        let ack = format!(
            "Your urgent report {} has been received and flagged for immediate attention.",
            reference
        );
        if let Err(e) = ctx.gateway.send(ctx.caller, &ack).await {
            warn!(error = %e, "Failed to send urgent-report acknowledgment");
        }
    }

    Ok(ToolOutcome::ok(format!(
        "Threat report filed with reference {}",
        reference
    ))
    .with("report_id", report.id)
    .with("reference_number", reference)
    .with("status", report.status.as_str())
    .with("is_urgent", is_urgent))
}

// ============================================================================
// check_threat_patterns
// ============================================================================

#[derive(Debug, Deserialize)]
struct PatternArgs {
    contact_info: String,
}

async fn check_threat_patterns(args: Value, ctx: &ToolContext<'_>) -> anyhow::Result<ToolOutcome> {
    let args: PatternArgs = match parse_args(args) {
        Ok(a) => a,
        Err(outcome) => return Ok(outcome),
    };

    let reports = ctx
        .db
        .threats_by_contact(&args.contact_info, THREAT_PATTERN_PAGE)?;
    let is_known = !reports.is_empty();
    let summaries: Vec<Value> = reports
        .iter()
        .map(|r| {
            json!({
                "reference_number": r.reference_number,
                "threat_type": r.threat_type.as_str(),
                "platform": r.platform,
                "reported_at": r.created_at.to_rfc3339(),
            })
        })
        .collect();

    let message = if is_known {
        format!(
            "This contact appears in {} prior threat report(s). Warn the citizen.",
            summaries.len()
        )
    } else {
        "This contact does not appear in any prior threat report.".to_string()
    };

    Ok(ToolOutcome::ok(message)
        .with("is_known", is_known)
        .with("match_count", summaries.len())
        .with("reports", summaries))
}

// ============================================================================
// escalate_information_request
// ============================================================================

#[derive(Debug, Deserialize)]
struct EscalateArgs {
    topic: String,
    category: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    ministry: Option<String>,
    #[allow(dead_code)]
    reason: String,
}

async fn escalate_information_request(
    args: Value,
    ctx: &ToolContext<'_>,
) -> anyhow::Result<ToolOutcome> {
    let args: EscalateArgs = match parse_args(args) {
        Ok(a) => a,
        Err(outcome) => return Ok(outcome),
    };
    let priority = args
        .priority
        .as_deref()
        .and_then(Priority::from_str)
        .unwrap_or(Priority::Normal);

    let request = ctx.db.upsert_information_request(
        &args.topic,
        ClaimCategory::from_text(&args.category),
        priority,
        args.ministry.as_deref(),
        ctx.caller,
    )?;

    Ok(ToolOutcome::ok(format!(
        "Escalated. This topic has now been requested {} time(s) at {} priority.",
        request.request_count,
        request.priority.as_str()
    ))
    .with("request_id", request.id)
    .with("request_count", request.request_count)
    .with("priority", request.priority.as_str()))
}
