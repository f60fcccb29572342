//! Orchestration loop.
//!
//! One inbound citizen message becomes one turn: the transcript goes to the
//! model with the tool catalog, requested tool calls are dispatched
//! concurrently, their results feed back into the transcript, and the loop
//! repeats until the model answers in plain text or the bounds are hit.
//! Every failure mode degrades to a fixed user-visible reply; the partially
//! mutated transcript is kept as-is.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chat_protocol::{ChatMessage, ChatOutcome};
use crate::classifier::JudgmentClassifier;
use crate::db::CivicDb;
use crate::gateway::{LocationContext, MediaContext, OutboundSender};
use crate::llm_client::ChatModel;
use crate::retrieval::RetrievalIndex;
use crate::session::SessionStore;
use crate::tools::{catalog, dispatch, ToolContext};

/// Maximum model round-trips per turn
pub const MAX_ITERATIONS: usize = 10;

/// Wall-clock bound on one whole turn, layered over the iteration bound
const TURN_TIMEOUT: Duration = Duration::from_secs(120);

/// Reply when the iteration bound or the turn timeout is hit
pub const APOLOGY_SLOW: &str =
    "Sorry, this is taking longer than expected. Please try again in a moment.";

/// Reply for any unrecoverable turn-level error
pub const APOLOGY_GENERIC: &str =
    "Sorry, something went wrong on our side. Please try again.";

/// User message synthesized for a location share with no text
const LOCATION_ONLY_TEXT: &str = "I am sharing my location with you.";

/// Fixed instruction text seeded into every new session
pub const SYSTEM_PROMPT: &str = "\
You are Civica, a civic-service assistant for citizens reached over a \
messaging app. You help with three things: checking claims and rumors \
against the official government knowledge base, taking reports of scams and \
other cyber threats, and pointing citizens to official information.

Rules:
- Never state that a claim is true or false from your own knowledge. Always \
call verify_information first, then judge the claim with \
update_verification_status based on what the knowledge base returned.
- When verify_information reports a data gap, tell the citizen the claim \
could not be checked against official sources, and escalate topics that \
matter to many citizens with escalate_information_request.
- For scam or fraud stories, offer to file a report with report_cyber_threat \
and share the reference number. Use check_threat_patterns when the citizen \
gives you a suspicious phone number or account.
- Reply in plain, warm language. Keep answers short; this is a chat, not a \
letter. Use the citizen's language when you can.";

/// Input for one turn of the loop
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub user_id: String,
    pub text: Option<String>,
    pub location: Option<LocationContext>,
    pub media: Option<MediaContext>,
}

/// Drives conversations through the model and the tool registry
pub struct Orchestrator {
    model: Arc<dyn ChatModel>,
    retrieval: Arc<dyn RetrievalIndex>,
    gateway: Arc<dyn OutboundSender>,
    db: Arc<CivicDb>,
    sessions: SessionStore,
    classifier: Arc<dyn JudgmentClassifier>,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        retrieval: Arc<dyn RetrievalIndex>,
        gateway: Arc<dyn OutboundSender>,
        db: Arc<CivicDb>,
        sessions: SessionStore,
        classifier: Arc<dyn JudgmentClassifier>,
    ) -> Self {
        Self {
            model,
            retrieval,
            gateway,
            db,
            sessions,
            classifier,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Run one turn and always come back with a reply string. Errors and
    /// timeouts are logged and mapped to fixed apologies; whatever was
    /// already appended to the transcript stays there.
    pub async fn handle_turn(&self, input: TurnInput) -> String {
        let turn_id = Uuid::new_v4();
        let started = std::time::Instant::now();

        let reply = match tokio::time::timeout(TURN_TIMEOUT, self.run_turn(&input)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                error!(
                    turn = %turn_id,
                    user = %input.user_id,
                    error = %e,
                    "Turn failed"
                );
                APOLOGY_GENERIC.to_string()
            }
            Err(_) => {
                warn!(turn = %turn_id, user = %input.user_id, "Turn timed out");
                APOLOGY_SLOW.to_string()
            }
        };

        info!(
            turn = %turn_id,
            user = %input.user_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Turn complete"
        );
        reply
    }

    async fn run_turn(&self, input: &TurnInput) -> anyhow::Result<String> {
        let envelope = build_envelope(input);

        let (mut messages, created) = self.sessions.get_or_create(&input.user_id).await;
        if created {
            if let Err(e) = self.db.record_session(&input.user_id) {
                warn!(error = %e, "Failed to record session statistics");
            }
        }

        let user_message = ChatMessage::user(envelope);
        self.sessions
            .append(&input.user_id, user_message.clone())
            .await;
        messages.push(user_message);

        let tool_defs = catalog();

        for iteration in 0..MAX_ITERATIONS {
            let outcome: ChatOutcome = self.model.chat(&messages, &tool_defs).await?;

            if outcome.wants_tools() {
                debug!(
                    user = %input.user_id,
                    iteration,
                    tools = outcome.tool_calls.len(),
                    "Model requested tool calls"
                );
                let assistant = ChatMessage::assistant_tool_calls(
                    outcome.content.clone(),
                    outcome.tool_calls.clone(),
                );
                self.sessions.append(&input.user_id, assistant.clone()).await;
                messages.push(assistant);

                let ctx = ToolContext {
                    caller: &input.user_id,
                    location: input.location.as_ref(),
                    media: input.media.as_ref(),
                    db: &self.db,
                    retrieval: self.retrieval.as_ref(),
                    gateway: self.gateway.as_ref(),
                    classifier: self.classifier.as_ref(),
                };

                // Fan out, then reassemble in call-id order; handlers must not
                // assume ordering relative to each other.
                let mut results = join_all(outcome.tool_calls.iter().map(|call| {
                    let ctx = &ctx;
                    async move {
                        let result = dispatch(call, ctx).await;
                        (call.id.clone(), call.function.name.clone(), result)
                    }
                }))
                .await;
                results.sort_by(|a, b| a.0.cmp(&b.0));

                for (call_id, tool_name, result) in results {
                    let tool_message =
                        ChatMessage::tool_result(call_id, tool_name, result.to_json_string());
                    self.sessions
                        .append(&input.user_id, tool_message.clone())
                        .await;
                    messages.push(tool_message);
                }
                continue;
            }

            let reply = outcome
                .content
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("model returned neither content nor tool calls"))?;
            self.sessions
                .append(&input.user_id, ChatMessage::assistant(reply.clone()))
                .await;
            return Ok(reply);
        }

        warn!(user = %input.user_id, "Turn hit the iteration bound");
        Ok(APOLOGY_SLOW.to_string())
    }
}

/// Prefix the raw text with the caller identity and, if present, a
/// structured location tag. A location share with no text gets a synthesized
/// default message.
fn build_envelope(input: &TurnInput) -> String {
    let text = input
        .text
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(LOCATION_ONLY_TEXT);

    let mut envelope = format!("[from {}] {}", input.user_id, text);
    if let Some(location) = &input.location {
        envelope.push_str(&format!(
            "\n[location: {:.4}, {:.4}{}]",
            location.latitude,
            location.longitude,
            location
                .description
                .as_deref()
                .map(|d| format!(" - {}", d))
                .unwrap_or_default()
        ));
    }
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_protocol::{ChatRole, FunctionCall, ToolCallRequest};
    use crate::classifier::RuleBasedClassifier;
    use crate::gateway::RecordingGateway;
    use crate::llm_client::FakeChatModel;
    use crate::retrieval::StaticRetrieval;

    fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }

    fn tools_outcome(calls: Vec<ToolCallRequest>) -> ChatOutcome {
        ChatOutcome {
            content: None,
            tool_calls: calls,
        }
    }

    fn text_outcome(text: &str) -> ChatOutcome {
        ChatOutcome {
            content: Some(text.to_string()),
            tool_calls: vec![],
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        model: Arc<FakeChatModel>,
        db: Arc<CivicDb>,
        sessions: SessionStore,
    }

    fn harness(script: Vec<ChatOutcome>) -> Harness {
        let model = Arc::new(FakeChatModel::new(script));
        let db = Arc::new(CivicDb::open_in_memory().unwrap());
        let sessions = SessionStore::new(SYSTEM_PROMPT);
        let orchestrator = Orchestrator::new(
            model.clone(),
            Arc::new(StaticRetrieval::empty()),
            Arc::new(RecordingGateway::default()),
            db.clone(),
            sessions.clone(),
            Arc::new(RuleBasedClassifier),
        );
        Harness {
            orchestrator,
            model,
            db,
            sessions,
        }
    }

    fn input(text: &str) -> TurnInput {
        TurnInput {
            user_id: "+2348012345678".to_string(),
            text: Some(text.to_string()),
            location: None,
            media: None,
        }
    }

    #[tokio::test]
    async fn plain_reply_appends_assistant_message() {
        let h = harness(vec![text_outcome("Good day! How can I help?")]);
        let reply = h.orchestrator.handle_turn(input("hello")).await;
        assert_eq!(reply, "Good day! How can I help?");

        let (messages, _) = h.sessions.get_or_create("+2348012345678").await;
        assert_eq!(messages.len(), 3); // system, user, assistant
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[1]
            .content
            .as_deref()
            .unwrap()
            .starts_with("[from +2348012345678] hello"));
        assert_eq!(messages[2].role, ChatRole::Assistant);
    }

    #[tokio::test]
    async fn every_requested_tool_call_gets_exactly_one_result() {
        let h = harness(vec![
            tools_outcome(vec![
                tool_call(
                    "call_b",
                    "check_threat_patterns",
                    r#"{"contact_info":"+2348055555555"}"#,
                ),
                tool_call(
                    "call_a",
                    "verify_information",
                    r#"{"claim":"Okada ban","category":"Government Policy"}"#,
                ),
            ]),
            text_outcome("Here is what I found."),
        ]);
        let reply = h.orchestrator.handle_turn(input("is the okada ban real?")).await;
        assert_eq!(reply, "Here is what I found.");

        let (messages, _) = h.sessions.get_or_create("+2348012345678").await;
        let tool_results: Vec<_> = messages
            .iter()
            .filter(|m| m.role == ChatRole::Tool)
            .collect();
        assert_eq!(tool_results.len(), 2);
        // Reassembled in call-id order
        assert_eq!(tool_results[0].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(tool_results[1].tool_call_id.as_deref(), Some("call_b"));
    }

    #[tokio::test]
    async fn loop_stops_at_the_iteration_bound() {
        // Script never stops asking for tools; the last entry repeats
        let h = harness(vec![tools_outcome(vec![tool_call(
            "call_1",
            "check_threat_patterns",
            r#"{"contact_info":"x"}"#,
        )])]);
        let reply = h.orchestrator.handle_turn(input("loop forever")).await;
        assert_eq!(reply, APOLOGY_SLOW);
        assert_eq!(h.model.calls(), MAX_ITERATIONS);

        // Transcript keeps all partial tool exchanges
        let (messages, _) = h.sessions.get_or_create("+2348012345678").await;
        let tool_results = messages.iter().filter(|m| m.role == ChatRole::Tool).count();
        assert_eq!(tool_results, MAX_ITERATIONS);
    }

    #[tokio::test]
    async fn unknown_tool_keeps_the_loop_alive() {
        let h = harness(vec![
            tools_outcome(vec![tool_call("call_1", "summon_unicorn", "{}")]),
            text_outcome("I could not do that, but I can verify claims."),
        ]);
        let reply = h.orchestrator.handle_turn(input("do magic")).await;
        assert_eq!(reply, "I could not do that, but I can verify claims.");

        let (messages, _) = h.sessions.get_or_create("+2348012345678").await;
        let tool_result = messages.iter().find(|m| m.role == ChatRole::Tool).unwrap();
        assert!(tool_result
            .content
            .as_deref()
            .unwrap()
            .contains("unknown_tool"));
    }

    #[tokio::test]
    async fn model_failure_degrades_to_generic_apology() {
        // Empty script: the fake returns an error on the first call
        let h = harness(vec![]);
        let reply = h.orchestrator.handle_turn(input("hello")).await;
        assert_eq!(reply, APOLOGY_GENERIC);

        // The user message from the failed turn is retained
        let (messages, _) = h.sessions.get_or_create("+2348012345678").await;
        assert!(messages.iter().any(|m| m.role == ChatRole::User));
    }

    #[tokio::test]
    async fn verification_turn_writes_through_to_the_store() {
        let h = harness(vec![
            tools_outcome(vec![tool_call(
                "call_1",
                "verify_information",
                r#"{"claim":"Government bans okada bikes","category":"Government Policy"}"#,
            )]),
            text_outcome("I could not confirm that from official sources."),
        ]);
        h.orchestrator.handle_turn(input("okada ban?")).await;

        let stats = h.db.daily_stats(crate::db::today()).unwrap().unwrap();
        assert_eq!(stats.total_verifications, 1);
        // New session counted for the day as well
        assert_eq!(stats.active_users, 1);
    }

    #[test]
    fn envelope_includes_identity_and_location_tag() {
        let envelope = build_envelope(&TurnInput {
            user_id: "+2348012345678".to_string(),
            text: Some("is this flood warning real?".to_string()),
            location: Some(LocationContext {
                latitude: 6.4541,
                longitude: 3.3947,
                description: Some("Lagos Island".to_string()),
            }),
            media: None,
        });
        assert!(envelope.starts_with("[from +2348012345678] is this flood warning real?"));
        assert!(envelope.contains("[location: 6.4541, 3.3947 - Lagos Island]"));
    }

    #[test]
    fn location_share_without_text_synthesizes_a_message() {
        let envelope = build_envelope(&TurnInput {
            user_id: "+2348012345678".to_string(),
            text: None,
            location: Some(LocationContext {
                latitude: 6.0,
                longitude: 3.0,
                description: None,
            }),
            media: None,
        });
        assert!(envelope.contains(LOCATION_ONLY_TEXT));
    }
}
