//! Approval arbiter: consults the risk classifier, then either lets
//! dispatch proceed, rejects, or defers to an out-of-band
//! `resolve_approval(token, decision)` call.

use agent_protocol::ApprovalDecision;
use agent_protocol::ApprovalPolicy;
use agent_protocol::PendingApproval;
use serde_json::Value;
use serde_json::json;

use crate::error::AgentError;
use crate::error::Result;
use crate::risk;
use crate::sink::EventSink;

/// What the engine should do after consulting the arbiter for one tool call.
pub enum Outcome {
    /// No approval needed, or the sink approved synchronously: dispatch now.
    Proceed,
    /// The sink denied synchronously: short-circuit with this result value
    /// instead of dispatching the tool.
    Denied(Value),
    /// The sink deferred: the engine must stop the current run and record
    /// `pending` for a later `resolve_approval` call.
    Deferred(PendingApproval),
}

/// Consults the risk classifier and, if approval is required, the sink.
/// `tool_id` identifies this particular tool call within the conversation
/// (not the approval token, which is minted here on defer).
pub async fn check(
    policy: ApprovalPolicy,
    tool: &str,
    tool_id: &str,
    args: &Value,
    sink: &dyn EventSink,
) -> Outcome {
    let verdict = risk::assess(policy, tool, args);
    if !verdict.need_approval {
        return Outcome::Proceed;
    }

    let token = uuid::Uuid::new_v4().to_string();
    match sink.approval_required(tool, tool_id, &verdict.reason, args, &token).await {
        ApprovalDecision::Approved => Outcome::Proceed,
        ApprovalDecision::Denied => Outcome::Denied(json!({
            "error": "denied",
            "reason": verdict.reason,
        })),
        ApprovalDecision::Deferred => Outcome::Deferred(PendingApproval {
            token,
            tool: tool.to_string(),
            tool_id: tool_id.to_string(),
            args: args.clone(),
        }),
    }
}

/// Consumes `*pending` if `token` matches, returning the record either way
/// (the caller decides what approve/deny means). Errors with
/// `AgentError::Approval` on any mismatch or missing pending approval,
/// Deliberately takes no `approve` flag: a valid deny is a normal
/// outcome (`{"approved": false}`), not an error — only "no matching
/// token" is.
#[expect(clippy::expect_used)]
pub fn resolve(pending: &mut Option<PendingApproval>, token: &str) -> Result<PendingApproval> {
    match pending {
        Some(p) if p.token == token => Ok(pending.take().expect("checked Some above")),
        _ => Err(AgentError::Approval),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::sink::NullSink;
    use async_trait::async_trait;

    struct FixedSink(ApprovalDecision);

    #[async_trait]
    impl EventSink for FixedSink {
        async fn approval_required(
            &self,
            _tool: &str,
            _id: &str,
            _reason: &str,
            _args: &Value,
            _token: &str,
        ) -> ApprovalDecision {
            self.0
        }
    }

    #[tokio::test]
    async fn never_policy_always_proceeds() {
        let outcome = check(ApprovalPolicy::Never, "run_shell", "t1", &json!({"cmd": "rm -rf /"}), &NullSink).await;
        assert!(matches!(outcome, Outcome::Proceed));
    }

    #[tokio::test]
    async fn approved_decision_proceeds() {
        let sink = FixedSink(ApprovalDecision::Approved);
        let outcome = check(ApprovalPolicy::Always, "read_file", "t1", &json!({}), &sink).await;
        assert!(matches!(outcome, Outcome::Proceed));
    }

    #[tokio::test]
    async fn denied_decision_short_circuits() {
        let sink = FixedSink(ApprovalDecision::Denied);
        let outcome = check(ApprovalPolicy::Always, "read_file", "t1", &json!({}), &sink).await;
        assert!(matches!(outcome, Outcome::Denied(_)));
    }

    #[tokio::test]
    async fn deferred_decision_mints_pending() {
        let sink = FixedSink(ApprovalDecision::Deferred);
        let outcome = check(ApprovalPolicy::Always, "read_file", "t1", &json!({}), &sink).await;
        let Outcome::Deferred(pending) = outcome else {
            panic!("expected deferred");
        };
        assert_eq!(pending.tool, "read_file");
        assert_eq!(pending.tool_id, "t1");
    }

    #[test]
    fn resolve_rejects_token_mismatch() {
        let mut pending = Some(PendingApproval {
            token: "abc".to_string(),
            tool: "read_file".to_string(),
            tool_id: "t1".to_string(),
            args: json!({}),
        });
        let result = resolve(&mut pending, "wrong");
        assert!(matches!(result, Err(AgentError::Approval)));
        assert!(pending.is_some());
    }

    #[test]
    fn resolve_rejects_when_nothing_pending() {
        let mut pending: Option<PendingApproval> = None;
        let result = resolve(&mut pending, "abc");
        assert!(matches!(result, Err(AgentError::Approval)));
    }

    #[test]
    fn resolve_consumes_matching_token() {
        let mut pending = Some(PendingApproval {
            token: "abc".to_string(),
            tool: "read_file".to_string(),
            tool_id: "t1".to_string(),
            args: json!({}),
        });
        let result = resolve(&mut pending, "abc").unwrap();
        assert_eq!(result.tool, "read_file");
        assert!(pending.is_none());
    }
}
