use std::fmt;

use serde::{Deserialize, Serialize};

/// The action applied to a single outbound flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Let the flow through.
    Allow,
    /// Drop the flow.
    Deny,
}

impl Verdict {
    /// The lowercase wire form, identical to the serialized value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Deny => "deny",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the engine arrived at a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    /// No rule is configured for the uid; unknown users fail open.
    UnknownUser,
    /// The rule applies, but the flow carried no usable hostname.
    NoHost,
    /// The host matched the user's allowlist under a default-deny policy.
    AllowlistMatch,
    /// The host matched the user's blocklist under a default-allow policy.
    BlocklistMatch,
    /// Nothing in the allowlist matched; the default policy denies.
    DefaultDeny,
    /// Nothing in the blocklist matched; the default policy allows.
    DefaultAllow,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionReason::UnknownUser => "no rule configured for user",
            DecisionReason::NoHost => "flow has no hostname",
            DecisionReason::AllowlistMatch => "host matched allowlist",
            DecisionReason::BlocklistMatch => "host matched blocklist",
            DecisionReason::DefaultDeny => "default policy is deny",
            DecisionReason::DefaultAllow => "default policy is allow",
        };
        f.write_str(s)
    }
}

/// The outcome of evaluating a flow against the policy store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    /// The verdict to apply.
    pub verdict: Verdict,
    /// The configured pattern that matched, if any.
    pub matched_pattern: Option<String>,
    /// Explanation of the decision.
    pub reason: DecisionReason,
}

impl PolicyDecision {
    /// A decision reached without any list match.
    pub fn unmatched(verdict: Verdict, reason: DecisionReason) -> Self {
        Self {
            verdict,
            matched_pattern: None,
            reason,
        }
    }

    /// A decision driven by a matching allowlist or blocklist pattern.
    pub fn matched(verdict: Verdict, reason: DecisionReason, pattern: impl Into<String>) -> Self {
        Self {
            verdict,
            matched_pattern: Some(pattern.into()),
            reason,
        }
    }
}
