use std::collections::HashMap;

use tracing::{debug, trace};

use crate::decision::{DecisionReason, PolicyDecision, Verdict};
use crate::matcher::{find_match, DomainPattern};
use crate::schema::{DefaultPolicy, UserRule};

// ---------------------------------------------------------------------------
// Pre-compiled rule representation
// ---------------------------------------------------------------------------

/// A [`UserRule`] with its patterns normalised for evaluation. Only the list
/// that opposes the default policy is kept; the other one can never change
/// the verdict.
#[derive(Debug)]
struct CompiledRule {
    rule: UserRule,
    /// `(compiled, raw)` pairs so decisions can report the configured text.
    overrides: Vec<(DomainPattern, String)>,
}

impl CompiledRule {
    fn compile(rule: UserRule) -> Self {
        let source = match rule.default_policy {
            DefaultPolicy::Deny => &rule.allowlist,
            DefaultPolicy::Allow => &rule.blocklist,
        };
        let overrides = source
            .iter()
            .map(|raw| (DomainPattern::parse(raw), raw.clone()))
            .collect();
        Self { rule, overrides }
    }
}

// ---------------------------------------------------------------------------
// PolicyStore
// ---------------------------------------------------------------------------

/// Immutable mapping from uid to that user's rule.
///
/// Built once and never mutated afterwards, so it can be shared across any
/// number of threads without locking.
#[derive(Debug, Default)]
pub struct PolicyStore {
    rules: HashMap<u32, CompiledRule>,
}

impl PolicyStore {
    /// Build a store from an ordered list of rules. When a uid appears more
    /// than once the last rule supplied for it wins.
    pub fn new(rules: impl IntoIterator<Item = UserRule>) -> Self {
        let mut map = HashMap::new();
        for rule in rules {
            let uid = rule.uid;
            if map.insert(uid, CompiledRule::compile(rule)).is_some() {
                debug!(uid, "duplicate rule for uid; keeping the later one");
            }
        }
        Self { rules: map }
    }

    /// The authoritative rule for `uid`, if one is configured.
    pub fn get(&self, uid: u32) -> Option<&UserRule> {
        self.rules.get(&uid).map(|c| &c.rule)
    }

    /// Number of users with a configured rule.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn compiled(&self, uid: u32) -> Option<&CompiledRule> {
        self.rules.get(&uid)
    }
}

// ---------------------------------------------------------------------------
// PolicyEngine
// ---------------------------------------------------------------------------

/// Evaluates outbound flows against per-user rules.
///
/// Evaluation is a pure function of the store built in [`PolicyEngine::new`];
/// wrap the engine in an `Arc` and call it from as many threads as needed.
pub struct PolicyEngine {
    store: PolicyStore,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("num_users", &self.store.len())
            .finish()
    }
}

impl PolicyEngine {
    /// Create an engine from an ordered list of user rules.
    ///
    /// Later rules overwrite earlier ones for the same uid. Patterns are not
    /// validated; a pattern that can never match simply never matches.
    pub fn new(rules: impl IntoIterator<Item = UserRule>) -> Self {
        Self {
            store: PolicyStore::new(rules),
        }
    }

    /// The underlying rule store.
    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    /// Decide whether a flow from `uid` to `hostname` may proceed.
    ///
    /// Users without a rule are always allowed. An empty hostname is treated
    /// the same as a missing one.
    pub fn evaluate(&self, uid: u32, hostname: Option<&str>) -> Verdict {
        self.decide(uid, hostname).verdict
    }

    /// Like [`evaluate`](Self::evaluate), but also reports why.
    pub fn decide(&self, uid: u32, hostname: Option<&str>) -> PolicyDecision {
        let Some(compiled) = self.store.compiled(uid) else {
            trace!(uid, "no rule for uid; failing open");
            return PolicyDecision::unmatched(Verdict::Allow, DecisionReason::UnknownUser);
        };

        let policy = compiled.rule.default_policy;
        let host = match hostname {
            Some(h) if !h.is_empty() => h.to_lowercase(),
            _ => {
                let verdict = match policy {
                    DefaultPolicy::Deny => Verdict::Deny,
                    DefaultPolicy::Allow => Verdict::Allow,
                };
                return PolicyDecision::unmatched(verdict, DecisionReason::NoHost);
            }
        };

        let hit = find_match(&host, &compiled.overrides);
        let decision = match (policy, hit) {
            (DefaultPolicy::Deny, Some(pattern)) => {
                PolicyDecision::matched(Verdict::Allow, DecisionReason::AllowlistMatch, pattern)
            }
            (DefaultPolicy::Deny, None) => {
                PolicyDecision::unmatched(Verdict::Deny, DecisionReason::DefaultDeny)
            }
            (DefaultPolicy::Allow, Some(pattern)) => {
                PolicyDecision::matched(Verdict::Deny, DecisionReason::BlocklistMatch, pattern)
            }
            (DefaultPolicy::Allow, None) => {
                PolicyDecision::unmatched(Verdict::Allow, DecisionReason::DefaultAllow)
            }
        };

        trace!(
            uid,
            host = %host,
            verdict = %decision.verdict,
            matched = decision.matched_pattern.as_deref(),
            "flow evaluated"
        );
        decision
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
