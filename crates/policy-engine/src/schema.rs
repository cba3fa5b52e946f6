use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Sentinel uid reported when the interceptor could not determine who owns a
/// flow. It is never configured, so such flows fail open.
pub const UNKNOWN_UID: u32 = u32::MAX;

/// What to do with a user's flow when no list entry matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultPolicy {
    Allow,
    Deny,
}

/// The rule set for one user: a default policy plus domain overrides.
///
/// Domain patterns are either exact hostnames or `*.`-prefixed wildcards that
/// match strict subdomains. Only the list that opposes the default policy is
/// consulted: `allowlist` under [`DefaultPolicy::Deny`], `blocklist` under
/// [`DefaultPolicy::Allow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRule {
    /// UNIX uid this rule applies to.
    pub uid: u32,
    /// Behaviour when no list entry matches.
    pub default_policy: DefaultPolicy,
    /// Domains explicitly allowed under a default-deny policy.
    pub allowlist: HashSet<String>,
    /// Domains explicitly blocked under a default-allow policy.
    pub blocklist: HashSet<String>,
}

impl UserRule {
    /// A rule with empty lists.
    pub fn new(uid: u32, default_policy: DefaultPolicy) -> Self {
        Self {
            uid,
            default_policy,
            allowlist: HashSet::new(),
            blocklist: HashSet::new(),
        }
    }

    /// Default-deny rule that only lets `allow` through.
    pub fn default_deny<I, S>(uid: u32, allow: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(uid, DefaultPolicy::Deny).with_allowlist(allow)
    }

    /// Default-allow rule that drops everything in `block`.
    pub fn default_allow<I, S>(uid: u32, block: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(uid, DefaultPolicy::Allow).with_blocklist(block)
    }

    /// Add domains to the allowlist, consuming and returning `self`.
    pub fn with_allowlist<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist.extend(domains.into_iter().map(Into::into));
        self
    }

    /// Add domains to the blocklist, consuming and returning `self`.
    pub fn with_blocklist<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocklist.extend(domains.into_iter().map(Into::into));
        self
    }
}
