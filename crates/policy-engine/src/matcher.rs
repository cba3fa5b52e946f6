/// A domain pattern normalised for repeated matching.
///
/// Patterns are lowercased once. A `*.suffix` pattern keeps the suffix with
/// its leading dot so subdomain checks are a single `ends_with`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainPattern {
    /// Matches only the identical hostname.
    Exact(String),
    /// Matches strict subdomains of the base domain, at any depth.
    Wildcard {
        /// `.example.com` for `*.example.com`.
        dotted_suffix: String,
    },
}

impl DomainPattern {
    /// Normalise a raw pattern. No syntax validation is performed; anything
    /// that is not `*.`-prefixed is an exact pattern.
    pub fn parse(pattern: &str) -> Self {
        let lower = pattern.to_lowercase();
        match lower.strip_prefix('*') {
            Some(rest) if rest.starts_with('.') => DomainPattern::Wildcard {
                dotted_suffix: rest.to_string(),
            },
            _ => DomainPattern::Exact(lower),
        }
    }

    /// Test an already-lowercased hostname.
    pub fn matches_lowercase(&self, host: &str) -> bool {
        match self {
            DomainPattern::Exact(domain) => host == domain,
            DomainPattern::Wildcard { dotted_suffix } => {
                // The base domain itself never matches, only names below it.
                host.ends_with(dotted_suffix.as_str()) && host != &dotted_suffix[1..]
            }
        }
    }

    /// Case-insensitive test of `host` against this pattern.
    pub fn matches(&self, host: &str) -> bool {
        self.matches_lowercase(&host.to_lowercase())
    }
}

/// Check whether `host` matches any of `patterns`, case-insensitively.
///
/// * `*.example.com` matches `api.example.com` and `a.b.example.com`, but not
///   `example.com`.
/// * Any other pattern matches only the identical hostname.
pub fn matches_domain<I, S>(host: &str, patterns: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let host = host.to_lowercase();
    patterns
        .into_iter()
        .any(|p| DomainPattern::parse(p.as_ref()).matches_lowercase(&host))
}

/// Return the first pattern in `patterns` that matches an already-lowercased
/// `host`.
pub(crate) fn find_match<'a>(
    host: &str,
    patterns: &'a [(DomainPattern, String)],
) -> Option<&'a str> {
    patterns
        .iter()
        .find(|(compiled, _)| compiled.matches_lowercase(host))
        .map(|(_, raw)| raw.as_str())
}
