//! Log message sanitization for deduplicated logging.
//!
//! Remote-tier errors embed endpoints, ports and timestamps that differ
//! between otherwise identical failures. Masking them keeps one line per
//! failure kind.

use once_cell::sync::Lazy;
use regex::Regex;

/// Sanitization rule with regex pattern and placeholder
struct Rule {
    re: Regex,
    placeholder: &'static str,
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    let rule = |pattern: &str, placeholder: &'static str| Rule {
        re: Regex::new(pattern).expect("static sanitizer pattern"),
        placeholder,
    };
    vec![
        // Connection strings first so hosts inside them are not masked twice
        rule(r"\b(?:redis|rediss|https?)://[^\s,;)]+", "<url>"),
        // RFC3339 timestamps
        rule(
            r"\b\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d{1,9})?(?:Z|[+-]\d{2}:\d{2})\b",
            "<ts>",
        ),
        // IPv4 with optional port
        rule(r"\b(?:\d{1,3}\.){3}\d{1,3}(?::\d{1,5})?\b", "<ip4>"),
        // Durations as printed by Debug (e.g. 250ms, 1.5s)
        rule(r"\b\d+(?:\.\d+)?(?:ns|µs|us|ms|s)\b", "<dur>"),
        // Long hex-like IDs (16-64 hex chars)
        rule(r"\b[0-9a-fA-F]{16,64}\b", "<hex>"),
    ]
});

/// Sanitizer applies an ordered set of sanitization rules
pub struct Sanitizer {
    collapse_spaces: bool,
}

/// Options for customizing Sanitizer
pub struct WithCollapseSpaces(pub bool);

impl Sanitizer {
    /// Creates a new log sanitizer
    pub fn new(opts: WithCollapseSpaces) -> Self {
        Self {
            collapse_spaces: opts.0,
        }
    }

    /// Sanitizes a message string according to the configured rules
    pub fn sanitize(&self, err: &str) -> String {
        if err.is_empty() {
            return String::new();
        }

        let mut result = err.to_string();
        for rule in RULES.iter() {
            result = rule.re.replace_all(&result, rule.placeholder).into_owned();
        }

        if self.collapse_spaces {
            result = result.split_whitespace().collect::<Vec<_>>().join(" ");
        }

        result
    }
}
