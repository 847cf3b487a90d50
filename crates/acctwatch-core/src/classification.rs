//! Response classification policy
//!
//! Maps an HTTP-level response to a [`ProbeOutcome`]. The rule is explicit
//! and configurable because upstream sites disagree on how a removed
//! account looks: some answer `404`, some answer `200` with an apology page.
//!
//! | Response                               | Outcome          |
//! |----------------------------------------|------------------|
//! | 2xx, body contains the removal marker  | `Removed`        |
//! | 2xx, no marker                         | `Active`         |
//! | 404 / 410 (if `not_found_is_removed`)  | `Removed`        |
//! | anything else (429, 5xx, 3xx, 403 ...) | `TransientError` |
//!
//! A rate limit or server error is never recorded as a removal.

use serde::{Deserialize, Serialize};

use crate::traits::ProbeOutcome;

/// Body text shown by the upstream site for unavailable profiles
pub const DEFAULT_REMOVED_MARKER: &str = "Sorry, this page isn't available";

/// Explicit classification rule for probe responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationPolicy {
    /// Substring of a successful body that means "removed"; empty disables
    #[serde(default = "default_removed_marker")]
    pub removed_marker: String,

    /// Treat 404/410 as `Removed` instead of `TransientError`
    #[serde(default = "default_not_found_is_removed")]
    pub not_found_is_removed: bool,
}

impl ClassificationPolicy {
    /// Classify a response by status code and (for 2xx) body
    pub fn classify(&self, status: u16, body: &str) -> ProbeOutcome {
        match status {
            200..=299 => {
                if !self.removed_marker.is_empty() && body.contains(&self.removed_marker) {
                    ProbeOutcome::Removed
                } else {
                    ProbeOutcome::Active
                }
            }
            404 | 410 if self.not_found_is_removed => ProbeOutcome::Removed,
            _ => ProbeOutcome::TransientError,
        }
    }

    /// Whether the body must be read to classify this status
    pub fn needs_body(&self, status: u16) -> bool {
        (200..=299).contains(&status) && !self.removed_marker.is_empty()
    }
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self {
            removed_marker: default_removed_marker(),
            not_found_is_removed: default_not_found_is_removed(),
        }
    }
}

fn default_removed_marker() -> String {
    DEFAULT_REMOVED_MARKER.to_string()
}

fn default_not_found_is_removed() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_table() {
        let policy = ClassificationPolicy::default();

        let cases = [
            (200, "<html>profile</html>", ProbeOutcome::Active),
            (200, "<h2>Sorry, this page isn't available.</h2>", ProbeOutcome::Removed),
            (204, "", ProbeOutcome::Active),
            (404, "", ProbeOutcome::Removed),
            (410, "", ProbeOutcome::Removed),
            (429, "", ProbeOutcome::TransientError),
            (500, "", ProbeOutcome::TransientError),
            (503, "", ProbeOutcome::TransientError),
            (302, "", ProbeOutcome::TransientError),
            (403, "", ProbeOutcome::TransientError),
        ];

        for (status, body, expected) in cases {
            assert_eq!(policy.classify(status, body), expected, "status {}", status);
        }
    }

    #[test]
    fn test_body_only_policy() {
        let policy = ClassificationPolicy {
            not_found_is_removed: false,
            ..ClassificationPolicy::default()
        };

        assert_eq!(policy.classify(404, ""), ProbeOutcome::TransientError);
        assert_eq!(
            policy.classify(200, DEFAULT_REMOVED_MARKER),
            ProbeOutcome::Removed
        );
    }

    #[test]
    fn test_empty_marker_never_reads_body() {
        let policy = ClassificationPolicy {
            removed_marker: String::new(),
            not_found_is_removed: true,
        };

        assert!(!policy.needs_body(200));
        assert_eq!(policy.classify(200, DEFAULT_REMOVED_MARKER), ProbeOutcome::Active);
        assert!(ClassificationPolicy::default().needs_body(200));
        assert!(!ClassificationPolicy::default().needs_body(404));
    }

    #[test]
    fn test_deserialize_defaults() {
        let policy: ClassificationPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, ClassificationPolicy::default());
    }
}
