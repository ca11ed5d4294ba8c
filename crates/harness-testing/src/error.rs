//! Assertion failures.

use thiserror::Error;

/// Note appended when a plain value fails, since it is never retried.
pub const SIMPLE_VALUE_NOTE: &str = " (the value was not retried as it is a plain value)";

/// Why an assertion over a deferred value failed.
///
/// Every variant names the deferred and the matcher, and embeds the last
/// observed value or failure rather than a bare timeout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssertionError {
    /// Values were resolved but none satisfied the matcher in time.
    #[error(
        "Matcher [{matcher}] failed to match last resolved value [{value}] for [{deferred}] due to {mismatch}{note}"
    )]
    Mismatch {
        deferred: String,
        matcher: String,
        value: String,
        mismatch: String,
        attempts: u32,
        note: String,
    },

    /// No value could be resolved in time.
    #[error(
        "Failed to resolve a value for [{deferred}] to evaluate with matcher [{matcher}]{}",
        last_error_suffix(.last_error)
    )]
    Unresolved {
        deferred: String,
        matcher: String,
        last_error: Option<String>,
    },

    /// The deferred reported it will never resolve.
    #[error("[{deferred}] became permanently unavailable while evaluating matcher [{matcher}]: {cause}")]
    PermanentlyUnavailable {
        deferred: String,
        matcher: String,
        cause: String,
    },

    /// A value violated a matcher that had to hold on every attempt.
    #[error(
        "Matcher [{matcher}] was violated by [{value}] for [{deferred}] due to {mismatch} (attempted {attempts} time(s), succeeded {succeeded} time(s))"
    )]
    Violated {
        deferred: String,
        matcher: String,
        value: String,
        mismatch: String,
        attempts: u32,
        succeeded: u32,
    },

    /// The polling loop was interrupted before reaching a verdict.
    #[error("Assertion of [{deferred}] with matcher [{matcher}] was interrupted after {attempts} attempt(s)")]
    Interrupted {
        deferred: String,
        matcher: String,
        attempts: u32,
    },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!(", last failure: {e}"))
        .unwrap_or_default()
}

impl AssertionError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, AssertionError::Interrupted { .. })
    }

    /// Description of the deferred the assertion was about.
    pub fn deferred(&self) -> &str {
        match self {
            AssertionError::Mismatch { deferred, .. }
            | AssertionError::Unresolved { deferred, .. }
            | AssertionError::PermanentlyUnavailable { deferred, .. }
            | AssertionError::Violated { deferred, .. }
            | AssertionError::Interrupted { deferred, .. } => deferred,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_embeds_last_value() {
        let error = AssertionError::Mismatch {
            deferred: "counter".to_string(),
            matcher: "is 3".to_string(),
            value: "2".to_string(),
            mismatch: "was 2".to_string(),
            attempts: 4,
            note: String::new(),
        };

        assert_eq!(
            error.to_string(),
            "Matcher [is 3] failed to match last resolved value [2] for [counter] due to was 2"
        );
    }

    #[test]
    fn test_unresolved_mentions_last_failure() {
        let error = AssertionError::Unresolved {
            deferred: "server".to_string(),
            matcher: "is true".to_string(),
            last_error: Some("connection refused".to_string()),
        };

        let message = error.to_string();
        assert!(message.starts_with("Failed to resolve a value for [server]"));
        assert!(message.ends_with("last failure: connection refused"));
        assert!(!error.is_interrupted());
        assert_eq!(error.deferred(), "server");
    }
}
