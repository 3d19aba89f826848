//! Error classification for provider failures.
//!
//! [`classify`] maps a raw provider error (an HTTP-ish status code plus a
//! message, or a bare message) to a [`Classification`]: a category, whether
//! the error is worth retrying, and the backoff shape a retry loop should
//! use. The retry collaborator and the penalty controller both consume the
//! same classification, so the function is pure and deterministic: same
//! input, same output, no side effects.

use std::fmt;

/// Maximum length of an unknown error message surfaced to users.
const UNKNOWN_MESSAGE_CAP: usize = 100;

/// Ceiling on any computed backoff delay.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Category of a classified provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Provider rate limiting (HTTP 429 or equivalent).
    RateLimit,
    /// Provider-side overload / capacity exhaustion.
    Capacity,
    /// Request or connection timeout.
    Timeout,
    /// Output failed schema validation downstream.
    SchemaViolation,
    /// Authentication or authorization failure.
    AuthError,
    /// Request rejected as malformed.
    ValidationError,
    /// Context window or token budget exhausted.
    ResourceExhausted,
    /// Transient network failure (connection reset, bad gateway).
    NetworkTransient,
    /// Permanent network failure (refused, unresolvable host).
    NetworkPermanent,
    /// Generic provider-side 5xx failure.
    ProviderError,
    /// Anything the classifier does not recognize.
    Unknown,
}

impl ErrorCategory {
    /// Stable machine-readable tag, also used as the message prefix of
    /// classifier-produced messages so that re-classifying one is stable.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Capacity => "capacity",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::SchemaViolation => "schema_violation",
            ErrorCategory::AuthError => "auth_error",
            ErrorCategory::ValidationError => "validation_error",
            ErrorCategory::ResourceExhausted => "resource_exhausted",
            ErrorCategory::NetworkTransient => "network_transient",
            ErrorCategory::NetworkPermanent => "network_permanent",
            ErrorCategory::ProviderError => "provider_error",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Parses a category tag produced by [`ErrorCategory::as_str`].
    pub fn from_tag(tag: &str) -> Option<ErrorCategory> {
        Some(match tag {
            "rate_limit" => ErrorCategory::RateLimit,
            "capacity" => ErrorCategory::Capacity,
            "timeout" => ErrorCategory::Timeout,
            "schema_violation" => ErrorCategory::SchemaViolation,
            "auth_error" => ErrorCategory::AuthError,
            "validation_error" => ErrorCategory::ValidationError,
            "resource_exhausted" => ErrorCategory::ResourceExhausted,
            "network_transient" => ErrorCategory::NetworkTransient,
            "network_permanent" => ErrorCategory::NetworkPermanent,
            "provider_error" => ErrorCategory::ProviderError,
            "unknown" => ErrorCategory::Unknown,
            _ => return None,
        })
    }

    /// Terminal categories are never retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ErrorCategory::AuthError
                | ErrorCategory::ValidationError
                | ErrorCategory::ResourceExhausted
                | ErrorCategory::NetworkPermanent
                | ErrorCategory::Unknown
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the delay sequence between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Every attempt waits the base delay.
    Fixed,
    /// Attempt `n` waits `base * n`.
    Linear,
    /// Attempt `n` waits `base * 2^(n-1)`, capped at 60 s.
    Exponential,
}

/// A raw error as received from a provider or transport layer.
///
/// Errors arrive either as status-bearing responses or as bare message
/// strings; both shapes normalize into this struct before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawError {
    /// HTTP-like status code, when one exists.
    pub status: Option<u16>,
    /// Human-readable error message.
    pub message: String,
}

impl RawError {
    /// Creates a raw error with a status code.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates a raw error from a bare message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        RawError::message(message)
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        RawError::message(message)
    }
}

/// Result of classifying a raw error.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// The recognized category.
    pub category: ErrorCategory,
    /// Whether a retry loop should attempt the operation again.
    pub retryable: bool,
    /// Maximum number of retries the category warrants. Zero when terminal.
    pub max_retries: u32,
    /// Delay sequence shape between attempts.
    pub backoff: BackoffStrategy,
    /// Base delay fed into the backoff formula.
    pub base_delay_ms: u64,
    /// Normalized message: `"{category}: {original}"` for recognized
    /// categories, the original text (capped at 100 chars) for unknown ones.
    pub message: String,
}

impl Classification {
    /// Computes the delay before the given 1-indexed retry attempt.
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let attempt = attempt.max(1) as u64;
        match self.backoff {
            BackoffStrategy::Fixed => self.base_delay_ms,
            BackoffStrategy::Linear => (self.base_delay_ms * attempt).min(MAX_BACKOFF_MS),
            BackoffStrategy::Exponential => {
                let factor = 1u64 << (attempt - 1).min(16);
                (self.base_delay_ms.saturating_mul(factor)).min(MAX_BACKOFF_MS)
            }
        }
    }
}

fn truncate(message: &str, cap: usize) -> &str {
    match message.char_indices().nth(cap) {
        Some((idx, _)) => &message[..idx],
        None => message,
    }
}

fn build(category: ErrorCategory, original: &str) -> Classification {
    let (retryable, max_retries, backoff, base_delay_ms) = match category {
        ErrorCategory::RateLimit => (true, 4, BackoffStrategy::Exponential, 1_000),
        ErrorCategory::Capacity => (true, 3, BackoffStrategy::Exponential, 1_000),
        ErrorCategory::Timeout => (true, 3, BackoffStrategy::Linear, 5_000),
        ErrorCategory::SchemaViolation => (true, 2, BackoffStrategy::Fixed, 500),
        ErrorCategory::NetworkTransient => (true, 3, BackoffStrategy::Exponential, 1_000),
        ErrorCategory::ProviderError => (true, 2, BackoffStrategy::Exponential, 1_000),
        ErrorCategory::AuthError
        | ErrorCategory::ValidationError
        | ErrorCategory::ResourceExhausted
        | ErrorCategory::NetworkPermanent
        | ErrorCategory::Unknown => (false, 0, BackoffStrategy::Fixed, 0),
    };

    let message = if category == ErrorCategory::Unknown {
        truncate(original, UNKNOWN_MESSAGE_CAP).to_string()
    } else {
        format!(
            "{}: {}",
            category.as_str(),
            truncate(original, UNKNOWN_MESSAGE_CAP)
        )
    };

    Classification {
        category,
        retryable,
        max_retries,
        backoff,
        base_delay_ms,
        message,
    }
}

/// Classifies a raw error into a category plus retry guidance.
///
/// Inspection order: a status code, when present, wins; otherwise the
/// message is searched for well-known substrings; anything unrecognized is
/// `Unknown` and surfaced verbatim (capped at 100 chars).
pub fn classify(err: &RawError) -> Classification {
    let message = err.message.as_str();

    if let Some(status) = err.status {
        return classify_status(status, message);
    }

    // Messages produced by this classifier carry their category as a prefix
    // tag, which keeps re-classification stable.
    if let Some((tag, _rest)) = message.split_once(':') {
        if let Some(category) = ErrorCategory::from_tag(tag.trim()) {
            return build(category, message);
        }
    }

    classify_message(message)
}

fn classify_status(status: u16, message: &str) -> Classification {
    let lowered = message.to_ascii_lowercase();
    match status {
        401 | 403 => build(ErrorCategory::AuthError, message),
        429 => build(ErrorCategory::RateLimit, message),
        408 | 504 => build(ErrorCategory::Timeout, message),
        500 => {
            if lowered.contains("overloaded") || lowered.contains("capacity") {
                build(ErrorCategory::Capacity, message)
            } else {
                build(ErrorCategory::ProviderError, message)
            }
        }
        400 => {
            if lowered.contains("context_length") || lowered.contains("token") {
                build(ErrorCategory::ResourceExhausted, message)
            } else {
                build(ErrorCategory::ValidationError, message)
            }
        }
        502 | 503 => build(ErrorCategory::NetworkTransient, message),
        _ => classify_message(message),
    }
}

fn classify_message(message: &str) -> Classification {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("timeout") {
        build(ErrorCategory::Timeout, message)
    } else if lowered.contains("econnreset") {
        build(ErrorCategory::NetworkTransient, message)
    } else if lowered.contains("rate limit") {
        build(ErrorCategory::RateLimit, message)
    } else if lowered.contains("overloaded") {
        build(ErrorCategory::Capacity, message)
    } else if lowered.contains("econnrefused") || lowered.contains("enotfound") {
        build(ErrorCategory::NetworkPermanent, message)
    } else {
        build(ErrorCategory::Unknown, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_are_terminal() {
        for status in [401, 403] {
            let c = classify(&RawError::with_status(status, "invalid api key"));
            assert_eq!(c.category, ErrorCategory::AuthError);
            assert!(!c.retryable);
            assert_eq!(c.max_retries, 0);
        }
    }

    #[test]
    fn rate_limit_status() {
        let c = classify(&RawError::with_status(429, "slow down"));
        assert_eq!(c.category, ErrorCategory::RateLimit);
        assert!(c.retryable);
        assert_eq!(c.max_retries, 4);
        assert_eq!(c.backoff, BackoffStrategy::Exponential);
        assert_eq!(c.base_delay_ms, 1_000);
    }

    #[test]
    fn timeout_statuses_use_linear_backoff() {
        for status in [408, 504] {
            let c = classify(&RawError::with_status(status, "upstream timed out"));
            assert_eq!(c.category, ErrorCategory::Timeout);
            assert_eq!(c.backoff, BackoffStrategy::Linear);
            assert_eq!(c.base_delay_ms, 5_000);
        }
    }

    #[test]
    fn overloaded_500_is_capacity() {
        let c = classify(&RawError::with_status(500, "Overloaded, try later"));
        assert_eq!(c.category, ErrorCategory::Capacity);

        let c = classify(&RawError::with_status(500, "no capacity available"));
        assert_eq!(c.category, ErrorCategory::Capacity);
    }

    #[test]
    fn plain_500_is_provider_error_with_two_retries() {
        let c = classify(&RawError::with_status(500, "internal error"));
        assert_eq!(c.category, ErrorCategory::ProviderError);
        assert!(c.retryable);
        assert_eq!(c.max_retries, 2);
    }

    #[test]
    fn token_400_is_resource_exhausted() {
        let c = classify(&RawError::with_status(400, "context_length exceeded"));
        assert_eq!(c.category, ErrorCategory::ResourceExhausted);
        assert!(!c.retryable);

        let c = classify(&RawError::with_status(400, "too many tokens"));
        assert_eq!(c.category, ErrorCategory::ResourceExhausted);
    }

    #[test]
    fn plain_400_is_validation() {
        let c = classify(&RawError::with_status(400, "missing field"));
        assert_eq!(c.category, ErrorCategory::ValidationError);
        assert!(!c.retryable);
    }

    #[test]
    fn gateway_statuses_are_transient() {
        for status in [502, 503] {
            let c = classify(&RawError::with_status(status, "bad gateway"));
            assert_eq!(c.category, ErrorCategory::NetworkTransient);
            assert!(c.retryable);
        }
    }

    #[test]
    fn message_fallback_keywords() {
        let cases = [
            ("request timeout after 30s", ErrorCategory::Timeout),
            ("socket hang up: ECONNRESET", ErrorCategory::NetworkTransient),
            ("rate limit reached for model", ErrorCategory::RateLimit),
            ("server overloaded", ErrorCategory::Capacity),
            ("connect ECONNREFUSED 127.0.0.1", ErrorCategory::NetworkPermanent),
            ("getaddrinfo ENOTFOUND api.example", ErrorCategory::NetworkPermanent),
        ];
        for (message, expected) in cases {
            assert_eq!(classify(&RawError::from(message)).category, expected);
        }
    }

    #[test]
    fn unrecognized_message_is_unknown_and_verbatim() {
        let c = classify(&RawError::from("something odd happened"));
        assert_eq!(c.category, ErrorCategory::Unknown);
        assert!(!c.retryable);
        assert_eq!(c.message, "something odd happened");
    }

    #[test]
    fn unknown_message_is_capped_at_100_chars() {
        let long = "x".repeat(250);
        let c = classify(&RawError::from(long.as_str()));
        assert_eq!(c.message.chars().count(), 100);
    }

    #[test]
    fn classification_is_deterministic() {
        let err = RawError::with_status(429, "slow down");
        assert_eq!(classify(&err), classify(&err));
    }

    #[test]
    fn reclassifying_produced_message_keeps_category() {
        let inputs = [
            RawError::with_status(401, "bad key"),
            RawError::with_status(429, "slow down"),
            RawError::with_status(408, "timed out"),
            RawError::with_status(500, "overloaded"),
            RawError::with_status(500, "oops"),
            RawError::with_status(400, "token limit"),
            RawError::with_status(400, "bad request"),
            RawError::with_status(503, "unavailable"),
            RawError::from("ECONNREFUSED"),
            RawError::from("no clue"),
        ];
        for input in inputs {
            let first = classify(&input);
            let second = classify(&RawError::from(first.message.clone()));
            assert_eq!(first.category, second.category, "input: {:?}", input);
        }
    }

    #[test]
    fn delay_formulas() {
        let fixed = build(ErrorCategory::SchemaViolation, "schema");
        assert_eq!(fixed.delay_for(1), 500);
        assert_eq!(fixed.delay_for(3), 500);

        let linear = build(ErrorCategory::Timeout, "timeout");
        assert_eq!(linear.delay_for(1), 5_000);
        assert_eq!(linear.delay_for(2), 10_000);

        let exponential = build(ErrorCategory::RateLimit, "rate limit");
        assert_eq!(exponential.delay_for(1), 1_000);
        assert_eq!(exponential.delay_for(2), 2_000);
        assert_eq!(exponential.delay_for(3), 4_000);
        // capped at 60s
        assert_eq!(exponential.delay_for(10), 60_000);
    }

    #[test]
    fn delay_for_treats_zero_attempt_as_first() {
        let c = build(ErrorCategory::RateLimit, "rate limit");
        assert_eq!(c.delay_for(0), c.delay_for(1));
    }
}
