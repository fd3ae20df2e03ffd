//! Response bodies exchanged over the public HTTPS API.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Generation endpoints
// ---------------------------------------------------------------------------

/// JSON body of a generation endpoint. Exactly one field is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Password {
    /// Passphrase built from dictionary words.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diceware: Option<String>,

    /// Password drawn from a cryptographically secure RNG.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random: Option<String>,

    /// Digits-only PIN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
}

impl Password {
    pub fn diceware(value: impl Into<String>) -> Self {
        Self {
            diceware: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn random(value: impl Into<String>) -> Self {
        Self {
            random: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn pin(value: impl Into<String>) -> Self {
        Self {
            pin: Some(value.into()),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Response body for `GET /v1/metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Random passwords issued.
    pub random: u64,
    /// Diceware passphrases issued.
    pub diceware: u64,
    /// PINs issued.
    pub pin: u64,
    /// Sum of the three counters.
    pub total: u64,
}

impl Metrics {
    /// Build from the per-kind counts; the total saturates instead of wrapping.
    pub fn new(random: u64, diceware: u64, pin: u64) -> Self {
        Self {
            random,
            diceware,
            pin,
            total: random.saturating_add(diceware).saturating_add(pin),
        }
    }
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status code, repeated in the body.
    pub code: u16,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a status code and message.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&crate::ServiceError> for ErrorResponse {
    fn from(err: &crate::ServiceError) -> Self {
        Self::new(err.http_status(), err.message())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Reachability of a backing dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyStatus {
    Online,
    Offline,
}

/// A single dependency entry in the health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub service: String,
    pub status: DependencyStatus,
}

/// Response body for `GET /v1/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Display name of the service.
    pub name: String,
    /// Service version.
    pub version: String,
    /// Status of every backing dependency.
    pub dependencies: Vec<Dependency>,
}
