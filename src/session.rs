//! Backend session identity
//!
//! A session scopes the exchange history held by the backend. The id is an
//! opaque string created once per client lifetime; clearing the conversation
//! drops the backend-side history but keeps the same id.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of the random suffix appended to the timestamp
const SUFFIX_LEN: usize = 8;

/// Opaque session identifier scoping exchange history on the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
}

impl Session {
    /// Create a session with a freshly generated id
    ///
    /// Uniqueness is best-effort (millisecond timestamp plus a random
    /// alphanumeric suffix), not cryptographic.
    #[must_use]
    pub fn new() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();

        Self {
            id: format!("{}-{}", chrono::Utc::now().timestamp_millis(), suffix),
        }
    }

    /// Wrap an existing id (e.g. one assigned by the backend)
    #[must_use]
    pub fn from_id(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// The opaque id value
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
