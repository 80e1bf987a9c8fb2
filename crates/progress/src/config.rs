//! Progress tracking configuration.

use serde::{Deserialize, Serialize};

/// Quiz score needed to pass when the quiz sets none.
pub const PASS_THRESHOLD: u8 = 70;

/// Progress tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Platform-wide passing score (0-100)
    pub pass_threshold: u8,

    /// Whether learner writes need a running subscription
    pub require_subscription: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            pass_threshold: PASS_THRESHOLD,
            require_subscription: true,
        }
    }
}
