//! # Retry Policy
//!
//! Decides what happens to a queue entry after a failed remote call. Failed
//! entries are rotated to the tail of the queue so the rest of the queue can
//! make progress; entries that keep failing for reasons a retry cannot fix
//! are moved to the dead-letter list instead of rotating forever.
//!
//! | Error class   | Decision                                          |
//! |---------------|---------------------------------------------------|
//! | transient     | always rotate                                     |
//! | permanent     | rotate until `dead_letter_after` attempts         |
//! | unrecoverable | dead-letter on the first failure                  |

use crate::client::remote::{ErrorClass, RemoteError};
use crate::shared::config::{AppConfig, DEFAULT_DEAD_LETTER_AFTER};

/// What to do with a failed entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Move the entry to the tail and try again later
    Rotate,
    /// Park the entry for manual resolution
    DeadLetter { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Permanent failures tolerated before dead-lettering
    pub dead_letter_after: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            dead_letter_after: DEFAULT_DEAD_LETTER_AFTER,
        }
    }
}

impl RetryPolicy {
    pub fn new(dead_letter_after: u32) -> Self {
        Self {
            dead_letter_after: dead_letter_after.max(1),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.dead_letter_after)
    }

    /// Decide after the `attempts`-th failure of an entry
    pub fn decide(&self, attempts: u32, error: &RemoteError) -> RetryDecision {
        if error.is_unrecoverable() {
            return RetryDecision::DeadLetter {
                reason: error.to_string(),
            };
        }
        match error.class() {
            ErrorClass::Transient => RetryDecision::Rotate,
            ErrorClass::Permanent if attempts >= self.dead_letter_after => RetryDecision::DeadLetter {
                reason: format!("gave up after {} attempts: {}", attempts, error),
            },
            ErrorClass::Permanent => RetryDecision::Rotate,
        }
    }
}
