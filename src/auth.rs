//! Shared-secret check for the periodic trigger.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::SchedulerError;

/// Verifies trigger secrets against the configured one.
///
/// With no secret configured every trigger is rejected.
#[derive(Clone)]
pub struct TriggerAuth {
    secret: Option<String>,
}

impl TriggerAuth {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(&self, provided: Option<&str>) -> Result<(), SchedulerError> {
        let Some(expected) = self.secret.as_deref() else {
            warn!("Trigger rejected: no trigger secret configured");
            return Err(SchedulerError::Unauthorized);
        };
        match provided {
            Some(candidate) if constant_time_eq(expected, candidate) => Ok(()),
            _ => {
                warn!("Trigger rejected: secret mismatch");
                Err(SchedulerError::Unauthorized)
            }
        }
    }
}

impl std::fmt::Debug for TriggerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerAuth")
            .field("configured", &self.is_configured())
            .finish()
    }
}

/// Compares digests so timing depends on neither content nor length.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let da = Sha256::digest(a.as_bytes());
    let db = Sha256::digest(b.as_bytes());
    da.iter().zip(db.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
