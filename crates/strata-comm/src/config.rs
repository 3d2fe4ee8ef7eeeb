//! Transport configuration.

use std::time::Duration;

use crate::error::CommError;

/// Configuration for an [`Endpoint`](crate::Endpoint) mesh.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommConfig {
    /// Longest wait for any message before giving up with
    /// [`CommError::Stalled`]. `None` blocks forever: a peer that never
    /// answers then hangs the whole step. Default: `None`.
    pub stall_timeout: Option<Duration>,
}

impl CommConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), CommError> {
        if self.stall_timeout == Some(Duration::ZERO) {
            return Err(CommError::InvalidConfig {
                reason: "stall_timeout must be positive".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_blocks_forever() {
        let config = CommConfig::default();
        assert_eq!(config.stall_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = CommConfig {
            stall_timeout: Some(Duration::ZERO),
        };
        assert!(matches!(
            config.validate(),
            Err(CommError::InvalidConfig { .. })
        ));
    }
}
