//! Gateway configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audit::DEFAULT_AUDIT_CAPACITY;
use crate::challenge::{DEFAULT_CHALLENGE_TTL, DEFAULT_MAX_PENDING};

/// Tunables of a [`SessionGateway`](super::SessionGateway).
///
/// Durations are (de)serialized as whole seconds. Missing fields take their
/// default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// How long an issued challenge stays consumable.
    #[serde(with = "secs", rename = "challenge_ttl_secs")]
    pub challenge_ttl: Duration,
    /// How long a rotated-out key keeps verifying. Zero disables overlap.
    #[serde(with = "secs", rename = "rotation_grace_secs")]
    pub rotation_grace: Duration,
    /// Open challenges allowed per client. Zero is treated as one.
    pub max_pending_challenges_per_client: usize,
    pub audit_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            challenge_ttl: DEFAULT_CHALLENGE_TTL,
            rotation_grace: Duration::ZERO,
            max_pending_challenges_per_client: DEFAULT_MAX_PENDING,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }
}

impl GatewayConfig {
    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    pub fn with_rotation_grace(mut self, grace: Duration) -> Self {
        self.rotation_grace = grace;
        self
    }

    pub fn with_max_pending_challenges(mut self, max: usize) -> Self {
        self.max_pending_challenges_per_client = max.max(1);
        self
    }

    pub fn with_audit_capacity(mut self, capacity: usize) -> Self {
        self.audit_capacity = capacity;
        self
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
