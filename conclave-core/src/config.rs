use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::digest::VanishedPolicy;

/// Engine configuration shared by embedders and test harnesses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Time a joining node waits for the coordinator's response.
    #[serde(with = "humantime_serde")]
    pub join_timeout: Duration,
    /// Time a leaving node waits for the coordinator's acknowledgement.
    #[serde(with = "humantime_serde")]
    pub leave_timeout: Duration,
    /// Merge protocol tuning parameters.
    pub merge: MergeConfig,
    /// Treatment of digest entries for members that vanish from a newly
    /// installed view. Selected here, explicitly, for every reconcile.
    pub vanished_policy: VanishedPolicy,
    /// Starts a merge automatically when a discarded announcement overlaps
    /// the installed view.
    pub auto_merge: bool,
    /// Capacity of the engine's inbound FIFO queue.
    pub inbound_queue: usize,
    /// Capacity of the upward notification channel.
    pub notify_capacity: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_secs(3),
            leave_timeout: Duration::from_secs(2),
            merge: MergeConfig::default(),
            vanished_policy: VanishedPolicy::Discard,
            auto_merge: true,
            inbound_queue: 256,
            notify_capacity: 64,
        }
    }
}

/// Merge protocol tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// How long the leader collects sub-group states before proceeding
    /// with whoever responded.
    #[serde(with = "humantime_serde")]
    pub collect_timeout: Duration,
    /// How long a non-leader holds membership changes waiting for the
    /// leader's merged view before abandoning the round.
    #[serde(with = "humantime_serde")]
    pub leader_wait_timeout: Duration,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            collect_timeout: Duration::from_secs(2),
            leader_wait_timeout: Duration::from_secs(4),
        }
    }
}
