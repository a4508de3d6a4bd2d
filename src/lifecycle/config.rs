use std::time::Duration;

use bon::Builder;
use strum_macros::Display;

use super::campaign::CandidatePolicy;
use crate::codec::{Category, EventKind, NotificationEvent};
use crate::protocol::REQUESTED_ATT_MTU;

/// Time allowed for service discovery before the session is abandoned.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
/// Period after notifications are enabled during which event frames are discarded.
pub const DEFAULT_IGNORE_WINDOW: Duration = Duration::from_secs(3);
/// Delay between tearing down a timed-out session and scanning again.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);
/// How long one scan runs without accepting a candidate.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(10);

/// Which decoded events trigger an attribute request on the control point.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Display, clap::ValueEnum)]
#[strum(serialize_all = "kebab-case")]
pub enum AttributeRequestPolicy {
    /// Added events in the social category.
    #[default]
    SocialAdded,
    /// Every added event.
    AllAdded,
    /// Never request attributes.
    Disabled,
}

impl AttributeRequestPolicy {
    #[must_use]
    pub fn should_request(self, event: &NotificationEvent) -> bool {
        let added = event.event_kind() == EventKind::Added;
        match self {
            Self::SocialAdded => added && event.category() == Category::Social,
            Self::AllAdded => added,
            Self::Disabled => false,
        }
    }
}

/// Timing and policy settings for the lifecycle state machine.
#[derive(Debug, Clone, Builder)]
pub struct LifecycleConfig {
    #[builder(default = DEFAULT_DISCOVERY_TIMEOUT)]
    discovery_timeout: Duration,
    #[builder(default = DEFAULT_IGNORE_WINDOW)]
    ignore_window: Duration,
    #[builder(default = DEFAULT_SETTLE_DELAY)]
    settle_delay: Duration,
    #[builder(default = DEFAULT_SCAN_DURATION)]
    scan_duration: Duration,
    #[builder(default = REQUESTED_ATT_MTU)]
    requested_mtu: u16,
    #[builder(default)]
    candidate_policy: CandidatePolicy,
    #[builder(default)]
    attribute_requests: AttributeRequestPolicy,
    /// Resume scanning after any session ends, not only after a timeout.
    #[builder(default)]
    rescan_on_disconnect: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl LifecycleConfig {
    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        self.discovery_timeout
    }

    #[must_use]
    pub fn ignore_window(&self) -> Duration {
        self.ignore_window
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    #[must_use]
    pub fn scan_duration(&self) -> Duration {
        self.scan_duration
    }

    #[must_use]
    pub fn requested_mtu(&self) -> u16 {
        self.requested_mtu
    }

    #[must_use]
    pub fn candidate_policy(&self) -> &CandidatePolicy {
        &self.candidate_policy
    }

    #[must_use]
    pub fn attribute_requests(&self) -> AttributeRequestPolicy {
        self.attribute_requests
    }

    #[must_use]
    pub fn rescan_on_disconnect(&self) -> bool {
        self.rescan_on_disconnect
    }
}
