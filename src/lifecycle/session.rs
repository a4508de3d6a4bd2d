use std::time::Duration;

use serde_with::SerializeDisplay;
use strum_macros::Display;
use tokio::time::Instant;

use crate::hw::{AncsEndpoints, PeerId};

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Display, SerializeDisplay)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    ServiceDiscovery,
    Subscribing,
    Active,
    TimedOut,
    Disconnected,
}

impl SessionState {
    /// Short progress text shown while the client runs.
    #[must_use]
    pub fn progress_message(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning for ANCS peers",
            Self::Connecting => "connecting",
            Self::ServiceDiscovery => "discovering services",
            Self::Subscribing => "enabling notifications",
            Self::Active => "listening for notifications",
            Self::TimedOut => "service discovery timed out",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Monotonic token that identifies one session or scan campaign.
///
/// Timers carry the generation they were armed for and are ignored once it
/// no longer matches.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, derive_more::Display,
)]
pub struct Generation(u64);

impl Generation {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// State for one connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    peer_id: PeerId,
    generation: Generation,
    state: SessionState,
    service_discovered: bool,
    notify_enabled_at: Option<Instant>,
    data_source_enabled: bool,
    mtu: Option<u16>,
    endpoints: Option<AncsEndpoints>,
    stale_disconnect_pending: bool,
}

impl ConnectionSession {
    pub(crate) fn new(peer_id: PeerId, generation: Generation) -> Self {
        Self {
            peer_id,
            generation,
            state: SessionState::Connecting,
            service_discovered: false,
            notify_enabled_at: None,
            data_source_enabled: false,
            mtu: None,
            endpoints: None,
            stale_disconnect_pending: false,
        }
    }

    /// Marks that the link this session replaced on the same peer has not
    /// reported its disconnect yet.
    pub(crate) fn expect_stale_disconnect(&mut self) {
        self.stale_disconnect_pending = true;
    }

    /// Consumes the pending stale disconnect, if any.
    ///
    /// Once the session is Active the replaced link is assumed gone.
    pub(crate) fn take_stale_disconnect(&mut self) -> bool {
        let pending = self.stale_disconnect_pending && self.state != SessionState::Active;
        self.stale_disconnect_pending = false;
        pending
    }

    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    #[must_use]
    pub fn service_discovered(&self) -> bool {
        self.service_discovered
    }

    /// Records the discovered ANCS endpoints. Only the first call has effect.
    pub(crate) fn mark_service_discovered(&mut self, endpoints: AncsEndpoints) -> bool {
        if self.service_discovered {
            return false;
        }
        self.service_discovered = true;
        self.endpoints = Some(endpoints);
        true
    }

    #[must_use]
    pub fn endpoints(&self) -> Option<&AncsEndpoints> {
        self.endpoints.as_ref()
    }

    #[must_use]
    pub fn notify_enabled_at(&self) -> Option<Instant> {
        self.notify_enabled_at
    }

    pub(crate) fn mark_notify_enabled(&mut self, now: Instant) {
        self.notify_enabled_at.get_or_insert(now);
    }

    #[must_use]
    pub fn data_source_enabled(&self) -> bool {
        self.data_source_enabled
    }

    pub(crate) fn mark_data_source_enabled(&mut self) {
        self.data_source_enabled = true;
    }

    #[must_use]
    pub fn mtu(&self) -> Option<u16> {
        self.mtu
    }

    pub(crate) fn set_mtu(&mut self, mtu: u16) {
        self.mtu = Some(mtu);
    }

    /// Returns whether an event arriving at `now` falls inside the ignore window.
    ///
    /// Events before notifications were enabled are always ignored.
    #[must_use]
    pub fn within_ignore_window(&self, now: Instant, window: Duration) -> bool {
        self.notify_enabled_at
            .is_none_or(|enabled_at| now.saturating_duration_since(enabled_at) < window)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::hw::ancs_service_table;
    use crate::hw::negotiate_ancs_endpoints;

    const WINDOW: Duration = Duration::from_secs(3);

    fn session() -> ConnectionSession {
        ConnectionSession::new(PeerId::from("AA"), Generation::new(1))
    }

    #[test]
    fn events_before_notify_enabled_are_ignored() {
        let session = session();
        assert!(session.within_ignore_window(Instant::now(), WINDOW));
    }

    #[rstest]
    #[case(Duration::ZERO, true)]
    #[case(Duration::from_millis(2_999), true)]
    #[case(WINDOW, false)]
    #[case(Duration::from_millis(3_001), false)]
    fn ignore_window_closes_at_its_end(#[case] elapsed: Duration, #[case] ignored: bool) {
        let enabled_at = Instant::now();
        let mut session = session();
        session.mark_notify_enabled(enabled_at);
        assert_eq!(
            ignored,
            session.within_ignore_window(enabled_at + elapsed, WINDOW)
        );
    }

    #[test]
    fn notify_enabled_timestamp_is_set_once() {
        let first = Instant::now();
        let mut session = session();
        session.mark_notify_enabled(first);
        session.mark_notify_enabled(first + Duration::from_secs(10));
        assert_eq!(Some(first), session.notify_enabled_at());
    }

    #[test]
    fn service_discovery_is_recorded_once() {
        let endpoints =
            negotiate_ancs_endpoints(&ancs_service_table()).expect("ANCS table should resolve");
        let mut session = session();
        assert!(session.mark_service_discovered(endpoints.clone()));
        assert!(!session.mark_service_discovered(endpoints));
        assert!(session.service_discovered());
    }

    #[test]
    fn state_names_are_snake_case() {
        assert_eq!("service_discovery", SessionState::ServiceDiscovery.to_string());
        assert_eq!("timed_out", SessionState::TimedOut.to_string());
    }
}
