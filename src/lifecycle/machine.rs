use std::time::Duration;

use strum_macros::Display;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use super::campaign::ScanCampaign;
use super::config::LifecycleConfig;
use super::output::{ClientOutput, SessionFailure, StateChange, StatusUpdate};
use super::session::{ConnectionSession, Generation, SessionState};
use crate::assembler::parse_response;
use crate::codec::decode_event;
use crate::command::CommandBuilder;
use crate::hw::{
    ConnectionChange, DiscoveredPeer, GattStatus, PeerId, ServiceInfo, TransportEvent,
    negotiate_ancs_endpoints,
};
use crate::protocol::EndpointId;

/// Software timers owned by the lifecycle.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TimerKind {
    ScanDuration,
    DiscoveryTimeout,
    Settle,
}

/// Requests issued by the application.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ClientCommand {
    /// Starts a fresh campaign, forgetting previously tried peers.
    StartScan,
    StopScan,
    /// Connects to a known peer, superseding any live session.
    ConnectTo(PeerId),
    /// Ends the live session without marking the peer as tried.
    Disconnect,
}

/// Everything the state machine reacts to, applied one at a time.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Input {
    Command(ClientCommand),
    Transport(TransportEvent),
    TimerFired {
        timer: TimerKind,
        generation: Generation,
    },
}

/// An [`Input`] stamped with the instant it entered the client's queue.
///
/// The driver applies it at `queued_at`, not at the moment it is dequeued.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct QueuedInput {
    pub(crate) input: Input,
    pub(crate) queued_at: Instant,
}

impl QueuedInput {
    pub(crate) fn now(input: Input) -> Self {
        Self {
            input,
            queued_at: Instant::now(),
        }
    }
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Action {
    StartScan,
    StopScan,
    Connect(PeerId),
    Disconnect(PeerId),
    RequestMtu {
        peer: PeerId,
        mtu: u16,
    },
    DiscoverServices(PeerId),
    Subscribe {
        peer: PeerId,
        endpoint: EndpointId,
    },
    Write {
        peer: PeerId,
        endpoint: EndpointId,
        payload: Vec<u8>,
    },
    ArmTimer {
        timer: TimerKind,
        generation: Generation,
        after: Duration,
    },
    CancelTimer(TimerKind),
    Publish(ClientOutput),
}

/// Connection lifecycle for a single ANCS session at a time.
///
/// The machine performs no I/O. Each [`Input`] is applied atomically and
/// yields the [`Action`]s the driver must carry out, in order.
#[derive(Debug)]
pub struct LifecycleMachine {
    config: LifecycleConfig,
    campaign: ScanCampaign,
    session: Option<ConnectionSession>,
    state: SessionState,
    last_generation: u64,
    pending_resume: Option<Generation>,
}

impl LifecycleMachine {
    #[must_use]
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            config,
            campaign: ScanCampaign::default(),
            session: None,
            state: SessionState::Idle,
            last_generation: 0,
            pending_resume: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn session(&self) -> Option<&ConnectionSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn campaign(&self) -> &ScanCampaign {
        &self.campaign
    }

    #[must_use]
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Applies one input observed at `now`.
    #[instrument(skip_all, level = "debug", fields(state = %self.state))]
    pub fn handle(&mut self, input: Input, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        match input {
            Input::Command(command) => self.on_command(command, &mut actions),
            Input::TimerFired { timer, generation } => {
                self.on_timer(timer, generation, &mut actions);
            }
            Input::Transport(event) => self.on_transport(event, now, &mut actions),
        }
        actions
    }

    fn next_generation(&mut self) -> Generation {
        self.last_generation += 1;
        Generation::new(self.last_generation)
    }

    fn on_command(&mut self, command: ClientCommand, actions: &mut Vec<Action>) {
        match command {
            ClientCommand::StartScan => self.start_scan(true, actions),
            ClientCommand::StopScan => {
                self.pending_resume = None;
                if self.stop_scan(actions) && self.session.is_none() {
                    self.transition(SessionState::Idle, actions);
                }
            }
            ClientCommand::ConnectTo(peer) => {
                self.stop_scan(actions);
                self.start_session(peer, actions);
            }
            ClientCommand::Disconnect => self.end_session(None, false, actions),
        }
    }

    fn on_timer(&mut self, timer: TimerKind, generation: Generation, actions: &mut Vec<Action>) {
        match timer {
            TimerKind::ScanDuration => {
                if self.campaign.scan_generation() != Some(generation) {
                    trace!(%generation, "ignoring stale scan timer");
                    return;
                }
                info!("scan finished without an acceptable candidate");
                self.stop_scan(actions);
                publish(actions, StatusUpdate::ScanFinished);
                self.transition(SessionState::Idle, actions);
            }
            TimerKind::DiscoveryTimeout => {
                let live = self.session.as_ref().filter(|session| {
                    session.generation() == generation
                        && session.state() == SessionState::ServiceDiscovery
                        && !session.service_discovered()
                });
                let Some(session) = live else {
                    trace!(%generation, "ignoring stale discovery timer");
                    return;
                };
                warn!(peer = %session.peer_id(), "service discovery timed out");
                self.transition(SessionState::TimedOut, actions);
                self.end_session(Some(SessionFailure::Timeout), true, actions);
            }
            TimerKind::Settle => {
                if self.pending_resume != Some(generation) {
                    trace!(%generation, "ignoring stale settle timer");
                    return;
                }
                self.pending_resume = None;
                if self.session.is_some() || self.campaign.is_scanning() {
                    debug!("scan or session already active; not resuming");
                    return;
                }
                info!("resuming scan after settle delay");
                self.start_scan(false, actions);
            }
        }
    }

    fn on_transport(&mut self, event: TransportEvent, now: Instant, actions: &mut Vec<Action>) {
        match event {
            TransportEvent::ScanResult(advert) => self.on_scan_result(&advert, actions),
            TransportEvent::ScanFailed { reason } => {
                if !self.campaign.is_scanning() {
                    return;
                }
                warn!(%reason, "scan failed");
                self.campaign.stop();
                actions.push(Action::CancelTimer(TimerKind::ScanDuration));
                publish(actions, StatusUpdate::ScanFailed { reason });
                if self.session.is_none() {
                    self.transition(SessionState::Idle, actions);
                }
            }
            TransportEvent::ConnectionState { peer, change } => {
                self.on_connection_state(&peer, change, actions);
            }
            TransportEvent::ServicesDiscovered { peer, outcome } => {
                self.on_services_discovered(&peer, outcome, actions);
            }
            TransportEvent::SubscriptionWritten {
                peer,
                endpoint,
                status,
            } => self.on_subscription_written(&peer, endpoint, status, now, actions),
            TransportEvent::CharacteristicWritten {
                peer,
                endpoint,
                status,
            } => {
                if self.live_state(&peer).is_none() {
                    return;
                }
                match status {
                    GattStatus::Success => trace!(%endpoint, "characteristic write acknowledged"),
                    GattStatus::Failure(reason) => {
                        warn!(%endpoint, %reason, "characteristic write failed");
                        publish(actions, StatusUpdate::WriteFailed { endpoint, reason });
                    }
                }
            }
            TransportEvent::CharacteristicChanged {
                peer,
                endpoint,
                value,
            } => {
                if self.live_state(&peer).is_none() {
                    return;
                }
                match endpoint {
                    EndpointId::NotificationSource => self.on_event_frame(&value, now, actions),
                    EndpointId::DataSource => self.on_response_frame(&value, actions),
                    EndpointId::ControlPoint | EndpointId::AncsService => {
                        trace!(%endpoint, "ignoring change on non-notifying endpoint");
                    }
                }
            }
            TransportEvent::MtuChanged { peer, mtu, status } => {
                if self.live_state(&peer).is_none() {
                    return;
                }
                match status {
                    GattStatus::Success => {
                        if let Some(session) = self.session.as_mut() {
                            session.set_mtu(mtu);
                        }
                        info!(mtu, "ATT MTU negotiated");
                        publish(actions, StatusUpdate::MtuChanged { mtu });
                    }
                    GattStatus::Failure(reason) => warn!(%reason, "MTU negotiation failed"),
                }
            }
        }
    }

    fn on_scan_result(&mut self, advert: &DiscoveredPeer, actions: &mut Vec<Action>) {
        if !self.campaign.is_scanning() {
            trace!(peer = %advert.peer_id(), "ignoring scan result outside a scan");
            return;
        }
        if !self
            .config
            .candidate_policy()
            .accepts_advert(advert, self.campaign.tried_peers())
        {
            trace!(peer = %advert.peer_id(), name = ?advert.local_name(), "skipping scan result");
            return;
        }

        info!(peer = %advert.peer_id(), name = ?advert.local_name(), "accepted ANCS candidate");
        publish(
            actions,
            StatusUpdate::CandidateAccepted {
                peer: advert.peer_id().clone(),
                name: advert.local_name().map(str::to_owned),
                rssi: advert.rssi(),
            },
        );
        self.stop_scan(actions);
        self.start_session(advert.peer_id().clone(), actions);
    }

    fn on_connection_state(
        &mut self,
        peer: &PeerId,
        change: ConnectionChange,
        actions: &mut Vec<Action>,
    ) {
        let Some((state, generation)) = self
            .session
            .as_ref()
            .filter(|session| session.peer_id() == peer)
            .map(|session| (session.state(), session.generation()))
        else {
            debug!(%peer, ?change, "ignoring connection change for a peer without a session");
            return;
        };

        match change {
            ConnectionChange::Connected if state == SessionState::Connecting => {
                self.transition(SessionState::ServiceDiscovery, actions);
                actions.push(Action::RequestMtu {
                    peer: peer.clone(),
                    mtu: self.config.requested_mtu(),
                });
                actions.push(Action::DiscoverServices(peer.clone()));
                actions.push(Action::ArmTimer {
                    timer: TimerKind::DiscoveryTimeout,
                    generation,
                    after: self.config.discovery_timeout(),
                });
            }
            ConnectionChange::Connected => debug!(%state, "ignoring repeated connected callback"),
            ConnectionChange::ConnectFailed { reason } => {
                self.end_session(Some(SessionFailure::ConnectFailed { reason }), true, actions);
            }
            ConnectionChange::Disconnected => {
                if self
                    .session
                    .as_mut()
                    .is_some_and(ConnectionSession::take_stale_disconnect)
                {
                    debug!(%peer, %state, "ignoring disconnect of the superseded link");
                    return;
                }
                let mark_tried = state != SessionState::Active;
                self.end_session(Some(SessionFailure::LinkLost), mark_tried, actions);
            }
        }
    }

    fn on_services_discovered(
        &mut self,
        peer: &PeerId,
        outcome: Result<Vec<ServiceInfo>, String>,
        actions: &mut Vec<Action>,
    ) {
        if self.live_state(peer) != Some(SessionState::ServiceDiscovery) {
            debug!(%peer, "ignoring service discovery outside the discovery state");
            return;
        }

        let services = match outcome {
            Ok(services) => services,
            Err(reason) => {
                self.end_session(Some(SessionFailure::DiscoveryFailed { reason }), true, actions);
                return;
            }
        };

        match negotiate_ancs_endpoints(&services) {
            Ok(endpoints) => {
                if let Some(session) = self.session.as_mut() {
                    session.mark_service_discovered(endpoints);
                }
                actions.push(Action::CancelTimer(TimerKind::DiscoveryTimeout));
                self.transition(SessionState::Subscribing, actions);
                for endpoint in [EndpointId::NotificationSource, EndpointId::DataSource] {
                    actions.push(Action::Subscribe {
                        peer: peer.clone(),
                        endpoint,
                    });
                }
            }
            Err(error) => {
                let failure = SessionFailure::ServiceMissing {
                    missing: error.to_string(),
                };
                self.end_session(Some(failure), true, actions);
            }
        }
    }

    fn on_subscription_written(
        &mut self,
        peer: &PeerId,
        endpoint: EndpointId,
        status: GattStatus,
        now: Instant,
        actions: &mut Vec<Action>,
    ) {
        let Some(state) = self.live_state(peer) else {
            return;
        };
        if !matches!(state, SessionState::Subscribing | SessionState::Active) {
            debug!(%state, %endpoint, "ignoring subscription result");
            return;
        }

        if let GattStatus::Failure(reason) = status {
            let failure = SessionFailure::SubscribeFailed {
                reason: format!("{endpoint}: {reason}"),
            };
            self.end_session(Some(failure), state != SessionState::Active, actions);
            return;
        }

        match endpoint {
            EndpointId::NotificationSource if state == SessionState::Subscribing => {
                if let Some(session) = self.session.as_mut() {
                    session.mark_notify_enabled(now);
                }
                self.transition(SessionState::Active, actions);
            }
            EndpointId::DataSource => {
                if let Some(session) = self.session.as_mut() {
                    session.mark_data_source_enabled();
                }
                publish(actions, StatusUpdate::DataSourceEnabled);
            }
            _ => trace!(%endpoint, "ignoring duplicate subscription result"),
        }
    }

    fn on_event_frame(&mut self, frame: &[u8], now: Instant, actions: &mut Vec<Action>) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.state() != SessionState::Active
            || session.within_ignore_window(now, self.config.ignore_window())
        {
            debug!(frame_len = frame.len(), "discarding event frame inside ignore window");
            publish(
                actions,
                StatusUpdate::EventIgnored {
                    frame_len: frame.len(),
                },
            );
            return;
        }

        let event = match decode_event(frame) {
            Ok(event) => event,
            Err(error) => {
                warn!(%error, "rejecting event frame");
                publish(
                    actions,
                    StatusUpdate::FrameRejected {
                        endpoint: EndpointId::NotificationSource,
                        reason: error.to_string(),
                    },
                );
                return;
            }
        };

        debug!(
            uid = event.notification_uid(),
            kind = %event.event_kind(),
            category = %event.category(),
            "decoded notification event"
        );
        let peer = session.peer_id().clone();
        actions.push(Action::Publish(ClientOutput::Event(event)));

        if self.config.attribute_requests().should_request(&event) {
            let notification_uid = event.notification_uid();
            actions.push(Action::Write {
                peer,
                endpoint: EndpointId::ControlPoint,
                payload: CommandBuilder::build_get_attributes_command(notification_uid).to_vec(),
            });
            publish(actions, StatusUpdate::AttributesRequested { notification_uid });
        }
    }

    fn on_response_frame(&mut self, frame: &[u8], actions: &mut Vec<Action>) {
        match parse_response(frame) {
            Ok(record) => {
                debug!(
                    uid = record.notification_uid(),
                    attributes = record.attributes().len(),
                    "assembled attribute record"
                );
                actions.push(Action::Publish(ClientOutput::Record(record)));
            }
            Err(error) => {
                warn!(%error, "rejecting attribute response");
                publish(
                    actions,
                    StatusUpdate::FrameRejected {
                        endpoint: EndpointId::DataSource,
                        reason: error.to_string(),
                    },
                );
            }
        }
    }

    fn start_scan(&mut self, fresh: bool, actions: &mut Vec<Action>) {
        if self.campaign.is_scanning() {
            debug!("scan already running");
            return;
        }
        if let Some(session) = &self.session {
            warn!(peer = %session.peer_id(), "ignoring scan request while a session is live");
            return;
        }

        let generation = self.next_generation();
        if fresh {
            self.campaign.begin(generation);
        } else {
            self.campaign.resume(generation);
        }
        self.pending_resume = None;
        actions.push(Action::StartScan);
        actions.push(Action::ArmTimer {
            timer: TimerKind::ScanDuration,
            generation,
            after: self.config.scan_duration(),
        });
        self.transition(SessionState::Scanning, actions);
    }

    fn stop_scan(&mut self, actions: &mut Vec<Action>) -> bool {
        if !self.campaign.is_scanning() {
            return false;
        }
        self.campaign.stop();
        actions.push(Action::CancelTimer(TimerKind::ScanDuration));
        actions.push(Action::StopScan);
        true
    }

    fn start_session(&mut self, peer: PeerId, actions: &mut Vec<Action>) {
        let mut reconnecting = false;
        if let Some(previous) = self.session.take() {
            info!(previous = %previous.peer_id(), %peer, "superseding previous session");
            reconnecting = *previous.peer_id() == peer;
            actions.push(Action::CancelTimer(TimerKind::DiscoveryTimeout));
            actions.push(Action::Disconnect(previous.peer_id().clone()));
        }

        let generation = self.next_generation();
        self.pending_resume = None;
        let mut session = ConnectionSession::new(peer.clone(), generation);
        if reconnecting {
            session.expect_stale_disconnect();
        }
        self.session = Some(session);
        actions.push(Action::Connect(peer));
        self.transition(SessionState::Connecting, actions);
    }

    fn end_session(
        &mut self,
        failure: Option<SessionFailure>,
        mark_tried: bool,
        actions: &mut Vec<Action>,
    ) {
        let Some((peer, generation)) = self
            .session
            .as_ref()
            .map(|session| (session.peer_id().clone(), session.generation()))
        else {
            return;
        };

        actions.push(Action::CancelTimer(TimerKind::DiscoveryTimeout));
        if mark_tried {
            self.campaign.mark_tried(peer.clone());
        }
        let timed_out = failure == Some(SessionFailure::Timeout);
        if let Some(failure) = failure {
            warn!(%peer, %failure, "session ended");
            publish(
                actions,
                StatusUpdate::SessionFailed {
                    peer: peer.clone(),
                    failure,
                },
            );
        }

        actions.push(Action::Disconnect(peer));
        self.transition(SessionState::Disconnected, actions);
        self.session = None;
        self.transition(SessionState::Idle, actions);

        if timed_out {
            self.pending_resume = Some(generation);
            actions.push(Action::ArmTimer {
                timer: TimerKind::Settle,
                generation,
                after: self.config.settle_delay(),
            });
        } else if self.config.rescan_on_disconnect() {
            self.start_scan(false, actions);
        }
    }

    fn live_state(&self, peer: &PeerId) -> Option<SessionState> {
        self.session
            .as_ref()
            .filter(|session| session.peer_id() == peer)
            .map(ConnectionSession::state)
    }

    fn transition(&mut self, state: SessionState, actions: &mut Vec<Action>) {
        let peer = self.session.as_mut().map(|session| {
            session.set_state(state);
            session.peer_id().clone()
        });
        info!(from = %self.state, to = %state, "lifecycle transition");
        self.state = state;
        actions.push(Action::Publish(ClientOutput::State(StateChange {
            state,
            peer,
        })));
    }
}

fn publish(actions: &mut Vec<Action>, status: StatusUpdate) {
    actions.push(Action::Publish(ClientOutput::Status(status)));
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::codec::{Category, EventFlags, EventKind, NotificationEvent};
    use crate::hw::ancs_service_table;

    const T0_OFFSET: Duration = Duration::from_secs(100);

    struct Harness {
        machine: LifecycleMachine,
        now: Instant,
    }

    impl Harness {
        fn new(config: LifecycleConfig) -> Self {
            Self {
                machine: LifecycleMachine::new(config),
                now: Instant::now() + T0_OFFSET,
            }
        }

        fn advance(&mut self, by: Duration) {
            self.now += by;
        }

        fn feed(&mut self, input: Input) -> Vec<Action> {
            self.machine.handle(input, self.now)
        }

        fn command(&mut self, command: ClientCommand) -> Vec<Action> {
            self.feed(Input::Command(command))
        }

        fn transport(&mut self, event: TransportEvent) -> Vec<Action> {
            self.feed(Input::Transport(event))
        }

        fn advertise(&mut self, peer: &str, name: &str) -> Vec<Action> {
            self.transport(TransportEvent::ScanResult(DiscoveredPeer::new(
                peer.into(),
                Some(name.to_string()),
                Some(-50),
            )))
        }

        fn connected(&mut self, peer: &str) -> Vec<Action> {
            self.transport(TransportEvent::ConnectionState {
                peer: peer.into(),
                change: ConnectionChange::Connected,
            })
        }

        fn discovered(&mut self, peer: &str, services: Vec<ServiceInfo>) -> Vec<Action> {
            self.transport(TransportEvent::ServicesDiscovered {
                peer: peer.into(),
                outcome: Ok(services),
            })
        }

        fn subscribed(&mut self, peer: &str, endpoint: EndpointId) -> Vec<Action> {
            self.transport(TransportEvent::SubscriptionWritten {
                peer: peer.into(),
                endpoint,
                status: GattStatus::Success,
            })
        }

        fn frame(&mut self, peer: &str, endpoint: EndpointId, value: &[u8]) -> Vec<Action> {
            self.transport(TransportEvent::CharacteristicChanged {
                peer: peer.into(),
                endpoint,
                value: value.to_vec(),
            })
        }

        fn fire(&mut self, timer: TimerKind, generation: Generation) -> Vec<Action> {
            self.feed(Input::TimerFired { timer, generation })
        }

        /// Drives a fresh scan through to an active session with `peer`.
        fn activate(&mut self, peer: &str) -> Vec<Action> {
            self.command(ClientCommand::StartScan);
            self.advertise(peer, "ancs-phone");
            self.connected(peer);
            self.discovered(peer, ancs_service_table());
            self.subscribed(peer, EndpointId::DataSource);
            self.subscribed(peer, EndpointId::NotificationSource)
        }
    }

    fn harness() -> Harness {
        Harness::new(LifecycleConfig::default())
    }

    fn states(actions: &[Action]) -> Vec<SessionState> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::Publish(ClientOutput::State(change)) => Some(change.state),
                _ => None,
            })
            .collect()
    }

    fn statuses(actions: &[Action]) -> Vec<&StatusUpdate> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::Publish(ClientOutput::Status(status)) => Some(status),
                _ => None,
            })
            .collect()
    }

    fn armed(actions: &[Action], kind: TimerKind) -> Option<(Generation, Duration)> {
        actions.iter().find_map(|action| match action {
            Action::ArmTimer {
                timer,
                generation,
                after,
            } if *timer == kind => Some((*generation, *after)),
            _ => None,
        })
    }

    fn event_frame(kind: EventKind, category: Category, uid: u32) -> [u8; 8] {
        NotificationEvent::new(kind, EventFlags::empty(), category, 1, uid).encode()
    }

    #[test]
    fn start_scan_arms_scan_timer() {
        let mut harness = harness();
        let actions = harness.command(ClientCommand::StartScan);

        assert_eq!(Action::StartScan, actions[0]);
        assert_eq!(
            Some(Duration::from_secs(10)),
            armed(&actions, TimerKind::ScanDuration).map(|(_, after)| after)
        );
        assert_eq!(vec![SessionState::Scanning], states(&actions));
        assert!(harness.machine.campaign().is_scanning());
    }

    #[test]
    fn accepted_candidate_stops_scan_and_connects() {
        let mut harness = harness();
        harness.command(ClientCommand::StartScan);
        let actions = harness.advertise("AA", "My-ancs-Watch");

        assert!(actions.contains(&Action::StopScan));
        assert!(actions.contains(&Action::Connect("AA".into())));
        assert_eq!(vec![SessionState::Connecting], states(&actions));
        assert_matches!(
            statuses(&actions)[..],
            [StatusUpdate::CandidateAccepted { peer, .. }] if peer.as_str() == "AA"
        );
        assert!(!harness.machine.campaign().is_scanning());
    }

    #[rstest]
    #[case("Speaker")]
    #[case("")]
    fn non_matching_scan_results_are_skipped(#[case] name: &str) {
        let mut harness = harness();
        harness.command(ClientCommand::StartScan);
        assert!(harness.advertise("AA", name).is_empty());
        assert_eq!(SessionState::Scanning, harness.machine.state());
    }

    #[test]
    fn scan_results_outside_a_scan_are_ignored() {
        let mut harness = harness();
        assert!(harness.advertise("AA", "ancs").is_empty());
    }

    #[test]
    fn connection_requests_mtu_discovers_and_arms_timeout() {
        let mut harness = harness();
        harness.command(ClientCommand::StartScan);
        harness.advertise("AA", "ancs");
        let actions = harness.connected("AA");

        assert_eq!(vec![SessionState::ServiceDiscovery], states(&actions));
        assert!(actions.contains(&Action::RequestMtu {
            peer: "AA".into(),
            mtu: 512,
        }));
        assert!(actions.contains(&Action::DiscoverServices("AA".into())));
        let session_generation = harness.machine.session().map(ConnectionSession::generation);
        assert_eq!(
            session_generation,
            armed(&actions, TimerKind::DiscoveryTimeout).map(|(generation, _)| generation)
        );
    }

    #[test]
    fn discovery_timeout_marks_peer_and_rescans_after_settle() {
        let mut harness = harness();
        harness.command(ClientCommand::StartScan);
        harness.advertise("AA", "ANCS-Device");
        let (generation, after) = armed(&harness.connected("AA"), TimerKind::DiscoveryTimeout)
            .expect("discovery timer should be armed");
        assert_eq!(Duration::from_secs(10), after);

        harness.advance(after);
        let actions = harness.fire(TimerKind::DiscoveryTimeout, generation);
        assert_eq!(
            vec![
                SessionState::TimedOut,
                SessionState::Disconnected,
                SessionState::Idle
            ],
            states(&actions)
        );
        assert!(actions.contains(&Action::Disconnect("AA".into())));
        assert!(harness.machine.campaign().is_tried(&"AA".into()));
        let (settle_generation, settle_after) =
            armed(&actions, TimerKind::Settle).expect("settle timer should be armed");
        assert_eq!(Duration::from_secs(2), settle_after);

        let actions = harness.fire(TimerKind::Settle, settle_generation);
        assert_eq!(Action::StartScan, actions[0]);
        assert_eq!(vec![SessionState::Scanning], states(&actions));
        assert!(harness.machine.campaign().is_tried(&"AA".into()));

        assert!(harness.advertise("AA", "ANCS-Device").is_empty());
        assert!(
            harness
                .advertise("BB", "ancs-other")
                .contains(&Action::Connect("BB".into()))
        );
    }

    #[test]
    fn settle_timer_does_not_restart_a_running_scan() {
        let mut harness = harness();
        harness.command(ClientCommand::StartScan);
        harness.advertise("AA", "ancs");
        let (generation, _) = armed(&harness.connected("AA"), TimerKind::DiscoveryTimeout)
            .expect("discovery timer should be armed");
        let (settle, _) = armed(
            &harness.fire(TimerKind::DiscoveryTimeout, generation),
            TimerKind::Settle,
        )
        .expect("settle timer should be armed");

        harness.command(ClientCommand::StartScan);
        assert!(harness.fire(TimerKind::Settle, settle).is_empty());
    }

    #[test]
    fn discovery_timer_is_stale_once_services_arrive() {
        let mut harness = harness();
        harness.command(ClientCommand::StartScan);
        harness.advertise("AA", "ancs");
        let (generation, _) = armed(&harness.connected("AA"), TimerKind::DiscoveryTimeout)
            .expect("discovery timer should be armed");

        let actions = harness.discovered("AA", ancs_service_table());
        assert!(actions.contains(&Action::CancelTimer(TimerKind::DiscoveryTimeout)));
        assert_eq!(vec![SessionState::Subscribing], states(&actions));
        assert!(actions.contains(&Action::Subscribe {
            peer: "AA".into(),
            endpoint: EndpointId::NotificationSource,
        }));
        assert!(actions.contains(&Action::Subscribe {
            peer: "AA".into(),
            endpoint: EndpointId::DataSource,
        }));

        assert!(harness.fire(TimerKind::DiscoveryTimeout, generation).is_empty());
        assert_eq!(SessionState::Subscribing, harness.machine.state());
    }

    #[test]
    fn missing_ancs_service_disconnects_and_marks_peer() {
        let mut harness = harness();
        harness.command(ClientCommand::StartScan);
        harness.advertise("AA", "ancs");
        harness.connected("AA");

        let actions = harness.discovered("AA", Vec::new());
        assert_eq!(
            vec![SessionState::Disconnected, SessionState::Idle],
            states(&actions)
        );
        assert_matches!(
            statuses(&actions)[..],
            [StatusUpdate::SessionFailed {
                failure: SessionFailure::ServiceMissing { .. },
                ..
            }]
        );
        assert!(armed(&actions, TimerKind::Settle).is_none());
        assert!(harness.machine.campaign().is_tried(&"AA".into()));
        assert!(harness.machine.session().is_none());
    }

    #[test]
    fn discovery_failure_disconnects_and_marks_peer() {
        let mut harness = harness();
        harness.command(ClientCommand::StartScan);
        harness.advertise("AA", "ancs");
        harness.connected("AA");

        let actions = harness.transport(TransportEvent::ServicesDiscovered {
            peer: "AA".into(),
            outcome: Err("gatt error 133".into()),
        });
        assert!(actions.contains(&Action::Disconnect("AA".into())));
        assert!(harness.machine.campaign().is_tried(&"AA".into()));
    }

    #[test]
    fn connect_failure_marks_peer() {
        let mut harness = harness();
        harness.command(ClientCommand::StartScan);
        harness.advertise("AA", "ancs");
        let actions = harness.transport(TransportEvent::ConnectionState {
            peer: "AA".into(),
            change: ConnectionChange::ConnectFailed {
                reason: "refused".into(),
            },
        });

        assert_eq!(
            vec![SessionState::Disconnected, SessionState::Idle],
            states(&actions)
        );
        assert!(harness.machine.campaign().is_tried(&"AA".into()));
    }

    #[test]
    fn notification_subscription_enters_active() {
        let mut harness = harness();
        let actions = harness.activate("AA");

        assert_eq!(vec![SessionState::Active], states(&actions));
        let session = harness.machine.session().expect("session should be live");
        assert!(session.data_source_enabled());
        assert!(session.service_discovered());
        assert!(session.endpoints().is_some());
    }

    #[test]
    fn events_inside_ignore_window_are_discarded() {
        let mut harness = harness();
        harness.activate("AA");
        let frame = event_frame(EventKind::Added, Category::Social, 9);

        harness.advance(Duration::from_millis(2_999));
        let actions = harness.frame("AA", EndpointId::NotificationSource, &frame);
        assert_eq!(
            vec![Action::Publish(ClientOutput::Status(
                StatusUpdate::EventIgnored { frame_len: 8 }
            ))],
            actions
        );

        harness.advance(Duration::from_millis(1));
        let actions = harness.frame("AA", EndpointId::NotificationSource, &frame);
        assert_matches!(
            &actions[0],
            Action::Publish(ClientOutput::Event(event)) if event.notification_uid() == 9
        );
    }

    #[test]
    fn social_added_event_requests_attributes() {
        let mut harness = harness();
        harness.activate("AA");
        harness.advance(Duration::from_secs(5));

        let actions = harness.frame(
            "AA",
            EndpointId::NotificationSource,
            &event_frame(EventKind::Added, Category::Social, 300),
        );
        assert!(actions.contains(&Action::Write {
            peer: "AA".into(),
            endpoint: EndpointId::ControlPoint,
            payload: CommandBuilder::build_get_attributes_command(300).to_vec(),
        }));
        assert!(
            statuses(&actions)
                .contains(&&StatusUpdate::AttributesRequested { notification_uid: 300 })
        );
    }

    #[rstest]
    #[case(EventKind::Added, Category::Email)]
    #[case(EventKind::Removed, Category::Social)]
    fn other_events_are_published_without_request(
        #[case] kind: EventKind,
        #[case] category: Category,
    ) {
        let mut harness = harness();
        harness.activate("AA");
        harness.advance(Duration::from_secs(5));

        let actions = harness.frame(
            "AA",
            EndpointId::NotificationSource,
            &event_frame(kind, category, 4),
        );
        assert_eq!(1, actions.len());
        assert_matches!(&actions[0], Action::Publish(ClientOutput::Event(_)));
    }

    #[test]
    fn short_event_frame_is_rejected_without_ending_session() {
        let mut harness = harness();
        harness.activate("AA");
        harness.advance(Duration::from_secs(5));

        let actions = harness.frame("AA", EndpointId::NotificationSource, &[0x00, 0x01]);
        assert_matches!(
            statuses(&actions)[..],
            [StatusUpdate::FrameRejected {
                endpoint: EndpointId::NotificationSource,
                ..
            }]
        );
        assert_eq!(SessionState::Active, harness.machine.state());
    }

    #[test]
    fn data_source_frame_publishes_record() {
        let mut harness = harness();
        harness.activate("AA");

        let actions = harness.frame(
            "AA",
            EndpointId::DataSource,
            &[0x00, 0x01, 0, 0, 0, 0x01, 0x03, 0x00, b'A', b'B', b'C'],
        );
        assert_matches!(
            &actions[..],
            [Action::Publish(ClientOutput::Record(record))] if record.title() == "ABC"
        );
    }

    #[test]
    fn control_point_write_failure_keeps_session() {
        let mut harness = harness();
        harness.activate("AA");

        let actions = harness.transport(TransportEvent::CharacteristicWritten {
            peer: "AA".into(),
            endpoint: EndpointId::ControlPoint,
            status: GattStatus::Failure("write not permitted".into()),
        });
        assert_matches!(statuses(&actions)[..], [StatusUpdate::WriteFailed { .. }]);
        assert_eq!(SessionState::Active, harness.machine.state());
    }

    #[test]
    fn active_link_loss_does_not_mark_peer() {
        let mut harness = harness();
        harness.activate("AA");

        let actions = harness.transport(TransportEvent::ConnectionState {
            peer: "AA".into(),
            change: ConnectionChange::Disconnected,
        });
        assert_eq!(
            vec![SessionState::Disconnected, SessionState::Idle],
            states(&actions)
        );
        assert!(!harness.machine.campaign().is_tried(&"AA".into()));
        assert!(!actions.contains(&Action::StartScan));
    }

    #[test]
    fn rescan_on_disconnect_resumes_campaign() {
        let mut harness = Harness::new(
            LifecycleConfig::builder()
                .rescan_on_disconnect(true)
                .build(),
        );
        harness.command(ClientCommand::StartScan);
        harness.advertise("AA", "ancs");
        harness.connected("AA");

        let actions = harness.discovered("AA", Vec::new());
        assert!(actions.contains(&Action::StartScan));
        assert_eq!(SessionState::Scanning, harness.machine.state());
        assert!(harness.machine.campaign().is_tried(&"AA".into()));
    }

    #[test]
    fn scan_duration_expiry_returns_to_idle() {
        let mut harness = harness();
        let (generation, _) = armed(
            &harness.command(ClientCommand::StartScan),
            TimerKind::ScanDuration,
        )
        .expect("scan timer should be armed");

        let actions = harness.fire(TimerKind::ScanDuration, generation);
        assert!(actions.contains(&Action::StopScan));
        assert_eq!(vec![SessionState::Idle], states(&actions));
        assert!(statuses(&actions).contains(&&StatusUpdate::ScanFinished));
    }

    #[test]
    fn scan_timer_is_stale_after_candidate_accepted() {
        let mut harness = harness();
        let (generation, _) = armed(
            &harness.command(ClientCommand::StartScan),
            TimerKind::ScanDuration,
        )
        .expect("scan timer should be armed");
        harness.advertise("AA", "ancs");

        assert!(harness.fire(TimerKind::ScanDuration, generation).is_empty());
        assert_eq!(SessionState::Connecting, harness.machine.state());
    }

    #[test]
    fn fresh_scan_forgets_tried_peers() {
        let mut harness = harness();
        harness.command(ClientCommand::StartScan);
        harness.advertise("AA", "ancs");
        harness.connected("AA");
        harness.discovered("AA", Vec::new());
        assert!(harness.machine.campaign().is_tried(&"AA".into()));

        harness.command(ClientCommand::StartScan);
        assert!(harness.machine.campaign().tried_peers().is_empty());
        assert!(harness.advertise("AA", "ancs").contains(&Action::Connect("AA".into())));
    }

    #[test]
    fn connect_to_supersedes_live_session() {
        let mut harness = harness();
        harness.activate("AA");

        let actions = harness.command(ClientCommand::ConnectTo("BB".into()));
        assert_eq!(
            vec![
                Action::CancelTimer(TimerKind::DiscoveryTimeout),
                Action::Disconnect("AA".into()),
                Action::Connect("BB".into()),
            ],
            actions
                .iter()
                .filter(|action| !matches!(action, Action::Publish(_)))
                .cloned()
                .collect::<Vec<_>>()
        );
        assert_eq!(
            Some(&PeerId::from("BB")),
            harness.machine.session().map(ConnectionSession::peer_id)
        );

        assert!(
            harness
                .frame(
                    "AA",
                    EndpointId::NotificationSource,
                    &event_frame(EventKind::Added, Category::Social, 1)
                )
                .is_empty()
        );
    }

    #[test]
    fn reconnecting_same_peer_ignores_disconnect_of_replaced_link() {
        let mut harness = harness();
        harness.activate("AA");

        let actions = harness.command(ClientCommand::ConnectTo("AA".into()));
        assert!(actions.contains(&Action::Disconnect("AA".into())));
        assert!(actions.contains(&Action::Connect("AA".into())));

        let actions = harness.transport(TransportEvent::ConnectionState {
            peer: "AA".into(),
            change: ConnectionChange::Disconnected,
        });
        assert!(actions.is_empty());
        assert_eq!(SessionState::Connecting, harness.machine.state());
        assert!(!harness.machine.campaign().is_tried(&"AA".into()));

        assert_eq!(
            vec![SessionState::ServiceDiscovery],
            states(&harness.connected("AA"))
        );
    }

    #[test]
    fn replaced_link_disconnect_is_ignored_only_once() {
        let mut harness = harness();
        harness.activate("AA");
        harness.command(ClientCommand::ConnectTo("AA".into()));
        let lost = TransportEvent::ConnectionState {
            peer: "AA".into(),
            change: ConnectionChange::Disconnected,
        };

        assert!(harness.transport(lost.clone()).is_empty());
        let actions = harness.transport(lost);
        assert_matches!(
            statuses(&actions)[..],
            [StatusUpdate::SessionFailed {
                failure: SessionFailure::LinkLost,
                ..
            }]
        );
        assert!(harness.machine.campaign().is_tried(&"AA".into()));
    }

    #[test]
    fn stop_scan_during_settle_delay_cancels_resume() {
        let mut harness = harness();
        harness.command(ClientCommand::StartScan);
        harness.advertise("AA", "ancs");
        let (generation, _) = armed(&harness.connected("AA"), TimerKind::DiscoveryTimeout)
            .expect("discovery timer should be armed");
        let (settle, _) = armed(
            &harness.fire(TimerKind::DiscoveryTimeout, generation),
            TimerKind::Settle,
        )
        .expect("settle timer should be armed");

        harness.command(ClientCommand::StopScan);
        assert!(harness.fire(TimerKind::Settle, settle).is_empty());
        assert!(!harness.machine.campaign().is_scanning());
        assert_eq!(SessionState::Idle, harness.machine.state());
    }

    #[test]
    fn app_disconnect_ends_session_without_marking_peer() {
        let mut harness = harness();
        harness.activate("AA");

        let actions = harness.command(ClientCommand::Disconnect);
        assert!(actions.contains(&Action::Disconnect("AA".into())));
        assert!(statuses(&actions).is_empty());
        assert!(!harness.machine.campaign().is_tried(&"AA".into()));
        assert_eq!(SessionState::Idle, harness.machine.state());
    }

    #[test]
    fn mtu_change_is_recorded() {
        let mut harness = harness();
        harness.command(ClientCommand::StartScan);
        harness.advertise("AA", "ancs");
        harness.connected("AA");

        let actions = harness.transport(TransportEvent::MtuChanged {
            peer: "AA".into(),
            mtu: 185,
            status: GattStatus::Success,
        });
        assert!(statuses(&actions).contains(&&StatusUpdate::MtuChanged { mtu: 185 }));
        assert_eq!(
            Some(185),
            harness.machine.session().and_then(ConnectionSession::mtu)
        );
    }
}
