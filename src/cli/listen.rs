use std::collections::HashSet;
use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use derive_more::Display;
use serde::Serialize;
use serde_with::SerializeDisplay;
use tracing::{info, instrument};

use crate::cli::command::parse_duration;
use crate::cli::{OutputFormat, write_json_line};
use crate::client::{AncsClient, RunningClient};
use crate::error::TransportError;
use crate::hw::{PeerId, Transport};
use crate::lifecycle::{
    AttributeRequestPolicy, CandidatePolicy, ClientOutput, DEFAULT_DISCOVERY_TIMEOUT,
    DEFAULT_IGNORE_WINDOW, DEFAULT_NAME_NEEDLE, DEFAULT_SCAN_DURATION, DEFAULT_SETTLE_DELAY,
    LifecycleConfig, SessionFailure, SessionState, StatusUpdate,
};

use super::ui::{ListenOutputView, ListenSummaryView, Painter};

/// Arguments for the `listen` command.
#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Stop after this many notification events, once their attributes arrive.
    /// If omitted, listen until Ctrl+C.
    #[arg(long)]
    max_events: Option<usize>,
    /// Connect to this peer directly instead of scanning.
    #[arg(long, value_name = "PEER")]
    connect: Option<String>,
    /// Case-insensitive substring a peer's advertised name must contain.
    #[arg(long, default_value = DEFAULT_NAME_NEEDLE)]
    name_filter: String,
    /// Only accept peers advertising Apple manufacturer data.
    #[arg(long)]
    require_apple: bool,
    /// Which events trigger an attribute request.
    #[arg(long, value_enum, default_value_t)]
    request_attributes: AttributeRequestPolicy,
    /// Scan again after any session ends, not only after a discovery timeout.
    #[arg(long)]
    rescan_on_disconnect: bool,
    /// Time allowed for service discovery (e.g. `10s`).
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    discovery_timeout: Duration,
    /// Period after subscribing during which events are discarded.
    #[arg(long, value_parser = parse_duration, default_value = "3s")]
    ignore_window: Duration,
    /// Delay before scanning again after a discovery timeout.
    #[arg(long, value_parser = parse_duration, default_value = "2s")]
    settle_delay: Duration,
    /// How long one scan runs without finding a candidate.
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    scan_duration: Duration,
}

impl ListenArgs {
    /// Creates listen arguments with default lifecycle settings.
    #[must_use]
    pub fn new(max_events: Option<usize>) -> Self {
        Self {
            max_events,
            connect: None,
            name_filter: DEFAULT_NAME_NEEDLE.to_string(),
            require_apple: false,
            request_attributes: AttributeRequestPolicy::default(),
            rescan_on_disconnect: false,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            ignore_window: DEFAULT_IGNORE_WINDOW,
            settle_delay: DEFAULT_SETTLE_DELAY,
            scan_duration: DEFAULT_SCAN_DURATION,
        }
    }

    /// Scans again after every failed session.
    #[must_use]
    pub fn with_rescan_on_disconnect(mut self) -> Self {
        self.rescan_on_disconnect = true;
        self
    }

    /// Skips scanning and connects to `peer`.
    #[must_use]
    pub fn with_connect(mut self, peer: impl Into<String>) -> Self {
        self.connect = Some(peer.into());
        self
    }

    #[must_use]
    pub fn with_ignore_window(mut self, ignore_window: Duration) -> Self {
        self.ignore_window = ignore_window;
        self
    }

    pub(crate) fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig::builder()
            .discovery_timeout(self.discovery_timeout)
            .ignore_window(self.ignore_window)
            .settle_delay(self.settle_delay)
            .scan_duration(self.scan_duration)
            .candidate_policy(CandidatePolicy::new(&self.name_filter, self.require_apple))
            .attribute_requests(self.request_attributes)
            .rescan_on_disconnect(self.rescan_on_disconnect)
            .build()
    }
}

/// Why a listen run ended.
#[derive(Debug, Clone, Eq, PartialEq, Display, SerializeDisplay)]
pub(crate) enum ListenStopReason {
    #[display("reached limit of {_0} event(s)")]
    ReachedLimit(usize),
    #[display("interrupted")]
    Interrupted,
    #[display("scan finished without a candidate")]
    ScanFinished,
    #[display("session ended: {_0}")]
    SessionEnded(SessionFailure),
    #[display("client stopped")]
    ClientStopped,
}

/// Totals reported when a listen run ends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename = "summary")]
pub(crate) struct ListenSummary {
    stop_reason: ListenStopReason,
    events: usize,
    records: usize,
    final_state: SessionState,
}

impl ListenSummary {
    pub(crate) fn new(
        stop_reason: ListenStopReason,
        events: usize,
        records: usize,
        final_state: SessionState,
    ) -> Self {
        Self {
            stop_reason,
            events,
            records,
            final_state,
        }
    }

    pub(crate) fn stop_reason(&self) -> &ListenStopReason {
        &self.stop_reason
    }

    pub(crate) fn events(&self) -> usize {
        self.events
    }

    pub(crate) fn records(&self) -> usize {
        self.records
    }

    pub(crate) fn final_state(&self) -> SessionState {
        self.final_state
    }
}

/// Counts outputs and decides when listening is done.
#[derive(Debug)]
struct ListenTally {
    max_events: Option<usize>,
    requests: AttributeRequestPolicy,
    rescan_on_disconnect: bool,
    events: usize,
    records: usize,
    outstanding: HashSet<u32>,
}

impl ListenTally {
    fn new(max_events: Option<usize>, config: &LifecycleConfig) -> Self {
        Self {
            max_events,
            requests: config.attribute_requests(),
            rescan_on_disconnect: config.rescan_on_disconnect(),
            events: 0,
            records: 0,
            outstanding: HashSet::new(),
        }
    }

    fn observe(&mut self, output: &ClientOutput) -> Option<ListenStopReason> {
        match output {
            ClientOutput::Event(event) => {
                self.events += 1;
                if self.requests.should_request(event) {
                    self.outstanding.insert(event.notification_uid());
                }
            }
            ClientOutput::Record(record) => {
                self.records += 1;
                self.outstanding.remove(&record.notification_uid());
            }
            // The request for the newest event is the one that failed.
            ClientOutput::Status(StatusUpdate::WriteFailed { .. }) => self.outstanding.clear(),
            ClientOutput::Status(StatusUpdate::ScanFinished) => {
                return Some(ListenStopReason::ScanFinished);
            }
            ClientOutput::Status(StatusUpdate::SessionFailed { failure, .. })
                if !self.rescan_on_disconnect && *failure != SessionFailure::Timeout =>
            {
                return Some(ListenStopReason::SessionEnded(failure.clone()));
            }
            ClientOutput::State(_) | ClientOutput::Status(_) => {}
        }

        match self.max_events {
            Some(limit) if self.events >= limit && self.outstanding.is_empty() => {
                Some(ListenStopReason::ReachedLimit(limit))
            }
            _ => None,
        }
    }
}

/// Executes the `listen` command.
#[instrument(skip(transport, args, out, painter), level = "info", fields(max_events = ?args.max_events))]
pub(crate) async fn run<W>(
    transport: Box<dyn Transport>,
    args: &ListenArgs,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let config = args.lifecycle_config();
    let mut tally = ListenTally::new(args.max_events, &config);
    let mut client = AncsClient::new(transport, config).spawn();

    match &args.connect {
        Some(peer) => client.handle().connect_to(PeerId::from(peer.as_str()))?,
        None => client.handle().start_scan()?,
    }

    let pumped = pump(&mut client, &mut tally, out, output_format, painter).await;
    let final_state = client.shutdown().await?;
    let stop_reason = pumped?;
    info!(%stop_reason, %final_state, "listen finished");

    let summary = ListenSummary::new(stop_reason, tally.events, tally.records, final_state);
    match output_format {
        OutputFormat::Pretty => {
            writeln!(out)?;
            writeln!(out, "{}", ListenSummaryView::new(&summary, painter))?;
        }
        OutputFormat::Json => write_json_line(out, &summary)?,
    }
    Ok(())
}

async fn pump<W>(
    client: &mut RunningClient,
    tally: &mut ListenTally,
    out: &mut W,
    output_format: OutputFormat,
    painter: &Painter,
) -> Result<ListenStopReason>
where
    W: io::Write,
{
    loop {
        let output = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|source| TransportError::CtrlC { source })?;
                return Ok(ListenStopReason::Interrupted);
            }
            output = client.next_output() => output,
        };
        let Some(output) = output else {
            return Ok(ListenStopReason::ClientStopped);
        };

        match output_format {
            OutputFormat::Pretty => writeln!(out, "{}", ListenOutputView::new(&output, painter))?,
            OutputFormat::Json => write_json_line(out, &output)?,
        }
        if let Some(reason) = tally.observe(&output) {
            return Ok(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::assembler::parse_response;
    use crate::codec::decode_event;

    fn event(category: u8, uid: u8) -> ClientOutput {
        ClientOutput::Event(
            decode_event(&[0x00, 0x00, category, 0x01, uid, 0x00, 0x00, 0x00])
                .expect("valid frame"),
        )
    }

    fn record(uid: u8) -> ClientOutput {
        ClientOutput::Record(parse_response(&[0x00, uid, 0x00, 0x00, 0x00]).expect("header"))
    }

    fn failed(failure: SessionFailure) -> ClientOutput {
        ClientOutput::Status(StatusUpdate::SessionFailed {
            peer: PeerId::from("AA"),
            failure,
        })
    }

    #[test]
    fn limit_waits_for_requested_attributes() {
        let config = LifecycleConfig::default();
        let mut tally = ListenTally::new(Some(1), &config);

        assert_eq!(None, tally.observe(&event(0x04, 1)));
        assert_eq!(
            Some(ListenStopReason::ReachedLimit(1)),
            tally.observe(&record(1))
        );
    }

    #[test]
    fn limit_stops_immediately_for_unrequested_events() {
        let config = LifecycleConfig::default();
        let mut tally = ListenTally::new(Some(1), &config);

        assert_eq!(
            Some(ListenStopReason::ReachedLimit(1)),
            tally.observe(&event(0x06, 2))
        );
    }

    #[rstest]
    #[case::link_lost(SessionFailure::LinkLost, Some(ListenStopReason::SessionEnded(SessionFailure::LinkLost)))]
    #[case::timeout_resumes(SessionFailure::Timeout, None)]
    fn failed_sessions_end_listening_without_rescan(
        #[case] failure: SessionFailure,
        #[case] expected: Option<ListenStopReason>,
    ) {
        let config = LifecycleConfig::default();
        let mut tally = ListenTally::new(None, &config);
        assert_eq!(expected, tally.observe(&failed(failure)));
    }

    #[test]
    fn rescan_keeps_listening_after_failures() {
        let config = LifecycleConfig::builder().rescan_on_disconnect(true).build();
        let mut tally = ListenTally::new(None, &config);
        assert_eq!(None, tally.observe(&failed(SessionFailure::LinkLost)));
    }

    #[test]
    fn listen_args_flow_into_lifecycle_config() {
        let args = ListenArgs::new(None)
            .with_ignore_window(Duration::ZERO)
            .with_rescan_on_disconnect();
        let config = args.lifecycle_config();

        assert_eq!(Duration::ZERO, config.ignore_window());
        assert!(config.rescan_on_disconnect());
        assert_eq!(DEFAULT_NAME_NEEDLE, config.candidate_policy().name_needle());
    }
}
