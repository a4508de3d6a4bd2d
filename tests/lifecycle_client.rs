use std::time::Duration;

use ancs::{
    AncsClient, ClientOutput, FakeArgs, LifecycleConfig, PeerId, RunningClient, SessionFailure,
    SessionState, StatusUpdate,
};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

const COLLECT_LIMIT: Duration = Duration::from_secs(120);

async fn spawn_fake(fake: FakeArgs, config: LifecycleConfig) -> anyhow::Result<RunningClient> {
    let transport = ancs::fake_transport_backend(fake).into_transport().await?;
    Ok(AncsClient::new(transport, config).spawn())
}

/// Collects outputs up to and including the first one matching `done`.
async fn collect_until(
    client: &mut RunningClient,
    mut done: impl FnMut(&ClientOutput) -> bool,
) -> anyhow::Result<Vec<ClientOutput>> {
    let collect = async {
        let mut outputs = Vec::new();
        while let Some(output) = client.next_output().await {
            let finished = done(&output);
            outputs.push(output);
            if finished {
                break;
            }
        }
        outputs
    };
    Ok(tokio::time::timeout(COLLECT_LIMIT, collect).await?)
}

fn states(outputs: &[ClientOutput]) -> Vec<SessionState> {
    outputs
        .iter()
        .filter_map(|output| match output {
            ClientOutput::State(change) => Some(change.state),
            _ => None,
        })
        .collect()
}

fn statuses(outputs: &[ClientOutput]) -> Vec<&StatusUpdate> {
    outputs
        .iter()
        .filter_map(|output| match output {
            ClientOutput::Status(status) => Some(status),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn scan_to_record_happy_path() -> anyhow::Result<()> {
    let fake = FakeArgs::builder()
        .scan("XX|Speaker|-70|plain;AA|ANCS-Phone|-40|ancs")?
        .build();
    let mut client = spawn_fake(fake, LifecycleConfig::default()).await?;
    client.handle().start_scan()?;

    let outputs = collect_until(&mut client, |output| {
        matches!(output, ClientOutput::Record(_))
    })
    .await?;

    assert_eq!(
        vec![
            SessionState::Scanning,
            SessionState::Connecting,
            SessionState::ServiceDiscovery,
            SessionState::Subscribing,
            SessionState::Active,
        ],
        states(&outputs)
    );
    let statuses = statuses(&outputs);
    assert_matches!(
        statuses[0],
        StatusUpdate::CandidateAccepted { peer, .. } if *peer == PeerId::from("AA")
    );
    assert!(statuses.contains(&&StatusUpdate::MtuChanged { mtu: 185 }));
    assert!(statuses.contains(&&StatusUpdate::AttributesRequested { notification_uid: 1 }));

    let Some(ClientOutput::Record(record)) = outputs.last() else {
        panic!("collection should end on a record");
    };
    assert_eq!(1, record.notification_uid());
    assert_eq!("com.example.fake", record.app_identifier());
    assert_eq!("Fake title 1", record.title());
    assert_eq!("Fake message 1", record.message());

    assert_eq!(SessionState::Active, client.shutdown().await?);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn events_inside_ignore_window_are_discarded() -> anyhow::Result<()> {
    let fake = FakeArgs::builder()
        .scan("AA|ANCS-Phone|-40|ancs")?
        .event_delay(Duration::ZERO)
        .build();
    let mut client = spawn_fake(fake, LifecycleConfig::default()).await?;
    client.handle().start_scan()?;

    let mut ignored = 0;
    let outputs = collect_until(&mut client, |output| {
        if matches!(output, ClientOutput::Status(StatusUpdate::EventIgnored { .. })) {
            ignored += 1;
        }
        ignored == 2
    })
    .await?;

    assert!(
        !outputs
            .iter()
            .any(|output| matches!(output, ClientOutput::Event(_)))
    );
    assert_eq!(Some(&SessionState::Active), states(&outputs).last());
    client.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stalled_peer_times_out_and_scan_resumes_with_next_candidate() -> anyhow::Result<()> {
    let fake = FakeArgs::builder()
        .scan("AA|ANCS-Stall|-40|stall;BB|ANCS-Phone|-55|ancs")?
        .build();
    let mut client = spawn_fake(fake, LifecycleConfig::default()).await?;
    client.handle().start_scan()?;

    let outputs = collect_until(&mut client, |output| {
        matches!(output, ClientOutput::Record(_))
    })
    .await?;

    assert_eq!(
        vec![
            SessionState::Scanning,
            SessionState::Connecting,
            SessionState::ServiceDiscovery,
            SessionState::TimedOut,
            SessionState::Disconnected,
            SessionState::Idle,
            SessionState::Scanning,
            SessionState::Connecting,
            SessionState::ServiceDiscovery,
            SessionState::Subscribing,
            SessionState::Active,
        ],
        states(&outputs)
    );
    let statuses = statuses(&outputs);
    assert!(statuses.contains(&&StatusUpdate::SessionFailed {
        peer: PeerId::from("AA"),
        failure: SessionFailure::Timeout,
    }));
    let accepted: Vec<&PeerId> = statuses
        .iter()
        .filter_map(|status| match status {
            StatusUpdate::CandidateAccepted { peer, .. } => Some(peer),
            _ => None,
        })
        .collect();
    assert_eq!(vec![&PeerId::from("AA"), &PeerId::from("BB")], accepted);

    client.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn peer_without_ancs_ends_session() -> anyhow::Result<()> {
    let fake = FakeArgs::builder().scan("AA|ANCS-Plain|-50|plain")?.build();
    let mut client = spawn_fake(fake, LifecycleConfig::default()).await?;
    client.handle().start_scan()?;

    let outputs = collect_until(&mut client, |output| {
        matches!(
            output,
            ClientOutput::State(change) if change.state == SessionState::Idle
        )
    })
    .await?;

    assert_eq!(
        vec![
            SessionState::Scanning,
            SessionState::Connecting,
            SessionState::ServiceDiscovery,
            SessionState::Disconnected,
            SessionState::Idle,
        ],
        states(&outputs)
    );
    assert_matches!(
        statuses(&outputs).last(),
        Some(StatusUpdate::SessionFailed {
            failure: SessionFailure::ServiceMissing { .. },
            ..
        })
    );
    assert_eq!(SessionState::Idle, client.shutdown().await?);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn refused_connection_is_reported() -> anyhow::Result<()> {
    let fake = FakeArgs::builder().scan("AA|ANCS-Broken|-50|fail")?.build();
    let mut client = spawn_fake(fake, LifecycleConfig::default()).await?;
    client.handle().start_scan()?;

    let outputs = collect_until(&mut client, |output| {
        matches!(output, ClientOutput::Status(StatusUpdate::SessionFailed { .. }))
    })
    .await?;

    assert_matches!(
        statuses(&outputs).last(),
        Some(StatusUpdate::SessionFailed {
            failure: SessionFailure::ConnectFailed { .. },
            ..
        })
    );
    client.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn scan_without_candidates_finishes() -> anyhow::Result<()> {
    let fake = FakeArgs::builder().scan("XX|Speaker|-70|plain")?.build();
    let config = LifecycleConfig::builder()
        .scan_duration(Duration::from_secs(5))
        .build();
    let mut client = spawn_fake(fake, config).await?;
    client.handle().start_scan()?;

    let outputs = collect_until(&mut client, |output| {
        matches!(output, ClientOutput::Status(StatusUpdate::ScanFinished))
    })
    .await?;

    assert_eq!(vec![SessionState::Scanning], states(&outputs));
    client.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn explicit_connect_skips_scanning() -> anyhow::Result<()> {
    let fake = FakeArgs::builder().scan("AA|Phone|-40|ancs")?.build();
    let mut client = spawn_fake(fake, LifecycleConfig::default()).await?;
    client.handle().connect_to(PeerId::from("AA"))?;

    let outputs = collect_until(&mut client, |output| {
        matches!(output, ClientOutput::State(change) if change.state == SessionState::Active)
    })
    .await?;

    assert_eq!(SessionState::Connecting, states(&outputs)[0]);
    assert!(!states(&outputs).contains(&SessionState::Scanning));

    client.handle().disconnect()?;
    let outputs = collect_until(&mut client, |output| {
        matches!(output, ClientOutput::State(change) if change.state == SessionState::Idle)
    })
    .await?;
    assert_eq!(
        vec![SessionState::Disconnected, SessionState::Idle],
        states(&outputs)
    );
    client.shutdown().await?;
    Ok(())
}
