use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, instrument, trace};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::error::TransportError;
use crate::hw::{ConnectionChange, GattStatus, PeerId, Transport, TransportEvent, TransportEventSink};
use crate::lifecycle::{
    Action, ClientCommand, ClientOutput, Input, LifecycleConfig, LifecycleMachine, QueuedInput,
    SessionState, TimerTable,
};
use crate::utils::error_chain;

/// ANCS client: a lifecycle state machine bound to a transport.
///
/// ```no_run
/// # async fn demo() -> anyhow::Result<()> {
/// use ancs::{AncsClient, ClientOutput, LifecycleConfig, TransportBackend};
///
/// let transport = TransportBackend::btleplug().into_transport().await?;
/// let mut client = AncsClient::new(transport, LifecycleConfig::default()).spawn();
/// client.handle().start_scan()?;
/// while let Some(output) = client.next_output().await {
///     if let ClientOutput::Record(record) = output {
///         println!("{}: {}", record.title(), record.message());
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct AncsClient {
    transport: Box<dyn Transport>,
    machine: LifecycleMachine,
}

impl AncsClient {
    #[must_use]
    pub fn new(transport: Box<dyn Transport>, config: LifecycleConfig) -> Self {
        Self {
            transport,
            machine: LifecycleMachine::new(config),
        }
    }

    /// Starts the driver task on the current tokio runtime.
    #[must_use]
    pub fn spawn(mut self) -> RunningClient {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (outputs_tx, outputs_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        self.transport
            .attach(TransportEventSink::new(inputs_tx.clone()));
        let task = tokio::spawn(self.run(
            inputs_rx,
            inputs_tx.clone(),
            outputs_tx,
            shutdown.clone(),
        ));

        RunningClient {
            handle: ClientHandle { inputs: inputs_tx },
            outputs: UnboundedReceiverStream::new(outputs_rx),
            shutdown,
            task,
        }
    }

    #[instrument(skip_all, level = "info", name = "ancs_client")]
    async fn run(
        mut self,
        mut inputs: UnboundedReceiver<QueuedInput>,
        inputs_tx: UnboundedSender<QueuedInput>,
        outputs: UnboundedSender<ClientOutput>,
        shutdown: CancellationToken,
    ) -> SessionState {
        let mut timers = TimerTable::default();
        Span::current().pb_set_message(SessionState::Idle.progress_message());

        loop {
            let queued = tokio::select! {
                () = shutdown.cancelled() => break,
                queued = inputs.recv() => match queued {
                    Some(queued) => queued,
                    None => break,
                },
            };

            for action in self.machine.handle(queued.input, queued.queued_at) {
                self.execute(action, &mut timers, &inputs_tx, &outputs)
                    .await;
            }
        }

        timers.cancel_all();
        self.teardown().await;
        self.machine.state()
    }

    async fn execute(
        &mut self,
        action: Action,
        timers: &mut TimerTable,
        inputs: &UnboundedSender<QueuedInput>,
        outputs: &UnboundedSender<ClientOutput>,
    ) {
        let failure = match action {
            Action::StartScan => self
                .transport
                .start_scan()
                .await
                .err()
                .map(|error| TransportEvent::ScanFailed {
                    reason: error_chain(&error),
                }),
            Action::StopScan => {
                if let Err(error) = self.transport.stop_scan().await {
                    debug!(error = %error_chain(&error), "failed to stop scan cleanly");
                }
                None
            }
            Action::Connect(peer) => match self.transport.connect(&peer).await {
                Ok(()) => None,
                Err(error) => Some(TransportEvent::ConnectionState {
                    peer,
                    change: ConnectionChange::ConnectFailed {
                        reason: error_chain(&error),
                    },
                }),
            },
            Action::Disconnect(peer) => {
                if let Err(error) = self.transport.disconnect(&peer).await {
                    debug!(%peer, error = %error_chain(&error), "failed to release peer");
                }
                None
            }
            Action::RequestMtu { peer, mtu } => {
                if let Err(error) = self.transport.request_mtu(&peer, mtu).await {
                    debug!(%peer, error = %error_chain(&error), "MTU request was not issued");
                }
                None
            }
            Action::DiscoverServices(peer) => {
                match self.transport.discover_services(&peer).await {
                    Ok(()) => None,
                    Err(error) => Some(TransportEvent::ServicesDiscovered {
                        peer,
                        outcome: Err(error_chain(&error)),
                    }),
                }
            }
            Action::Subscribe { peer, endpoint } => {
                match self.transport.subscribe(&peer, endpoint).await {
                    Ok(()) => None,
                    Err(error) => Some(TransportEvent::SubscriptionWritten {
                        peer,
                        endpoint,
                        status: GattStatus::Failure(error_chain(&error)),
                    }),
                }
            }
            Action::Write {
                peer,
                endpoint,
                payload,
            } => match self.transport.write(&peer, endpoint, &payload).await {
                Ok(()) => None,
                Err(error) => Some(TransportEvent::CharacteristicWritten {
                    peer,
                    endpoint,
                    status: GattStatus::Failure(error_chain(&error)),
                }),
            },
            Action::ArmTimer {
                timer,
                generation,
                after,
            } => {
                timers.arm(timer, generation, after, inputs.clone());
                None
            }
            Action::CancelTimer(timer) => {
                timers.cancel(timer);
                None
            }
            Action::Publish(output) => {
                if let ClientOutput::State(change) = &output {
                    Span::current().pb_set_message(change.state.progress_message());
                }
                if outputs.send(output).is_err() {
                    trace!("output receiver dropped");
                }
                None
            }
        };

        if let Some(event) = failure
            && inputs
                .send(QueuedInput::now(Input::Transport(event)))
                .is_err()
        {
            trace!("input queue closed while reporting a failed request");
        }
    }

    async fn teardown(&mut self) {
        if self.machine.campaign().is_scanning()
            && let Err(error) = self.transport.stop_scan().await
        {
            debug!(error = %error_chain(&error), "failed to stop scan during shutdown");
        }
        let peer = self
            .machine
            .session()
            .map(|session| session.peer_id().clone());
        if let Some(peer) = peer {
            info!(%peer, "releasing peer on shutdown");
            if let Err(error) = self.transport.disconnect(&peer).await {
                debug!(error = %error_chain(&error), "failed to release peer during shutdown");
            }
        }
    }
}

/// Commands a running client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    inputs: UnboundedSender<QueuedInput>,
}

impl ClientHandle {
    /// Starts a fresh scan campaign.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientStopped`] once the client has stopped.
    pub fn start_scan(&self) -> Result<(), TransportError> {
        self.send(ClientCommand::StartScan)
    }

    /// # Errors
    ///
    /// Returns [`TransportError::ClientStopped`] once the client has stopped.
    pub fn stop_scan(&self) -> Result<(), TransportError> {
        self.send(ClientCommand::StopScan)
    }

    /// Connects to a known peer, superseding any live session.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientStopped`] once the client has stopped.
    pub fn connect_to(&self, peer: PeerId) -> Result<(), TransportError> {
        self.send(ClientCommand::ConnectTo(peer))
    }

    /// # Errors
    ///
    /// Returns [`TransportError::ClientStopped`] once the client has stopped.
    pub fn disconnect(&self) -> Result<(), TransportError> {
        self.send(ClientCommand::Disconnect)
    }

    fn send(&self, command: ClientCommand) -> Result<(), TransportError> {
        self.inputs
            .send(QueuedInput::now(Input::Command(command)))
            .map_err(|_closed| TransportError::ClientStopped)
    }
}

/// A spawned client: its command handle, output stream and task.
///
/// Dropping it stops the driver without waiting for teardown.
pub struct RunningClient {
    handle: ClientHandle,
    outputs: UnboundedReceiverStream<ClientOutput>,
    shutdown: CancellationToken,
    task: JoinHandle<SessionState>,
}

impl RunningClient {
    #[must_use]
    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    /// Waits for the next published output. Returns `None` once the client stopped.
    pub async fn next_output(&mut self) -> Option<ClientOutput> {
        self.outputs.next().await
    }

    /// Stops the driver, releases the transport and returns the final state.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientStopped`] if the driver task panicked.
    pub async fn shutdown(mut self) -> Result<SessionState, TransportError> {
        self.shutdown.cancel();
        (&mut self.task)
            .await
            .map_err(|_join_error| TransportError::ClientStopped)
    }
}

impl Drop for RunningClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
