use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::machine::{Input, QueuedInput, TimerKind};
use super::session::Generation;

/// Cancellable tokio timers that post expiry back onto the input queue.
///
/// At most one timer of each kind is armed; re-arming cancels the previous one.
#[derive(Debug, Default)]
pub(crate) struct TimerTable {
    armed: HashMap<TimerKind, CancellationToken>,
}

impl TimerTable {
    pub(crate) fn arm(
        &mut self,
        timer: TimerKind,
        generation: Generation,
        after: Duration,
        inputs: UnboundedSender<QueuedInput>,
    ) {
        self.cancel(timer);

        let token = CancellationToken::new();
        let cancelled = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => trace!(%timer, %generation, "timer cancelled"),
                () = sleep(after) => {
                    trace!(%timer, %generation, "timer fired");
                    let _ = inputs.send(QueuedInput::now(Input::TimerFired { timer, generation }));
                }
            }
        });
        self.armed.insert(timer, token);
    }

    pub(crate) fn cancel(&mut self, timer: TimerKind) {
        if let Some(token) = self.armed.remove(&timer) {
            token.cancel();
        }
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, token) in self.armed.drain() {
            token.cancel();
        }
    }
}
