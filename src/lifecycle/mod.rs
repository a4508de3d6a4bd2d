//! Connection lifecycle: scan campaigns, candidate selection and the
//! per-session state machine.
//!
//! [`LifecycleMachine`] is pure. It consumes [`Input`]s one at a time and
//! returns the [`Action`]s to perform, which keeps every transition atomic
//! and lets tests drive time explicitly. The async driver lives in
//! [`crate::client`].

mod campaign;
mod config;
mod machine;
mod output;
mod session;
mod timer;

pub use self::campaign::{CandidatePolicy, DEFAULT_NAME_NEEDLE, ScanCampaign, accept};
pub use self::config::{
    AttributeRequestPolicy, DEFAULT_DISCOVERY_TIMEOUT, DEFAULT_IGNORE_WINDOW,
    DEFAULT_SCAN_DURATION, DEFAULT_SETTLE_DELAY, LifecycleConfig,
};
pub use self::machine::{Action, ClientCommand, Input, LifecycleMachine, TimerKind};
pub use self::output::{ClientOutput, SessionFailure, StateChange, StatusUpdate};
pub use self::session::{ConnectionSession, Generation, SessionState};
pub(crate) use self::machine::QueuedInput;
pub(crate) use self::timer::TimerTable;
