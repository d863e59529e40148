//! tandem-engine: multi-profile connection and session coordination.
//!
//! The engine is a single-owner, single-threaded state machine. Every
//! input arrives as an [`Event`] and runs to completion; every output is a
//! non-blocking request to one of the collaborators bundled in a
//! [`Context`]. Nothing here blocks or spawns.

pub mod action;
pub mod arbiter;
pub mod audio;
pub mod codec;
pub mod context;
pub mod coordinator;
pub mod discovery;
pub mod dispatcher;
pub mod engine;
pub mod event;
pub mod notify;
pub mod profiles;
pub mod registry;
pub mod session;
pub mod settings;
pub mod store;
pub mod timer;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use action::{Action, ActionSlots};
pub use audio::{AudioCommand, AudioLog, AudioSink};
pub use context::Context;
pub use dispatcher::GatewayState;
pub use engine::{Engine, GatewaySnapshot};
pub use event::{ChannelHandle, ConnectStatus, Event, PassthroughOp, Seid, TransportEvent};
pub use notify::{NotificationLog, Notifier, StatusEvent};
pub use registry::{SessionId, SessionRegistry};
pub use settings::Settings;
pub use store::{CodecWords, ConfigStore, MemoryStore};
pub use timer::{ManualScheduler, Scheduler, TimerKey, TimerKind, TimerScope};
pub use transport::{RequestLog, Transport, TransportError, TransportRequest};
