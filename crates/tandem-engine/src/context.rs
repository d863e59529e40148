//! The collaborators an engine step may talk to.

use crate::audio::{AudioCommand, AudioSink};
use crate::notify::{Notifier, StatusEvent};
use crate::store::ConfigStore;
use crate::timer::Scheduler;
use crate::transport::{Transport, TransportError, TransportRequest};

/// Borrowed for the duration of one event.
pub struct Context<'a> {
    pub transport: &'a mut dyn Transport,
    pub audio: &'a mut dyn AudioSink,
    pub timers: &'a mut dyn Scheduler,
    pub store: &'a mut dyn ConfigStore,
    pub notifier: &'a mut dyn Notifier,
}

impl<'a> Context<'a> {
    pub fn new(
        transport: &'a mut dyn Transport,
        audio: &'a mut dyn AudioSink,
        timers: &'a mut dyn Scheduler,
        store: &'a mut dyn ConfigStore,
        notifier: &'a mut dyn Notifier,
    ) -> Self {
        Self {
            transport,
            audio,
            timers,
            store,
            notifier,
        }
    }

    /// Issue a request the caller needs to know was started.
    pub fn request(&mut self, req: TransportRequest) -> Result<(), TransportError> {
        tracing::trace!(?req, "transport request");
        self.transport.request(req)
    }

    /// Issue a request whose failure is only worth a log line.
    pub fn send(&mut self, req: TransportRequest) -> bool {
        match self.transport.request(req.clone()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(?req, error = %e, "transport request not started");
                false
            }
        }
    }

    pub fn audio(&mut self, cmd: AudioCommand) {
        tracing::trace!(?cmd, "audio command");
        self.audio.apply(cmd);
    }

    pub fn notify(&mut self, event: StatusEvent) {
        self.notifier.notify(event);
    }
}
