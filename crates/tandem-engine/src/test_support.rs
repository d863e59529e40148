//! In-memory collaborators bundled for unit tests.

use crate::audio::AudioLog;
use crate::context::Context;
use crate::notify::NotificationLog;
use crate::store::MemoryStore;
use crate::timer::ManualScheduler;
use crate::transport::RequestLog;

#[derive(Default)]
pub struct Collaborators {
    pub transport: RequestLog,
    pub audio: AudioLog,
    pub timers: ManualScheduler,
    pub store: MemoryStore,
    pub notes: NotificationLog,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cx(&mut self) -> Context<'_> {
        Context::new(
            &mut self.transport,
            &mut self.audio,
            &mut self.timers,
            &mut self.store,
            &mut self.notes,
        )
    }
}
