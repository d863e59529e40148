//! Tandem integration test harness.
//!
//! Every test drives a real engine through its public event interface with
//! in-memory collaborators standing in for the radio stack, the audio
//! processor, the timer service and the persistent store. Timers never
//! fire on their own; a test fires them explicitly.
//!
//!   cargo test --test integration

use tandem_core::record::MruEntry;
use tandem_core::{BdAddr, Profile, ProfileSet};
use tandem_engine::codec::{CodecKind, Endpoint};
use tandem_engine::session::Session;
use tandem_engine::{
    Action, AudioLog, ChannelHandle, ConfigStore, ConnectStatus, Context, Engine, Event, ManualScheduler,
    MemoryStore, NotificationLog, RequestLog, SessionId, Settings, StatusEvent, TimerKey, TimerKind, TransportEvent,
};

mod connect;
mod discovery;
mod dispatch;
mod properties;
mod quality;

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct Rig {
    pub engine: Engine,
    pub transport: RequestLog,
    pub audio: AudioLog,
    pub timers: ManualScheduler,
    pub store: MemoryStore,
    pub notes: NotificationLog,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            engine: Engine::new(settings),
            transport: RequestLog::new(),
            audio: AudioLog::new(),
            timers: ManualScheduler::new(),
            store: MemoryStore::default(),
            notes: NotificationLog::new(),
        }
    }

    /// Start the engine and let the stack report ready. Logs are cleared.
    pub fn ready(mut self) -> Self {
        self.feed(Event::Start);
        self.feed(TransportEvent::Ready);
        self.clear();
        self
    }

    pub fn clear(&mut self) {
        self.transport.take();
        self.audio.take();
        self.notes.take();
    }

    pub fn feed(&mut self, event: impl Into<Event>) {
        let mut cx = Context::new(
            &mut self.transport,
            &mut self.audio,
            &mut self.timers,
            &mut self.store,
            &mut self.notes,
        );
        self.engine.handle(event.into(), &mut cx);
    }

    pub fn act(&mut self, action: Action) {
        self.feed(Event::Action(action));
    }

    /// Fire an armed timer. Panics if it is not armed.
    pub fn fire(&mut self, key: TimerKey) {
        assert!(self.timers.take(&key), "timer {key:?} not armed");
        self.feed(Event::Timer(key));
    }

    pub fn remember(&mut self, addr: BdAddr, profiles: ProfileSet) {
        self.store.remember(MruEntry {
            addr,
            profiles,
            pin_index: 0,
        });
    }

    pub fn id(&self, addr: BdAddr) -> SessionId {
        self.engine
            .registry()
            .find(addr)
            .unwrap_or_else(|| panic!("no session for {addr}"))
    }

    pub fn session(&self, addr: BdAddr) -> &Session {
        let id = self.id(addr);
        self.engine.registry().get(id).unwrap()
    }

    pub fn session_timer(&self, addr: BdAddr, kind: TimerKind) -> TimerKey {
        TimerKey::session(self.id(addr), kind)
    }

    /// Terminal connect notifications seen so far for `addr`.
    pub fn terminal_reports(&self, addr: BdAddr) -> usize {
        self.notes.count(|n| {
            matches!(n,
                StatusEvent::SessionConnected { addr: a, .. } | StatusEvent::SessionConnectFailed { addr: a }
                    if *a == addr)
        })
    }

    /// Bring an inbound streaming peer up to an open media channel with
    /// the signaling holdoff over.
    pub fn open_inbound_stream(&mut self, addr: BdAddr, signal: ChannelHandle, media: ChannelHandle) {
        self.feed(TransportEvent::StreamConnectInd { addr, handle: signal });
        self.feed(TransportEvent::StreamConnectCfm {
            addr,
            handle: Some(signal),
            status: ConnectStatus::Success,
        });
        self.feed(TransportEvent::StreamCapabilities {
            handle: signal,
            endpoints: vec![sbc_endpoint(1)],
        });
        self.feed(TransportEvent::StreamOpenCfm {
            handle: signal,
            media: Some(media),
            success: true,
        });
        let holdoff = self.session_timer(addr, TimerKind::MediaHoldoff);
        self.fire(holdoff);
    }
}

pub fn peer(n: u8) -> BdAddr {
    BdAddr::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, n])
}

/// An SBC endpoint accepting every mode, bitpool 2..=53.
pub fn sbc_endpoint(seid: u8) -> Endpoint {
    Endpoint {
        seid,
        codec: CodecKind::Sbc,
        caps: vec![0xFF, 0xFF, 2, 53],
    }
}

/// Complete 16-bit service class list.
pub fn eir_complete(profiles: &[Profile]) -> Vec<u8> {
    let uuids: Vec<u16> = profiles
        .iter()
        .map(|p| match p {
            Profile::Voice => 0x111E,
            Profile::Streaming => 0x110B,
            Profile::Control => 0x110E,
        })
        .collect();
    let mut out = vec![1 + 2 * uuids.len() as u8, 0x03];
    for u in uuids {
        out.extend_from_slice(&u.to_le_bytes());
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_rig_comes_up_idle() {
    let rig = Rig::new().ready();
    let snapshot = rig.engine.snapshot();
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["state"], "idle");
    assert!(json["sessions"].as_array().unwrap().is_empty());
    assert!(rig.transport.requests().is_empty());
}
