//! The single task that owns the engine.
//!
//! Every input (stack events, timer fires, control actions) arrives on one
//! channel and runs to completion in arrival order. After each step the
//! status view is republished for the HTTP surface.

use std::collections::VecDeque;

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use tandem_engine::{
    Action, AudioSink, ConfigStore, Context, Engine, Event, GatewaySnapshot, Notifier, StatusEvent, TimerKey,
    Transport, TransportEvent,
};

use crate::scheduler::TokioScheduler;

/// How many notifications `/status` keeps.
const RECENT: usize = 32;

#[derive(Debug)]
pub enum Input {
    Transport(TransportEvent),
    Timer { key: TimerKey, seq: u64 },
    Action(Action),
    LinkLost,
    Shutdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub gateway: GatewaySnapshot,
    pub recent: Vec<StatusEvent>,
    pub link_up: bool,
}

impl StatusView {
    pub fn initial(engine: &Engine) -> Self {
        Self {
            gateway: engine.snapshot(),
            recent: Vec::new(),
            link_up: true,
        }
    }
}

/// Logs every notification and keeps the latest few.
#[derive(Debug, Default)]
pub struct StatusFeed {
    recent: VecDeque<StatusEvent>,
}

impl Notifier for StatusFeed {
    fn notify(&mut self, event: StatusEvent) {
        tracing::info!(?event, "status");
        if self.recent.len() == RECENT {
            self.recent.pop_front();
        }
        self.recent.push_back(event);
    }
}

pub struct EventLoop<T, A, S> {
    engine: Engine,
    transport: T,
    audio: A,
    store: S,
    timers: TokioScheduler,
    feed: StatusFeed,
    rx: mpsc::UnboundedReceiver<Input>,
    status: watch::Sender<StatusView>,
    link_up: bool,
}

impl<T, A, S> EventLoop<T, A, S>
where
    T: Transport,
    A: AudioSink,
    S: ConfigStore,
{
    pub fn new(
        engine: Engine,
        transport: T,
        audio: A,
        store: S,
        timers: TokioScheduler,
        rx: mpsc::UnboundedReceiver<Input>,
        status: watch::Sender<StatusView>,
    ) -> Self {
        Self {
            engine,
            transport,
            audio,
            store,
            timers,
            feed: StatusFeed::default(),
            rx,
            status,
            link_up: true,
        }
    }

    pub async fn run(mut self) {
        self.step(Event::Start);
        while let Some(input) = self.rx.recv().await {
            let event = match input {
                Input::Transport(ev) => Event::Transport(ev),
                Input::Timer { key, seq } => {
                    if !self.timers.claim(key, seq) {
                        tracing::trace!(?key, seq, "superseded timer dropped");
                        continue;
                    }
                    Event::Timer(key)
                }
                Input::Action(action) => Event::Action(action),
                Input::LinkLost => {
                    tracing::error!("stack link lost, powering off");
                    self.link_up = false;
                    Event::PowerOff
                }
                Input::Shutdown => {
                    self.step(Event::PowerOff);
                    break;
                }
            };
            self.step(event);
        }
        tracing::info!(armed_timers = self.timers.armed(), "event loop stopped");
    }

    fn step(&mut self, event: Event) {
        let mut cx = Context::new(
            &mut self.transport,
            &mut self.audio,
            &mut self.timers,
            &mut self.store,
            &mut self.feed,
        );
        self.engine.handle(event, &mut cx);
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(StatusView {
            gateway: self.engine.snapshot(),
            recent: self.feed.recent.iter().cloned().collect(),
            link_up: self.link_up,
        });
    }
}
