//! The engine: owns every piece of orchestration state and routes each
//! incoming [`Event`] to the layer that handles it.
//!
//! Routing rules:
//! - connect indications and confirmations are correlated by peer address,
//! - everything else on a channel is correlated by its handle,
//! - timers carry a session id whose generation must still match.
//!
//! Anything that fails to correlate is stale and dropped with a warning.

use serde::Serialize;

use tandem_core::{BdAddr, Profile, QualityChoice};

use crate::action::{Action, ActionSlots};
use crate::arbiter::Arbiter;
use crate::audio::AudioCommand;
use crate::context::Context;
use crate::coordinator;
use crate::discovery::{Discovery, DiscoveryMode};
use crate::dispatcher::GatewayState;
use crate::event::{ChannelHandle, ConnectStatus, Event, PassthroughOp, TransportEvent};
use crate::notify::StatusEvent;
use crate::profiles::{self, control, streaming, voice, ProfileReport};
use crate::registry::{Destroy, SessionId, SessionRegistry};
use crate::session::{Role, SessionSnapshot};
use crate::settings::Settings;
use crate::timer::{TimerKey, TimerKind, TimerScope};
use crate::transport::TransportRequest;

/// Everything `GET /status` shows.
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySnapshot {
    pub state: GatewayState,
    pub current: Option<Action>,
    pub pending: Option<Action>,
    pub discovery: Option<DiscoveryMode>,
    pub quality: Option<QualityChoice>,
    pub sessions: Vec<SessionSnapshot>,
}

#[derive(Debug)]
pub struct Engine {
    pub(crate) settings: Settings,
    pub(crate) registry: SessionRegistry,
    pub(crate) discovery: Discovery,
    pub(crate) arbiter: Arbiter,
    pub(crate) state: GatewayState,
    pub(crate) slots: ActionSlots,
    /// Remembered peers still to try for the in-flight `Connect`.
    pub(crate) mru_plan: Vec<BdAddr>,
    /// Session whose connect cycle the dispatcher is waiting on.
    pub(crate) connecting: Option<SessionId>,
    /// Discovery started while streaming; it leaves the gateway state alone.
    pub(crate) background: bool,
    audio_active: bool,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        Self {
            registry: SessionRegistry::with_capacity(settings.max_sessions),
            discovery: Discovery::new(settings.candidate_capacity),
            arbiter: Arbiter::new(),
            state: GatewayState::Uninitialised,
            slots: ActionSlots::new(),
            mru_plan: Vec::new(),
            connecting: None,
            background: false,
            audio_active: false,
            settings,
        }
    }

    pub fn state(&self) -> GatewayState {
        self.state
    }

    pub fn slots(&self) -> &ActionSlots {
        &self.slots
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn snapshot(&self) -> GatewaySnapshot {
        GatewaySnapshot {
            state: self.state,
            current: self.slots.current(),
            pending: self.slots.pending(),
            discovery: self.discovery.mode(),
            quality: self.arbiter.current(),
            sessions: self.registry.iter().map(|(_, s)| s.snapshot()).collect(),
        }
    }

    /// Run one event to completion.
    pub fn handle(&mut self, event: Event, cx: &mut Context<'_>) {
        tracing::trace!(?event, state = ?self.state, "event");
        match event {
            Event::Start => self.start(cx),
            Event::PowerOff => self.power_off(cx),
            Event::Action(action) => self.dispatch(action, cx),
            Event::Timer(key) => self.on_timer(key, cx),
            Event::Transport(ev) => self.on_transport(ev, cx),
        }
        self.sync_audio_idle(cx);
    }

    pub(crate) fn set_state(&mut self, state: GatewayState, cx: &mut Context<'_>) {
        if self.state == state {
            return;
        }
        tracing::info!(from = ?self.state, to = ?state, "gateway state");
        self.state = state;
        cx.notify(StatusEvent::ModeChanged { state });
    }

    pub(crate) fn arbitrate(&mut self, cx: &mut Context<'_>) {
        self.arbiter
            .choose_streaming_quality(&mut self.registry, self.settings.max_bitpool, cx);
    }

    /// Return the audio processor to idle once nothing is routed to it.
    fn sync_audio_idle(&mut self, cx: &mut Context<'_>) {
        let active = self
            .registry
            .iter()
            .any(|(_, s)| s.stream.state == tandem_core::ProfileState::Streaming || s.handles.voice_audio.is_some());
        if self.audio_active && !active {
            tracing::debug!("no audio routed, processor idle");
            cx.audio(AudioCommand::EnterIdle);
        }
        self.audio_active = active;
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    fn start(&mut self, cx: &mut Context<'_>) {
        match self.state {
            GatewayState::Uninitialised | GatewayState::PoweredOff => {
                self.set_state(GatewayState::Initialising, cx);
            }
            state => tracing::debug!(?state, "already started"),
        }
    }

    fn on_ready(&mut self, cx: &mut Context<'_>) {
        if self.state != GatewayState::Initialising {
            tracing::warn!(state = ?self.state, "stack ready outside initialisation, dropped");
            return;
        }
        self.set_state(GatewayState::Idle, cx);
        cx.audio(AudioCommand::EnterIdle);
        if let Some(action) = self.slots.finish() {
            self.run(action, cx, false);
        }
    }

    fn power_off(&mut self, cx: &mut Context<'_>) {
        tracing::info!(sessions = self.registry.len(), "powering off");
        self.discovery.stop(cx);
        self.background = false;
        self.slots.clear();
        self.mru_plan.clear();
        self.connecting = None;
        for id in self.registry.ids() {
            if let Some(s) = self.registry.get_mut(id) {
                coordinator::request_disconnect(id, s, cx, &self.settings);
            }
        }
        self.set_state(GatewayState::PoweredOff, cx);
        cx.audio(AudioCommand::EnterIdle);
    }

    // ── Timers ───────────────────────────────────────────────────────────

    fn on_timer(&mut self, key: TimerKey, cx: &mut Context<'_>) {
        let local = cx.store.local_profiles();
        match key.scope {
            TimerScope::System => {
                let step = match key.kind {
                    TimerKind::DiscoveryWindow => {
                        self.discovery.on_window_timer(local, cx, &self.settings)
                    }
                    TimerKind::ProbeTimeout => self.discovery.on_probe_timeout(local, cx, &self.settings),
                    kind => {
                        tracing::warn!(?kind, "session timer without a session, dropped");
                        return;
                    }
                };
                self.on_discovery_step(step, cx);
            }
            TimerScope::Session(id) => {
                let Some(s) = self.registry.get_mut(id) else {
                    tracing::debug!(session = %id, kind = ?key.kind, "stale timer, dropped");
                    return;
                };
                match key.kind {
                    TimerKind::ProfileConnect(profile) => {
                        let report = profiles::on_connect_timeout(s, profile, cx);
                        self.apply_reports(id, report.into_iter().collect(), cx);
                    }
                    TimerKind::MediaHoldoff => {
                        let reports = streaming::on_holdoff_end(s, cx);
                        self.apply_reports(id, reports, cx);
                    }
                    TimerKind::DestroySession => match self.registry.destroy(id, cx.timers) {
                        Destroy::Destroyed => self.check_disconnect_done(cx),
                        Destroy::Deferred => tracing::debug!(session = %id, "session busy again, kept"),
                        Destroy::Gone => {}
                    },
                    kind => tracing::warn!(session = %id, ?kind, "system timer scoped to a session, dropped"),
                }
            }
        }
    }

    // ── Transport ────────────────────────────────────────────────────────

    fn on_transport(&mut self, ev: TransportEvent, cx: &mut Context<'_>) {
        let local = cx.store.local_profiles();
        match ev {
            TransportEvent::Ready => self.on_ready(cx),

            TransportEvent::InquiryResult { addr, rssi, eir } => {
                let connected = self
                    .registry
                    .find(addr)
                    .and_then(|id| self.registry.get(id))
                    .is_some_and(|s| !s.connected_profiles().is_empty());
                if connected {
                    tracing::debug!(peer = %addr, "already connected, not a candidate");
                    return;
                }
                self.discovery
                    .on_inquiry_result(addr, rssi, &eir, local, cx, &self.settings);
            }
            TransportEvent::InquiryComplete => {
                let step = self.discovery.on_scan_done(false, local, cx, &self.settings);
                self.on_discovery_step(step, cx);
            }
            TransportEvent::SearchResult { addr, profile, found } => {
                let step = self
                    .discovery
                    .on_search_result(addr, profile, found, local, cx, &self.settings);
                self.on_discovery_step(step, cx);
            }

            TransportEvent::PinRequest { addr } => self.on_pin_request(addr, cx),
            TransportEvent::AuthenticationResult { addr, success } => {
                if success {
                    tracing::debug!(peer = %addr, "authenticated");
                } else {
                    tracing::warn!(peer = %addr, "authentication failed");
                }
            }
            TransportEvent::LinkInfo { addr, quality, edr } => {
                let Some(s) = self.registry.find(addr).and_then(|id| self.registry.get_mut(id)) else {
                    tracing::debug!(peer = %addr, "link info for unknown peer, dropped");
                    return;
                };
                tracing::debug!(peer = %addr, ?quality, edr, "link info");
                s.quality = quality;
                s.edr = edr;
                self.arbitrate(cx);
            }

            TransportEvent::VoiceConnectInd { addr, handle } => {
                self.on_connect_ind(Profile::Voice, addr, handle, cx)
            }
            TransportEvent::StreamConnectInd { addr, handle } => {
                self.on_connect_ind(Profile::Streaming, addr, handle, cx)
            }
            TransportEvent::ControlConnectInd { addr, handle } => {
                self.on_connect_ind(Profile::Control, addr, handle, cx)
            }
            TransportEvent::VoiceConnectCfm { addr, handle, status } => {
                self.on_connect_cfm(Profile::Voice, addr, handle, status, cx)
            }
            TransportEvent::StreamConnectCfm { addr, handle, status } => {
                self.on_connect_cfm(Profile::Streaming, addr, handle, status, cx)
            }
            TransportEvent::ControlConnectCfm { addr, handle, status } => {
                self.on_connect_cfm(Profile::Control, addr, handle, status, cx)
            }

            ev => self.on_channel_event(&ev, cx),
        }
    }

    fn on_pin_request(&mut self, addr: BdAddr, cx: &mut Context<'_>) {
        let index = self
            .registry
            .find(addr)
            .and_then(|id| self.registry.get(id))
            .map_or(0, |s| s.pin_index as usize);
        let pin = cx.store.pins().get(index).cloned();
        if pin.is_none() {
            tracing::info!(peer = %addr, index, "no pin candidate left");
        }
        cx.send(TransportRequest::PinReply { addr, pin });
    }

    fn reject(&self, profile: Profile, addr: BdAddr, handle: ChannelHandle, reason: &str, cx: &mut Context<'_>) {
        tracing::info!(peer = %addr, %profile, reason, "inbound connection rejected");
        cx.send(TransportRequest::Respond {
            addr,
            profile,
            handle,
            accept: false,
        });
        cx.notify(StatusEvent::SessionRejected { addr, profile });
    }

    fn on_connect_ind(&mut self, profile: Profile, addr: BdAddr, handle: ChannelHandle, cx: &mut Context<'_>) {
        if matches!(
            self.state,
            GatewayState::Uninitialised | GatewayState::Initialising | GatewayState::PoweredOff
        ) {
            return self.reject(profile, addr, handle, "not ready", cx);
        }
        if !cx.store.local_profiles().contains(profile) {
            return self.reject(profile, addr, handle, "profile not enabled", cx);
        }
        let Some(id) = self.registry.find_or_create(addr, true, Role::Acceptor) else {
            return self.reject(profile, addr, handle, "session pool full", cx);
        };
        let Some(s) = self.registry.get_mut(id) else {
            return;
        };
        if !s.state(profile).is_disconnected() {
            let state = s.state(profile);
            tracing::debug!(peer = %addr, %profile, ?state, "profile busy");
            return self.reject(profile, addr, handle, "profile busy", cx);
        }
        cx.timers.cancel(TimerKey::session(id, TimerKind::DestroySession));
        if let Err(e) = profiles::accept(id, s, profile, handle, cx, &self.settings) {
            tracing::warn!(peer = %addr, %profile, error = %e, "accept not sent");
            let reports = coordinator::on_profile_down(id, s, cx, &self.settings);
            self.on_session_reports(reports, cx);
        }
    }

    fn on_connect_cfm(
        &mut self,
        profile: Profile,
        addr: BdAddr,
        handle: Option<ChannelHandle>,
        status: ConnectStatus,
        cx: &mut Context<'_>,
    ) {
        let Some(id) = self.registry.find(addr) else {
            if let (ConnectStatus::Success, Some(h)) = (status, handle) {
                tracing::warn!(peer = %addr, %profile, "connect confirmation for unknown peer, closing channel");
                cx.send(profiles::disconnect_request(profile, h));
            } else {
                tracing::warn!(peer = %addr, %profile, ?status, "connect confirmation for unknown peer, dropped");
            }
            return;
        };
        let Some(s) = self.registry.get_mut(id) else {
            return;
        };
        let report = profiles::on_connect_cfm(id, s, profile, handle, status, cx, &self.settings);
        self.apply_reports(id, report.into_iter().collect(), cx);
    }

    fn on_channel_event(&mut self, ev: &TransportEvent, cx: &mut Context<'_>) {
        let Some((handle, profile)) = ev.channel() else {
            tracing::warn!(event = ?ev, "uncorrelated transport event, dropped");
            return;
        };
        let Some((id, owner)) = self.registry.find_by_channel_handle(handle) else {
            tracing::warn!(handle = handle.0, %profile, event = ?ev, "event for unknown channel, dropped");
            return;
        };
        if owner != profile {
            tracing::warn!(handle = handle.0, %owner, %profile, "event on another profile's channel, dropped");
            return;
        }
        let Some(s) = self.registry.get_mut(id) else {
            return;
        };
        let reports = match profile {
            Profile::Voice => voice::on_event(s, ev, cx),
            Profile::Streaming => streaming::on_event(s, ev, cx, &self.settings),
            Profile::Control => control::on_event(s, ev, cx),
        };
        self.apply_reports(id, reports, cx);
    }

    // ── Reports ──────────────────────────────────────────────────────────

    /// Feed what a profile machine reported into the coordinator, the
    /// dispatcher and the arbiter.
    pub(crate) fn apply_reports(&mut self, id: SessionId, reports: Vec<ProfileReport>, cx: &mut Context<'_>) {
        for report in reports {
            tracing::debug!(session = %id, ?report, "profile report");
            match report {
                ProfileReport::ConnectResult { profile, outcome } => {
                    let local = cx.store.local_profiles();
                    let Some(s) = self.registry.get_mut(id) else {
                        continue;
                    };
                    let reports = coordinator::on_profile_result(id, s, profile, outcome, local, cx, &self.settings);
                    self.on_session_reports(reports, cx);
                    self.check_disconnect_done(cx);
                }
                ProfileReport::Disconnected(profile) => {
                    let Some(s) = self.registry.get_mut(id) else {
                        continue;
                    };
                    let reports = coordinator::on_profile_down(id, s, cx, &self.settings);
                    if profile == Profile::Streaming {
                        self.on_stream_quiet(cx);
                    }
                    if profile == Profile::Voice {
                        self.on_call_quiet(cx);
                    }
                    self.on_session_reports(reports, cx);
                    self.check_disconnect_done(cx);
                }
                ProfileReport::MediaOpened => self.arbitrate(cx),
                ProfileReport::MediaStarted => self.on_media_started(cx),
                ProfileReport::MediaStartFailed => self.on_media_start_failed(cx),
                ProfileReport::MediaSuspended | ProfileReport::MediaClosed => self.on_stream_quiet(cx),
                ProfileReport::CallChanged(call) => self.on_call_changed(call, cx),
                ProfileReport::Passthrough(op) => self.on_passthrough(op, cx),
            }
        }
    }

    fn on_passthrough(&mut self, op: PassthroughOp, cx: &mut Context<'_>) {
        let action = match op {
            PassthroughOp::Play => Action::StartStream,
            PassthroughOp::Pause | PassthroughOp::Stop => Action::EndStream,
            PassthroughOp::Forward | PassthroughOp::Backward => {
                tracing::debug!(?op, "passthrough has no local effect");
                return;
            }
        };
        tracing::info!(?op, %action, "remote control");
        self.dispatch(action, cx);
    }
}
