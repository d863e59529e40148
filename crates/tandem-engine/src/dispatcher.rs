//! Top-level action dispatcher.
//!
//! One gateway-wide state plus the current/pending action slots. An action
//! either runs now, is a no-op in the current state, or waits in the
//! pending slot until the in-flight operation completes. Each completion
//! re-dispatches the pending action exactly once.

use serde::Serialize;

use tandem_core::{CallState, ProfileState};

use crate::action::Action;
use crate::context::Context;
use crate::coordinator::{self, SessionReport};
use crate::discovery::{DiscoveryMode, DiscoveryStep};
use crate::engine::Engine;
use crate::profiles::{streaming, voice};
use crate::registry::SessionId;
use crate::session::{Role, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayState {
    Uninitialised,
    Initialising,
    Idle,
    Discovering,
    Probing,
    Connecting,
    Streaming,
    InCall,
    PoweredOff,
}

/// Stream running or about to run.
fn stream_busy(s: &Session) -> bool {
    matches!(
        s.stream.state,
        ProfileState::Starting | ProfileState::Streaming | ProfileState::Suspending
    ) || s.stream.start_wanted
}

fn discovery_mode(action: Action) -> Option<DiscoveryMode> {
    match action {
        Action::Discover => Some(DiscoveryMode::Once),
        Action::DiscoverWhileConnected => Some(DiscoveryMode::OpenEnded),
        Action::Inquire => Some(DiscoveryMode::InquiryOnly),
        _ => None,
    }
}

impl Engine {
    /// Entry point for externally requested actions.
    pub fn dispatch(&mut self, action: Action, cx: &mut Context<'_>) {
        self.run(action, cx, false);
    }

    /// `after_connect` marks a re-dispatch following a connect attempt; an
    /// action that still finds no connection is dropped instead of
    /// connecting again.
    pub(crate) fn run(&mut self, action: Action, cx: &mut Context<'_>, after_connect: bool) {
        tracing::debug!(
            %action,
            state = ?self.state,
            current = ?self.slots.current(),
            pending = ?self.slots.pending(),
            "dispatch"
        );

        if action == Action::None {
            if let Some(cancelled) = self.slots.cancel_pending() {
                tracing::info!(action = %cancelled, "pending action cancelled");
            }
            return;
        }

        match self.state {
            GatewayState::Uninitialised | GatewayState::PoweredOff => {
                tracing::debug!(%action, state = ?self.state, "not running, ignored");
                return;
            }
            GatewayState::Initialising => {
                self.park(action);
                return;
            }
            GatewayState::Discovering | GatewayState::Probing => match action {
                Action::Disconnect => {
                    tracing::info!("disconnect during discovery");
                    self.discovery.stop(cx);
                    self.slots.abandon();
                    self.set_state(GatewayState::Idle, cx);
                    self.begin_disconnect(cx);
                    return;
                }
                Action::Discover | Action::DiscoverWhileConnected | Action::Inquire => {
                    tracing::debug!(%action, "discovery already running");
                    return;
                }
                _ => {}
            },
            _ => {}
        }

        if self.slots.is_busy() {
            self.park(action);
            return;
        }

        match (self.state, action) {
            (GatewayState::Idle, Action::Connect) => self.begin_connect(cx),
            (GatewayState::Idle, Action::Disconnect) => self.begin_disconnect(cx),
            (GatewayState::Idle, Action::StartCall) => self.start_call(cx, after_connect),
            (GatewayState::Idle, Action::StartStream) => self.start_stream(cx, after_connect),
            (GatewayState::Idle, Action::Discover | Action::DiscoverWhileConnected | Action::Inquire) => {
                if let Some(mode) = discovery_mode(action) {
                    self.begin_discovery(action, mode, cx);
                }
            }

            (GatewayState::Streaming, Action::EndStream) => self.end_stream(cx),
            (GatewayState::Streaming, Action::Disconnect | Action::StartCall | Action::Discover) => {
                self.park(action);
                self.end_stream(cx);
            }
            (GatewayState::Streaming, Action::DiscoverWhileConnected) => self.background_discovery(cx),

            (GatewayState::InCall, Action::EndCall) => self.end_call(cx),
            (GatewayState::InCall, Action::Disconnect | Action::StartStream) => {
                self.park(action);
                self.end_call(cx);
            }

            (state, action) => tracing::debug!(%action, ?state, "nothing to do"),
        }
    }

    fn park(&mut self, action: Action) {
        if let Some(displaced) = self.slots.defer(action) {
            tracing::info!(%action, %displaced, "pending action replaced");
        } else {
            tracing::debug!(%action, "action pending");
        }
    }

    /// The in-flight action is over; re-dispatch whatever waited behind it.
    pub(crate) fn complete(&mut self, cx: &mut Context<'_>) {
        let done = self.slots.current();
        if let Some(next) = self.slots.finish() {
            tracing::debug!(done = ?done, %next, "re-dispatching pending action");
            self.run(next, cx, false);
        }
    }

    /// Gateway state once nothing is in flight.
    fn settled_state(&self) -> GatewayState {
        let sessions = || self.registry.iter().map(|(_, s)| s);
        if sessions().any(|s| s.voice.call != CallState::Idle) {
            GatewayState::InCall
        } else if sessions().any(stream_busy) {
            GatewayState::Streaming
        } else {
            GatewayState::Idle
        }
    }

    fn settle(&mut self, cx: &mut Context<'_>) {
        let state = self.settled_state();
        self.set_state(state, cx);
    }

    // ── Connect ──────────────────────────────────────────────────────────

    fn begin_connect(&mut self, cx: &mut Context<'_>) {
        self.slots.begin(Action::Connect);
        self.mru_plan = cx
            .store
            .mru()
            .into_iter()
            .map(|e| e.addr)
            .filter(|addr| {
                self.registry
                    .find(*addr)
                    .and_then(|id| self.registry.get(id))
                    .map_or(true, |s| s.connected_profiles().is_empty())
            })
            .collect();
        tracing::info!(remembered = self.mru_plan.len(), "connect");
        self.next_remembered(cx);
    }

    /// Try the next remembered peer, or fall back to discovery.
    fn next_remembered(&mut self, cx: &mut Context<'_>) {
        let local = cx.store.local_profiles();
        while !self.mru_plan.is_empty() {
            let addr = self.mru_plan.remove(0);
            let Some(entry) = cx.store.mru().into_iter().find(|e| e.addr == addr) else {
                continue;
            };
            let Some(id) = self.registry.find_or_create(addr, true, Role::Initiator) else {
                tracing::info!(peer = %addr, "session pool full, skipping remembered peer");
                continue;
            };
            let Some(s) = self.registry.get_mut(id) else {
                continue;
            };
            s.supported = if entry.profiles.is_empty() {
                tandem_core::ProfileSet::ALL
            } else {
                entry.profiles
            };
            if (entry.pin_index as usize) < cx.store.pins().len() {
                s.pin_index = entry.pin_index;
            }
            self.connecting = Some(id);
            self.set_state(GatewayState::Connecting, cx);
            let Some(s) = self.registry.get_mut(id) else {
                continue;
            };
            let reports = coordinator::request_connect(id, s, local, cx, &self.settings);
            self.on_session_reports(reports, cx);
            return;
        }

        tracing::info!("no remembered peer left, discovering");
        self.background = false;
        let step = self.discovery.start(DiscoveryMode::Once, cx, &self.settings);
        self.set_state(GatewayState::Discovering, cx);
        self.on_discovery_step(step, cx);
    }

    /// A dispatcher-driven connect is over.
    fn connect_finished(&mut self, success: bool, cx: &mut Context<'_>) {
        self.connecting = None;
        self.mru_plan.clear();
        self.settle(cx);
        let done = self.slots.current();
        match self.slots.finish() {
            Some(next) if !success && next.needs_connection() => {
                tracing::info!(action = %next, "connect failed, dropping pending action");
            }
            Some(next) => {
                tracing::debug!(done = ?done, %next, "re-dispatching pending action");
                self.run(next, cx, true);
            }
            None => {}
        }
    }

    /// Session-level outcomes from the coordinator.
    pub(crate) fn on_session_reports(&mut self, reports: Vec<SessionReport>, cx: &mut Context<'_>) {
        for report in reports {
            match report {
                SessionReport::ConnectSucceeded { id, .. } if self.connecting == Some(id) => {
                    self.connecting = None;
                    if self.discovery.is_connecting() {
                        let local = cx.store.local_profiles();
                        let step = self.discovery.on_connect_result(true, local, cx, &self.settings);
                        self.on_discovery_step(step, cx);
                    } else {
                        self.connect_finished(true, cx);
                    }
                }
                SessionReport::ConnectFailed { id, addr } if self.connecting == Some(id) => {
                    self.connecting = None;
                    if self.discovery.is_connecting() {
                        let local = cx.store.local_profiles();
                        let step = self.discovery.on_connect_result(false, local, cx, &self.settings);
                        self.on_discovery_step(step, cx);
                    } else if self.slots.current() == Some(Action::Connect) {
                        tracing::info!(peer = %addr, "remembered peer unavailable");
                        self.next_remembered(cx);
                    }
                }
                SessionReport::Disconnected { .. } => self.check_disconnect_done(cx),
                SessionReport::ConnectSucceeded { .. } | SessionReport::ConnectFailed { .. } => {}
            }
        }
    }

    // ── Discovery ────────────────────────────────────────────────────────

    fn begin_discovery(&mut self, action: Action, mode: DiscoveryMode, cx: &mut Context<'_>) {
        self.slots.begin(action);
        self.background = false;
        let step = self.discovery.start(mode, cx, &self.settings);
        self.set_state(GatewayState::Discovering, cx);
        self.on_discovery_step(step, cx);
    }

    fn background_discovery(&mut self, cx: &mut Context<'_>) {
        if self.discovery.is_active() {
            tracing::debug!("discovery already running");
            return;
        }
        self.background = true;
        let step = self.discovery.start(DiscoveryMode::OpenEnded, cx, &self.settings);
        self.on_discovery_step(step, cx);
    }

    pub(crate) fn on_discovery_step(&mut self, step: DiscoveryStep, cx: &mut Context<'_>) {
        match step {
            DiscoveryStep::Pending => {
                if !self.background && self.discovery.is_active() && !self.discovery.is_connecting() {
                    let state = if self.discovery.is_probing() {
                        GatewayState::Probing
                    } else {
                        GatewayState::Discovering
                    };
                    self.set_state(state, cx);
                }
            }
            DiscoveryStep::Connect(candidate) => {
                let local = cx.store.local_profiles();
                let Some(id) = self.registry.find_or_create(candidate.addr, true, Role::Initiator) else {
                    tracing::info!(peer = %candidate.addr, "session pool full, candidate skipped");
                    let step = self.discovery.on_connect_result(false, local, cx, &self.settings);
                    return self.on_discovery_step(step, cx);
                };
                self.connecting = Some(id);
                if !self.background {
                    self.set_state(GatewayState::Connecting, cx);
                }
                let Some(s) = self.registry.get_mut(id) else {
                    return;
                };
                s.supported = s.supported.union(candidate.profiles);
                let reports = coordinator::request_connect(id, s, local, cx, &self.settings);
                self.on_session_reports(reports, cx);
            }
            DiscoveryStep::Finished(found) => {
                if std::mem::take(&mut self.background) {
                    tracing::debug!(found = ?found, "background discovery over");
                    return;
                }
                self.discovery_finished(found.is_some(), cx);
            }
        }
    }

    fn discovery_finished(&mut self, found: bool, cx: &mut Context<'_>) {
        match self.slots.current() {
            Some(Action::Connect) => self.connect_finished(found, cx),
            _ => {
                self.connecting = None;
                self.settle(cx);
                self.complete(cx);
            }
        }
    }

    // ── Disconnect ───────────────────────────────────────────────────────

    fn begin_disconnect(&mut self, cx: &mut Context<'_>) {
        let targets: Vec<SessionId> = self
            .registry
            .iter()
            .filter(|(_, s)| !s.all_disconnected())
            .map(|(id, _)| id)
            .collect();
        if self.discovery.is_active() {
            self.discovery.stop(cx);
            self.background = false;
        }
        if targets.is_empty() {
            tracing::debug!("nothing to disconnect");
            return;
        }
        tracing::info!(sessions = targets.len(), "disconnect");
        self.slots.begin(Action::Disconnect);
        for id in targets {
            let Some(s) = self.registry.get_mut(id) else {
                continue;
            };
            let reports = coordinator::request_disconnect(id, s, cx, &self.settings);
            self.on_session_reports(reports, cx);
        }
        self.check_disconnect_done(cx);
    }

    /// Completes `Disconnect` once every session is fully down.
    pub(crate) fn check_disconnect_done(&mut self, cx: &mut Context<'_>) {
        if self.slots.current() != Some(Action::Disconnect) {
            return;
        }
        if self.registry.iter().all(|(_, s)| s.all_disconnected()) {
            tracing::info!("all sessions down");
            self.settle(cx);
            self.complete(cx);
        }
    }

    // ── Call ─────────────────────────────────────────────────────────────

    fn start_call(&mut self, cx: &mut Context<'_>, after_connect: bool) {
        let target = self
            .registry
            .iter()
            .find(|(_, s)| s.voice.state == ProfileState::Connected && s.handles.voice.is_some())
            .map(|(id, _)| id);
        let Some(id) = target else {
            if after_connect {
                tracing::info!("no voice connection after connect, start-call dropped");
            } else {
                self.park(Action::StartCall);
                self.begin_connect(cx);
            }
            return;
        };
        let Some(s) = self.registry.get_mut(id) else {
            return;
        };
        self.slots.begin(Action::StartCall);
        let reports = voice::start_call(s, cx);
        if reports.is_empty() {
            tracing::warn!(session = %id, "call not started");
            self.settle(cx);
            self.complete(cx);
            return;
        }
        self.apply_reports(id, reports, cx);
    }

    fn end_call(&mut self, cx: &mut Context<'_>) {
        self.slots.begin(Action::EndCall);
        for id in self.registry.ids() {
            let Some(s) = self.registry.get_mut(id) else {
                continue;
            };
            if s.voice.call == CallState::Idle {
                continue;
            }
            let reports = voice::end_call(s, cx);
            self.apply_reports(id, reports, cx);
        }
        self.on_call_quiet(cx);
    }

    pub(crate) fn on_call_changed(&mut self, call: CallState, cx: &mut Context<'_>) {
        match call {
            CallState::Setup | CallState::Active => {
                self.set_state(GatewayState::InCall, cx);
                if call == CallState::Active && self.slots.current() == Some(Action::StartCall) {
                    self.complete(cx);
                }
            }
            CallState::Shutdown => {}
            CallState::Idle => self.on_call_quiet(cx),
        }
    }

    /// A call may have ended; leave InCall once none is left.
    pub(crate) fn on_call_quiet(&mut self, cx: &mut Context<'_>) {
        if self.registry.iter().any(|(_, s)| s.voice.call != CallState::Idle) {
            return;
        }
        if self.state == GatewayState::InCall {
            self.settle(cx);
        }
        if matches!(self.slots.current(), Some(Action::StartCall | Action::EndCall)) {
            self.complete(cx);
        }
    }

    // ── Stream ───────────────────────────────────────────────────────────

    fn start_stream(&mut self, cx: &mut Context<'_>, after_connect: bool) {
        let target = {
            let candidates = || {
                self.registry
                    .iter()
                    .filter(|(_, s)| s.stream.state.is_connected() && s.handles.stream_signal.is_some())
            };
            candidates()
                .find(|(_, s)| s.stream.state.has_media())
                .or_else(|| candidates().next())
                .map(|(id, _)| id)
        };
        let Some(id) = target else {
            if after_connect {
                tracing::info!("no streaming connection after connect, start-stream dropped");
            } else {
                self.park(Action::StartStream);
                self.begin_connect(cx);
            }
            return;
        };
        let Some(s) = self.registry.get_mut(id) else {
            return;
        };
        if s.stream.state == ProfileState::Streaming {
            self.set_state(GatewayState::Streaming, cx);
            return;
        }
        self.slots.begin(Action::StartStream);
        match streaming::request_start(s, cx) {
            streaming::StartRequest::Underway | streaming::StartRequest::Deferred => {
                self.set_state(GatewayState::Streaming, cx);
            }
            streaming::StartRequest::Impossible => {
                tracing::warn!(session = %id, "stream cannot start");
                self.complete(cx);
            }
        }
    }

    fn end_stream(&mut self, cx: &mut Context<'_>) {
        self.slots.begin(Action::EndStream);
        for (id, s) in self.registry.iter_mut() {
            if streaming::request_suspend(s, cx) {
                tracing::debug!(session = %id, "suspend requested");
            }
        }
        self.on_stream_quiet(cx);
    }

    pub(crate) fn on_media_started(&mut self, cx: &mut Context<'_>) {
        if self.state != GatewayState::InCall {
            self.set_state(GatewayState::Streaming, cx);
        }
        self.arbitrate(cx);
        if self.slots.current() == Some(Action::StartStream) {
            self.complete(cx);
        }
    }

    pub(crate) fn on_media_start_failed(&mut self, cx: &mut Context<'_>) {
        self.arbitrate(cx);
        if self.slots.current() == Some(Action::StartStream) {
            self.settle(cx);
            self.complete(cx);
        }
    }

    /// Media suspended, closed or lost somewhere.
    pub(crate) fn on_stream_quiet(&mut self, cx: &mut Context<'_>) {
        self.arbitrate(cx);
        if self.registry.iter().any(|(_, s)| stream_busy(s)) {
            return;
        }
        if self.state == GatewayState::Streaming {
            self.settle(cx);
        }
        if self.slots.current() == Some(Action::EndStream) {
            self.complete(cx);
        }
    }
}
