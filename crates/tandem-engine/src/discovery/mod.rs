//! Discovery and ranking.
//!
//! One cycle: scan for the inquiry window, collecting ranked candidates;
//! then drain them best-first, probing each for profiles its advertised
//! data did not settle, and hand the first suitable one out as a connect
//! target. A failed connect moves on to the next candidate. Open-ended
//! discovery starts a fresh scan when the buffer runs dry.

pub mod buffer;
pub mod eir;

use serde::Serialize;

use tandem_core::{BdAddr, Profile, ProfileSet};

pub use buffer::{Candidate, CandidateBuffer, Insert};

use crate::context::Context;
use crate::notify::StatusEvent;
use crate::settings::Settings;
use crate::timer::{TimerKey, TimerKind};
use crate::transport::TransportRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// One scan, connect to the best suitable peer.
    Once,
    /// Keep scanning until a peer connects.
    OpenEnded,
    /// Scan and report candidates, never connect.
    InquiryOnly,
}

/// What the caller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStep {
    /// Waiting on the stack or a timer.
    Pending,
    /// Connect to this peer and report back with `on_connect_result`.
    Connect(Candidate),
    /// Discovery is over.
    Finished(Option<BdAddr>),
}

#[derive(Debug, Clone, Copy)]
struct Probe {
    candidate: Candidate,
    remaining: ProfileSet,
    current: Option<Profile>,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    Scanning,
    Probing(Probe),
    Connecting(Candidate),
}

#[derive(Debug)]
pub struct Discovery {
    mode: Option<DiscoveryMode>,
    phase: Phase,
    buffer: CandidateBuffer,
}

impl Discovery {
    pub fn new(capacity: usize) -> Self {
        Self {
            mode: None,
            phase: Phase::Idle,
            buffer: CandidateBuffer::new(capacity),
        }
    }

    pub fn mode(&self) -> Option<DiscoveryMode> {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode.is_some()
    }

    pub fn is_probing(&self) -> bool {
        matches!(self.phase, Phase::Probing(_))
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self.phase, Phase::Connecting(_))
    }

    pub fn candidates(&self) -> &[Candidate] {
        self.buffer.as_slice()
    }

    pub fn start(&mut self, mode: DiscoveryMode, cx: &mut Context<'_>, settings: &Settings) -> DiscoveryStep {
        if self.is_active() {
            self.stop(cx);
        }
        tracing::info!(?mode, "discovery started");
        self.mode = Some(mode);
        self.scan(cx, settings)
    }

    /// Abandon discovery without a result.
    pub fn stop(&mut self, cx: &mut Context<'_>) {
        if matches!(self.phase, Phase::Scanning) {
            cx.send(TransportRequest::StopInquiry);
        }
        if self.is_active() {
            tracing::info!("discovery stopped");
        }
        self.reset(cx);
    }

    fn reset(&mut self, cx: &mut Context<'_>) {
        cx.timers.cancel(TimerKey::system(TimerKind::DiscoveryWindow));
        cx.timers.cancel(TimerKey::system(TimerKind::ProbeTimeout));
        self.mode = None;
        self.phase = Phase::Idle;
        self.buffer.clear();
    }

    fn scan(&mut self, cx: &mut Context<'_>, settings: &Settings) -> DiscoveryStep {
        self.buffer.clear();
        if !cx.send(TransportRequest::StartInquiry) {
            return self.finish(None, cx);
        }
        self.phase = Phase::Scanning;
        cx.timers
            .schedule(TimerKey::system(TimerKind::DiscoveryWindow), settings.inquiry_window);
        DiscoveryStep::Pending
    }

    fn finish(&mut self, found: Option<BdAddr>, cx: &mut Context<'_>) -> DiscoveryStep {
        tracing::info!(found = ?found, "discovery finished");
        self.reset(cx);
        cx.notify(StatusEvent::DiscoveryFinished { found });
        DiscoveryStep::Finished(found)
    }

    // ── Scanning ─────────────────────────────────────────────────────────

    pub fn on_inquiry_result(
        &mut self,
        addr: BdAddr,
        rssi: i8,
        eir: &[u8],
        local: ProfileSet,
        cx: &mut Context<'_>,
        settings: &Settings,
    ) {
        if !matches!(self.phase, Phase::Scanning) {
            tracing::debug!(peer = %addr, "inquiry result outside scan, dropped");
            return;
        }
        let adv = eir::parse(eir);
        let tx_power = adv.tx_power.unwrap_or(settings.default_tx_power);
        let path_loss = eir::path_loss(tx_power, rssi);

        if path_loss > settings.max_path_loss {
            tracing::debug!(peer = %addr, path_loss, "too far, dropped");
            return;
        }
        if adv.complete && adv.profiles.intersection(local).is_empty() {
            tracing::debug!(peer = %addr, profiles = ?adv.profiles, "shares no profile, dropped");
            return;
        }

        let candidate = Candidate {
            addr,
            profiles: adv.profiles,
            path_loss,
            complete: adv.complete,
        };
        match self.buffer.insert(candidate) {
            Insert::Added | Insert::Replaced => {
                tracing::debug!(peer = %addr, path_loss, profiles = ?adv.profiles, "candidate ranked");
                cx.notify(StatusEvent::CandidateFound {
                    addr,
                    path_loss,
                    profiles: adv.profiles,
                });
            }
            Insert::Ignored => {}
            Insert::Full => {
                tracing::info!(peer = %addr, path_loss, "candidate buffer full, dropped");
            }
        }
    }

    /// Scan window over, either by our timer or the stack finishing early.
    pub fn on_scan_done(&mut self, from_timer: bool, local: ProfileSet, cx: &mut Context<'_>, settings: &Settings) -> DiscoveryStep {
        if !matches!(self.phase, Phase::Scanning) {
            tracing::debug!("scan end outside scan, dropped");
            return DiscoveryStep::Pending;
        }
        if from_timer {
            cx.send(TransportRequest::StopInquiry);
        } else {
            cx.timers.cancel(TimerKey::system(TimerKind::DiscoveryWindow));
        }
        tracing::info!(candidates = self.buffer.len(), "scan window closed");
        if self.mode == Some(DiscoveryMode::InquiryOnly) {
            return self.finish(None, cx);
        }
        self.next_candidate(local, cx, settings)
    }

    // ── Probing ──────────────────────────────────────────────────────────

    fn next_candidate(&mut self, local: ProfileSet, cx: &mut Context<'_>, settings: &Settings) -> DiscoveryStep {
        while let Some(candidate) = self.buffer.pop_best() {
            let remaining = if candidate.complete {
                ProfileSet::EMPTY
            } else {
                local.difference(candidate.profiles)
            };
            let probe = Probe {
                candidate,
                remaining,
                current: None,
            };
            if let Some(step) = self.probe_or_evaluate(probe, local, cx, settings) {
                return step;
            }
        }
        match self.mode {
            Some(DiscoveryMode::OpenEnded) => {
                tracing::debug!("no suitable candidate, scanning again");
                self.scan(cx, settings)
            }
            _ => self.finish(None, cx),
        }
    }

    /// Ask about the next unknown profile, or judge the candidate once
    /// nothing is left to ask. `None` means it was discarded.
    fn probe_or_evaluate(
        &mut self,
        mut probe: Probe,
        local: ProfileSet,
        cx: &mut Context<'_>,
        settings: &Settings,
    ) -> Option<DiscoveryStep> {
        let addr = probe.candidate.addr;
        while let Some(profile) = probe.remaining.iter().next() {
            probe.remaining.remove(profile);
            if cx.send(TransportRequest::Search { addr, profile }) {
                probe.current = Some(profile);
                self.phase = Phase::Probing(probe);
                cx.timers
                    .schedule(TimerKey::system(TimerKind::ProbeTimeout), settings.probe_timeout);
                return Some(DiscoveryStep::Pending);
            }
            if settings.blocking.contains(profile) {
                tracing::info!(peer = %addr, %profile, "blocking probe not started, candidate dropped");
                return None;
            }
        }

        let shared = probe.candidate.profiles.intersection(local);
        if shared.is_empty() {
            tracing::info!(peer = %addr, profiles = ?probe.candidate.profiles, "candidate unsuitable");
            return None;
        }
        tracing::info!(peer = %addr, profiles = ?shared, "candidate selected");
        self.phase = Phase::Connecting(probe.candidate);
        Some(DiscoveryStep::Connect(probe.candidate))
    }

    fn probe_answered(
        &mut self,
        mut probe: Probe,
        found: bool,
        local: ProfileSet,
        cx: &mut Context<'_>,
        settings: &Settings,
    ) -> DiscoveryStep {
        let addr = probe.candidate.addr;
        if let Some(profile) = probe.current.take() {
            if found {
                probe.candidate.profiles.insert(profile);
            } else if settings.blocking.contains(profile) {
                tracing::info!(peer = %addr, %profile, "blocking probe failed, candidate dropped");
                return self.next_candidate(local, cx, settings);
            }
        }
        match self.probe_or_evaluate(probe, local, cx, settings) {
            Some(step) => step,
            None => self.next_candidate(local, cx, settings),
        }
    }

    pub fn on_search_result(
        &mut self,
        addr: BdAddr,
        profile: Profile,
        found: bool,
        local: ProfileSet,
        cx: &mut Context<'_>,
        settings: &Settings,
    ) -> DiscoveryStep {
        let probe = match self.phase {
            Phase::Probing(p) if p.candidate.addr == addr && p.current == Some(profile) => p,
            _ => {
                tracing::warn!(peer = %addr, %profile, "search result for no pending probe, dropped");
                return DiscoveryStep::Pending;
            }
        };
        cx.timers.cancel(TimerKey::system(TimerKind::ProbeTimeout));
        tracing::debug!(peer = %addr, %profile, found, "probe answered");
        self.probe_answered(probe, found, local, cx, settings)
    }

    pub fn on_probe_timeout(&mut self, local: ProfileSet, cx: &mut Context<'_>, settings: &Settings) -> DiscoveryStep {
        let Phase::Probing(probe) = self.phase else {
            tracing::debug!("probe timeout with no probe, dropped");
            return DiscoveryStep::Pending;
        };
        tracing::info!(peer = %probe.candidate.addr, profile = ?probe.current, "probe timed out");
        self.probe_answered(probe, false, local, cx, settings)
    }

    pub fn on_window_timer(&mut self, local: ProfileSet, cx: &mut Context<'_>, settings: &Settings) -> DiscoveryStep {
        self.on_scan_done(true, local, cx, settings)
    }

    // ── Connecting ───────────────────────────────────────────────────────

    /// The candidate handed out by `Connect` finished connecting.
    pub fn on_connect_result(&mut self, success: bool, local: ProfileSet, cx: &mut Context<'_>, settings: &Settings) -> DiscoveryStep {
        let Phase::Connecting(candidate) = self.phase else {
            tracing::debug!("connect result with no candidate connecting, dropped");
            return DiscoveryStep::Pending;
        };
        if success {
            return self.finish(Some(candidate.addr), cx);
        }
        tracing::info!(peer = %candidate.addr, "candidate failed to connect, trying next");
        self.next_candidate(local, cx, settings)
    }
}
