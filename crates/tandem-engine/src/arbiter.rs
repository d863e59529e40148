//! Audio resource arbiter: one encoder quality across every open stream.

use tandem_core::{Quality, QualityChoice};

use crate::audio::AudioCommand;
use crate::context::Context;
use crate::notify::StatusEvent;
use crate::registry::SessionRegistry;
use crate::transport::TransportRequest;

/// What arbitration needs to know about one open stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSample {
    pub quality: Quality,
    /// Link runs at the top data-rate tier.
    pub edr: bool,
    /// Highest bitpool this stream was configured for.
    pub max_bitpool: u8,
}

/// Pick the shared quality for `links`.
///
/// The weakest link sets the tier. Sharing air time between more than one
/// stream costs a tier, and a link below the top data-rate tier in that
/// situation costs another. Bitpools are clamped into the tightest bound.
///
/// The shared-air-time tier applies even when every link is EDR. Good and
/// High over a slow link must land on Low, which takes both steps from
/// Good; a single step gated on a slow link would stop at Medium.
pub fn select_quality(links: &[LinkSample], max_bitpool: u8) -> Option<QualityChoice> {
    let weakest = links.iter().map(|l| l.quality.effective()).min()?;
    let bound = links
        .iter()
        .map(|l| l.max_bitpool)
        .fold(max_bitpool, u8::min);

    let mut quality = weakest;
    if links.len() > 1 {
        quality = quality.downgrade();
        if links.iter().any(|l| !l.edr) {
            quality = quality.downgrade();
        }
    }
    Some(QualityChoice::for_quality(quality, bound))
}

#[derive(Debug, Default)]
pub struct Arbiter {
    last: Option<QualityChoice>,
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<QualityChoice> {
        self.last
    }

    /// Re-run arbitration over every session with an open media channel.
    /// Pushes to the audio processor only on change. Sessions whose link
    /// quality was never read get one link-info request.
    pub fn choose_streaming_quality(
        &mut self,
        registry: &mut SessionRegistry,
        max_bitpool: u8,
        cx: &mut Context<'_>,
    ) -> Option<QualityChoice> {
        let mut links = Vec::new();
        for (_, s) in registry.iter_mut() {
            if !s.stream.state.has_media() {
                continue;
            }
            if s.quality == Quality::Unknown && !s.link_info_requested {
                s.link_info_requested = true;
                cx.send(TransportRequest::ReadLinkInfo { addr: s.addr() });
            }
            links.push(LinkSample {
                quality: s.quality,
                edr: s.edr,
                max_bitpool: s
                    .stream
                    .codec
                    .as_ref()
                    .and_then(|c| c.max_bitpool)
                    .unwrap_or(max_bitpool),
            });
        }

        let choice = select_quality(&links, max_bitpool);
        match choice {
            Some(c) if self.last != Some(c) => {
                tracing::info!(
                    quality = ?c.quality,
                    bitpool = c.bitpool,
                    poor_link_bitpool = c.poor_link_bitpool,
                    streams = links.len(),
                    "encoder quality"
                );
                cx.audio(AudioCommand::TargetQuality { choice: c });
                cx.notify(StatusEvent::QualityChanged { choice: c });
                self.last = Some(c);
            }
            Some(_) => {}
            None => self.last = None,
        }
        choice
    }
}
