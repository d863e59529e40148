//! Commands to the audio-processing collaborator.

use serde::{Deserialize, Serialize};

use tandem_core::{Profile, QualityChoice};

use crate::codec::CodecParams;
use crate::event::ChannelHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "audio", rename_all = "snake_case")]
pub enum AudioCommand {
    /// Nothing is routed; processing may power down.
    EnterIdle,
    /// Load the processing chain for a profile.
    Load { profile: Profile },
    ConnectChannel { handle: ChannelHandle },
    DisconnectChannel { handle: ChannelHandle },
    Codec { params: CodecParams },
    TargetQuality { choice: QualityChoice },
}

pub trait AudioSink {
    fn apply(&mut self, cmd: AudioCommand);
}

/// Keeps every command applied, in order.
#[derive(Debug, Default)]
pub struct AudioLog {
    commands: Vec<AudioCommand>,
}

impl AudioLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[AudioCommand] {
        &self.commands
    }

    pub fn take(&mut self) -> Vec<AudioCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn last(&self) -> Option<&AudioCommand> {
        self.commands.last()
    }

    /// Most recent quality pushed, if any.
    pub fn last_quality(&self) -> Option<QualityChoice> {
        self.commands.iter().rev().find_map(|c| match c {
            AudioCommand::TargetQuality { choice } => Some(*choice),
            _ => None,
        })
    }
}

impl AudioSink for AudioLog {
    fn apply(&mut self, cmd: AudioCommand) {
        self.commands.push(cmd);
    }
}
