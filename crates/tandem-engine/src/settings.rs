//! Engine tunables, resolved once from the loaded configuration.

use std::time::Duration;

use tandem_core::config::GatewayConfig;
use tandem_core::ProfileSet;

#[derive(Debug, Clone)]
pub struct Settings {
    pub max_sessions: usize,
    pub connect_timeout: Duration,
    pub media_holdoff: Duration,
    pub max_reopen_attempts: u8,
    pub destroy_delay: Duration,
    pub inquiry_window: Duration,
    pub candidate_capacity: usize,
    pub probe_timeout: Duration,
    pub max_path_loss: u8,
    pub default_tx_power: i8,
    /// A failed probe for any of these rules the candidate out.
    pub blocking: ProfileSet,
    pub max_bitpool: u8,
}

impl Settings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            max_sessions: config.session.max_sessions,
            connect_timeout: Duration::from_millis(config.session.connect_timeout_ms),
            media_holdoff: Duration::from_millis(config.session.media_holdoff_ms),
            max_reopen_attempts: config.session.max_reopen_attempts,
            destroy_delay: Duration::from_millis(config.session.destroy_delay_ms),
            inquiry_window: Duration::from_secs(config.discovery.inquiry_secs),
            candidate_capacity: config.discovery.candidate_capacity,
            probe_timeout: Duration::from_millis(config.discovery.probe_timeout_ms),
            max_path_loss: config.discovery.max_path_loss,
            default_tx_power: config.discovery.default_tx_power,
            blocking: config.discovery.blocking(),
            max_bitpool: config.audio.max_bitpool,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}
