//! tandemd: audio gateway daemon.

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

use tandem_core::config::GatewayConfig;
use tandem_engine::{Engine, Settings};

mod event_loop;
mod scheduler;
mod stack;
mod status;
mod store;

use event_loop::{EventLoop, Input, StatusView};
use scheduler::TokioScheduler;
use store::FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Config first: it carries the fallback log filter.
    let written = GatewayConfig::write_default_if_missing();
    let (config, load_error) = match GatewayConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (GatewayConfig::default(), Some(e)),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = written {
        tracing::warn!(error = %e, "failed to write default config");
    }
    if let Some(e) = load_error {
        tracing::warn!(error = %e, "failed to load config, using defaults");
    }
    tracing::info!(
        voice = config.profiles.voice,
        streaming = config.profiles.streaming,
        control = config.profiles.control,
        max_sessions = config.session.max_sessions,
        "tandemd starting"
    );

    let store_dir = config.store_dir();
    let store = FileStore::open(&store_dir, &config).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "store unusable, starting empty");
        FileStore::fresh(&store_dir, &config)
    });
    tracing::info!(path = %store.path().display(), "persistent store");

    let (input_tx, input_rx) = mpsc::unbounded_channel::<Input>();

    let (transport, audio) = stack::connect(&config.stack.addr, input_tx.clone()).await?;
    let timers = TokioScheduler::new(input_tx.clone());
    let engine = Engine::new(Settings::from_config(&config));
    let (status_tx, status_rx) = watch::channel(StatusView::initial(&engine));

    let loop_task = tokio::spawn(
        EventLoop::new(engine, transport, audio, store, timers, input_rx, status_tx).run(),
    );

    // ── Shutdown ─────────────────────────────────────────────────────────────
    {
        let input = input_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = input.send(Input::Shutdown);
        });
    }

    let api = status::ApiState {
        view: status_rx,
        input: input_tx,
    };

    tokio::select! {
        r = status::serve(api, config.api.port) => r.context("API server failed")?,
        r = loop_task => r.context("event loop task failed")?,
    }
    tracing::info!("tandemd stopped");
    Ok(())
}
