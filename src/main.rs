use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use beacon::kernel::consent::ConsentTracker;
use beacon::{BeaconConfig, Event, Reactor};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    // 2. Config: optional path as the only argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = BeaconConfig::load(config_path.as_deref()).context("loading configuration")?;
    tracing::info!("Collect endpoint: {}", config.collect.url);

    // 3. Consent. The demo driver consents up front; type /optout to revoke.
    let consent = Arc::new(ConsentTracker::granted());
    let mut reactor = Reactor::from_config(&config, consent.clone()).context("building HTTP transport")?;
    let recorder = reactor.recorder().clone();

    let shutdown = CancellationToken::new();

    // 4. Stdin: every line becomes an event
    let input_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("Type a line to record it. /optout and /optin toggle consent. Ctrl+D or Ctrl+C to quit.");

        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            match line {
                "" => continue,
                "/optout" => {
                    consent.decline();
                    tracing::info!("Consent declined, uploads paused");
                }
                "/optin" => {
                    consent.grant();
                    tracing::info!("Consent granted, uploads resume at next heartbeat");
                }
                text => {
                    let event = Event::new("consoleInput")
                        .with_version(1)
                        .with_param("text", text)
                        .with_param("length", text.len() as i64);
                    if let Err(e) = recorder.record(&event) {
                        tracing::warn!("Event not recorded: {}", e);
                    }
                }
            }
        }
        input_shutdown.cancel();
    });

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_shutdown.cancel();
        }
    });

    // 5. Heartbeat until shutdown
    reactor.run(shutdown).await;
    Ok(())
}
