/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use std::path::Path;

use anyhow::Context;
use chatrelay_cli::cli_args::Opt;
use chatrelay_cli::config::RelayConfig;
use chatrelay_cli::control::{read_commands, write_events};
use chatrelay_client::{Coordinator, CoordinatorHandle, CredentialUpdate};
use chatrelay_types::{ConnectionAction, ControlCommand, SessionId};
use clap::Parser;
use tokio::io::BufReader;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};

fn load_config(opt: &Opt) -> anyhow::Result<RelayConfig> {
    let mut config = match &opt.config {
        Some(path) => RelayConfig::from_file(path)?,
        None => RelayConfig::from_env_or_default()?,
    };
    if let Some(url) = &opt.server_url {
        config.settings.server_url = url.clone();
    }
    if opt.no_relay {
        config.settings.relay_enabled = false;
    }
    config.server_url()?;
    Ok(config)
}

fn read_cookie_file(path: &Path) -> anyhow::Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading cookie file {}", path.display()))?;
    let cookie = content.lines().next().unwrap_or_default().trim().to_string();
    anyhow::ensure!(!cookie.is_empty(), "cookie file {} is empty", path.display());
    Ok(cookie)
}

/// Resolve the cookie and report progress through the coordinator.
fn deliver_credential(opt: &Opt, config: &RelayConfig, handle: &CoordinatorHandle) {
    handle.update_credential(CredentialUpdate::Retrieving);
    let cookie = match (&opt.cookie, &opt.cookie_file) {
        (Some(cookie), _) => Ok(cookie.clone()),
        (None, Some(path)) => read_cookie_file(path),
        (None, None) => config
            .cookie
            .clone()
            .context("no cookie configured (use --cookie, --cookie-file or CHAT_COOKIE)"),
    };
    match cookie {
        Ok(cookie) => {
            handle.update_credential(CredentialUpdate::Ready(cookie));
        }
        Err(e) => {
            warn!("{e:#}");
            handle.update_credential(CredentialUpdate::Failed(format!("{e:#}")));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `try_init` also routes the library crates' `log` records into tracing.
    tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))?;
    dotenv::dotenv().ok();

    let opt = Opt::parse();
    let config = load_config(&opt)?;
    info!("Chat service: {}", config.settings.server_url);

    let (coordinator, handle) = Coordinator::new(config.settings.clone(), "");
    let events = handle.subscribe();
    let coordinator_task = tokio::spawn(coordinator.run());
    let writer_task = tokio::spawn(write_events(events, tokio::io::stdout()));

    deliver_credential(&opt, &config, &handle);
    if opt.connect {
        for id in SessionId::ALL {
            handle.send(ControlCommand::Action {
                client_id: id,
                action: ConnectionAction::Connect,
            });
        }
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let interrupted = tokio::select! {
        result = read_commands(stdin, handle.clone()) => {
            result?;
            info!("Control input closed, shutting down");
            false
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            true
        }
    };

    drop(handle);
    coordinator_task.await?;
    writer_task.await??;

    if interrupted {
        // The pending stdin read sits on a blocking thread and would keep the
        // runtime from shutting down.
        std::process::exit(0);
    }
    Ok(())
}
