// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Vigil - streaming pipeline for astronomical alerts
//!
//! Usage:
//!   vigil <command> [options]
//!
//! Commands:
//!   run                      Start the scheduler-hosted pipeline
//!   init                     Create the collection set and counter
//!   provision <name> <role>  Upsert a store account (read | readwrite)
//!   revoke <name>            Remove a store account
//!   list                     List store accounts

use std::process::ExitCode;

use anyhow::Result;
use tracing::{error, info};

use vigil_engine::accounts::{self, Role};
use vigil_engine::{Config, PipelineRuntime};

fn print_usage() {
    eprintln!(
        r#"Usage: vigil <command> [options]

Run the vigil alert pipeline or manage its store accounts.

COMMANDS:
    run                         Start the scheduler-hosted pipeline
    init                        Create the collection set and counter document
    provision <name> <role>     Upsert an account; role is 'read' or 'readwrite'
    revoke <name>               Remove an account
    list                        List accounts

ENVIRONMENT:
    VIGIL_STORE_URI             Store connection ('mem:' or 'sqlite:<path>') (required)
    VIGIL_ARCHIVE_URI           Archive connection (optional)
    VIGIL_RUN_TYPE              'scheduled' (default) or 'manual'
    VIGIL_LOG_AGGREGATION_MS    Log merge window (default: 1000)
    VIGIL_PUSH_INTERVAL_MS      Bulk-buffer push interval (default: 10000)
    VIGIL_AUTOPUSH_SIZE         Bulk-buffer autopush threshold (default: 100)
    VIGIL_BULK_WORKERS          Bulk-buffer worker count (default: 8)
    VIGIL_T2_POLL_MS            T2 poll interval (default: 5000)

EXAMPLES:
    # Prepare a fresh store
    VIGIL_STORE_URI=sqlite:.data/vigil.db vigil init

    # Provision a read-only science account
    VIGIL_STORE_URI=sqlite:.data/vigil.db vigil provision science read
"#
    );
}

#[derive(Debug)]
enum Command {
    Run,
    Init,
    Provision { name: String, role: Role },
    Revoke { name: String },
    List,
}

fn parse_command(args: &[String]) -> Option<Command> {
    match args.first().map(String::as_str) {
        Some("run") => Some(Command::Run),
        Some("init") => Some(Command::Init),
        Some("provision") => {
            let name = args.get(1)?.clone();
            let role = Role::parse(args.get(2)?)?;
            Some(Command::Provision { name, role })
        }
        Some("revoke") => Some(Command::Revoke {
            name: args.get(1)?.clone(),
        }),
        Some("list") => Some(Command::List),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vigil=info".parse().expect("static directive parses")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = parse_command(&args) else {
        print_usage();
        return ExitCode::FAILURE;
    };

    match dispatch(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Command) -> Result<()> {
    let config = Config::from_env()?;
    let store = config.open_store().await?;

    match command {
        Command::Run => {
            info!(store = %config.store_uri, "Starting vigil");
            let runtime = PipelineRuntime::builder()
                .store(store)
                .buffer_config(vigil_store::BufferConfig {
                    push_interval: config.push_interval,
                    autopush_size: config.autopush_size,
                    workers: config.workers,
                })
                .t2_poll(config.t2_poll_interval)
                .stats_every(std::time::Duration::from_secs(300))
                .build()?
                .start()
                .await?;

            tokio::signal::ctrl_c().await?;
            info!("Shutting down...");
            runtime.shutdown().await?;
        }
        Command::Init => {
            accounts::init(store.as_ref()).await?;
            info!("Store initialized");
        }
        Command::Provision { name, role } => {
            accounts::provision(store.as_ref(), &name, role).await?;
            info!(account = %name, "Account provisioned");
        }
        Command::Revoke { name } => {
            if accounts::revoke(store.as_ref(), &name).await? {
                info!(account = %name, "Account revoked");
            } else {
                anyhow::bail!("no such account: '{name}'");
            }
        }
        Command::List => {
            for (name, role) in accounts::list(store.as_ref()).await? {
                println!("{name}\t{role}");
            }
        }
    }
    Ok(())
}
