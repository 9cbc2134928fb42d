// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fkd — the fluffy kernel daemon.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fk_kernel::{lifecycle, Config};

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match fk_kernel::env::log_dir() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "fkd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let _log_guard = init_tracing();

    let config = Config::from_env();
    info!(workspace = %config.workspace_dir.display(), "starting kernel");

    let kernel = match lifecycle::start(config).await {
        Ok(kernel) => kernel,
        Err(e) => {
            // Bind and lock failures are fatal at startup.
            error!(error = %e, "kernel failed to start");
            std::process::exit(1);
        }
    };

    let shutdown = kernel.shutdown_token();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                error!(error = %e, "cannot install SIGTERM handler");
                let _ = ctrl_c.await;
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => info!("interrupt received"),
            _ = sigterm.recv() => info!("SIGTERM received"),
        }
        shutdown.cancel();
    });

    kernel.run().await;
}
