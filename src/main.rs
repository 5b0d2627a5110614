use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::warn;

mod api;
mod auth;
mod cli;
mod environment;
mod error;
mod logging;
mod storage;

use cli::dispatch::{Dispatcher, Terminal};
use cli::prompt::StdinPrompter;
use environment::Environment;

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: cannot start async runtime: {}", e);
            return ExitCode::from(error::EXIT_FAILURE);
        }
    };

    let dispatcher = Dispatcher::new(
        cli::commands::standard(),
        Environment::from_process(),
        Arc::new(StdinPrompter),
    );
    let mut term = Terminal::stdio();
    let code = runtime.block_on(dispatcher.run(std::env::args_os(), &mut term, shutdown_signal()));

    // A prompt blocked on stdin must not hold the process open after Ctrl+C.
    runtime.shutdown_timeout(Duration::from_millis(100));
    ExitCode::from(code)
}

/// Resolves on Ctrl+C or SIGTERM. If a handler cannot be installed that
/// signal is simply never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
