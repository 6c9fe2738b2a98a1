//! Entry points shared by the executables.

use std::env;
use std::io;
use std::process::ExitCode;

use tokio::select;
use tokio::signal;
use tokio::task;

use vidlink_core::cli;
use vidlink_core::engine::Service;
use vidlink_core::net::SystemInterfaces;
use vidlink_core::pipeline;
use vidlink_core::runtime::Runtime;
use vidlink_core::server;
use vidlink_core::{ReceiverConfig, RetrySupervisor, ServerConfig, ServerProfile};

use crate::{GstEngine, GstRtspEngine};

/// Play the configured stream and reconnect whenever it is lost, until
/// interrupted.
pub async fn run_receiver() -> ExitCode {
    let path = match cli::config_path(env::args()) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let config = match ReceiverConfig::load(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error reading configuration file {}: {}", path.display(), err);
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(?config, "read configuration file");

    if let Err(err) = gst::init() {
        eprintln!("Failed to initialize GStreamer: {}", err);
        return ExitCode::FAILURE;
    }

    let description = pipeline::build_receiver(&config);
    tracing::info!(%description, "built receiver pipeline");

    let supervisor = RetrySupervisor::new(GstEngine, description, io::stderr())
        .with_label(config.source_url.clone())
        .with_eos_policy(config.eos_policy);

    let runtime = Runtime::new();
    let Some(mut task) = runtime
        .task()
        .spawn(move |task_context| supervisor.run(task_context))
        .await
    else {
        return ExitCode::FAILURE;
    };

    let exit = select! {
        exit = task.join() => exit,
        _ = signal::ctrl_c() => {
            tracing::info!("interrupted (stopping)");
            runtime.stop().await;
            task.join().await
        },
    };
    runtime.stop().await;

    match exit {
        Some(exit) => {
            tracing::info!(?exit, "receiver finished");
            ExitCode::SUCCESS
        }
        None => ExitCode::FAILURE,
    }
}

/// Serve the local camera over RTSP until interrupted.
pub async fn run_server(profile: ServerProfile) -> ExitCode {
    let path = match cli::config_path(env::args()) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let config = match ServerConfig::load(&path, profile) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error reading configuration file {}: {}", path.display(), err);
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(?config, "read configuration file");

    if let Err(err) = gst::init() {
        eprintln!("Failed to initialize GStreamer: {}", err);
        return ExitCode::FAILURE;
    }

    let mut engine = GstRtspEngine;
    // The interface prompt blocks on stdin.
    let running = task::block_in_place(|| {
        server::start(
            &mut engine,
            &config,
            &SystemInterfaces,
            io::stdin().lock(),
            io::stdout(),
        )
    });
    let running = match running {
        Ok(running) => running,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    match signal::ctrl_c().await {
        Ok(()) => tracing::info!("interrupted (stopping)"),
        Err(err) => tracing::error!(%err, "failed to wait for interrupt (stopping)"),
    }
    running.service.shutdown();

    ExitCode::SUCCESS
}
