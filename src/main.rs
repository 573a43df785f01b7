//! `grpcsnoop`: passive host-local tracer that decodes the gRPC
//! conversation over a Unix-domain control socket (spec.md §1).
//!
//! This binary is the thin process-wiring layer: argument parsing, logging
//! setup, signal handling, and gluing `grpcsnoop-probe`'s event stream into
//! `grpcsnoop-core`'s decode loop. All protocol logic lives in those two
//! library crates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use clap::Parser;
use grpcsnoop_core::{Decoder, RenderOptions};

/// Trace gRPC calls made over an AF_UNIX socket (e.g. containerd's).
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the AF_UNIX control socket to trace.
    #[arg(long, env = "GRPCSNOOP_ADDRESS", default_value = "/run/containerd/containerd.sock")]
    address: String,

    /// Print the full decoded message instead of truncating to 100 chars.
    #[arg(long, env = "GRPCSNOOP_COMPLETE_CONTENT")]
    complete_content: bool,

    /// Path to the compiled kprobe object file the probe collaborator
    /// produces for this `--address` (spec.md §1: the BPF program itself
    /// is a separate, already-specified component).
    #[arg(long, env = "GRPCSNOOP_PROBE_OBJECT", default_value = "/usr/lib/grpcsnoop/probe.o")]
    probe_object: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            tracing::info!("shutdown signal received, draining in-flight output");
            shutdown.store(true, Ordering::Relaxed);
        })?;
    }

    let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(grpcsnoop_probe::CHANNEL_CAPACITY);

    let probe_shutdown = shutdown.clone();
    let probe_object = cli.probe_object.clone();
    let probe_thread = std::thread::spawn(move || {
        if let Err(e) = grpcsnoop_probe::Probe::attach_and_run(&probe_object, tx, &probe_shutdown) {
            // Kernel-probe startup/runtime failure is fatal (spec.md §7).
            tracing::error!(error = %e, "kernel probe failed");
            std::process::exit(1);
        }
    });

    println!("{}", grpcsnoop_core::decoder::header_line());

    let mut decoder = Decoder::new(RenderOptions {
        complete_content: cli.complete_content,
    });

    tracing::info!(address = %cli.address, "tracing started");

    while !shutdown.load(Ordering::Relaxed) {
        match rx.recv_timeout(std::time::Duration::from_millis(200)) {
            Ok(record) => match decoder.feed(&record) {
                Ok(rendered) => {
                    for r in rendered {
                        println!("{}", r.line);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed event");
                }
            },
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    let _ = probe_thread.join();
    Ok(())
}
