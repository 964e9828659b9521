//! Splits whatever the default output is playing across two other outputs.
//!
//! The first chosen device plays the right channel, the second the left.
//! The default output is muted while piping and restored on exit.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::future::Future;
use std::io::{self, Write};
use std::process::ExitCode;

use stereo_split::{
    resolve_endpoint, AudioEndpoint, CapturePipe, ChannelRole, CpalDriver, DeviceEnumerator,
    PipeEvent, PipeStats,
};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error>;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), BoxError> {
    let driver = CpalDriver::new();
    let input = driver
        .default_output_endpoint()?
        .ok_or("no default output device to capture")?;
    let endpoints = driver.output_endpoints()?;
    if endpoints.is_empty() {
        return Err("no output devices found".into());
    }

    println!("=== stereo-split ===");
    println!();
    println!("Capturing: {input}");
    println!();
    print_endpoints(&endpoints, &input);

    let right = prompt_endpoint(&endpoints, ChannelRole::Right)?;
    let left = prompt_endpoint(&endpoints, ChannelRole::Left)?;

    let pipe = CapturePipe::builder(input, [right, left])
        .driver(driver)
        .mute_input_when_piped(true)
        .on_event(|event| match event {
            PipeEvent::BufferOverflow { role, dropped_bytes } => {
                tracing::warn!(%role, dropped_bytes, "output falling behind");
            }
            PipeEvent::BufferUnderrun { role } => {
                tracing::debug!(%role, "output starved");
            }
            PipeEvent::Started | PipeEvent::Stopped => {}
        })
        .build()?;

    let stats = pipe_until(&pipe, shutdown_signal()).await?;

    println!("Blocks captured: {}", stats.blocks_captured);
    for (role, channel) in stats.channels.iter_roles() {
        println!(
            "  {role}: {} bytes dropped, {} underruns",
            channel.bytes_dropped, channel.underruns
        );
    }

    Ok(())
}

/// Plays the pipe until `shutdown` resolves, then stops and closes it.
///
/// The pipe is stopped even when waiting for the signal fails, so the
/// capture endpoint's mute flag is always restored.
async fn pipe_until<F>(pipe: &CapturePipe, shutdown: F) -> Result<PipeStats, BoxError>
where
    F: Future<Output = io::Result<&'static str>>,
{
    pipe.start()?;
    println!();
    println!(
        "Piping '{}' -> right '{}', left '{}'. Press Ctrl-C to stop.",
        pipe.input(),
        pipe.outputs().right(),
        pipe.outputs().left()
    );

    let signal = shutdown.await;

    println!();
    println!("Stopping...");
    let stopped = pipe.stop();
    let stats = pipe.stats();
    pipe.close();

    let signal = signal?;
    tracing::info!(signal, "shut down");
    stopped?;
    Ok(stats)
}

/// Waits for Ctrl-C or for the process being told to exit.
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn shutdown_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "ctrl-c"),
        _ = terminate.recv() => Ok("terminate"),
        _ = hangup.recv() => Ok("hangup"),
    }
}

/// Waits for Ctrl-C or for the console being closed, logoff or shutdown.
///
/// Returns the name of the signal received.
#[cfg(windows)]
async fn shutdown_signal() -> io::Result<&'static str> {
    use tokio::signal::windows::{ctrl_break, ctrl_close, ctrl_logoff, ctrl_shutdown};

    let mut brk = ctrl_break()?;
    let mut close = ctrl_close()?;
    let mut logoff = ctrl_logoff()?;
    let mut shutdown = ctrl_shutdown()?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "ctrl-c"),
        _ = brk.recv() => Ok("ctrl-break"),
        _ = close.recv() => Ok("console closed"),
        _ = logoff.recv() => Ok("logoff"),
        _ = shutdown.recv() => Ok("shutdown"),
    }
}

#[cfg(not(any(unix, windows)))]
async fn shutdown_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}

fn print_endpoints(endpoints: &[AudioEndpoint], input: &AudioEndpoint) {
    println!("Output devices:");
    println!("---------------");
    for (i, endpoint) in endpoints.iter().enumerate() {
        let marker = if endpoint == input { " (capturing)" } else { "" };
        println!("  {}. {endpoint}{marker}", i + 1);
    }
    println!();
}

fn prompt_endpoint(endpoints: &[AudioEndpoint], role: ChannelRole) -> Result<AudioEndpoint, BoxError> {
    print!("Device for the {role} channel (number or name): ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(resolve_endpoint(endpoints, &line)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_split::{MockDriver, PlaybackState};

    fn rig() -> (MockDriver, AudioEndpoint, CapturePipe) {
        let driver = MockDriver::new();
        let input = AudioEndpoint::named("Speakers");
        let pipe = CapturePipe::builder(
            input.clone(),
            [AudioEndpoint::named("Right box"), AudioEndpoint::named("Left box")],
        )
        .driver(driver.clone())
        .mute_input_when_piped(true)
        .build()
        .unwrap();
        (driver, input, pipe)
    }

    #[tokio::test]
    async fn test_exit_signal_stops_and_unmutes() {
        let (driver, input, pipe) = rig();
        let observed = driver.clone();
        let watched = input.clone();

        let shutdown = async move {
            assert!(observed.mute_state(&watched));
            assert!(observed.is_capturing());
            Ok("terminate")
        };
        pipe_until(&pipe, shutdown).await.unwrap();

        assert!(!driver.mute_state(&input));
        assert!(!driver.is_capturing());
        assert!(pipe.is_disposed());
        assert_eq!(pipe.state(), PlaybackState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_signal_wait_still_unmutes() {
        let (driver, input, pipe) = rig();

        let shutdown = async { Err(io::Error::other("signal handler unavailable")) };
        assert!(pipe_until(&pipe, shutdown).await.is_err());

        assert!(!driver.mute_state(&input));
        assert!(driver.capture_released());
    }
}
