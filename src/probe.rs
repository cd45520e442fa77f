//! Runtime for the `stream-probe` binary.
//!
//! The probe connects to a render service, then either starts a stream or
//! measures round-trip time with repeated sync-time requests. The binary
//! only parses arguments and delegates here.

#![expect(
    clippy::print_stdout,
    reason = "intentional console output for probe results"
)]

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cli_defs::{Cli, Commands, ProbeConfig, SyncTimeArgs};
use tracing::{debug, info};

use crate::{
    client::{ClientOptions, RequestError, StreamClient},
    settings::StreamSettings,
    time::WireDuration,
    transport::ConnectionDescriptor,
    wire::{geometry::Dimensions, messages::StartStream},
};

/// One sync-time measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeSample {
    /// Local send to local receive.
    pub round_trip: WireDuration,
    /// Server clock minus the local midpoint of the round trip.
    pub clock_offset: WireDuration,
}

impl TimeSample {
    /// Derive a sample from local send/receive instants and the server reply.
    ///
    /// A reply without a usable time yields a zero offset.
    #[must_use]
    pub fn from_instants(sent: DateTime<Utc>, received: DateTime<Utc>, server: Option<DateTime<Utc>>) -> Self {
        let half = (received - sent) / 2;
        let midpoint = sent.checked_add_signed(half).unwrap_or(sent);
        Self {
            round_trip: WireDuration::between(sent, received),
            clock_offset: server.map_or_else(WireDuration::default, |at| WireDuration::between(midpoint, at)),
        }
    }
}

/// Build the connection descriptor for `config`, carrying stream settings.
///
/// Settings come from the configured file when given, otherwise from the
/// `RENDER_STREAM_*` environment alone.
///
/// # Errors
/// Fails if the settings cannot be loaded or the URL does not parse.
pub fn descriptor(config: &ProbeConfig) -> Result<ConnectionDescriptor> {
    let defaults = StreamSettings::default();
    let settings = match &config.settings {
        #[cfg(feature = "toml")]
        Some(path) => StreamSettings::load(path, &defaults)
            .with_context(|| format!("loading stream settings from {}", path.display()))?,
        #[cfg(not(feature = "toml"))]
        Some(path) => anyhow::bail!("settings file {} needs the toml feature", path.display()),
        None => StreamSettings::from_env(&defaults).context("loading stream settings")?,
    };
    let base = config
        .protocols
        .iter()
        .fold(ConnectionDescriptor::new(&config.url), |descriptor, protocol| {
            descriptor.with_protocol(protocol)
        });
    Ok(base.with_settings(&settings)?)
}

/// Issue `samples` sync-time requests back to back.
///
/// # Errors
/// Stops at the first failed request.
pub async fn measure(client: &StreamClient, samples: u32) -> Result<Vec<TimeSample>, RequestError> {
    let mut measured = Vec::new();
    for sample in 0..samples {
        let sent = Utc::now();
        let reply = client.sync_time().await?;
        let received = Utc::now();
        let measurement = TimeSample::from_instants(sent, received, reply.reply_time.to_datetime());
        debug!(sample, ?measurement, "sync-time sample");
        measured.push(measurement);
    }
    Ok(measured)
}

/// Median round trip in milliseconds, or `None` without samples.
#[must_use]
pub fn median_round_trip(samples: &[TimeSample]) -> Option<i64> {
    let mut millis: Vec<i64> = samples
        .iter()
        .filter_map(|sample| sample.round_trip.to_millis())
        .collect();
    millis.sort_unstable();
    #[expect(
        clippy::integer_division,
        reason = "the upper median is acceptable for a latency summary"
    )]
    let middle = millis.len() / 2;
    millis.get(middle).copied()
}

/// Resolve configuration, connect and run the requested command.
///
/// # Errors
/// Returns configuration, connection or request failures.
pub async fn run(cli: Cli) -> Result<()> {
    let config = ProbeConfig::load(&cli.config).context("resolving probe configuration")?;
    let command = cli
        .command
        .unwrap_or_else(|| Commands::SyncTime(SyncTimeArgs::default()));
    let descriptor = descriptor(&config)?;
    info!(url = %descriptor.url, "connecting");

    let client = StreamClient::websocket(ClientOptions::default());
    client
        .connect(Arc::new(descriptor))
        .await
        .with_context(|| format!("connecting to {}", config.url))?;
    let outcome = execute(&client, &config, &command).await;
    client.dispose().await;
    outcome
}

async fn execute(client: &StreamClient, config: &ProbeConfig, command: &Commands) -> Result<()> {
    match command {
        Commands::StartStream => {
            let started = client
                .start_stream(StartStream {
                    dimensions: Dimensions::new(config.width, config.height),
                    ..StartStream::default()
                })
                .await
                .context("start-stream request failed")?;
            println!(
                "stream {} scene {} session {}",
                started.stream_id, started.scene_id, started.session_id
            );
        }
        Commands::SyncTime(args) => {
            let samples = measure(client, args.samples)
                .await
                .context("sync-time request failed")?;
            for (index, sample) in samples.iter().enumerate() {
                println!(
                    "sample {index}: rtt {} ms, offset {} ms",
                    sample.round_trip.to_millis().unwrap_or_default(),
                    sample.clock_offset.to_millis().unwrap_or_default()
                );
            }
            if let Some(median) = median_round_trip(&samples) {
                println!("median rtt {median} ms over {} samples", samples.len());
            }
        }
    }
    Ok(())
}
