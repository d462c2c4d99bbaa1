//! ecs-sd: generates Prometheus file_sd target files for Alicloud ECS.
//!
//! A discovery loop periodically enumerates the running ECS instances of
//! one region, maps each to a target group (`<private ip>:<port>` plus
//! `__meta_ecs_*` labels), diffs the result against the previous cycle so
//! removed instances are retracted with tombstone groups, and hands every
//! full batch to a writer task that atomically replaces the output file.
//! Cycle latency and failures are exposed on an HTTP `/metrics` endpoint.

use std::time::Duration;

use tokio::sync::{mpsc, watch};

pub mod api;
pub mod config;
pub mod discovery;
pub mod ecs;
pub mod metrics;
pub mod sink;
pub mod target;

/// Size of the discovery-to-writer handoff queue. Bounded so a stalled
/// writer backpressures the loop instead of buffering batches forever.
const BATCH_QUEUE_SIZE: usize = 10;

#[derive(Debug, clap::Parser)]
#[command(
    name = "ecs-sd",
    version,
    about = "Tool to generate Prometheus file_sd target files for Alicloud ECS."
)]
pub struct Options {
    /// The output filename for the file_sd compatible file.
    #[arg(long = "output.file", default_value = "ecs.json")]
    pub output_file: String,
    /// The config filename for the ecs_sd config file.
    #[arg(long = "config.file", default_value = "config/ecs_sd_config.yml")]
    pub config_file: String,
    /// The listen address for the metrics endpoint.
    #[arg(long = "web.listen-address", default_value = "0.0.0.0:9465")]
    pub listen_address: String,
}

/// Runs the adapter until interrupted.
///
/// Loads and validates the configuration (fatal on error), then wires up
/// the component tasks: the file_sd writer draining the batch channel, the
/// discovery loop feeding it, and the metrics server. On Ctrl-C the
/// discovery loop is signalled and joined; a cycle in flight finishes
/// first.
pub async fn run(options: Options) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_file(&options.config_file)?;
    let sd_config = config.ecs_sd_config;
    log::debug!(
        "configured region={} refresh_interval={}s port={} filters={}",
        sd_config.region,
        sd_config.refresh_interval,
        sd_config.port,
        sd_config.filters.len()
    );

    let metrics = metrics::Metrics::new()?;
    let client = ecs::EcsClient::new(&sd_config)?;
    let builder = target::TargetBuilder::new(sd_config.port);

    let (tx, rx) = mpsc::channel::<Vec<target::TargetGroup>>(BATCH_QUEUE_SIZE);
    let writer_handle = tokio::spawn(sink::FileSdWriter::new(&options.output_file).run(rx));

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let discoverer = discovery::Discoverer::new(
        client,
        builder,
        metrics.clone(),
        Duration::from_secs(sd_config.refresh_interval),
    );
    let discovery_handle = tokio::spawn(discoverer.run(tx, shutdown_rx));

    {
        let api = api::ApiServer::new(metrics);
        let addr = options.listen_address.clone();
        tokio::spawn(async move {
            log::info!("listening for connections on {addr}");
            api.listen(addr).await
        });
    }

    tokio::signal::ctrl_c().await?;
    log::info!("interrupt received, shutting down");
    let _ = shutdown_tx.send(());
    discovery_handle.await.expect("discovery task panicked");
    // The discovery task owned the channel sender; its exit closes the
    // channel, and the writer drains any queued batches before stopping.
    writer_handle.await.expect("target writer task panicked");

    Ok(())
}
