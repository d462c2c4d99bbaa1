//! Discovery instrumentation.
//!
//! All collectors hang off an explicitly constructed [`Metrics`] value with
//! its own registry; nothing registers into a process-wide default. The
//! prometheus primitives are shared internally, so clones observe into the
//! same series.

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry, process_collector};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to register collector: {0}")]
    Register(#[source] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Latency of one full inventory listing (all pages).
    pub request_duration: Histogram,
    /// Failed discovery cycles.
    pub request_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "prometheus_ecs_sd_request_duration_seconds",
                "Histogram of latencies for requests to the Alicloud ECS API.",
            )
            .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )
        .map_err(Error::Register)?;

        let request_failures = IntCounter::with_opts(Opts::new(
            "prometheus_ecs_sd_request_failures_total",
            "Total number of failed requests to the Alicloud ECS API.",
        ))
        .map_err(Error::Register)?;

        registry
            .register(Box::new(request_duration.clone()))
            .map_err(Error::Register)?;
        registry
            .register(Box::new(request_failures.clone()))
            .map_err(Error::Register)?;
        registry
            .register(Box::new(process_collector::ProcessCollector::for_self()))
            .map_err(Error::Register)?;

        Ok(Self {
            registry,
            request_duration,
            request_failures,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
