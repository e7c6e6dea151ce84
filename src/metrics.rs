//! Metrics and tracing helpers.
//!
//! With the `metrics` feature, [`METRICS`] owns an OpenTelemetry meter whose
//! readings are exported through a prometheus registry; [`gather_text`]
//! renders that registry in the text exposition format. With the `tracing`
//! feature, [`tracing_helpers`] builds the spans the resolver enters around
//! compile, execute and hydrate.

#[cfg(feature = "metrics")]
pub use self::exporter::{gather_text, GraphMetrics, METRICS};

#[cfg(feature = "metrics")]
mod exporter {
    use std::time::Duration;

    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};

    pub static METRICS: Lazy<GraphMetrics> = Lazy::new(GraphMetrics::init);

    pub struct GraphMetrics {
        pub registry: Registry,
        // Dropping the provider stops collection
        _provider: SdkMeterProvider,
        pub queries_total: Counter<u64>,
        pub query_errors_total: Counter<u64>,
        pub cache_hits_total: Counter<u64>,
        pub cache_misses_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
        pub hydrated_rows: Histogram<u64>,
    }

    impl GraphMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let provider = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => SdkMeterProvider::builder().with_reader(exporter).build(),
                Err(e) => {
                    log::warn!("prometheus exporter unavailable, metrics will not be exported: {e:?}");
                    SdkMeterProvider::builder().build()
                }
            };
            let meter = provider.meter("lifegraph");

            let queries_total = meter
                .u64_counter("lifegraph_queries_total")
                .with_description("Total statements executed")
                .build();

            let query_errors_total = meter
                .u64_counter("lifegraph_query_errors_total")
                .with_description("Statements whose execution failed")
                .build();

            let cache_hits_total = meter
                .u64_counter("lifegraph_cache_hits_total")
                .with_description("Responses served from the response cache")
                .build();

            let cache_misses_total = meter
                .u64_counter("lifegraph_cache_misses_total")
                .with_description("Response cache lookups that fell through to execution")
                .build();

            let query_duration = meter
                .f64_histogram("lifegraph_query_duration_seconds")
                .with_description("Duration of statement execution")
                .build();

            let hydrated_rows = meter
                .u64_histogram("lifegraph_hydrated_rows")
                .with_description("Rows consumed per hydration")
                .build();

            Self {
                registry,
                _provider: provider,
                queries_total,
                query_errors_total,
                cache_hits_total,
                cache_misses_total,
                query_duration,
                hydrated_rows,
            }
        }

        pub fn record_query(&self, elapsed: Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn record_cache_hit(&self) {
            self.cache_hits_total.add(1, &[]);
        }

        pub fn record_cache_miss(&self) {
            self.cache_misses_total.add(1, &[]);
        }

        pub fn record_hydration(&self, rows: usize) {
            self.hydrated_rows
                .record(u64::try_from(rows).unwrap_or(u64::MAX), &[]);
        }
    }

    /// Prometheus text exposition of everything recorded so far
    pub fn gather_text() -> String {
        let families = METRICS.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&families, &mut buffer) {
            log::warn!("failed to encode metrics: {e}");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{debug_span, info_span, Span};

    /// Longest SQL prefix attached to a span
    const SQL_PREVIEW: usize = 200;

    pub fn compile_span(connection_id: &str, root: &str) -> Span {
        info_span!("lifegraph.compile", connection = connection_id, root = root)
    }

    pub fn execute_query_span(sql: &str) -> Span {
        let preview: String = sql.chars().take(SQL_PREVIEW).collect();
        info_span!("lifegraph.execute", sql = %preview)
    }

    pub fn hydrate_span(rows: usize) -> Span {
        debug_span!("lifegraph.hydrate", rows = rows)
    }
}
