use prometheus::{HistogramVec, IntGaugeVec, Opts, Registry};

/// In-process gauges/histograms, mirroring the original's
/// `zmetrics.RegisterMetric`/`zmetrics.Histogram` wrappers around
/// `prometheus.go` — this crate keeps the gauges (ambient observability)
/// without standing up the external `/metrics` exposition endpoint, which
/// is out of scope per spec.md's Non-goals.
pub struct Metrics {
    pub total_missing_heights: IntGaugeVec,
    pub buffer_sync_duration_seconds: HistogramVec,
    pub dispatcher_queue_depth: IntGaugeVec,
}

impl Metrics {
    pub fn new(registry: &Registry) -> Self {
        let total_missing_heights = IntGaugeVec::new(
            Opts::new("zindexer_total_missing_heights", "Height count reported missing by the most recent GetMissing call"),
            &["indexer_id"],
        )
        .expect("static metric definition");

        let buffer_sync_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("zindexer_buffer_sync_duration_seconds", "Wall time of a buffer flush cycle")
                .buckets(prometheus::exponential_buckets(0.01, 2.0, 10).expect("static buckets")),
            &["indexer_id"],
        )
        .expect("static metric definition");

        let dispatcher_queue_depth = IntGaugeVec::new(
            Opts::new("zindexer_dispatcher_queue_depth", "Pending job count in the dispatcher's job pool"),
            &["indexer_id"],
        )
        .expect("static metric definition");

        registry.register(Box::new(total_missing_heights.clone())).expect("single registration");
        registry.register(Box::new(buffer_sync_duration_seconds.clone())).expect("single registration");
        registry.register(Box::new(dispatcher_queue_depth.clone())).expect("single registration");

        Self { total_missing_heights, buffer_sync_duration_seconds, dispatcher_queue_depth }
    }

    pub fn set_total_missing_heights(&self, indexer_id: &str, count: usize) {
        self.total_missing_heights.with_label_values(&[indexer_id]).set(count as i64);
    }

    pub fn set_dispatcher_queue_depth(&self, indexer_id: &str, depth: usize) {
        self.dispatcher_queue_depth.with_label_values(&[indexer_id]).set(depth as i64);
    }

    pub fn observe_buffer_sync_duration(&self, indexer_id: &str, seconds: f64) {
        self.buffer_sync_duration_seconds.with_label_values(&[indexer_id]).observe(seconds);
    }
}
