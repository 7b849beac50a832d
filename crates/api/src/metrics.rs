use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use query::RetrievalMode;

pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,

    // Timing (in microseconds)
    total_ingest_time_us: AtomicU64,
    total_query_time_us: AtomicU64,

    // Counts
    documents_ingested: AtomicUsize,
    total_chunks_processed: AtomicUsize,
    queries: AtomicUsize,
    /// Indexed like `RetrievalMode::ALL`.
    queries_by_mode: [AtomicUsize; 4],
    empty_results: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_requests: AtomicUsize::new(0),
            successful_requests: AtomicUsize::new(0),
            failed_requests: AtomicUsize::new(0),
            total_ingest_time_us: AtomicU64::new(0),
            total_query_time_us: AtomicU64::new(0),
            documents_ingested: AtomicUsize::new(0),
            total_chunks_processed: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            queries_by_mode: Default::default(),
            empty_results: AtomicUsize::new(0),
        })
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_ingest(&self, duration: Duration, chunks: usize) {
        self.total_ingest_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.total_chunks_processed.fetch_add(chunks, Ordering::Relaxed);
    }

    pub fn record_query(&self, duration: Duration, mode: RetrievalMode, results: usize) {
        self.total_query_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.queries_by_mode[mode_slot(mode)].fetch_add(1, Ordering::Relaxed);
        if results == 0 {
            self.empty_results.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let by_mode = |mode| self.queries_by_mode[mode_slot(mode)].load(Ordering::Relaxed);

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            avg_ingest_time_ms: avg_time_ms(&self.total_ingest_time_us, &self.documents_ingested),
            avg_query_time_ms: avg_time_ms(&self.total_query_time_us, &self.queries),
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            total_chunks_processed: self.total_chunks_processed.load(Ordering::Relaxed),
            queries: QueryCounts {
                vector: by_mode(RetrievalMode::Vector),
                graph: by_mode(RetrievalMode::Graph),
                raptor: by_mode(RetrievalMode::Raptor),
                hybrid: by_mode(RetrievalMode::Hybrid),
                empty_results: self.empty_results.load(Ordering::Relaxed),
            },
        }
    }
}

fn mode_slot(mode: RetrievalMode) -> usize {
    match mode {
        RetrievalMode::Vector => 0,
        RetrievalMode::Graph => 1,
        RetrievalMode::Raptor => 2,
        RetrievalMode::Hybrid => 3,
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    let cnt = count.load(Ordering::Relaxed) as f64;
    if cnt > 0.0 {
        total / cnt / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub avg_ingest_time_ms: f64,
    pub avg_query_time_ms: f64,
    pub documents_ingested: usize,
    pub total_chunks_processed: usize,
    pub queries: QueryCounts,
}

#[derive(Debug, Serialize)]
pub struct QueryCounts {
    pub vector: usize,
    pub graph: usize,
    pub raptor: usize,
    pub hybrid: usize,
    pub empty_results: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_averages() {
        let metrics = Metrics::new();
        metrics.record_request(true);
        metrics.record_request(false);
        metrics.record_ingest(Duration::from_millis(10), 3);
        metrics.record_ingest(Duration::from_millis(30), 5);
        metrics.record_query(Duration::from_millis(4), RetrievalMode::Graph, 2);
        metrics.record_query(Duration::from_millis(2), RetrievalMode::Vector, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.documents_ingested, 2);
        assert_eq!(snapshot.total_chunks_processed, 8);
        assert!((snapshot.avg_ingest_time_ms - 20.0).abs() < 1e-9);
        assert!((snapshot.avg_query_time_ms - 3.0).abs() < 1e-9);
        assert_eq!(snapshot.queries.graph, 1);
        assert_eq!(snapshot.queries.vector, 1);
        assert_eq!(snapshot.queries.raptor, 0);
        assert_eq!(snapshot.queries.empty_results, 1);
    }

    #[test]
    fn test_empty_snapshot_has_zero_averages() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.avg_query_time_ms, 0.0);
        assert_eq!(snapshot.avg_ingest_time_ms, 0.0);
    }

    #[test]
    fn test_timed_operation() {
        let timer = TimedOperation::start();
        std::thread::sleep(Duration::from_millis(1));
        assert!(timer.elapsed() >= Duration::from_millis(1));
    }
}
