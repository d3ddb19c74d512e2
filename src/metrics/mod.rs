//! Cumulative probe outcome counters and their Prometheus exposition.
//!
//! Every sink owns its own registry, so nothing here is process-global: the
//! binary builds one sink and hands it to the prober, tests build their own.

use dashmap::DashMap;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::http_probe::phase::ReachedState;

pub mod build_info;

pub use build_info::BuildInfo;

const URL_LABEL: &str = "url";
const STATE_LABEL: &str = "http_state";
const HTTP_REQUESTS_METRIC: &str = "http_requests";
const IN_FLIGHT_METRIC: &str = "http_requests_in_flight";

/// Counter key: which target, and how far its attempts got.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub target: String,
    pub state: ReachedState,
}

pub struct MetricsSink {
    namespace: String,
    registry: Registry,
    http_requests: IntCounterVec,
    in_flight: IntGaugeVec,
    /// Handles into `http_requests`, one per key seen so far. Each handle is
    /// an atomic counter, which is what `snapshot` reads.
    counters: DashMap<CounterKey, IntCounter>,
    /// Handles into `in_flight` for every target that has started an attempt.
    in_flight_gauges: DashMap<String, IntGauge>,
}

impl MetricsSink {
    /// Create a sink with its metrics registered under `namespace`.
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new(
                HTTP_REQUESTS_METRIC,
                "Number of HTTP requests and how far they got",
            )
            .namespace(namespace),
            &[URL_LABEL, STATE_LABEL],
        )?;

        let in_flight = IntGaugeVec::new(
            Opts::new(
                IN_FLIGHT_METRIC,
                "Number of probe requests currently in flight",
            )
            .namespace(namespace),
            &[URL_LABEL],
        )?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;

        Ok(Self {
            namespace: namespace.to_string(),
            registry,
            http_requests,
            in_flight,
            counters: DashMap::new(),
            in_flight_gauges: DashMap::new(),
        })
    }

    /// Count one finished attempt against `target` in `state`.
    pub fn inc(&self, target: &str, state: ReachedState) {
        let key = CounterKey {
            target: target.to_string(),
            state,
        };
        self.counters
            .entry(key)
            .or_insert_with(|| {
                self.http_requests
                    .with_label_values(&[target, state.as_str()])
            })
            .inc();
    }

    /// Current count for one key; zero if it was never incremented.
    pub fn get(&self, target: &str, state: ReachedState) -> u64 {
        let key = CounterKey {
            target: target.to_string(),
            state,
        };
        self.counters.get(&key).map(|c| c.get()).unwrap_or(0)
    }

    /// Every counter seen so far, ordered by target then state label.
    ///
    /// Each value reflects every increment that completed before it was
    /// read; values for different keys are not read at one instant.
    pub fn snapshot(&self) -> Vec<(CounterKey, u64)> {
        let mut entries: Vec<(CounterKey, u64)> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| {
            a.target
                .cmp(&b.target)
                .then_with(|| a.state.as_str().cmp(b.state.as_str()))
        });
        entries
    }

    /// Mark one attempt against `target` as running until the guard drops.
    pub fn track_in_flight(&self, target: &str) -> InFlightGuard {
        let gauge = self
            .in_flight_gauges
            .entry(target.to_string())
            .or_insert_with(|| self.in_flight.with_label_values(&[target]))
            .clone();
        gauge.inc();
        InFlightGuard { gauge }
    }

    /// Attempts currently running against `target`. Reading never creates a
    /// series: targets that have not started an attempt read as zero.
    pub fn in_flight(&self, target: &str) -> i64 {
        self.in_flight_gauges
            .get(target)
            .map(|gauge| gauge.get())
            .unwrap_or(0)
    }

    /// Register the static build gauges alongside the probe counters.
    pub fn register_build_info(&self, info: &BuildInfo) -> Result<(), prometheus::Error> {
        for collector in info.collectors(&self.namespace)? {
            self.registry.register(collector)?;
        }
        Ok(())
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics output is not UTF-8: {e}")))
    }
}

/// Decrements the in-flight gauge when the attempt ends or is abandoned.
pub struct InFlightGuard {
    gauge: IntGauge,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_probe::phase::ConnectionPhase;
    use std::sync::Arc;

    #[test]
    fn unknown_keys_read_as_zero() {
        let sink = MetricsSink::new("test").unwrap();
        assert_eq!(sink.get("http://a", ReachedState::Completed), 0);
        assert!(sink.snapshot().is_empty());
    }

    #[test]
    fn counts_are_kept_per_target_and_state() {
        let sink = MetricsSink::new("test").unwrap();
        sink.inc("http://a", ReachedState::Completed);
        sink.inc("http://a", ReachedState::Completed);
        sink.inc("http://a", ConnectionPhase::DnsDone.into());
        sink.inc("http://b", ReachedState::NonOkResponse);

        assert_eq!(sink.get("http://a", ReachedState::Completed), 2);
        assert_eq!(sink.get("http://a", ConnectionPhase::DnsDone.into()), 1);
        assert_eq!(sink.get("http://b", ReachedState::NonOkResponse), 1);
        assert_eq!(sink.get("http://b", ReachedState::Completed), 0);

        let snapshot = sink.snapshot();
        let labels: Vec<(&str, &str, u64)> = snapshot
            .iter()
            .map(|(key, count)| (key.target.as_str(), key.state.as_str(), *count))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("http://a", "Completed", 2),
                ("http://a", "DNSDone", 1),
                ("http://b", "Non-200-Response", 1),
            ]
        );
    }

    #[test]
    fn concurrent_increments_are_never_lost() {
        const THREADS: usize = 16;
        const PER_THREAD: u64 = 1000;

        let sink = Arc::new(MetricsSink::new("test").unwrap());
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        sink.inc("http://shared", ReachedState::Completed);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            sink.get("http://shared", ReachedState::Completed),
            THREADS as u64 * PER_THREAD
        );
    }

    #[test]
    fn in_flight_guard_tracks_running_attempts() {
        let sink = MetricsSink::new("test").unwrap();
        let first = sink.track_in_flight("http://a");
        let second = sink.track_in_flight("http://a");
        assert_eq!(sink.in_flight("http://a"), 2);
        drop(first);
        assert_eq!(sink.in_flight("http://a"), 1);
        drop(second);
        assert_eq!(sink.in_flight("http://a"), 0);
    }

    #[test]
    fn reading_in_flight_does_not_expose_a_series() {
        let sink = MetricsSink::new("test").unwrap();
        assert_eq!(sink.in_flight("http://never-started"), 0);
        assert!(!sink.render().unwrap().contains("http://never-started"));

        drop(sink.track_in_flight("http://started"));
        assert!(sink.render().unwrap().contains(
            r#"test_http_requests_in_flight{url="http://started"} 0"#
        ));
    }

    #[test]
    fn render_uses_namespace_and_labels() {
        let sink = MetricsSink::new("connprobe").unwrap();
        sink.inc("http://a", ConnectionPhase::TlsHandshakeDone.into());
        let text = sink.render().unwrap();

        assert!(text.contains("# TYPE connprobe_http_requests counter"));
        assert!(text.contains(
            r#"connprobe_http_requests{http_state="TLSHandshakeDone",url="http://a"} 1"#
        ));
    }
}
