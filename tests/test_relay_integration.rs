//! Integration tests for the relay loop
//!
//! Drive `RelayEngine` with a scripted source and a recording forwarder to
//! check the end-to-end guarantees:
//! - a point seen by several overlapping polls is forwarded once
//! - observe-only metrics are never forwarded
//! - empty results change nothing
//! - the loop stops cleanly on shutdown and honours the fetch policy

#[cfg(test)]
mod relay_integration_tests {
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use cwrelay::relay::{
        FetchError, FetchPolicy, FetchWindow, ForwardError, Forwarder, MetricRegistry,
        MetricResult, MetricSource, MetricSpec, RelayEngine, RelayError, Sample,
        ShutdownCoordinator,
    };
    use std::collections::VecDeque;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Response = Result<Vec<MetricResult>, FetchError>;

    /// Replays responses in order; once exhausted, returns the fallback.
    /// Optionally requests shutdown after a given number of fetches.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Response>>,
        fallback: Vec<MetricResult>,
        fetches: Mutex<Vec<FetchWindow>>,
        stop_after: Option<(usize, Arc<ShutdownCoordinator>)>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Response>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                fallback: Vec::new(),
                fetches: Mutex::new(Vec::new()),
                stop_after: None,
            }
        }

        fn with_fallback(mut self, fallback: Vec<MetricResult>) -> Self {
            self.fallback = fallback;
            self
        }

        fn stop_after(mut self, fetches: usize, coordinator: Arc<ShutdownCoordinator>) -> Self {
            self.stop_after = Some((fetches, coordinator));
            self
        }

        fn fetch_count(&self) -> usize {
            self.fetches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MetricSource for ScriptedSource {
        async fn fetch(&self, window: &FetchWindow, _specs: &[MetricSpec]) -> Response {
            let count = {
                let mut fetches = self.fetches.lock().unwrap();
                fetches.push(*window);
                fetches.len()
            };

            if let Some((limit, coordinator)) = &self.stop_after {
                if count >= *limit {
                    coordinator.trigger("test");
                }
            }

            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(self.fallback.clone()))
        }
    }

    #[derive(Default)]
    struct RecordingForwarder {
        calls: Mutex<Vec<(String, f64, i64)>>,
    }

    impl RecordingForwarder {
        fn calls(&self) -> Vec<(String, f64, i64)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Forwarder for RecordingForwarder {
        async fn forward(&self, name: &str, value: f64, timestamp: i64) -> Result<(), ForwardError> {
            self.calls.lock().unwrap().push((name.to_string(), value, timestamp));
            Ok(())
        }
    }

    /// Captures what the engine prints, in place of stdout
    #[derive(Clone, Default)]
    struct SharedOutput(Arc<Mutex<Vec<u8>>>);

    impl SharedOutput {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn spec(id: &str, sink_name: Option<&str>) -> MetricSpec {
        MetricSpec {
            id: id.to_string(),
            namespace: "Custom/Test".to_string(),
            name: id.to_uppercase(),
            dimension: None,
            sink_name: sink_name.map(str::to_string),
        }
    }

    fn point(id: &str, timestamp: i64, value: f64) -> MetricResult {
        MetricResult::new(id, vec![Sample { timestamp, value }])
    }

    fn registry() -> MetricRegistry {
        MetricRegistry::from_specs(vec![
            spec("cpu", Some("cpu")),
            spec("mem", None),
            spec("disk", Some("disk")),
        ])
    }

    #[tokio::test]
    async fn test_overlapping_polls_forward_once() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(vec![point("cpu", 95, 42.0)]),
            Ok(vec![point("cpu", 95, 42.0)]),
        ]));
        let forwarder = Arc::new(RecordingForwarder::default());
        let output = SharedOutput::default();
        let mut engine = RelayEngine::new(registry(), source, forwarder.clone(), Duration::from_secs(30))
            .with_output(output.clone());

        let first = engine
            .run_iteration(Utc.timestamp_opt(100, 0).unwrap())
            .await
            .unwrap();
        let second = engine
            .run_iteration(Utc.timestamp_opt(130, 0).unwrap())
            .await
            .unwrap();
        assert!(engine.inflight().wait_idle_timeout(Duration::from_secs(1)).await);

        assert_eq!(first.observations.len(), 1);
        assert_eq!(first.observations[0].render_line(), "cpu:\t42.000 @ 1970-01-01 00:01:35 +0000 UTC");
        assert!(second.observations.is_empty());
        assert_eq!(forwarder.calls(), vec![("cpu".to_string(), 42.0, 95)]);
        assert_eq!(engine.watermarks().get("cpu"), Some(95));
        assert_eq!(output.lines(), vec!["cpu:\t42.000 @ 1970-01-01 00:01:35 +0000 UTC"]);
    }

    #[tokio::test]
    async fn test_observe_only_metric_is_printed_not_forwarded() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![point("mem", 60, 512.25)])]));
        let forwarder = Arc::new(RecordingForwarder::default());
        let output = SharedOutput::default();
        let mut engine = RelayEngine::new(registry(), source, forwarder.clone(), Duration::from_secs(30))
            .with_output(output.clone());

        let report = engine.run_iteration(Utc::now()).await.unwrap();
        assert!(engine.inflight().wait_idle_timeout(Duration::from_secs(1)).await);

        assert_eq!(report.observations.len(), 1);
        assert_eq!(report.observations[0].id, "mem");
        assert_eq!(report.dispatched, 0);
        assert!(forwarder.calls().is_empty());
        assert_eq!(engine.watermarks().get("mem"), Some(60));
        assert_eq!(output.lines(), vec!["mem:\t512.250 @ 1970-01-01 00:01:00 +0000 UTC"]);
    }

    #[tokio::test]
    async fn test_missing_timestamp_changes_nothing() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![MetricResult::new("disk", vec![])])]));
        let forwarder = Arc::new(RecordingForwarder::default());
        let mut engine = RelayEngine::new(registry(), source, forwarder.clone(), Duration::from_secs(30))
            .with_output(std::io::sink());

        let report = engine.run_iteration(Utc::now()).await.unwrap();

        assert_eq!(report.results, 1);
        assert!(report.observations.is_empty());
        assert!(forwarder.calls().is_empty());
        assert!(engine.watermarks().get("disk").is_none());
    }

    #[tokio::test]
    async fn test_window_follows_clock() {
        let source = Arc::new(ScriptedSource::new(vec![]));
        let mut engine = RelayEngine::new(
            registry(),
            source.clone(),
            Arc::new(RecordingForwarder::default()),
            Duration::from_secs(30),
        )
        .with_output(std::io::sink());

        let report = engine
            .run_iteration(Utc.with_ymd_and_hms(2024, 2, 2, 8, 15, 42).unwrap())
            .await
            .unwrap();

        assert_eq!(report.window.end, Utc.with_ymd_and_hms(2024, 2, 2, 8, 16, 0).unwrap());
        assert_eq!(report.window.start, Utc.with_ymd_and_hms(2024, 2, 2, 8, 11, 0).unwrap());
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_shutdown() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        let source = Arc::new(
            ScriptedSource::new(vec![
                Ok(vec![point("cpu", 60, 1.0), point("disk", 60, 80.0)]),
                Ok(vec![point("cpu", 60, 1.0), point("disk", 120, 81.0)]),
            ])
            .with_fallback(vec![point("cpu", 120, 2.0)])
            .stop_after(3, coordinator.clone()),
        );
        let forwarder = Arc::new(RecordingForwarder::default());
        let mut engine = RelayEngine::new(
            registry(),
            source.clone(),
            forwarder.clone(),
            Duration::from_millis(20),
        )
        .with_output(std::io::sink());

        let result = tokio::time::timeout(Duration::from_secs(5), engine.run(coordinator.handle()))
            .await
            .expect("relay loop did not stop");
        assert!(result.is_ok());
        assert!(coordinator.drain(engine.inflight()).await);

        assert_eq!(source.fetch_count(), 3);
        assert_eq!(engine.stats().iterations, 3);
        assert_eq!(
            forwarder.calls(),
            vec![
                ("cpu".to_string(), 1.0, 60),
                ("disk".to_string(), 80.0, 60),
                ("disk".to_string(), 81.0, 120),
                ("cpu".to_string(), 2.0, 120),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_loop_returns_immediately_if_already_shut_down() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        coordinator.trigger("test");

        let source = Arc::new(ScriptedSource::new(vec![]));
        let mut engine = RelayEngine::new(
            registry(),
            source.clone(),
            Arc::new(RecordingForwarder::default()),
            Duration::from_secs(30),
        )
        .with_output(std::io::sink());

        assert!(engine.run(coordinator.handle()).await.is_ok());
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_retry_policy_recovers_from_transient_failure() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        let source = Arc::new(
            ScriptedSource::new(vec![
                Err(FetchError::Transport("connection reset".to_string())),
                Err(FetchError::Status {
                    code: 503,
                    body: "throttled".to_string(),
                }),
                Ok(vec![point("cpu", 300, 5.0)]),
            ])
            .stop_after(3, coordinator.clone()),
        );
        let forwarder = Arc::new(RecordingForwarder::default());
        let mut engine = RelayEngine::new(registry(), source.clone(), forwarder.clone(), Duration::from_millis(10))
            .with_fetch_policy(FetchPolicy::Retry {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                max_retries: 3,
            })
            .with_output(std::io::sink());

        let result = tokio::time::timeout(Duration::from_secs(5), engine.run(coordinator.handle()))
            .await
            .expect("relay loop did not stop");
        assert!(result.is_ok());
        assert!(engine.inflight().wait_idle_timeout(Duration::from_secs(1)).await);

        assert_eq!(engine.stats().fetch_failures, 2);
        assert_eq!(forwarder.calls(), vec![("cpu".to_string(), 5.0, 300)]);
    }

    #[tokio::test]
    async fn test_retry_policy_gives_up() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(FetchError::Transport("down".to_string())),
            Err(FetchError::Transport("down".to_string())),
            Err(FetchError::Transport("still down".to_string())),
        ]));
        let mut engine = RelayEngine::new(
            registry(),
            source.clone(),
            Arc::new(RecordingForwarder::default()),
            Duration::from_millis(10),
        )
        .with_fetch_policy(FetchPolicy::Retry {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            max_retries: 2,
        })
        .with_output(std::io::sink());

        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        let result = tokio::time::timeout(Duration::from_secs(5), engine.run(coordinator.handle()))
            .await
            .expect("relay loop did not stop");

        match result {
            Err(RelayError::RetriesExhausted(FetchError::Transport(msg))) => assert_eq!(msg, "still down"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(source.fetch_count(), 3);
    }
}
