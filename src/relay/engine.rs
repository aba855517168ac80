//! Relay engine - the poll / dedup / forward loop
//!
//! One iteration:
//! 1. Plan the fetch window from the current time
//! 2. Query the source for every registered metric
//! 3. For each result, take its newest sample and compare with the watermark
//! 4. New points are printed, handed to the forwarder (if the metric has a
//!    sink name) and the watermark advances
//! 5. Sleep for whatever is left of the interval
//!
//! Windows overlap across iterations on purpose, so the same point is seen by
//! several consecutive polls. The watermark makes sure it goes out once.
//!
//! Forward calls run on spawned tasks tracked by `InflightForwards`. The
//! watermark decision is made here, on the loop, before dispatch; a failed
//! forward is logged and never rolled back.

use super::error::{FetchError, RelayError, RelayResult};
use super::error_handler::FetchPolicy;
use super::forwarder::Forwarder;
use super::inflight::InflightForwards;
use super::registry::MetricRegistry;
use super::scheduler::drift_corrected_sleep;
use super::shutdown::ShutdownHandle;
use super::source::MetricSource;
use super::types::{MetricResult, Observation};
use super::watermark::WatermarkStore;
use super::window::{FetchWindow, WindowPlanner};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What one iteration did
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub window: FetchWindow,
    pub results: usize,
    pub observations: Vec<Observation>,
    pub dispatched: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub iterations: u64,
    pub observed: u64,
    pub dispatched: u64,
    pub fetch_failures: u64,
}

pub struct RelayEngine {
    registry: MetricRegistry,
    planner: WindowPlanner,
    watermarks: WatermarkStore,
    source: Arc<dyn MetricSource>,
    forwarder: Arc<dyn Forwarder>,
    inflight: InflightForwards,
    interval: Duration,
    fetch_policy: FetchPolicy,
    output: Box<dyn Write + Send>,
    stats: RelayStats,
}

impl RelayEngine {
    pub fn new(
        registry: MetricRegistry,
        source: Arc<dyn MetricSource>,
        forwarder: Arc<dyn Forwarder>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            planner: WindowPlanner::default(),
            watermarks: WatermarkStore::new(),
            source,
            forwarder,
            inflight: InflightForwards::new(),
            interval,
            fetch_policy: FetchPolicy::Fatal,
            output: Box::new(std::io::stdout()),
            stats: RelayStats::default(),
        }
    }

    pub fn with_planner(mut self, planner: WindowPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    pub fn with_inflight(mut self, inflight: InflightForwards) -> Self {
        self.inflight = inflight;
        self
    }

    /// Where the line per new point goes (stdout by default)
    pub fn with_output<W: Write + Send + 'static>(mut self, output: W) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn watermarks(&self) -> &WatermarkStore {
        &self.watermarks
    }

    pub fn inflight(&self) -> &InflightForwards {
        &self.inflight
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Run until shutdown is requested or a fetch failure is fatal
    ///
    /// Shutdown is observed before each fetch and during sleeps; an
    /// iteration that has started always runs to completion.
    pub async fn run(&mut self, shutdown: ShutdownHandle) -> RelayResult<()> {
        let mut backoff = self.fetch_policy.backoff();

        log::info!(
            "🔄 Relay loop starting: {} metric(s), {} forwarded, interval {:?}, look-back {}m",
            self.registry.len(),
            self.registry.forwarding_count(),
            self.interval,
            self.planner.lookback().num_minutes()
        );

        loop {
            if shutdown.is_triggered() {
                log::info!("🛑 Shutdown requested, relay loop stopping");
                return Ok(());
            }

            let started = Instant::now();

            match self.run_iteration(Utc::now()).await {
                Ok(report) => {
                    if let Some(backoff) = backoff.as_mut() {
                        backoff.reset();
                    }
                    log::debug!(
                        "📊 Poll {}: {} result(s), {} new, {} forwarded ({}ms)",
                        self.stats.iterations,
                        report.results,
                        report.observations.len(),
                        report.dispatched,
                        started.elapsed().as_millis()
                    );
                }
                Err(e) => {
                    self.stats.fetch_failures += 1;
                    let Some(backoff) = backoff.as_mut() else {
                        log::error!("❌ {}", e);
                        return Err(RelayError::Fetch(e));
                    };

                    log::warn!("⚠️  {}", e);
                    tokio::select! {
                        retry = backoff.sleep() => {
                            if retry.is_err() {
                                log::error!("❌ Fetch retries exhausted, giving up");
                                return Err(RelayError::RetriesExhausted(e));
                            }
                        }
                        _ = shutdown.triggered() => {
                            log::info!("🛑 Shutdown requested during fetch backoff");
                            return Ok(());
                        }
                    }
                    continue;
                }
            }

            let pause = drift_corrected_sleep(self.interval, started.elapsed());
            if pause.is_zero() {
                log::warn!(
                    "⚠️  Poll took {}ms, longer than the {:?} interval; polling again immediately",
                    started.elapsed().as_millis(),
                    self.interval
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.triggered() => {
                    log::info!("🛑 Shutdown requested, relay loop stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Fetch, dedup and dispatch once, for the window around `now`
    pub async fn run_iteration(&mut self, now: DateTime<Utc>) -> Result<IterationReport, FetchError> {
        let window = self.planner.plan(now);
        let results = self.source.fetch(&window, self.registry.specs()).await?;
        self.stats.iterations += 1;

        let observations = self.process_results(&results);
        emit_lines(self.output.as_mut(), &observations);

        let mut dispatched = 0;
        for observation in &observations {
            if self.dispatch(observation) {
                dispatched += 1;
            }
        }
        self.stats.dispatched += dispatched as u64;

        Ok(IterationReport {
            window,
            results: results.len(),
            observations,
            dispatched,
        })
    }

    /// Decide which results carry a new point and advance their watermarks
    ///
    /// Results without samples are skipped. Points at or before the
    /// watermark are skipped, even if the value changed upstream.
    pub fn process_results(&mut self, results: &[MetricResult]) -> Vec<Observation> {
        let mut observations = Vec::new();

        for result in results {
            let Some(latest) = result.latest() else {
                continue;
            };

            if !self.watermarks.try_advance(&result.id, latest.timestamp) {
                continue;
            }

            let sink_name = match self.registry.get(&result.id) {
                Some(spec) => spec.sink_name.clone(),
                None => {
                    log::debug!("Result for unregistered id '{}' observed only", result.id);
                    None
                }
            };

            observations.push(Observation {
                id: result.id.clone(),
                value: latest.value,
                timestamp: latest.timestamp,
                sink_name,
            });
        }

        self.stats.observed += observations.len() as u64;
        observations
    }

    /// Hand one observation to the forwarder on its own task. Returns false
    /// for observe-only metrics.
    fn dispatch(&self, observation: &Observation) -> bool {
        let Some(name) = observation.sink_name.clone() else {
            return false;
        };

        let guard = self.inflight.start();
        let forwarder = self.forwarder.clone();
        let value = observation.value;
        let timestamp = observation.timestamp;

        tokio::spawn(async move {
            let _guard = guard;
            match forwarder.forward(&name, value, timestamp).await {
                Ok(()) => log::debug!("✅ Forwarded {} = {:.3} @ {}", name, value, timestamp),
                Err(e) => log::error!("❌ Failed to forward {} @ {}: {}", name, timestamp, e),
            }
        });

        true
    }
}

fn emit_lines(out: &mut dyn Write, observations: &[Observation]) {
    if observations.is_empty() {
        return;
    }

    for observation in observations {
        if let Err(e) = writeln!(out, "{}", observation.render_line()) {
            log::warn!("Failed to write observation line: {}", e);
            return;
        }
    }
    if let Err(e) = out.flush() {
        log::warn!("Failed to flush observation lines: {}", e);
    }
}
