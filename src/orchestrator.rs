//! Concurrent, rate-limited collection of travel times.
//!
//! Each enabled provider gets a [`ProviderLane`]: its adapter, its
//! authenticated client, and its own [`RateLimiter`]. A lane runs on its own
//! tokio task and spawns one future per `(pair, departure)`. The limiter is
//! the only throttle, so a lane with no budget fires everything at once.
//! Every task reports back over one completion channel to the merge loop in
//! [`FetchOrchestrator::run`], which alone owns the [`Dataset`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{ProviderConfig, ProviderId};
use crate::dataset::{Dataset, DatasetKey};
use crate::error::{ConfigError, FetchError};
use crate::fetch::{RateLimiter, SharedClient};
use crate::input::RoutePair;
use crate::providers::{ProviderAdapter, RouteResult, authorize};

/// Bounded retry with exponential backoff for retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Everything needed to query one provider.
pub struct ProviderLane {
    adapter: ProviderAdapter,
    client: SharedClient,
    limiter: RateLimiter,
    abandoned: AtomicBool,
}

impl ProviderLane {
    pub fn new(adapter: ProviderAdapter, client: SharedClient, limiter: RateLimiter) -> Self {
        Self {
            adapter,
            client,
            limiter,
            abandoned: AtomicBool::new(false),
        }
    }

    /// Builds the adapter, wraps `base` with credentials and sizes the limiter.
    pub fn from_config(config: &ProviderConfig, base: SharedClient) -> Result<Self, ConfigError> {
        let adapter = ProviderAdapter::from_config(config)?;
        let client = authorize(config, base)?;
        Ok(Self::new(
            adapter,
            client,
            RateLimiter::from_budget(config.max_rpm),
        ))
    }

    pub fn id(&self) -> ProviderId {
        self.adapter.id()
    }

    async fn run(
        self: Arc<Self>,
        keys: Arc<[DatasetKey]>,
        retry: RetryPolicy,
        completions: mpsc::UnboundedSender<TaskOutcome>,
    ) {
        debug!(tasks = keys.len(), burst = ?self.limiter.burst(), "Lane started");
        let mut tasks = Vec::with_capacity(keys.len());
        for &key in keys.iter() {
            let lane = self.clone();
            let completions = completions.clone();
            let task_span = info_span!("task", route = %key.pair, departure = %key.departure);
            tasks.push(tokio::spawn(
                async move {
                    let (result, attempts) = lane.execute(key, retry).await;
                    let outcome = TaskOutcome {
                        provider: lane.id(),
                        key,
                        result,
                        attempts,
                    };
                    // the merge loop outlives every lane
                    let _ = completions.send(outcome);
                }
                .instrument(task_span),
            ));
        }
        drop(completions);

        for task in tasks {
            if let Err(e) = task.await {
                error!(provider = %self.id(), error = %e, "Fetch task panicked");
            }
        }
    }

    /// Drives one task to a terminal state. Returns the result and the number
    /// of requests actually sent.
    async fn execute(
        &self,
        key: DatasetKey,
        retry: RetryPolicy,
    ) -> (Result<RouteResult, FetchError>, u32) {
        let mut attempt = 0;
        loop {
            if self.is_abandoned() {
                return (Err(abandoned_error()), attempt);
            }
            self.limiter.acquire().await;
            // the wait may have outlasted another task's auth failure
            if self.is_abandoned() {
                return (Err(abandoned_error()), attempt);
            }

            attempt += 1;
            let result = self
                .adapter
                .fetch(
                    self.client.as_ref(),
                    key.pair.origin,
                    key.pair.destination,
                    key.departure,
                )
                .await;

            match result {
                Err(e) if e.abandons_provider() => {
                    if !self.abandoned.swap(true, Ordering::AcqRel) {
                        error!(provider = %self.id(), error = %e, "Credentials rejected, abandoning provider");
                    }
                    return (Err(e), attempt);
                }
                Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                    let delay = retry.backoff(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return (other, attempt),
            }
        }
    }

    fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }
}

fn abandoned_error() -> FetchError {
    FetchError::Authentication {
        message: "skipped after an earlier authentication failure".to_string(),
    }
}

/// Terminal state of one `(pair, departure, provider)` task.
#[derive(Debug)]
pub struct TaskOutcome {
    pub provider: ProviderId,
    pub key: DatasetKey,
    pub result: Result<RouteResult, FetchError>,
    pub attempts: u32,
}

/// Per-provider task accounting.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderTally {
    pub succeeded: usize,
    pub failed: usize,
    /// Failures keyed by [`FetchError::kind`].
    pub failures: BTreeMap<&'static str, usize>,
    pub abandoned: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    pub providers: BTreeMap<ProviderId, ProviderTally>,
}

impl FetchReport {
    fn record(&mut self, outcome: &TaskOutcome) {
        let tally = self.providers.entry(outcome.provider).or_default();
        match &outcome.result {
            Ok(_) => tally.succeeded += 1,
            Err(e) => {
                tally.failed += 1;
                *tally.failures.entry(e.kind()).or_default() += 1;
                tally.abandoned |= e.abandons_provider();
            }
        }
    }

    pub fn failed(&self, provider: ProviderId) -> usize {
        self.providers.get(&provider).map_or(0, |t| t.failed)
    }

    pub fn total_failed(&self) -> usize {
        self.providers.values().map(|t| t.failed).sum()
    }

    /// Providers whose credentials were rejected during the run.
    pub fn abandoned(&self) -> Vec<ProviderId> {
        self.providers
            .iter()
            .filter(|(_, t)| t.abandoned)
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn log_summary(&self) {
        for (id, tally) in &self.providers {
            let failures = tally
                .failures
                .iter()
                .map(|(kind, count)| format!("{kind}={count}"))
                .collect::<Vec<_>>()
                .join(",");
            info!(
                provider = %id,
                succeeded = tally.succeeded,
                failed = tally.failed,
                failures = %failures,
                "Provider fetch summary"
            );
        }
        for id in self.abandoned() {
            warn!(provider = %id, "Provider abandoned after authentication failure; check its credentials");
        }
    }
}

pub struct FetchOrchestrator {
    lanes: Vec<Arc<ProviderLane>>,
    retry: RetryPolicy,
}

impl FetchOrchestrator {
    pub fn new(lanes: Vec<ProviderLane>, retry: RetryPolicy) -> Self {
        Self {
            lanes: lanes.into_iter().map(Arc::new).collect(),
            retry,
        }
    }

    pub fn providers(&self) -> Vec<ProviderId> {
        self.lanes.iter().map(|lane| lane.id()).collect()
    }

    /// Fetches every `(pair, departure, provider)` combination.
    ///
    /// Never fails: each task ends up either as a dataset cell or as a
    /// counted failure in the report. Every expected row is present in the
    /// returned dataset, even if all of its cells are empty.
    #[tracing::instrument(
        skip_all,
        fields(pairs = pairs.len(), departures = departures.len(), providers = self.lanes.len())
    )]
    pub async fn run(
        &self,
        pairs: &[RoutePair],
        departures: &[DateTime<FixedOffset>],
    ) -> (Dataset, FetchReport) {
        let mut dataset = Dataset::with_rows(self.providers(), pairs, departures);
        let keys: Arc<[DatasetKey]> = dataset.rows().iter().map(|row| row.key).collect();
        let mut report = FetchReport::default();
        for id in self.providers() {
            report.providers.insert(id, ProviderTally::default());
        }

        info!(
            tasks = keys.len() * self.lanes.len(),
            "Dispatching fetch tasks"
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut lanes = Vec::with_capacity(self.lanes.len());
        for lane in &self.lanes {
            let lane_span = info_span!("lane", provider = %lane.id());
            lanes.push(tokio::spawn(
                lane.clone()
                    .run(keys.clone(), self.retry, tx.clone())
                    .instrument(lane_span),
            ));
        }
        drop(tx);

        let total = keys.len() * self.lanes.len();
        let mut completed = 0;
        while let Some(outcome) = rx.recv().await {
            completed += 1;
            report.record(&outcome);
            match outcome.result {
                Ok(route) => {
                    debug!(
                        provider = %outcome.provider,
                        key = %outcome.key,
                        seconds = route.seconds,
                        distance = ?route.details.distance_meters,
                        attempts = outcome.attempts,
                        "Travel time received"
                    );
                    dataset.insert(outcome.key, outcome.provider, route.seconds);
                    dataset.insert_details(outcome.key, outcome.provider, route.details);
                }
                Err(e) => warn!(
                    provider = %outcome.provider,
                    key = %outcome.key,
                    attempts = outcome.attempts,
                    kind = e.kind(),
                    error = %e,
                    "Fetch failed"
                ),
            }
            if completed % 100 == 0 {
                info!(completed, total, "Fetch progress");
            }
        }

        for lane in lanes {
            if let Err(e) = lane.await {
                error!(error = %e, "Provider lane panicked");
            }
        }

        (dataset, report)
    }
}
