//! Scanner module - probes and the bounded worker pool that drives them.
//!
//! The pool admits at most `concurrency` probes at a time through a
//! semaphore, counts every admitted item as scanned on dispatch, streams
//! interesting results through a channel, and converts any fault inside a
//! worker into a skipped item instead of tearing the pool down.

pub mod http;
pub mod rate_limiter;
pub mod tcp;
pub mod traits;

use crate::error::{ConfigError, ProbeError};
use crate::progress::JobCounters;
use futures::Stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{Id, JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

pub use http::{AcceptedStatusSet, HttpPathProbe, RetryPolicy};
pub use rate_limiter::RateLimiter;
pub use tcp::TcpConnectProbe;
pub use traits::{PathResult, PortResult, Probe, ProbeOutcome, UNKNOWN};

/// Result channel capacity per unit of concurrency.
const RESULT_BUFFER_PER_WORKER: usize = 20;

/// Upper bound on the result channel capacity.
const MAX_RESULT_BUFFER: usize = 1 << 16;

/// How one admitted item ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitOutcome {
    Found,
    Miss,
    Failed,
    Skipped,
}

/// Totals of a finished pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    /// Items admitted to a worker.
    pub dispatched: u64,
    pub found: u64,
    pub missed: u64,
    /// Transport or protocol failures.
    pub failed: u64,
    /// Cancelled before probing, or the worker faulted.
    pub skipped: u64,
    /// Highest number of probes observed in flight at once.
    pub peak_in_flight: usize,
}

impl PoolSummary {
    fn record(&mut self, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Found => self.found += 1,
            UnitOutcome::Miss => self.missed += 1,
            UnitOutcome::Failed => self.failed += 1,
            UnitOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Gauge of probes currently running.
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded pool of probe workers.
pub struct WorkerPool<P: Probe> {
    probe: Arc<P>,
    concurrency: usize,
    limiter: Option<RateLimiter>,
    counters: Arc<JobCounters>,
    in_flight: Arc<InFlight>,
}

impl<P: Probe> WorkerPool<P> {
    /// Create a pool running at most `concurrency` probes at once.
    pub fn new(probe: Arc<P>, concurrency: usize) -> Result<Self, ConfigError> {
        if concurrency == 0 {
            return Err(ConfigError::NonPositiveConcurrency);
        }
        Ok(Self {
            probe,
            concurrency: concurrency.min(Semaphore::MAX_PERMITS),
            limiter: None,
            counters: Arc::new(JobCounters::default()),
            in_flight: Arc::new(InFlight::default()),
        })
    }

    /// Cap how many probes may start per second.
    pub fn with_rate_limiter(mut self, limiter: Option<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Share scanned/total counters with a progress reporter.
    pub fn with_counters(mut self, counters: Arc<JobCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn counters(&self) -> &Arc<JobCounters> {
        &self.counters
    }

    pub fn in_flight(&self) -> &Arc<InFlight> {
        &self.in_flight
    }

    /// Run the pool in the background and hand back its result stream.
    ///
    /// Closing `shutdown`, through the handle or any other holder, stops
    /// admission.
    pub fn spawn(self, items: Vec<P::Item>, shutdown: Arc<Shutdown>) -> PoolHandle<P::Output> {
        let capacity = self
            .concurrency
            .saturating_mul(RESULT_BUFFER_PER_WORKER)
            .min(MAX_RESULT_BUFFER);
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = shutdown.token();
        let task = tokio::spawn(async move { self.run(items, cancel, tx).await });

        PoolHandle {
            shutdown,
            results: rx,
            task,
        }
    }

    /// Probe every item, sending interesting results to `results`.
    ///
    /// Returns once every admitted probe has finished. Cancellation stops
    /// admission; probes already running finish within their own timeouts.
    pub async fn run(
        &self,
        items: Vec<P::Item>,
        cancel: CancellationToken,
        results: mpsc::Sender<P::Output>,
    ) -> PoolSummary {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        let mut labels: HashMap<Id, String> = HashMap::new();
        let mut summary = PoolSummary::default();

        for item in items {
            if cancel.is_cancelled() {
                break;
            }

            if let Some(limiter) = &self.limiter {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = limiter.wait() => {}
                }
            }

            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            while let Some(joined) = set.try_join_next_with_id() {
                summary.record(settle(joined, &mut labels));
            }

            self.counters.record_dispatch();
            summary.dispatched += 1;

            let label = item.to_string();
            let probe = Arc::clone(&self.probe);
            let in_flight = Arc::clone(&self.in_flight);
            let cancel = cancel.clone();
            let results = results.clone();

            let handle = set.spawn(async move {
                let _permit = permit;
                let _in_flight = in_flight.enter();

                match probe.probe(item, &cancel).await {
                    ProbeOutcome::Found(output) => {
                        // A closed receiver means nobody wants results anymore
                        let _ = results.send(output).await;
                        UnitOutcome::Found
                    }
                    ProbeOutcome::Miss => UnitOutcome::Miss,
                    ProbeOutcome::Failed(ProbeError::Cancelled) => UnitOutcome::Skipped,
                    ProbeOutcome::Failed(_) => UnitOutcome::Failed,
                }
            });
            labels.insert(handle.id(), label);
        }

        while let Some(joined) = set.join_next_with_id().await {
            summary.record(settle(joined, &mut labels));
        }

        summary.peak_in_flight = self.in_flight.peak();
        summary
    }
}

/// Turn a joined worker into an outcome; faults become skipped items.
fn settle(
    joined: Result<(Id, UnitOutcome), JoinError>,
    labels: &mut HashMap<Id, String>,
) -> UnitOutcome {
    match joined {
        Ok((id, outcome)) => {
            labels.remove(&id);
            outcome
        }
        Err(e) => {
            let item = labels.remove(&e.id()).unwrap_or_default();
            if e.is_panic() {
                tracing::warn!(%item, "probe worker panicked, item skipped");
            } else {
                tracing::debug!(%item, "probe worker aborted");
            }
            UnitOutcome::Skipped
        }
    }
}

/// Close-once guard over a cancellation token.
#[derive(Debug, Default)]
pub struct Shutdown {
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token. Only the first call has an effect; returns
    /// whether this call was the one that closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// A running pool: its result stream plus a guarded close path.
pub struct PoolHandle<T> {
    shutdown: Arc<Shutdown>,
    results: mpsc::Receiver<T>,
    task: JoinHandle<PoolSummary>,
}

impl<T> PoolHandle<T> {
    /// The results as a `Stream`; it ends once every worker has finished.
    pub fn results(&mut self) -> impl Stream<Item = T> + '_ {
        futures::stream::poll_fn(move |cx| self.results.poll_recv(cx))
    }

    /// Stop admitting work. Only the first call has an effect; returns
    /// whether this call was the one that closed the pool.
    pub fn close(&self) -> bool {
        self.shutdown.close()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_closed()
    }

    /// Wait for the pool to drain.
    pub async fn join(self) -> Result<PoolSummary, JoinError> {
        drop(self.results);
        self.task.await
    }
}
