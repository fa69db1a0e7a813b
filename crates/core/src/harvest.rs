//! Concurrent fan-out over the source registry.
//!
//! Every source runs on its own thread and reports exactly one outcome into a
//! bounded queue. The consumer drains outcomes in arrival order.

use crate::{
    environment::Environment,
    error::{CoreError, Result, SourceError},
    metrics::{Source, SourceRegistry},
    model::{Harvested, MetricBatch},
};
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use std::{
    any::Any,
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use tracing::debug;

pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

type Report = (usize, Result<MetricBatch>);

#[derive(Debug, Clone)]
pub struct Harvester {
    capacity: usize,
    timeout: Option<Duration>,
}

impl Default for Harvester {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, None)
    }
}

impl Harvester {
    /// `capacity` bounds the delivery queue; `timeout`, when set, is the
    /// deadline for all sources measured from the start of the harvest.
    pub fn new(capacity: usize, timeout: Option<Duration>) -> Self {
        Self {
            capacity: capacity.max(1),
            timeout,
        }
    }

    /// Start every source and return the stream of their outcomes.
    pub fn collect_all(&self, sources: &SourceRegistry, env: Arc<Environment>) -> HarvestStream {
        let (tx, rx) = channel::bounded::<Report>(self.capacity);
        let mut reported = vec![false; sources.len()];
        let mut ready = VecDeque::new();

        for (position, entry) in sources.iter().enumerate() {
            let index = position + 1;

            // A source left behind by an earlier deadline is not started twice
            let Some(in_flight) = entry.claim() else {
                debug!(source = entry.name(), index, "Source still running, skipping");
                reported[position] = true;
                ready.push_back(Harvested::Failed(SourceError::new(index, CoreError::StillRunning)));
                continue;
            };

            let source = Arc::clone(entry.source());
            let env = Arc::clone(&env);
            let tx = tx.clone();

            let spawned = thread::Builder::new()
                .name(format!("source-{}", source.name()))
                .spawn(move || {
                    let started = Instant::now();
                    let outcome = run_source(&*source, &env);
                    drop(env);
                    drop(in_flight);
                    debug!(
                        source = source.name(),
                        index,
                        ok = outcome.is_ok(),
                        elapsed = ?started.elapsed(),
                        "Source finished"
                    );
                    // Fails only when the consumer has already given up on this source
                    let _ = tx.send((index, outcome));
                });

            if let Err(e) = spawned {
                reported[position] = true;
                ready.push_back(Harvested::Failed(SourceError::new(index, CoreError::Io(e))));
            }
        }

        let pending = reported.iter().filter(|done| !**done).count();
        HarvestStream {
            rx,
            reported,
            pending,
            deadline: self.timeout.map(|timeout| Instant::now() + timeout),
            timeout: self.timeout.unwrap_or_default(),
            ready,
        }
    }
}

fn run_source(source: &dyn Source, env: &Environment) -> Result<MetricBatch> {
    panic::catch_unwind(AssertUnwindSafe(|| source.collect(env)))
        .unwrap_or_else(|payload| Err(CoreError::Panicked(panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// One-shot stream of harvest outcomes, ending once every source has reported.
pub struct HarvestStream {
    rx: Receiver<Report>,
    reported: Vec<bool>,
    pending: usize,
    deadline: Option<Instant>,
    timeout: Duration,
    ready: VecDeque<Harvested>,
}

impl HarvestStream {
    /// Report every silent source as failed and stop waiting.
    fn abandon_pending(&mut self, reason: impl Fn() -> CoreError) {
        for (position, done) in self.reported.iter_mut().enumerate() {
            if !*done {
                *done = true;
                self.ready
                    .push_back(Harvested::Failed(SourceError::new(position + 1, reason())));
            }
        }
        self.pending = 0;
    }
}

impl Iterator for HarvestStream {
    type Item = Harvested;

    fn next(&mut self) -> Option<Harvested> {
        if let Some(item) = self.ready.pop_front() {
            return Some(item);
        }

        while self.pending > 0 {
            let received = match self.deadline {
                Some(deadline) => self.rx.recv_deadline(deadline),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok((index, outcome)) => {
                    let done = &mut self.reported[index - 1];
                    if *done {
                        continue;
                    }
                    *done = true;
                    self.pending -= 1;
                    return Some(match outcome {
                        Ok(batch) => Harvested::Batch(batch),
                        Err(e) => Harvested::Failed(SourceError::new(index, e)),
                    });
                }
                Err(RecvTimeoutError::Timeout) => {
                    let timeout = self.timeout;
                    self.abandon_pending(|| CoreError::TimedOut(timeout));
                    return self.ready.pop_front();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.abandon_pending(|| CoreError::Abandoned);
                    return self.ready.pop_front();
                }
            }
        }

        None
    }
}
