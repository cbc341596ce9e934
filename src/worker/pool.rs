//! Bounded worker pool: semaphore-gated fan-out of step attempts.
//!
//! Each attempt runs in its own spawned task, so a failing worker cannot
//! corrupt or block its batch peers. The pool emits `StepEvent`s on a channel
//! the controller consumes; the fan-in barrier is the controller awaiting one
//! `Finished` event per outstanding attempt.

use crate::audit::{AttemptKind, AttemptOutcome, AttemptRecord};
use crate::errors::RunError;
use crate::plan::Step;
use crate::worker::{ProgressReporter, Repairer, StepEvent, Worker};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

pub struct WorkerPool {
    worker: Arc<dyn Worker>,
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl WorkerPool {
    /// Create a pool running at most `limit` attempts at once.
    ///
    /// A limit below one can never run a step; that is a configuration
    /// error, not a plan error.
    pub fn new(worker: Arc<dyn Worker>, limit: usize) -> Result<Self, RunError> {
        if limit == 0 {
            return Err(RunError::PoolExhausted);
        }
        Ok(Self {
            worker,
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        })
    }

    /// Maximum concurrent attempts.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Dispatch one standard attempt of a step. Returns immediately; the
    /// outcome arrives as a `StepEvent::Finished` on `events`.
    pub fn dispatch(
        &self,
        step: Step,
        attempt: u32,
        events: mpsc::Sender<StepEvent>,
    ) -> JoinHandle<()> {
        let worker = self.worker.clone();
        let semaphore = self.semaphore.clone();

        tokio::spawn(async move {
            // Closed semaphore cannot happen; the pool never closes it.
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };

            debug!(step = %step.id, attempt, "worker slot acquired");
            events
                .send(StepEvent::Started {
                    step_id: step.id.clone(),
                    attempt,
                })
                .await
                .ok();

            let started_at = Utc::now();
            let progress = ProgressReporter::new(&step.id, attempt, events.clone());
            let outcome = worker.execute(&step, &progress).await;

            let record = AttemptRecord {
                step_id: step.id.clone(),
                attempt,
                kind: AttemptKind::Standard,
                started_at,
                ended_at: Utc::now(),
                outcome: if outcome.is_success() {
                    AttemptOutcome::Succeeded
                } else {
                    AttemptOutcome::Failed
                },
                detail: outcome.detail(),
            };

            events.send(StepEvent::Finished { record }).await.ok();
        })
    }

    /// Dispatch the debug-escalation attempt: run the repair action, then one
    /// final execution. A failed repair finishes the attempt without
    /// re-running the worker.
    pub fn dispatch_repair(
        &self,
        step: Step,
        attempt: u32,
        repairer: Arc<dyn Repairer>,
        history: Vec<AttemptRecord>,
        events: mpsc::Sender<StepEvent>,
    ) -> JoinHandle<()> {
        let worker = self.worker.clone();
        let semaphore = self.semaphore.clone();

        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };

            debug!(step = %step.id, attempt, "escalation slot acquired");
            events
                .send(StepEvent::Started {
                    step_id: step.id.clone(),
                    attempt,
                })
                .await
                .ok();

            let started_at = Utc::now();
            let (outcome, detail) = match repairer.repair(&step, &history).await {
                Ok(()) => {
                    let progress = ProgressReporter::new(&step.id, attempt, events.clone());
                    let outcome = worker.execute(&step, &progress).await;
                    let detail = outcome.detail();
                    (
                        if outcome.is_success() {
                            AttemptOutcome::Succeeded
                        } else {
                            AttemptOutcome::Failed
                        },
                        detail,
                    )
                }
                Err(error) => (AttemptOutcome::Failed, error.to_string()),
            };

            let record = AttemptRecord {
                step_id: step.id.clone(),
                attempt,
                kind: AttemptKind::Repair,
                started_at,
                ended_at: Utc::now(),
                outcome,
                detail,
            };

            events.send(StepEvent::Finished { record }).await.ok();
        })
    }
}
