//! Run controller: state machine, retry policy, and the `RunHandle` surface.

use crate::audit::{AttemptKind, AttemptRecord, AuditLog};
use crate::dag::{Batch, BatchOptions, compute_batches};
use crate::errors::RunError;
use crate::orchestrator::state::{FailedStep, RunReport, RunSnapshot, RunState, StepStatus};
use crate::plan::{ExecutionMode, Plan};
use crate::worker::{Repairer, StepEvent, Worker, WorkerPool};
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Options for one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Concurrency cap for parallel-mode plans. Sequential plans always run
    /// with a cap of 1.
    pub max_parallel: usize,
    /// Re-attempts of a failed step before debug escalation.
    pub max_retries: u32,
    /// Batch computation options.
    pub batch: BatchOptions,
    /// Directory holding the run logs.
    pub audit_dir: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            max_retries: 1,
            batch: BatchOptions::default(),
            audit_dir: PathBuf::from(".foreman/audit"),
        }
    }
}

/// Orchestrates plan runs. Holds the worker and policy; each `start_run`
/// produces an independent `RunHandle` carrying all run-scoped state.
pub struct Orchestrator {
    worker: Arc<dyn Worker>,
    repairer: Option<Arc<dyn Repairer>>,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(worker: Arc<dyn Worker>, options: RunOptions) -> Self {
        Self {
            worker,
            repairer: None,
            options,
        }
    }

    /// Attach a debug/repair collaborator. Without one, escalation is
    /// skipped and retry exhaustion fails the step directly.
    pub fn with_repairer(mut self, repairer: Arc<dyn Repairer>) -> Self {
        self.repairer = Some(repairer);
        self
    }

    /// Validate the plan, compute batches, and spawn the controller task.
    ///
    /// Fails without dispatching anything on plan validation errors or a
    /// zero concurrency limit.
    pub fn start_run(&self, plan: Plan) -> Result<RunHandle, RunError> {
        let batches = compute_batches(&plan, &self.options.batch)?;

        let limit = match plan.mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel => self.options.max_parallel,
        };
        let pool = WorkerPool::new(self.worker.clone(), limit)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let audit = AuditLog::create(&self.options.audit_dir, run_id, started_at)
            .context("Failed to create audit log")?;
        let audit_path = audit.path().to_path_buf();

        let statuses: BTreeMap<String, StepStatus> = plan
            .steps()
            .iter()
            .map(|s| (s.id.clone(), StepStatus::Pending))
            .collect();

        let initial = RunSnapshot {
            run_id,
            state: RunState::Idle,
            batch_index: 0,
            total_batches: batches.len(),
            steps: statuses.clone(),
            started_at,
            updated_at: started_at,
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let abort = Arc::new(AtomicBool::new(false));

        info!(
            %run_id,
            steps = plan.len(),
            batches = batches.len(),
            mode = ?plan.mode,
            limit,
            "starting run"
        );

        let controller = Controller {
            plan,
            batches,
            pool,
            repairer: self.repairer.clone(),
            max_retries: self.options.max_retries,
            audit,
            snapshot_tx,
            abort: abort.clone(),
            run_id,
            started_at,
            statuses,
            history: HashMap::new(),
        };

        let join = tokio::spawn(controller.run());

        Ok(RunHandle {
            run_id,
            audit_path,
            abort,
            snapshot_rx,
            join,
        })
    }
}

/// Handle to a running orchestration. All run-scoped state hangs off the
/// handle; there is no process-wide current run.
pub struct RunHandle {
    run_id: Uuid,
    audit_path: PathBuf,
    abort: Arc<AtomicBool>,
    snapshot_rx: watch::Receiver<RunSnapshot>,
    join: JoinHandle<Result<RunReport, RunError>>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn audit_path(&self) -> &Path {
        &self.audit_path
    }

    /// Request cancellation. Already-dispatched workers finish; no new batch
    /// starts afterwards.
    pub fn cancel(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Latest run-state snapshot.
    pub fn status(&self) -> RunSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Wait for the run to reach a terminal state. Takes `&mut self` so a
    /// caller can race this against a cancellation signal and wait again
    /// after cancelling.
    pub async fn wait(&mut self) -> Result<RunReport, RunError> {
        (&mut self.join)
            .await
            .context("Controller task panicked or was cancelled")?
    }
}

struct Controller {
    plan: Plan,
    batches: Vec<Batch>,
    pool: WorkerPool,
    repairer: Option<Arc<dyn Repairer>>,
    max_retries: u32,
    audit: AuditLog,
    snapshot_tx: watch::Sender<RunSnapshot>,
    abort: Arc<AtomicBool>,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    statuses: BTreeMap<String, StepStatus>,
    history: HashMap<String, Vec<AttemptRecord>>,
}

/// How one batch ended.
enum BatchEnd {
    Clean,
    StepFailed,
}

impl Controller {
    async fn run(mut self) -> Result<RunReport, RunError> {
        let timer = Instant::now();
        let mut state = RunState::Running;
        let mut batch_index = 0;
        let mut aborted_in_batch = None;

        self.publish(state, batch_index);
        self.audit
            .append_snapshot(&self.snapshot_tx.borrow().clone())
            .context("Failed to record run start")?;

        let batches = std::mem::take(&mut self.batches);
        let mut terminal = None;

        for (index, batch) in batches.iter().enumerate() {
            batch_index = index;

            if self.abort.load(Ordering::SeqCst) {
                // Cancellation observed between batches; the previous batch
                // was the one in flight when it was requested.
                aborted_in_batch = index.checked_sub(1);
                terminal = Some(RunState::Aborted);
                break;
            }

            info!(batch = index, steps = ?batch.step_ids, "dispatching batch");
            let end = self.run_batch(index, batch, state).await?;

            self.publish(state, batch_index);
            self.audit
                .append_snapshot(&self.snapshot_tx.borrow().clone())
                .context("Failed to record batch boundary")?;

            match end {
                BatchEnd::StepFailed => {
                    if self.abort.load(Ordering::SeqCst) {
                        aborted_in_batch = Some(index);
                        terminal = Some(RunState::Aborted);
                    } else {
                        self.skip_unstarted();
                        terminal = Some(RunState::Failed);
                    }
                    break;
                }
                BatchEnd::Clean => {
                    if self.abort.load(Ordering::SeqCst) {
                        aborted_in_batch = Some(index);
                        terminal = Some(RunState::Aborted);
                        break;
                    }
                }
            }
        }

        state = terminal.unwrap_or(RunState::Succeeded);
        self.publish(state, batch_index);
        self.audit
            .append_snapshot(&self.snapshot_tx.borrow().clone())
            .context("Failed to record terminal snapshot")?;

        let failed_steps: Vec<FailedStep> = self
            .statuses
            .iter()
            .filter_map(|(id, status)| match status {
                StepStatus::Failed { reason } => Some(FailedStep {
                    id: id.clone(),
                    reason: reason.clone(),
                }),
                _ => None,
            })
            .collect();

        info!(state = ?state, elapsed = ?timer.elapsed(), "run finished");

        Ok(RunReport {
            run_id: self.run_id,
            state,
            total: self.statuses.len(),
            succeeded: self.count(StepStatus::is_success),
            failed: failed_steps.len(),
            skipped: self.count(|s| matches!(s, StepStatus::Skipped)),
            failed_steps,
            aborted_in_batch,
            duration: timer.elapsed(),
            audit_path: self.audit.path().to_path_buf(),
        })
    }

    /// Dispatch one batch and await its full fan-in, applying the retry and
    /// escalation policy per step as outcomes arrive.
    async fn run_batch(
        &mut self,
        index: usize,
        batch: &Batch,
        state: RunState,
    ) -> Result<BatchEnd, RunError> {
        let capacity = std::cmp::max(16, batch.len() * 4);
        let (tx, mut rx) = mpsc::channel::<StepEvent>(capacity);

        for id in &batch.step_ids {
            self.set_status(id, StepStatus::Ready);
        }
        self.publish(state, index);

        for id in &batch.step_ids {
            let step = self
                .plan
                .get_step(id)
                .with_context(|| format!("Batch references unknown step {}", id))?
                .clone();
            self.pool.dispatch(step, 1, tx.clone());
        }

        let mut outstanding = batch.len();
        let mut failed = false;

        // The controller keeps `tx` alive for retry dispatch, so recv() only
        // returns None if the runtime is torn down under us.
        while outstanding > 0 {
            let Some(event) = rx.recv().await else {
                warn!(batch = index, outstanding, "event channel closed early");
                return Err(
                    anyhow::anyhow!("Worker task ended without reporting an outcome").into(),
                );
            };

            match event {
                StepEvent::Started { step_id, attempt } => {
                    debug!(step = %step_id, attempt, "running");
                    self.set_status(&step_id, StepStatus::Running);
                }
                StepEvent::Verifying { step_id, attempt } => {
                    debug!(step = %step_id, attempt, "verifying");
                    self.set_status(&step_id, StepStatus::Verifying);
                }
                StepEvent::Finished { record } => {
                    self.audit
                        .append_attempt(&record)
                        .context("Failed to record attempt")?;

                    let step_id = record.step_id.clone();
                    let resolved = self.handle_finished(record, &tx, &mut outstanding)?;
                    if let Some(permanently_failed) = resolved {
                        if permanently_failed {
                            failed = true;
                        }
                        debug!(step = %step_id, "step resolved");
                    }
                }
            }
            self.publish(state, index);
        }

        Ok(if failed {
            BatchEnd::StepFailed
        } else {
            BatchEnd::Clean
        })
    }

    /// Apply the per-step outcome policy for a finished attempt.
    ///
    /// Returns `Some(permanently_failed)` when the step reached a terminal
    /// status, `None` when another attempt was dispatched.
    fn handle_finished(
        &mut self,
        record: AttemptRecord,
        tx: &mpsc::Sender<StepEvent>,
        outstanding: &mut usize,
    ) -> Result<Option<bool>, RunError> {
        let step_id = record.step_id.clone();
        let attempt = record.attempt;
        let kind = record.kind;
        let succeeded = record.is_success();
        let detail = record.detail.clone();

        self.history.entry(step_id.clone()).or_default().push(record);

        if succeeded {
            self.set_status(&step_id, StepStatus::Succeeded);
            *outstanding -= 1;
            return Ok(Some(false));
        }

        // A retry is a new dispatch; once the abort flag is set, only
        // already-dispatched attempts may finish.
        let abort = self.abort.load(Ordering::SeqCst);

        if !abort && kind == AttemptKind::Standard && attempt <= self.max_retries {
            warn!(step = %step_id, attempt, "attempt failed, retrying");
            let step = self
                .plan
                .get_step(&step_id)
                .with_context(|| format!("Unknown step {}", step_id))?
                .clone();
            self.pool.dispatch(step, attempt + 1, tx.clone());
            return Ok(None);
        }

        if !abort
            && kind == AttemptKind::Standard
            && let Some(repairer) = &self.repairer
        {
            warn!(step = %step_id, attempt, "retries exhausted, escalating");
            let step = self
                .plan
                .get_step(&step_id)
                .with_context(|| format!("Unknown step {}", step_id))?
                .clone();
            let history = self.history.get(&step_id).cloned().unwrap_or_default();
            self.pool
                .dispatch_repair(step, attempt + 1, repairer.clone(), history, tx.clone());
            return Ok(None);
        }

        warn!(step = %step_id, attempt, %detail, "step permanently failed");
        self.set_status(&step_id, StepStatus::Failed { reason: detail });
        *outstanding -= 1;
        Ok(Some(true))
    }

    /// Mark every step that never started as skipped.
    fn skip_unstarted(&mut self) {
        for status in self.statuses.values_mut() {
            if matches!(status, StepStatus::Pending | StepStatus::Ready) {
                *status = StepStatus::Skipped;
            }
        }
    }

    fn set_status(&mut self, id: &str, status: StepStatus) {
        if let Some(slot) = self.statuses.get_mut(id) {
            *slot = status;
        }
    }

    fn count(&self, pred: impl Fn(&StepStatus) -> bool) -> usize {
        self.statuses.values().filter(|s| pred(s)).count()
    }

    fn publish(&self, state: RunState, batch_index: usize) {
        let total_batches = self.snapshot_tx.borrow().total_batches;
        self.snapshot_tx.send_replace(RunSnapshot {
            run_id: self.run_id,
            state,
            batch_index,
            total_batches,
            steps: self.statuses.clone(),
            started_at: self.started_at,
            updated_at: Utc::now(),
        });
    }
}
