use super::{roll_back, ExecutionStrategy, Sequential};
use crate::machine::Machine;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tango_core::{MachineError, Response, StepName};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Runs every step at once, at most `concurrency` at a time.
///
/// With a bound of 0 or 1 this strategy delegates to [`Sequential`] for both
/// execution and compensation, so the result is identical.
///
/// With a larger bound, directives do not steer execution: every step is
/// dispatched regardless of what the others return, SKIP and JUMP are
/// ignored and ERROR does not stop the remaining steps. Once all steps have
/// finished:
///
/// - if any step failed, the executed steps are compensated and the first
///   failure observed is returned (which one is a race when several fail);
/// - otherwise the first DONE response, in completion order, is returned.
///
/// The executed-step log is in completion order. Steps share one context
/// with no isolation; state they write must be synchronized by the caller.
///
/// # Examples
///
/// ```
/// use tango::Concurrent;
///
/// let strategy = Concurrent::new(4);
/// assert_eq!(strategy.concurrency(), 4);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Concurrent {
    concurrency: usize,
}

impl Concurrent {
    /// Creates a strategy admitting at most `concurrency` steps at once.
    pub fn new(concurrency: usize) -> Self {
        Self { concurrency }
    }

    /// The admission bound.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn delegates(&self) -> bool {
        self.concurrency <= 1
    }
}

/// Spawned step tasks behind a counting admission bound.
struct Dispatch {
    admission: Arc<Semaphore>,
    tasks: Vec<(StepName, JoinHandle<()>)>,
}

impl Dispatch {
    /// Admits at most `bound` of `expected` tasks at once, capped at the task
    /// count and at the semaphore's capacity.
    fn new(bound: usize, expected: usize) -> Self {
        let permits = bound.min(expected).min(Semaphore::MAX_PERMITS);
        Self {
            admission: Arc::new(Semaphore::new(permits)),
            tasks: Vec::with_capacity(expected),
        }
    }

    /// Waits for a free slot, then spawns `task`.
    async fn spawn<F>(&mut self, step_name: StepName, task: F) -> Result<(), MachineError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = match Arc::clone(&self.admission).acquire_owned().await {
            Ok(permit) => permit,
            Err(closed) => {
                let reason = format!("admission bound closed: {closed}");
                return Err(MachineError::Configuration(reason));
            }
        };

        let handle = tokio::spawn(async move {
            let _permit = permit;
            task.await;
        });
        self.tasks.push((step_name, handle));
        Ok(())
    }

    /// Waits for every task. Returns the failures of tasks that did not finish.
    async fn wait(self) -> Vec<MachineError> {
        let mut aborted = Vec::new();
        for (step_name, handle) in self.tasks {
            if let Err(e) = handle.await {
                aborted.push(MachineError::TaskAborted {
                    step_name,
                    details: e.to_string(),
                });
            }
        }
        aborted
    }
}

/// Returns the first failure reported through `failures`, falling back to the
/// tasks that aborted.
async fn first_failure(
    failures: &mut mpsc::UnboundedReceiver<MachineError>,
    aborted: Vec<MachineError>,
) -> Option<MachineError> {
    match failures.recv().await {
        Some(error) => Some(error),
        None => aborted.into_iter().next(),
    }
}

#[async_trait]
impl<Sv, St> ExecutionStrategy<Sv, St> for Concurrent
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    async fn execute(
        &self,
        machine: &mut Machine<Sv, St>,
    ) -> Result<Option<Response<Sv, St>>, MachineError> {
        if self.delegates() {
            return ExecutionStrategy::<Sv, St>::execute(&Sequential, machine).await;
        }

        let runner = machine.runner();
        let steps = machine.steps().to_vec();
        let (completed_tx, mut completed_rx) = mpsc::unbounded_channel::<Response<Sv, St>>();
        let (failed_tx, mut failed_rx) = mpsc::unbounded_channel::<MachineError>();
        let mut dispatch = Dispatch::new(self.concurrency, steps.len());

        debug!(
            machine = %machine.name(),
            steps = steps.len(),
            concurrency = self.concurrency,
            "dispatching steps concurrently"
        );

        for step in steps {
            let runner = runner.clone();
            let completed = completed_tx.clone();
            let failed = failed_tx.clone();

            dispatch
                .spawn(step.name(), async move {
                    match runner.execute_step(&step).await {
                        Ok(response) => {
                            let _ = completed.send(response.clone());
                            runner.record(&step, &response);
                        }
                        Err(error) => {
                            let _ = failed.send(error);
                        }
                    }
                })
                .await?;
        }
        drop(completed_tx);
        drop(failed_tx);

        let aborted = dispatch.wait().await;
        if let Some(failure) = first_failure(&mut failed_rx, aborted).await {
            warn!(
                machine = %machine.name(),
                error = %failure,
                "concurrent step failed, compensating"
            );
            return Err(roll_back(self, machine, failure).await);
        }

        while let Some(response) = completed_rx.recv().await {
            if response.is_done() {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    async fn compensate(&self, machine: &mut Machine<Sv, St>) -> Result<(), MachineError> {
        if self.delegates() {
            return ExecutionStrategy::<Sv, St>::compensate(&Sequential, machine).await;
        }

        machine.restore_initial_context();
        let runner = machine.runner();
        let executed = machine.executed_steps();
        let (failed_tx, mut failed_rx) = mpsc::unbounded_channel::<MachineError>();
        let mut dispatch = Dispatch::new(self.concurrency, executed.len());

        for step in executed.into_iter().rev() {
            let runner = runner.clone();
            let failed = failed_tx.clone();

            dispatch
                .spawn(step.name(), async move {
                    if let Err(error) = runner.compensate_step(&step).await {
                        let _ = failed.send(error);
                    }
                })
                .await?;
        }
        drop(failed_tx);

        let aborted = dispatch.wait().await;
        match first_failure(&mut failed_rx, aborted).await {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
