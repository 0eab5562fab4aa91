//! Per-step dispatch and the executed-step journal.

use crate::config::LogSettings;
use crate::plugin::Plugin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tango_core::{MachineContext, MachineError, PluginPhase, Response, Step};
use tracing::debug;

/// Append-only log of executed steps.
///
/// Its lock also covers the context's previous result, so "append step" and
/// "set previous result" are one atomic update for every strategy.
pub(crate) struct Journal<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    executed: Mutex<Vec<Arc<dyn Step<Sv, St>>>>,
}

impl<Sv, St> Journal<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Arc<dyn Step<Sv, St>>>> {
        self.executed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn record(
        &self,
        step: &Arc<dyn Step<Sv, St>>,
        response: &Response<Sv, St>,
        ctx: &MachineContext<Sv, St>,
    ) {
        let mut executed = self.entries();
        executed.push(Arc::clone(step));
        ctx.set_previous_result(Some(response.clone()));
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Step<Sv, St>>> {
        self.entries().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    pub(crate) fn clear(&self) {
        self.entries().clear();
    }
}

/// Everything a strategy needs to drive one step, detached from the machine
/// so it can move into spawned tasks.
pub(crate) struct StepRunner<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    pub(crate) machine: Arc<str>,
    pub(crate) context: Arc<MachineContext<Sv, St>>,
    pub(crate) plugins: Vec<Arc<dyn Plugin<Sv, St>>>,
    pub(crate) logging: LogSettings,
    pub(crate) journal: Arc<Journal<Sv, St>>,
}

impl<Sv, St> Clone for StepRunner<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            machine: Arc::clone(&self.machine),
            context: Arc::clone(&self.context),
            plugins: self.plugins.clone(),
            logging: self.logging,
            journal: Arc::clone(&self.journal),
        }
    }
}

impl<Sv, St> StepRunner<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    /// Plugin hooks, then `before_execute`, `execute` and `after_execute`.
    /// The first error aborts the step.
    pub(crate) async fn execute_step(
        &self,
        step: &Arc<dyn Step<Sv, St>>,
    ) -> Result<Response<Sv, St>, MachineError> {
        let step_name = step.name();
        self.logging.announce(&self.machine, "executing", &step_name);

        for plugin in &self.plugins {
            if let Err(e) = plugin.execute(&self.context).await {
                return Err(MachineError::plugin(plugin.name(), PluginPhase::Execute, e));
            }
        }

        step.before_execute(&self.context).await?;
        let response = step.execute(&self.context).await?;
        step.after_execute(&self.context).await?;

        debug!(
            machine = %self.machine,
            step = %step_name,
            status = %response.status(),
            "step executed"
        );
        Ok(response)
    }

    /// `before_compensate`, `compensate` and `after_compensate`. The first
    /// error aborts the rollback of this step.
    pub(crate) async fn compensate_step(
        &self,
        step: &Arc<dyn Step<Sv, St>>,
    ) -> Result<(), MachineError> {
        let step_name = step.name();
        self.logging.announce(&self.machine, "compensating", &step_name);

        step.before_compensate(&self.context).await?;
        let response = step.compensate(&self.context).await?;
        step.after_compensate(&self.context).await?;

        debug!(
            machine = %self.machine,
            step = %step_name,
            result = ?response.result(),
            "step compensated"
        );
        Ok(())
    }

    pub(crate) fn record(&self, step: &Arc<dyn Step<Sv, St>>, response: &Response<Sv, St>) {
        self.journal.record(step, response, &self.context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tango_core::{FnStep, StepName};

    #[test]
    fn test_journal_records_step_and_previous_result() {
        let journal = Journal::<(), ()>::new();
        let ctx = MachineContext::new((), ());
        let step: Arc<dyn Step<(), ()>> = Arc::new(FnStep::<(), ()>::new("Record"));

        journal.record(&step, &Response::next("first"), &ctx);
        journal.record(&step, &Response::done("second"), &ctx);

        assert_eq!(journal.len(), 2);
        let names: Vec<StepName> = journal.snapshot().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec![StepName::new("Record"); 2]);
        assert!(ctx.previous_result().is_some_and(|r| r.is_done()));

        journal.clear();
        assert_eq!(journal.len(), 0);
    }
}
