//! The machine: steps, shared context, executed-step log and strategy.

use crate::config::MachineConfig;
use crate::plugin::Plugin;
use crate::runner::{Journal, StepRunner};
use crate::strategy::ExecutionStrategy;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tango_core::{
    MachineContext, MachineError, NestedMachine, PluginPhase, Response, Step, StepName,
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// An ordered list of steps driven over a shared context by an
/// [`ExecutionStrategy`], with saga-style compensation.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicI64, Ordering};
/// use tango::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), MachineError> {
/// let mut machine = Machine::new(
///     "counter",
///     Vec::new(),
///     MachineContext::new((), AtomicI64::new(0)),
///     MachineConfig::new(),
///     Sequential,
/// );
///
/// machine.add_step(FnStep::<(), AtomicI64>::new("Increment").with_execute(|ctx| {
///     Box::pin(async move {
///         ctx.state.fetch_add(1, Ordering::SeqCst);
///         Ok(Response::next("incremented"))
///     })
/// }));
/// machine.add_step(FnStep::<(), AtomicI64>::new("Finish").with_execute(|_ctx| {
///     Box::pin(async { Ok(Response::done("finished")) })
/// }));
///
/// let response = machine.run().await?;
/// assert!(response.is_some_and(|r| r.is_done()));
/// assert_eq!(machine.context().state.load(Ordering::SeqCst), 1);
/// # Ok(())
/// # }
/// ```
pub struct Machine<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    name: Arc<str>,
    context: Arc<MachineContext<Sv, St>>,
    initial_context: Arc<MachineContext<Sv, St>>,
    steps: Vec<Arc<dyn Step<Sv, St>>>,
    journal: Arc<Journal<Sv, St>>,
    config: MachineConfig<Sv, St>,
    strategy: Arc<dyn ExecutionStrategy<Sv, St>>,
}

impl<Sv, St> fmt::Debug for Machine<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<StepName> = self.steps.iter().map(|s| s.name()).collect();
        f.debug_struct("Machine")
            .field("name", &self.name)
            .field("steps", &steps)
            .field("executed_steps", &self.executed_step_names())
            .field("config", &self.config)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl<Sv, St> Machine<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    /// Creates a machine.
    ///
    /// The context becomes both the working context and the initial context
    /// that compensation and [`Machine::reset`] return to. They are the same
    /// shared value, not a copy.
    pub fn new<S>(
        name: impl Into<String>,
        steps: Vec<Arc<dyn Step<Sv, St>>>,
        initial_context: impl Into<Arc<MachineContext<Sv, St>>>,
        config: MachineConfig<Sv, St>,
        strategy: S,
    ) -> Self
    where
        S: ExecutionStrategy<Sv, St> + 'static,
    {
        let initial_context = initial_context.into();
        Self {
            name: Arc::from(name.into()),
            context: Arc::clone(&initial_context),
            initial_context,
            steps,
            journal: Arc::new(Journal::new()),
            config,
            strategy: Arc::new(strategy),
        }
    }

    /// Appends a step. Steps are not validated until they run.
    pub fn add_step<S: Step<Sv, St> + 'static>(&mut self, step: S) {
        self.steps.push(Arc::new(step));
    }

    /// Appends a step that is shared with other machines.
    pub fn add_shared_step(&mut self, step: Arc<dyn Step<Sv, St>>) {
        self.steps.push(step);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Arc<dyn Step<Sv, St>>] {
        &self.steps
    }

    /// Steps that completed their execute call, in execution order.
    pub fn executed_steps(&self) -> Vec<Arc<dyn Step<Sv, St>>> {
        self.journal.snapshot()
    }

    pub fn executed_step_names(&self) -> Vec<StepName> {
        self.journal.snapshot().iter().map(|s| s.name()).collect()
    }

    pub fn context(&self) -> &Arc<MachineContext<Sv, St>> {
        &self.context
    }

    pub fn initial_context(&self) -> &Arc<MachineContext<Sv, St>> {
        &self.initial_context
    }

    pub fn config(&self) -> &MachineConfig<Sv, St> {
        &self.config
    }

    pub fn strategy(&self) -> &Arc<dyn ExecutionStrategy<Sv, St>> {
        &self.strategy
    }

    /// Index of the first step named `name`.
    pub fn position(&self, name: &StepName) -> Option<usize> {
        self.steps.iter().position(|s| s.name() == *name)
    }

    pub(crate) fn runner(&self) -> StepRunner<Sv, St> {
        StepRunner {
            machine: Arc::clone(&self.name),
            context: Arc::clone(&self.context),
            plugins: self.config.plugins.clone(),
            logging: self.config.logging,
            journal: Arc::clone(&self.journal),
        }
    }

    pub(crate) fn restore_initial_context(&mut self) {
        self.context = Arc::clone(&self.initial_context);
    }

    /// Runs the steps with the active strategy.
    ///
    /// Plugins are initialized first and may swap the strategy; their cleanup
    /// hooks run once the strategy returns, whatever the outcome.
    ///
    /// Returns `Ok(Some(response))` when a step answered DONE, `Ok(None)` when
    /// the steps ran out without one, and `Err` otherwise.
    pub async fn run(&mut self) -> Result<Option<Response<Sv, St>>, MachineError> {
        if self.steps.is_empty() {
            return Err(MachineError::NoSteps);
        }

        info!(machine = %self.name, steps = self.steps.len(), "running machine");

        let plugins = self.config.plugins.clone();
        for plugin in &plugins {
            if let Err(e) = plugin.init(&self.context).await {
                return Err(MachineError::plugin(plugin.name(), PluginPhase::Init, e));
            }

            if let Some(strategy) = plugin.modify_strategy(self) {
                debug!(
                    machine = %self.name,
                    plugin = plugin.name(),
                    strategy = ?strategy,
                    "strategy replaced"
                );
                self.strategy = strategy;
            }
        }

        let strategy = Arc::clone(&self.strategy);
        let outcome = strategy.execute(self).await;
        let cleanup = self.cleanup(&plugins).await;

        match (outcome, cleanup) {
            (Ok(response), Ok(())) => {
                info!(
                    machine = %self.name,
                    executed = self.journal.len(),
                    done = response.is_some(),
                    "machine finished"
                );
                Ok(response)
            }
            (Ok(_), Err(error)) => Err(error),
            (Err(error), Ok(())) => {
                warn!(machine = %self.name, error = %error, "machine failed");
                Err(error)
            }
            (Err(error), Err(cleanup_error)) => {
                warn!(
                    machine = %self.name,
                    error = %error,
                    cleanup_error = %cleanup_error,
                    "machine failed"
                );
                Err(error)
            }
        }
    }

    async fn cleanup(&self, plugins: &[Arc<dyn Plugin<Sv, St>>]) -> Result<(), MachineError> {
        for plugin in plugins {
            if let Err(e) = plugin.cleanup(&self.context).await {
                return Err(MachineError::plugin(plugin.name(), PluginPhase::Cleanup, e));
            }
        }
        Ok(())
    }

    /// Rolls back the executed steps with the active strategy.
    ///
    /// The context is reset to the initial context first; the executed-step
    /// log is left untouched.
    pub async fn compensate(&mut self) -> Result<(), MachineError> {
        info!(machine = %self.name, executed = self.journal.len(), "compensating machine");
        let strategy = Arc::clone(&self.strategy);
        strategy.compensate(self).await
    }

    /// Clears the steps and the executed-step log and returns to the initial
    /// context. Configuration and strategy are kept.
    pub fn reset(&mut self) {
        self.steps.clear();
        self.journal.clear();
        self.restore_initial_context();
    }

    /// Wraps the machine so a step can hand it to its caller through
    /// [`Response::run_machine`].
    pub fn into_shared(self) -> Arc<SharedMachine<Sv, St>> {
        Arc::new(SharedMachine(Mutex::new(self)))
    }
}

/// A machine behind an async lock, usable as a [`NestedMachine`].
pub struct SharedMachine<Sv, St>(Mutex<Machine<Sv, St>>)
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static;

impl<Sv, St> SharedMachine<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    /// Locks the machine for inspection or modification.
    pub async fn lock(&self) -> MutexGuard<'_, Machine<Sv, St>> {
        self.0.lock().await
    }
}

#[async_trait]
impl<Sv, St> NestedMachine<Sv, St> for SharedMachine<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    async fn name(&self) -> String {
        self.0.lock().await.name().to_string()
    }

    async fn run(&self) -> Result<Option<Response<Sv, St>>, MachineError> {
        self.0.lock().await.run().await
    }

    async fn compensate(&self) -> Result<(), MachineError> {
        self.0.lock().await.compensate().await
    }
}
