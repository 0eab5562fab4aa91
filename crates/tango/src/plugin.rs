//! Plugin lifecycle hooks.

use crate::machine::Machine;
use crate::strategy::ExecutionStrategy;
use async_trait::async_trait;
use std::sync::Arc;
use tango_core::{MachineContext, MachineError};

/// Extension invoked around a machine run.
///
/// - [`Plugin::init`] runs once before any step. A failure aborts the run.
/// - [`Plugin::modify_strategy`] is consulted right after `init` and may
///   replace the machine's execution strategy for this run and later ones.
/// - [`Plugin::execute`] runs before every step dispatch, ahead of the step's
///   own `before_execute`. A failure aborts that step.
/// - [`Plugin::cleanup`] runs once after the run concludes, whatever the outcome.
///
/// Failures are reported as [`MachineError::Plugin`] tagged with the phase.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use tango::prelude::*;
/// use async_trait::async_trait;
///
/// #[derive(Default)]
/// struct StepCounter(AtomicUsize);
///
/// #[async_trait]
/// impl Plugin<(), ()> for StepCounter {
///     async fn execute(&self, _ctx: &MachineContext<(), ()>) -> Result<(), MachineError> {
///         self.0.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin<Sv, St>: Send + Sync
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    /// Name used in error messages and logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn init(&self, _ctx: &MachineContext<Sv, St>) -> Result<(), MachineError> {
        Ok(())
    }

    async fn execute(&self, _ctx: &MachineContext<Sv, St>) -> Result<(), MachineError> {
        Ok(())
    }

    async fn cleanup(&self, _ctx: &MachineContext<Sv, St>) -> Result<(), MachineError> {
        Ok(())
    }

    /// Returns a strategy to use instead of the machine's current one.
    fn modify_strategy(
        &self,
        _machine: &Machine<Sv, St>,
    ) -> Option<Arc<dyn ExecutionStrategy<Sv, St>>> {
        None
    }
}
