//! Execution strategies: how a machine walks its steps and its rollback.

mod concurrent;
mod sequential;

pub use concurrent::Concurrent;
pub use sequential::Sequential;

use crate::machine::Machine;
use async_trait::async_trait;
use std::fmt::Debug;
use tango_core::{MachineError, Response};

/// Drives a machine's steps forward and backward.
///
/// A strategy is stored in the machine behind an `Arc` and can be replaced by
/// a plugin before a run starts, never while it is running.
#[async_trait]
pub trait ExecutionStrategy<Sv, St>: Send + Sync + Debug
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    /// Runs the machine's steps.
    ///
    /// Returns `Ok(Some(response))` for a DONE response, `Ok(None)` if the
    /// steps ran out without one, and `Err` on failure.
    async fn execute(
        &self,
        machine: &mut Machine<Sv, St>,
    ) -> Result<Option<Response<Sv, St>>, MachineError>;

    /// Rolls back the machine's executed steps, newest first, against its
    /// initial context.
    async fn compensate(&self, machine: &mut Machine<Sv, St>) -> Result<(), MachineError>;
}

/// Runs the strategy's compensation after `failure` and folds a rollback error
/// into the result.
async fn roll_back<Sv, St, S>(
    strategy: &S,
    machine: &mut Machine<Sv, St>,
    failure: MachineError,
) -> MachineError
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
    S: ExecutionStrategy<Sv, St> + ?Sized,
{
    match strategy.compensate(machine).await {
        Ok(()) => failure,
        Err(source) => {
            tracing::warn!(machine = %machine.name(), error = %source, "compensation failed");
            MachineError::compensation(failure, source)
        }
    }
}
