//! Step trait and related types.

use crate::context::MachineContext;
use crate::error::MachineError;
use crate::response::Response;
use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type-safe step name wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the step name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StepName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for StepName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StepName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A named unit of work with an optional compensation.
///
/// Only [`Step::execute`] and [`Step::name`] are required. The hooks default
/// to no-ops and [`Step::compensate`] defaults to reporting
/// [`MachineError::MissingCompensate`], so a step only has to provide a
/// compensation if it can ever be rolled back.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicI64, Ordering};
/// use tango_core::{MachineContext, MachineError, Response, Step, StepName};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct Deposit(i64);
///
/// #[async_trait]
/// impl Step<(), AtomicI64> for Deposit {
///     fn name(&self) -> StepName {
///         StepName::new("Deposit")
///     }
///
///     async fn execute(
///         &self,
///         ctx: &MachineContext<(), AtomicI64>,
///     ) -> Result<Response<(), AtomicI64>, MachineError> {
///         ctx.state.fetch_add(self.0, Ordering::SeqCst);
///         Ok(Response::next(self.0))
///     }
///
///     async fn compensate(
///         &self,
///         ctx: &MachineContext<(), AtomicI64>,
///     ) -> Result<Response<(), AtomicI64>, MachineError> {
///         ctx.state.fetch_sub(self.0, Ordering::SeqCst);
///         Ok(Response::done(self.0))
///     }
/// }
/// ```
#[async_trait]
pub trait Step<Sv, St>: Send + Sync + Debug
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    /// Returns the step name.
    fn name(&self) -> StepName;

    /// Executes the step and tells the machine what to do next.
    async fn execute(&self, ctx: &MachineContext<Sv, St>) -> Result<Response<Sv, St>, MachineError>;

    /// Undoes the effects of [`Step::execute`].
    ///
    /// Compensations run against the machine's initial context, in reverse
    /// execution order. The returned response is not interpreted.
    async fn compensate(
        &self,
        _ctx: &MachineContext<Sv, St>,
    ) -> Result<Response<Sv, St>, MachineError> {
        Err(MachineError::MissingCompensate {
            step_name: self.name(),
        })
    }

    /// Runs right before [`Step::execute`]. An error aborts the run.
    async fn before_execute(&self, _ctx: &MachineContext<Sv, St>) -> Result<(), MachineError> {
        Ok(())
    }

    /// Runs right after [`Step::execute`]. An error aborts the run and the
    /// response already produced is discarded.
    async fn after_execute(&self, _ctx: &MachineContext<Sv, St>) -> Result<(), MachineError> {
        Ok(())
    }

    /// Runs right before [`Step::compensate`]. An error aborts the rollback.
    async fn before_compensate(&self, _ctx: &MachineContext<Sv, St>) -> Result<(), MachineError> {
        Ok(())
    }

    /// Runs right after [`Step::compensate`]. An error aborts the rollback.
    async fn after_compensate(&self, _ctx: &MachineContext<Sv, St>) -> Result<(), MachineError> {
        Ok(())
    }
}

/// Boxed future returned by [`FnStep`] closures.
pub type StepFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type StepResult<Sv, St> = Result<Response<Sv, St>, MachineError>;

type ActionFn<Sv, St> = Arc<
    dyn for<'a> Fn(&'a MachineContext<Sv, St>) -> StepFuture<'a, StepResult<Sv, St>>
        + Send
        + Sync,
>;

type HookFn<Sv, St> = Arc<
    dyn for<'a> Fn(&'a MachineContext<Sv, St>) -> StepFuture<'a, Result<(), MachineError>>
        + Send
        + Sync,
>;

/// A step assembled from closures.
///
/// Every part is optional. A missing execute closure is only reported when
/// the step is about to run, a missing compensate closure only when the step
/// is about to be rolled back.
///
/// # Examples
///
/// ```
/// use tango_core::{FnStep, Response};
///
/// let step: FnStep<(), ()> = FnStep::new("Greet")
///     .with_execute(|_ctx| Box::pin(async { Ok(Response::next("hello")) }))
///     .with_compensate(|_ctx| Box::pin(async { Ok(Response::done("bye")) }));
///
/// assert_eq!(step.step_name().as_str(), "Greet");
/// ```
pub struct FnStep<Sv, St> {
    name: StepName,
    execute: Option<ActionFn<Sv, St>>,
    compensate: Option<ActionFn<Sv, St>>,
    before_execute: Option<HookFn<Sv, St>>,
    after_execute: Option<HookFn<Sv, St>>,
    before_compensate: Option<HookFn<Sv, St>>,
    after_compensate: Option<HookFn<Sv, St>>,
}

impl<Sv, St> Clone for FnStep<Sv, St> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            execute: self.execute.clone(),
            compensate: self.compensate.clone(),
            before_execute: self.before_execute.clone(),
            after_execute: self.after_execute.clone(),
            before_compensate: self.before_compensate.clone(),
            after_compensate: self.after_compensate.clone(),
        }
    }
}

impl<Sv, St> Debug for FnStep<Sv, St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep")
            .field("name", &self.name)
            .field("execute", &self.execute.is_some())
            .field("compensate", &self.compensate.is_some())
            .finish_non_exhaustive()
    }
}

impl<Sv, St> FnStep<Sv, St> {
    /// Creates a step with no functions attached.
    pub fn new(name: impl Into<StepName>) -> Self {
        Self {
            name: name.into(),
            execute: None,
            compensate: None,
            before_execute: None,
            after_execute: None,
            before_compensate: None,
            after_compensate: None,
        }
    }

    /// Returns the step name.
    pub fn step_name(&self) -> &StepName {
        &self.name
    }

    pub fn with_execute<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a MachineContext<Sv, St>) -> StepFuture<'a, StepResult<Sv, St>>
            + Send
            + Sync
            + 'static,
    {
        self.execute = Some(Arc::new(f));
        self
    }

    pub fn with_compensate<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a MachineContext<Sv, St>) -> StepFuture<'a, StepResult<Sv, St>>
            + Send
            + Sync
            + 'static,
    {
        self.compensate = Some(Arc::new(f));
        self
    }

    pub fn with_before_execute<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a MachineContext<Sv, St>) -> StepFuture<'a, Result<(), MachineError>>
            + Send
            + Sync
            + 'static,
    {
        self.before_execute = Some(Arc::new(f));
        self
    }

    pub fn with_after_execute<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a MachineContext<Sv, St>) -> StepFuture<'a, Result<(), MachineError>>
            + Send
            + Sync
            + 'static,
    {
        self.after_execute = Some(Arc::new(f));
        self
    }

    pub fn with_before_compensate<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a MachineContext<Sv, St>) -> StepFuture<'a, Result<(), MachineError>>
            + Send
            + Sync
            + 'static,
    {
        self.before_compensate = Some(Arc::new(f));
        self
    }

    pub fn with_after_compensate<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a MachineContext<Sv, St>) -> StepFuture<'a, Result<(), MachineError>>
            + Send
            + Sync
            + 'static,
    {
        self.after_compensate = Some(Arc::new(f));
        self
    }
}

async fn run_hook<Sv, St>(
    hook: &Option<HookFn<Sv, St>>,
    ctx: &MachineContext<Sv, St>,
) -> Result<(), MachineError> {
    match hook {
        Some(hook) => hook(ctx).await,
        None => Ok(()),
    }
}

#[async_trait]
impl<Sv, St> Step<Sv, St> for FnStep<Sv, St>
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    fn name(&self) -> StepName {
        self.name.clone()
    }

    async fn execute(
        &self,
        ctx: &MachineContext<Sv, St>,
    ) -> Result<Response<Sv, St>, MachineError> {
        match &self.execute {
            Some(execute) => execute(ctx).await,
            None => Err(MachineError::MissingExecute {
                step_name: self.name.clone(),
            }),
        }
    }

    async fn compensate(
        &self,
        ctx: &MachineContext<Sv, St>,
    ) -> Result<Response<Sv, St>, MachineError> {
        match &self.compensate {
            Some(compensate) => compensate(ctx).await,
            None => Err(MachineError::MissingCompensate {
                step_name: self.name.clone(),
            }),
        }
    }

    async fn before_execute(&self, ctx: &MachineContext<Sv, St>) -> Result<(), MachineError> {
        run_hook(&self.before_execute, ctx).await
    }

    async fn after_execute(&self, ctx: &MachineContext<Sv, St>) -> Result<(), MachineError> {
        run_hook(&self.after_execute, ctx).await
    }

    async fn before_compensate(&self, ctx: &MachineContext<Sv, St>) -> Result<(), MachineError> {
        run_hook(&self.before_compensate, ctx).await
    }

    async fn after_compensate(&self, ctx: &MachineContext<Sv, St>) -> Result<(), MachineError> {
        run_hook(&self.after_compensate, ctx).await
    }
}
