//! Step responses and the directives that steer a machine.

use crate::error::MachineError;
use crate::step::StepName;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

trait PayloadValue: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync + fmt::Debug> PayloadValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Opaque result carried by a [`Response`].
///
/// Any `Send + Sync + Debug` value can be stored; callers inspect it by
/// downcasting, so different steps are free to return different result types.
///
/// ```
/// use tango_core::Payload;
///
/// let payload = Payload::new(42u32);
/// assert_eq!(payload.downcast_ref::<u32>(), Some(&42));
/// assert_eq!(payload.downcast_ref::<String>(), None);
/// ```
#[derive(Clone)]
pub struct Payload(Arc<dyn PayloadValue>);

impl Payload {
    /// Wraps a value. Wrapping a `Payload` again returns a clone of it.
    pub fn new<T: Any + Send + Sync + fmt::Debug>(value: T) -> Self {
        if let Some(payload) = (&value as &dyn Any).downcast_ref::<Payload>() {
            return payload.clone();
        }
        Self(Arc::new(value))
    }

    /// Returns a reference to the value if it is of type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        let value: &dyn PayloadValue = &*self.0;
        value.as_any().downcast_ref::<T>()
    }

    /// Returns `true` if the value is of type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value: &dyn PayloadValue = &*self.0;
        fmt::Debug::fmt(value, f)
    }
}

/// Strings render verbatim, everything else through `Debug`.
impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = self.downcast_ref::<String>() {
            f.write_str(text)
        } else if let Some(text) = self.downcast_ref::<&'static str>() {
            f.write_str(text)
        } else {
            write!(f, "{self:?}")
        }
    }
}

/// What the machine should do after a step returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Advance to the next step.
    Next,
    /// Stop successfully; the response is the machine's result.
    Done,
    /// Stop and roll back everything executed so far.
    Error,
    /// Advance past this many additional steps.
    Skip(usize),
    /// Continue at the named step.
    Jump(StepName),
}

/// Field-less view of a [`Directive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Next,
    Done,
    Error,
    Skip,
    Jump,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Next => write!(f, "NEXT"),
            Status::Done => write!(f, "DONE"),
            Status::Error => write!(f, "ERROR"),
            Status::Skip => write!(f, "SKIP"),
            Status::Jump => write!(f, "JUMP"),
        }
    }
}

impl Directive {
    /// Returns the status of this directive.
    pub fn status(&self) -> Status {
        match self {
            Directive::Next => Status::Next,
            Directive::Done => Status::Done,
            Directive::Error => Status::Error,
            Directive::Skip(_) => Status::Skip,
            Directive::Jump(_) => Status::Jump,
        }
    }
}

/// A machine that can be driven from the outside after a step hands it over
/// through [`Response::run_machine`].
///
/// The engine never runs a nested machine on its own.
#[async_trait]
pub trait NestedMachine<Sv, St>: Send + Sync {
    /// Name of the nested machine.
    async fn name(&self) -> String;

    /// Runs the nested machine to completion.
    async fn run(&self) -> Result<Option<Response<Sv, St>>, MachineError>;

    /// Compensates whatever the nested machine executed.
    async fn compensate(&self) -> Result<(), MachineError>;
}

/// The outcome of a single step invocation.
///
/// Built only through the named constructors, so the directive and its data
/// always agree.
///
/// ```
/// use tango_core::{Response, Status};
///
/// let response: Response<(), ()> = Response::skip("nothing to do", 2);
/// assert_eq!(response.status(), Status::Skip);
/// assert_eq!(response.skip_count(), 2);
/// assert_eq!(response.jump_target(), None);
/// ```
pub struct Response<Sv, St> {
    result: Payload,
    directive: Directive,
    sub_machine: Option<Arc<dyn NestedMachine<Sv, St>>>,
}

impl<Sv, St> Clone for Response<Sv, St> {
    fn clone(&self) -> Self {
        Self {
            result: self.result.clone(),
            directive: self.directive.clone(),
            sub_machine: self.sub_machine.clone(),
        }
    }
}

impl<Sv, St> fmt::Debug for Response<Sv, St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("result", &self.result)
            .field("directive", &self.directive)
            .field("sub_machine", &self.sub_machine.is_some())
            .finish()
    }
}

impl<Sv, St> Response<Sv, St> {
    fn with_directive<T: Any + Send + Sync + fmt::Debug>(result: T, directive: Directive) -> Self {
        Self {
            result: Payload::new(result),
            directive,
            sub_machine: None,
        }
    }

    /// Continue with the next step.
    pub fn next<T: Any + Send + Sync + fmt::Debug>(result: T) -> Self {
        Self::with_directive(result, Directive::Next)
    }

    /// Finish the run successfully with this response.
    pub fn done<T: Any + Send + Sync + fmt::Debug>(result: T) -> Self {
        Self::with_directive(result, Directive::Done)
    }

    /// Fail the run and roll back the executed steps.
    pub fn error<T: Any + Send + Sync + fmt::Debug>(result: T) -> Self {
        Self::with_directive(result, Directive::Error)
    }

    /// Skip the next `count` steps.
    pub fn skip<T: Any + Send + Sync + fmt::Debug>(result: T, count: usize) -> Self {
        Self::with_directive(result, Directive::Skip(count))
    }

    /// Continue at the step named `target`.
    pub fn jump<T: Any + Send + Sync + fmt::Debug>(result: T, target: impl Into<StepName>) -> Self {
        Self::with_directive(result, Directive::Jump(target.into()))
    }

    /// Continue with the next step and hand a nested machine to the caller.
    pub fn run_machine<T: Any + Send + Sync + fmt::Debug>(
        result: T,
        machine: Arc<dyn NestedMachine<Sv, St>>,
    ) -> Self {
        Self {
            result: Payload::new(result),
            directive: Directive::Next,
            sub_machine: Some(machine),
        }
    }

    pub fn result(&self) -> &Payload {
        &self.result
    }

    pub fn directive(&self) -> &Directive {
        &self.directive
    }

    pub fn status(&self) -> Status {
        self.directive.status()
    }

    /// Number of steps to skip; zero unless the directive is SKIP.
    pub fn skip_count(&self) -> usize {
        match self.directive {
            Directive::Skip(count) => count,
            _ => 0,
        }
    }

    /// Jump target; `None` unless the directive is JUMP.
    pub fn jump_target(&self) -> Option<&StepName> {
        match &self.directive {
            Directive::Jump(target) => Some(target),
            _ => None,
        }
    }

    /// The nested machine handed over by [`Response::run_machine`], if any.
    pub fn sub_machine(&self) -> Option<&Arc<dyn NestedMachine<Sv, St>>> {
        self.sub_machine.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.directive == Directive::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResponse = Response<(), ()>;

    #[test]
    fn test_constructors_set_matching_directive() {
        assert_eq!(TestResponse::next(1).status(), Status::Next);
        assert_eq!(TestResponse::done(1).status(), Status::Done);
        assert_eq!(TestResponse::error(1).status(), Status::Error);

        let skip = TestResponse::skip("skip", 3);
        assert_eq!(skip.directive(), &Directive::Skip(3));
        assert_eq!(skip.jump_target(), None);

        let jump = TestResponse::jump("jump", "Step3");
        assert_eq!(jump.jump_target().map(StepName::as_str), Some("Step3"));
        assert_eq!(jump.skip_count(), 0);
        assert!(jump.sub_machine().is_none());
    }

    #[test]
    fn test_payload_downcast() {
        let response = TestResponse::done(vec![1u8, 2, 3]);
        assert_eq!(
            response.result().downcast_ref::<Vec<u8>>(),
            Some(&vec![1, 2, 3])
        );
        assert!(!response.result().is::<String>());
        assert!(response.is_done());
    }

    #[test]
    fn test_payload_display() {
        assert_eq!(Payload::new("boom").to_string(), "boom");
        assert_eq!(Payload::new("boom".to_string()).to_string(), "boom");
        assert_eq!(Payload::new(7i64).to_string(), "7");
        assert_eq!(Payload::new(Some(1)).to_string(), "Some(1)");
    }

    #[test]
    fn test_payload_is_not_wrapped_twice() {
        let inner = Payload::new("Done");
        let outer = Payload::new(inner);
        assert_eq!(outer.downcast_ref::<&str>(), Some(&"Done"));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::Next.to_string(), "NEXT");
        assert_eq!(Status::Jump.to_string(), "JUMP");
        assert_eq!(Directive::Skip(0).status(), Status::Skip);
    }
}
