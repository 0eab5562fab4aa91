use super::{roll_back, ExecutionStrategy};
use crate::machine::Machine;
use async_trait::async_trait;
use tango_core::{Directive, MachineError, Response};
use tracing::{debug, warn};

/// Runs one step at a time, following every directive.
///
/// | Directive | Effect |
/// |---|---|
/// | NEXT | advance one step |
/// | DONE | stop, the response is the result |
/// | ERROR | compensate everything executed, including this step, then fail |
/// | SKIP(k) | advance past the next `k` steps |
/// | JUMP(name) | continue at the first step with that name |
///
/// Every completed step is appended to the executed-step log before its
/// directive is interpreted.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

#[async_trait]
impl<Sv, St> ExecutionStrategy<Sv, St> for Sequential
where
    Sv: Send + Sync + 'static,
    St: Send + Sync + 'static,
{
    async fn execute(
        &self,
        machine: &mut Machine<Sv, St>,
    ) -> Result<Option<Response<Sv, St>>, MachineError> {
        let runner = machine.runner();
        let mut cursor = 0;

        while let Some(step) = machine.steps().get(cursor).cloned() {
            let response = runner.execute_step(&step).await?;
            runner.record(&step, &response);

            let directive = response.directive().clone();
            match directive {
                Directive::Next => cursor += 1,
                Directive::Done => return Ok(Some(response)),
                Directive::Error => {
                    let failure = MachineError::StepFailed {
                        step_name: step.name(),
                        result: response.result().to_string(),
                    };
                    warn!(machine = %machine.name(), error = %failure, "step failed, compensating");
                    return Err(roll_back(self, machine, failure).await);
                }
                Directive::Skip(count) => {
                    debug!(
                        machine = %machine.name(),
                        step = %step.name(),
                        count,
                        "skipping steps"
                    );
                    cursor = cursor.saturating_add(count).saturating_add(1);
                }
                Directive::Jump(target) => {
                    let Some(position) = machine.position(&target) else {
                        return Err(MachineError::JumpTargetNotFound {
                            target,
                            step_name: step.name(),
                        });
                    };
                    debug!(
                        machine = %machine.name(),
                        step = %step.name(),
                        target = %target,
                        "jumping"
                    );
                    cursor = position;
                }
            }
        }

        Ok(None)
    }

    async fn compensate(&self, machine: &mut Machine<Sv, St>) -> Result<(), MachineError> {
        machine.restore_initial_context();
        let runner = machine.runner();

        for step in machine.executed_steps().iter().rev() {
            runner.compensate_step(step).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;
    use std::sync::{Arc, Mutex, PoisonError};
    use tango_core::{FnStep, MachineContext, StepName};

    type Log = Mutex<Vec<String>>;

    fn push(ctx: &MachineContext<(), Log>, entry: String) {
        let mut log = ctx.state.lock().unwrap_or_else(PoisonError::into_inner);
        log.push(entry);
    }

    fn logging_step(name: &'static str, response: fn() -> Response<(), Log>) -> FnStep<(), Log> {
        FnStep::<(), Log>::new(name)
            .with_execute(move |ctx| {
                Box::pin(async move {
                    push(ctx, name.to_string());
                    Ok(response())
                })
            })
            .with_compensate(move |ctx| {
                Box::pin(async move {
                    push(ctx, format!("undo {name}"));
                    Ok(Response::done("undone"))
                })
            })
    }

    fn machine(steps: Vec<FnStep<(), Log>>) -> Machine<(), Log> {
        let mut machine = Machine::new(
            "sequential",
            Vec::new(),
            MachineContext::new((), Mutex::new(Vec::new())),
            MachineConfig::new(),
            Sequential,
        );
        for step in steps {
            machine.add_step(step);
        }
        machine
    }

    fn log_of(machine: &Machine<(), Log>) -> Vec<String> {
        let log = machine.context().state.lock();
        log.map(|log| log.clone()).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_skip_zero_behaves_like_next() {
        let mut machine = machine(vec![
            logging_step("A", || Response::skip("none", 0)),
            logging_step("B", || Response::done("b")),
        ]);

        let response = machine.run().await;
        assert!(matches!(response, Ok(Some(r)) if r.is_done()));
        assert_eq!(
            machine.executed_step_names(),
            vec![StepName::new("A"), StepName::new("B")]
        );
    }

    #[tokio::test]
    async fn test_skip_past_the_end_exhausts_steps() {
        let mut machine = machine(vec![
            logging_step("A", || Response::skip("far", 10)),
            logging_step("B", || Response::done("b")),
        ]);

        let response = machine.run().await;
        assert!(matches!(response, Ok(None)));
        assert_eq!(log_of(&machine), vec!["A"]);
    }

    #[tokio::test]
    async fn test_jump_backwards_revisits_step() {
        let visits = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&visits);
        let looping = FnStep::<(), Log>::new("Loop").with_execute(move |_ctx| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                let mut visits = counter.lock().unwrap_or_else(PoisonError::into_inner);
                *visits += 1;
                if *visits < 3 {
                    Ok(Response::jump(*visits, "Start"))
                } else {
                    Ok(Response::done(*visits))
                }
            })
        });

        let mut machine = machine(vec![logging_step("Start", || Response::next("s")), looping]);
        let response = machine.run().await;

        let visits = response.ok().flatten().map(|r| r.result().to_string());
        assert_eq!(visits.as_deref(), Some("3"));
        assert_eq!(log_of(&machine), vec!["Start", "Start", "Start"]);
        assert_eq!(machine.executed_steps().len(), 6);
    }

    #[tokio::test]
    async fn test_step_error_skips_compensation() {
        let failing = FnStep::<(), Log>::new("Broken").with_execute(|_ctx| {
            Box::pin(async { Err(MachineError::step("Broken", "disk full")) })
        });

        let mut machine = machine(vec![logging_step("A", || Response::next("a")), failing]);
        let response = machine.run().await;

        assert!(matches!(
            response,
            Err(MachineError::StepError { ref details, .. }) if details == "disk full"
        ));
        assert_eq!(log_of(&machine), vec!["A"]);
        assert_eq!(machine.executed_step_names(), vec![StepName::new("A")]);
    }
}
