use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tango::prelude::*;
use tokio_test::{assert_err, assert_ok};

type Trail = Mutex<Vec<String>>;
type Ctx = MachineContext<(), Trail>;

fn note(ctx: &Ctx, entry: impl Into<String>) {
    let mut trail = ctx.state.lock().unwrap_or_else(PoisonError::into_inner);
    trail.push(entry.into());
}

fn entries(machine: &Machine<(), Trail>) -> Vec<String> {
    let trail = machine.context().state.lock();
    trail.map(|t| t.clone()).unwrap_or_default()
}

/// Trail entries sorted, since completion order is not deterministic.
fn trail(machine: &Machine<(), Trail>) -> Vec<String> {
    let mut entries = entries(machine);
    entries.sort();
    entries
}

fn names(machine: &Machine<(), Trail>) -> Vec<String> {
    let names = machine.executed_step_names();
    names.iter().map(|n| n.to_string()).collect()
}

/// A step that waits `delay_ms`, then answers with `reply`.
fn timed(
    name: &'static str,
    delay_ms: u64,
    reply: fn() -> Response<(), Trail>,
) -> FnStep<(), Trail> {
    FnStep::<(), Trail>::new(name)
        .with_execute(move |ctx| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                note(ctx, format!("execute {name}"));
                Ok(reply())
            })
        })
        .with_compensate(move |ctx| {
            Box::pin(async move {
                note(ctx, format!("compensate {name}"));
                Ok(Response::done(()))
            })
        })
}

fn failing(name: &'static str, delay_ms: u64) -> FnStep<(), Trail> {
    FnStep::<(), Trail>::new(name)
        .with_execute(move |_ctx| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Err(MachineError::step(name, "service unavailable"))
            })
        })
        .with_compensate(move |ctx| {
            Box::pin(async move {
                note(ctx, format!("compensate {name}"));
                Ok(Response::done(()))
            })
        })
}

#[allow(clippy::panic)]
fn crash(name: &str) -> Response<(), Trail> {
    panic!("{name} lost its connection")
}

/// A step whose task dies instead of answering.
fn crashing(name: &'static str, delay_ms: u64) -> FnStep<(), Trail> {
    FnStep::<(), Trail>::new(name).with_execute(move |_ctx| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(crash(name))
        })
    })
}

fn machine<S>(strategy: S, steps: Vec<FnStep<(), Trail>>) -> Machine<(), Trail>
where
    S: ExecutionStrategy<(), Trail> + 'static,
{
    let mut machine = Machine::new(
        "fan-out",
        Vec::new(),
        MachineContext::new((), Mutex::new(Vec::new())),
        MachineConfig::new(),
        strategy,
    );
    for step in steps {
        machine.add_step(step);
    }
    machine
}

fn directed_steps() -> Vec<FnStep<(), Trail>> {
    vec![
        timed("Step1", 0, || Response::skip("skip", 1)),
        timed("Step2", 0, || Response::next("skipped")),
        timed("Step3", 0, || Response::jump("jump", "Step5")),
        timed("Step4", 0, || Response::next("skipped")),
        timed("Step5", 0, || Response::error("boom")),
    ]
}

#[tokio::test]
async fn test_single_slot_matches_sequential() {
    for bound in [0, 1] {
        let mut sequential = machine(Sequential, directed_steps());
        let mut concurrent = machine(Concurrent::new(bound), directed_steps());

        let expected = assert_err!(sequential.run().await);
        let actual = assert_err!(concurrent.run().await);

        assert_eq!(actual.to_string(), expected.to_string());
        assert_eq!(names(&concurrent), names(&sequential));
        assert_eq!(entries(&concurrent), entries(&sequential));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_step_runs_regardless_of_directives() {
    let mut machine = machine(Concurrent::new(3), directed_steps());

    let response = assert_ok!(machine.run().await);

    assert!(response.is_none());
    assert_eq!(machine.executed_steps().len(), 5);
    assert_eq!(
        trail(&machine),
        vec![
            "execute Step1",
            "execute Step2",
            "execute Step3",
            "execute Step4",
            "execute Step5",
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_first_done_in_completion_order_wins() {
    let mut machine = machine(
        Concurrent::new(3),
        vec![
            timed("Slow", 200, || Response::done("slow")),
            timed("Fast", 10, || Response::done("fast")),
            timed("Plain", 0, || Response::next(())),
        ],
    );

    let response = assert_ok!(machine.run().await);

    assert!(response.is_some_and(|r| r.result().to_string() == "fast"));
    let mut executed = names(&machine);
    executed.sort();
    assert_eq!(executed, vec!["Fast", "Plain", "Slow"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unbounded_concurrency_admits_every_step() {
    let mut machine = machine(
        Concurrent::new(usize::MAX),
        vec![
            timed("Reserve", 0, || Response::next(())),
            timed("Notify", 5, || Response::next(())),
        ],
    );

    let response = assert_ok!(machine.run().await);
    assert!(response.is_none());
    assert_ok!(machine.compensate().await);

    assert_eq!(
        trail(&machine),
        vec![
            "compensate Notify",
            "compensate Reserve",
            "execute Notify",
            "execute Reserve",
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_compensates_recorded_steps() {
    let mut machine = machine(
        Concurrent::new(3),
        vec![
            timed("Reserve", 0, || Response::next(())),
            failing("Charge", 20),
            timed("Notify", 0, || Response::next(())),
        ],
    );

    let error = assert_err!(machine.run().await);

    assert!(matches!(
        error,
        MachineError::StepError { ref step_name, .. } if step_name == "Charge"
    ));
    let mut executed = names(&machine);
    executed.sort();
    assert_eq!(executed, vec!["Notify", "Reserve"]);
    assert_eq!(
        trail(&machine),
        vec![
            "compensate Notify",
            "compensate Reserve",
            "execute Notify",
            "execute Reserve",
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_crashed_task_compensates_recorded_steps() {
    let mut machine = machine(
        Concurrent::new(2),
        vec![
            timed("Reserve", 0, || Response::next(())),
            crashing("Crash", 20),
        ],
    );

    let error = assert_err!(machine.run().await);

    assert!(matches!(
        error,
        MachineError::TaskAborted { ref step_name, .. } if step_name == "Crash"
    ));
    assert_eq!(names(&machine), vec!["Reserve"]);
    assert_eq!(
        trail(&machine),
        vec!["compensate Reserve", "execute Reserve"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_several_failures_surface_one_error() {
    let mut machine = machine(
        Concurrent::new(4),
        vec![
            failing("A", 5),
            failing("B", 5),
            timed("C", 0, || Response::next(())),
        ],
    );

    let error = assert_err!(machine.run().await);

    assert!(matches!(error, MachineError::StepError { .. }));
    assert_eq!(names(&machine), vec!["C"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_explicit_compensate_rolls_back_everything_once() {
    let mut machine = machine(
        Concurrent::new(2),
        vec![
            timed("A", 0, || Response::next(())),
            timed("B", 5, || Response::next(())),
            timed("C", 10, || Response::next(())),
        ],
    );
    assert_ok!(machine.run().await);

    assert_ok!(machine.compensate().await);

    assert_eq!(
        trail(&machine),
        vec![
            "compensate A",
            "compensate B",
            "compensate C",
            "execute A",
            "execute B",
            "execute C",
        ]
    );
    assert_eq!(machine.executed_steps().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_compensation_failure_supersedes() {
    let irreversible = FnStep::<(), Trail>::new("Irreversible").with_execute(|ctx| {
        Box::pin(async move {
            note(ctx, "execute Irreversible");
            Ok(Response::next(()))
        })
    });
    let steps = vec![irreversible, failing("Charge", 20)];
    let mut machine = machine(Concurrent::new(2), steps);

    let error = assert_err!(machine.run().await);

    assert!(matches!(
        error,
        MachineError::CompensationFailed { ref source, .. }
            if matches!(**source, MachineError::MissingCompensate { .. })
    ));
}
