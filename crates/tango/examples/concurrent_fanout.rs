//! Notification fan-out with the concurrent strategy.
//!
//! Demonstrates:
//! - Closure-built steps (`FnStep`)
//! - Bounded parallel dispatch
//! - Compensation of delivered notifications when one channel fails
//! - Handing a nested machine back to the caller

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tango::prelude::*;

#[derive(Debug)]
struct Gateway {
    latency: Duration,
    broken: Vec<&'static str>,
}

type Outbox = Mutex<Vec<String>>;

fn deliver(channel: &'static str) -> FnStep<Gateway, Outbox> {
    FnStep::<Gateway, Outbox>::new(channel)
        .with_execute(move |ctx| {
            Box::pin(async move {
                tokio::time::sleep(ctx.services.latency).await;
                if ctx.services.broken.contains(&channel) {
                    return Err(MachineError::step(channel, "gateway rejected the message"));
                }
                ctx.state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(channel.to_string());
                println!("  sent via {channel}");
                Ok(Response::next(channel))
            })
        })
        .with_compensate(move |ctx| {
            Box::pin(async move {
                ctx.state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|c| c != channel);
                println!("  recalled {channel}");
                Ok(Response::done(channel))
            })
        })
}

fn fan_out(broken: Vec<&'static str>, concurrency: usize) -> Machine<Gateway, Outbox> {
    let gateway = Gateway {
        latency: Duration::from_millis(100),
        broken,
    };
    let mut machine = Machine::new(
        "fan-out",
        Vec::new(),
        MachineContext::new(gateway, Mutex::new(Vec::new())),
        MachineConfig::new(),
        Concurrent::new(concurrency),
    );
    for channel in ["email", "sms", "push", "slack", "webhook", "pager"] {
        machine.add_step(deliver(channel));
    }
    machine
}

fn delivered(machine: &Machine<Gateway, Outbox>) -> Vec<String> {
    let outbox = machine.context().state.lock();
    outbox.map(|o| o.clone()).unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("Six channels, three at a time:");
    let started = Instant::now();
    let mut machine = fan_out(Vec::new(), 3);
    machine.run().await?;
    println!(
        "Delivered {:?} in {:?}",
        delivered(&machine),
        started.elapsed()
    );

    println!("\nSame fan-out with a broken pager gateway:");
    let mut machine = fan_out(vec!["pager"], 3);
    if let Err(e) = machine.run().await {
        println!("Failed: {e}");
        println!("Still delivered after rollback: {:?}", delivered(&machine));
    }

    println!("\nFan-out handed over by a parent machine:");
    let child = fan_out(Vec::new(), 6).into_shared();
    let handle = Arc::clone(&child);
    let mut parent = Machine::new(
        "dispatcher",
        Vec::new(),
        MachineContext::new(
            Gateway {
                latency: Duration::ZERO,
                broken: Vec::new(),
            },
            Mutex::new(Vec::new()),
        ),
        MachineConfig::new(),
        Sequential,
    );
    let prepare = FnStep::<Gateway, Outbox>::new("Prepare").with_execute(move |_ctx| {
        let nested: Arc<dyn NestedMachine<Gateway, Outbox>> = handle.clone();
        Box::pin(async move {
            Ok(Response::run_machine("fan-out prepared", nested))
        })
    });
    parent.add_step(prepare);
    parent.run().await?;

    let previous = parent.context().previous_result();
    if let Some(nested) = previous.and_then(|r| r.sub_machine().cloned()) {
        println!("Running nested machine {}", nested.name().await);
        nested.run().await?;
        println!("Delivered {:?}", delivered(&*child.lock().await));
    }

    Ok(())
}
