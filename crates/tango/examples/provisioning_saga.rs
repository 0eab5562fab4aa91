//! Provisioning saga with rollback.
//!
//! Demonstrates:
//! - Steps implemented as structs with compensate functions
//! - An ERROR directive rolling back every executed step, newest first
//! - A plugin observing the run
//! - Per-step logging through `tracing`

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tango::prelude::*;

/// In-memory stand-in for a cloud API.
#[derive(Debug, Default)]
struct Cloud {
    resources: Mutex<BTreeMap<String, String>>,
    instance_quota: usize,
}

impl Cloud {
    fn create(&self, id: &str, kind: &str) {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), kind.to_string());
    }

    fn delete(&self, id: &str) -> bool {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    fn count(&self, kind: &str) -> usize {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|k| k.as_str() == kind)
            .count()
    }

    fn total(&self) -> usize {
        self.resources.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct Provisioning {
    network_id: Option<String>,
    disk_id: Option<String>,
    instance_ids: Vec<String>,
}

type Ctx = MachineContext<Cloud, Mutex<Provisioning>>;
type Reply = Result<Response<Cloud, Mutex<Provisioning>>, MachineError>;

fn state(ctx: &Ctx) -> std::sync::MutexGuard<'_, Provisioning> {
    ctx.state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct CreateNetwork;

#[async_trait]
impl Step<Cloud, Mutex<Provisioning>> for CreateNetwork {
    fn name(&self) -> StepName {
        StepName::new("CreateNetwork")
    }

    async fn execute(&self, ctx: &Ctx) -> Reply {
        ctx.services.create("net-1", "network");
        state(ctx).network_id = Some("net-1".to_string());
        println!("  created network net-1");
        Ok(Response::next("net-1"))
    }

    async fn compensate(&self, ctx: &Ctx) -> Reply {
        let id = state(ctx).network_id.take();
        if let Some(id) = id {
            ctx.services.delete(&id);
            println!("  deleted network {id}");
        }
        Ok(Response::done("network removed"))
    }
}

#[derive(Debug)]
struct AllocateDisk {
    size_gb: u32,
}

#[async_trait]
impl Step<Cloud, Mutex<Provisioning>> for AllocateDisk {
    fn name(&self) -> StepName {
        StepName::new("AllocateDisk")
    }

    async fn execute(&self, ctx: &Ctx) -> Reply {
        if self.size_gb == 0 {
            return Ok(Response::skip("no disk requested", 0));
        }
        ctx.services.create("disk-1", "disk");
        state(ctx).disk_id = Some("disk-1".to_string());
        println!("  allocated {} GB disk disk-1", self.size_gb);
        Ok(Response::next("disk-1"))
    }

    async fn compensate(&self, ctx: &Ctx) -> Reply {
        let id = state(ctx).disk_id.take();
        if let Some(id) = id {
            ctx.services.delete(&id);
            println!("  released disk {id}");
        }
        Ok(Response::done("disk released"))
    }
}

#[derive(Debug)]
struct LaunchInstances {
    count: usize,
}

#[async_trait]
impl Step<Cloud, Mutex<Provisioning>> for LaunchInstances {
    fn name(&self) -> StepName {
        StepName::new("LaunchInstances")
    }

    async fn execute(&self, ctx: &Ctx) -> Reply {
        for i in 0..self.count {
            if ctx.services.count("instance") >= ctx.services.instance_quota {
                return Ok(Response::error(format!(
                    "instance quota of {} reached",
                    ctx.services.instance_quota
                )));
            }
            let id = format!("vm-{i}");
            ctx.services.create(&id, "instance");
            state(ctx).instance_ids.push(id.clone());
            println!("  launched instance {id}");
        }
        Ok(Response::done(format!("{} instances running", self.count)))
    }

    async fn compensate(&self, ctx: &Ctx) -> Reply {
        let ids = std::mem::take(&mut state(ctx).instance_ids);
        for id in ids.iter().rev() {
            ctx.services.delete(id);
            println!("  terminated instance {id}");
        }
        Ok(Response::done("instances terminated"))
    }
}

/// Counts dispatched steps and reports once the run is over.
#[derive(Default)]
struct Audit {
    dispatched: AtomicUsize,
}

#[async_trait]
impl Plugin<Cloud, Mutex<Provisioning>> for Audit {
    fn name(&self) -> &str {
        "audit"
    }

    async fn execute(&self, _ctx: &Ctx) -> Result<(), MachineError> {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cleanup(&self, ctx: &Ctx) -> Result<(), MachineError> {
        println!(
            "  audit: {} steps dispatched, {} resources left",
            self.dispatched.load(Ordering::SeqCst),
            ctx.services.total()
        );
        Ok(())
    }
}

fn provisioning(
    instances: usize,
    quota: usize,
    logging: LogSettings,
) -> Machine<Cloud, Mutex<Provisioning>> {
    let cloud = Cloud {
        instance_quota: quota,
        ..Cloud::default()
    };
    let config = MachineConfig::new()
        .with_logging(logging)
        .with_plugin(Audit::default());

    let mut machine = Machine::new(
        "provisioning",
        Vec::new(),
        MachineContext::new(cloud, Mutex::new(Provisioning::default())),
        config,
        Sequential,
    );
    machine.add_step(CreateNetwork);
    machine.add_step(AllocateDisk { size_gb: 40 });
    machine.add_step(LaunchInstances { count: instances });
    machine
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging = LogSettings::at(LogLevel::Info);
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(logging.level))
        .init();

    println!("Provisioning 2 instances with a quota of 3:");
    let mut machine = provisioning(2, 3, logging);
    if let Some(response) = machine.run().await? {
        println!("Done: {}", response.result());
    }

    println!("\nProvisioning 4 instances with a quota of 3:");
    let mut machine = provisioning(4, 3, logging);
    match machine.run().await {
        Ok(_) => println!("Unexpected success"),
        Err(e) => {
            println!("Rolled back: {e}");
            let executed = machine.executed_step_names();
            let names: Vec<String> = executed.iter().map(|n| n.to_string()).collect();
            println!("Executed steps: {}", names.join(", "));
            println!("Resources left: {}", machine.context().services.total());
        }
    }

    Ok(())
}
