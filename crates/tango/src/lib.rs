//! An in-process saga machine for Rust.
//!
//! A [`Machine`] runs an ordered list of steps over a shared
//! [`MachineContext`]. Each step answers with a [`Response`] whose directive
//! tells the machine what to do next: go on, stop, skip ahead, jump to a
//! named step, or fail. A failure rolls back every executed step, newest
//! first, through its compensate function.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Mutex;
//! use tango::prelude::*;
//!
//! #[derive(Debug)]
//! struct Reserve;
//!
//! #[async_trait::async_trait]
//! impl Step<(), Mutex<Vec<String>>> for Reserve {
//!     fn name(&self) -> StepName {
//!         StepName::new("Reserve")
//!     }
//!
//!     async fn execute(
//!         &self,
//!         ctx: &MachineContext<(), Mutex<Vec<String>>>,
//!     ) -> Result<Response<(), Mutex<Vec<String>>>, MachineError> {
//!         if let Ok(mut log) = ctx.state.lock() {
//!             log.push("reserved".to_string());
//!         }
//!         Ok(Response::done("reservation-1"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MachineError> {
//!     let mut machine = Machine::new(
//!         "booking",
//!         Vec::new(),
//!         MachineContext::new((), Mutex::new(Vec::new())),
//!         MachineConfig::new(),
//!         Sequential,
//!     );
//!     machine.add_step(Reserve);
//!
//!     let response = machine.run().await?;
//!     assert_eq!(response.map(|r| r.result().to_string()), Some("reservation-1".to_string()));
//!     Ok(())
//! }
//! ```

mod config;
mod machine;
mod plugin;
mod runner;
mod strategy;

// Re-export core types
pub use tango_core::*;

pub use config::{LogLevel, LogSettings, MachineConfig};
pub use machine::{Machine, SharedMachine};
pub use plugin::Plugin;
pub use strategy::{Concurrent, ExecutionStrategy, Sequential};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Concurrent, Directive, ExecutionStrategy, FnStep, LogLevel, LogSettings, Machine,
        MachineConfig, MachineContext, MachineError, NestedMachine, Payload, Plugin, PluginPhase,
        Response, Sequential, SharedMachine, Status, Step, StepFuture, StepName,
    };
}
