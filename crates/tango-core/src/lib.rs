//! Core traits and types for the tango saga machine.
//!
//! This crate provides the vocabulary shared by steps and the engine, without
//! any runtime dependency. Step authors can depend on it alone.
//!
//! # Core Types
//!
//! - [`Step`] - The core trait for machine steps, with optional hooks and compensation
//! - [`FnStep`] - A step assembled from closures
//! - [`Response`] - What a step returns, carrying a [`Directive`] and a [`Payload`]
//! - [`MachineContext`] - Services and state shared by every step of a run
//! - [`MachineError`] - Error types for running and compensating a machine
//! - [`NestedMachine`] - A machine handed over to the caller through a response

mod context;
mod error;
mod response;
mod step;

pub use context::MachineContext;
pub use error::{MachineError, PluginPhase};
pub use response::{Directive, NestedMachine, Payload, Response, Status};
pub use step::{FnStep, Step, StepFuture, StepName};
