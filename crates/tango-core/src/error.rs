//! Machine error types.

use crate::step::StepName;
use thiserror::Error;

/// The plugin lifecycle phase that failed.
///
/// Used in [`MachineError::Plugin`] so plugin-origin failures can be told apart
/// from step-origin failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginPhase {
    /// The `init` hook, called once before any step runs.
    Init,
    /// The per-step `execute` hook, called before each step dispatch.
    Execute,
    /// The `cleanup` hook, called once after the run concludes.
    Cleanup,
}

impl std::fmt::Display for PluginPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginPhase::Init => write!(f, "setup"),
            PluginPhase::Execute => write!(f, "before step"),
            PluginPhase::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Errors that can occur while running or compensating a machine.
///
/// Marked `#[non_exhaustive]`; always include a wildcard arm when matching.
///
/// ```
/// use tango_core::MachineError;
///
/// fn describe(error: &MachineError) -> String {
///     match error {
///         MachineError::StepFailed { step_name, result } => {
///             format!("{step_name} asked for a rollback: {result}")
///         }
///         MachineError::CompensationFailed { source, .. } => {
///             format!("rollback failed: {source}")
///         }
///         MachineError::Plugin { plugin, phase, .. } => {
///             format!("plugin {plugin} failed during {phase}")
///         }
///         other => other.to_string(),
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MachineError {
    /// `run` was called on a machine without steps.
    #[error("no steps to execute")]
    NoSteps,

    /// A step about to run has no execute function.
    #[error("step {step_name} has no execute function")]
    MissingExecute {
        /// The step that cannot run.
        step_name: StepName,
    },

    /// A step about to be compensated has no compensate function.
    #[error("step {step_name} has no compensate function")]
    MissingCompensate {
        /// The step that cannot be compensated.
        step_name: StepName,
    },

    /// The machine or one of its strategies is misconfigured.
    #[error("invalid machine configuration: {0}")]
    Configuration(String),

    /// A step function (or one of its hooks) reported an error of its own.
    ///
    /// Unlike [`MachineError::StepFailed`], this does not come from an ERROR
    /// directive and never triggers compensation on the sequential strategy.
    #[error("step {step_name} returned an error: {details}")]
    StepError {
        /// The name of the step that failed.
        step_name: StepName,
        /// Details about the failure.
        details: String,
    },

    /// A step answered with an ERROR directive and the machine was rolled back.
    #[error("step {step_name} failed: {result}")]
    StepFailed {
        /// The step that returned the ERROR directive.
        step_name: StepName,
        /// Rendered payload of the ERROR response.
        result: String,
    },

    /// A JUMP directive named a step that does not exist.
    #[error("jump target '{target}' not found at {step_name}")]
    JumpTargetNotFound {
        /// The requested target.
        target: StepName,
        /// The step that issued the jump.
        step_name: StepName,
    },

    /// Compensation failed while rolling back after another failure.
    #[error("compensate error: {source} (after: {failure})")]
    CompensationFailed {
        /// The failure that triggered the rollback.
        failure: Box<MachineError>,
        /// The error raised by the compensation itself.
        source: Box<MachineError>,
    },

    /// A plugin lifecycle hook failed.
    #[error("plugin {phase} error: {source}")]
    Plugin {
        /// Name of the failing plugin.
        plugin: String,
        /// Which hook failed.
        phase: PluginPhase,
        /// The error returned by the hook.
        source: Box<MachineError>,
    },

    /// A concurrently dispatched step task panicked or was cancelled.
    #[error("step {step_name} task aborted: {details}")]
    TaskAborted {
        /// The step whose task did not finish.
        step_name: StepName,
        /// Details reported by the runtime.
        details: String,
    },
}

impl MachineError {
    /// Shorthand for a [`MachineError::StepError`].
    pub fn step(step_name: impl Into<StepName>, details: impl Into<String>) -> Self {
        MachineError::StepError {
            step_name: step_name.into(),
            details: details.into(),
        }
    }

    /// Wraps an error raised by a plugin hook.
    pub fn plugin(plugin: impl Into<String>, phase: PluginPhase, source: MachineError) -> Self {
        MachineError::Plugin {
            plugin: plugin.into(),
            phase,
            source: Box::new(source),
        }
    }

    /// Folds the failure that triggered a rollback into the rollback's own error.
    pub fn compensation(failure: MachineError, source: MachineError) -> Self {
        MachineError::CompensationFailed {
            failure: Box::new(failure),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = MachineError::StepFailed {
            step_name: StepName::new("Step2"),
            result: "boom".to_string(),
        };
        assert_eq!(error.to_string(), "step Step2 failed: boom");

        let error = MachineError::JumpTargetNotFound {
            target: StepName::new("Nowhere"),
            step_name: StepName::new("Step1"),
        };
        assert_eq!(
            error.to_string(),
            "jump target 'Nowhere' not found at Step1"
        );

        assert_eq!(MachineError::NoSteps.to_string(), "no steps to execute");
    }

    #[test]
    fn test_plugin_error_display() {
        let error = MachineError::plugin(
            "audit",
            PluginPhase::Cleanup,
            MachineError::Configuration("sink closed".to_string()),
        );
        assert_eq!(
            error.to_string(),
            "plugin cleanup error: invalid machine configuration: sink closed"
        );

        let error = MachineError::plugin("audit", PluginPhase::Init, MachineError::NoSteps);
        assert!(error.to_string().starts_with("plugin setup error"));
    }

    #[test]
    fn test_compensation_error_keeps_triggering_failure() {
        let failure = MachineError::StepFailed {
            step_name: StepName::new("Charge"),
            result: "card declined".to_string(),
        };
        let error = MachineError::compensation(
            failure,
            MachineError::MissingCompensate {
                step_name: StepName::new("Reserve"),
            },
        );
        let message = error.to_string();
        let expected = "compensate error: step Reserve has no compensate function";
        assert!(message.starts_with(expected));
        assert!(message.contains("card declined"));
    }

    #[test]
    fn test_plugin_phase_display() {
        assert_eq!(PluginPhase::Init.to_string(), "setup");
        assert_eq!(PluginPhase::Execute.to_string(), "before step");
        assert_eq!(PluginPhase::Cleanup.to_string(), "cleanup");
    }
}
