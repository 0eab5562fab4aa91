//! Shared machine context threaded through every step invocation.

use crate::response::Response;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// State shared by every step of a machine run.
///
/// `services` holds read-mostly dependencies (clients, pools), `state` holds
/// the workflow data. The machine shares one context by reference for the
/// whole run and never copies it between steps, so steps only get `&self`:
/// state that steps write must provide its own interior mutability. Steps
/// running under the concurrent strategy race on it unless that mutability
/// is synchronized.
///
/// # Examples
///
/// ```
/// use std::sync::Mutex;
/// use tango_core::MachineContext;
///
/// let ctx = MachineContext::new("https://api.example.com", Mutex::new(Vec::<String>::new()));
///
/// ctx.state.lock().unwrap().push("created".to_string());
/// assert_eq!(ctx.state.lock().unwrap().len(), 1);
/// assert!(ctx.previous_result().is_none());
/// ```
pub struct MachineContext<Sv, St> {
    /// Caller-provided dependencies.
    pub services: Sv,
    /// Caller-provided workflow state.
    pub state: St,
    previous_result: Mutex<Option<Response<Sv, St>>>,
}

impl<Sv: fmt::Debug, St: fmt::Debug> fmt::Debug for MachineContext<Sv, St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineContext")
            .field("services", &self.services)
            .field("state", &self.state)
            .field("previous_result", &self.previous_result())
            .finish()
    }
}

impl<Sv: Default, St: Default> Default for MachineContext<Sv, St> {
    fn default() -> Self {
        Self::new(Sv::default(), St::default())
    }
}

impl<Sv, St> MachineContext<Sv, St> {
    /// Creates a context with no previous result.
    pub fn new(services: Sv, state: St) -> Self {
        Self {
            services,
            state,
            previous_result: Mutex::new(None),
        }
    }

    /// Returns the response recorded for the most recently executed step.
    pub fn previous_result(&self) -> Option<Response<Sv, St>> {
        self.previous_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records the latest step response.
    ///
    /// Engine-internal. The machine updates this together with the
    /// executed-step log under its bookkeeping lock; steps and plugins should
    /// only read it through [`MachineContext::previous_result`]. Writing it
    /// from outside the engine desynchronizes the two.
    #[doc(hidden)]
    pub fn set_previous_result(&self, response: Option<Response<Sv, St>>) {
        *self
            .previous_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = response;
    }
}
