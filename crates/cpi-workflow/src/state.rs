//! Wizard state machine.
//!
//! One authority for where the wizard is. Every change goes through
//! [`WizardMachine::apply`], which looks the `(state, event)` pair up in the
//! transition table and rejects anything the table does not allow.

use crate::flow::{FlowKind, StepKind};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardState {
    /// No flow active (menu or nothing shown).
    Idle,
    /// A flow is showing `step` and waiting for the user.
    Active { flow: FlowKind, step: usize },
    /// A device operation for `step` is in flight.
    Busy { flow: FlowKind, step: usize },
    /// The flow ended on the error dialog. `flow` is kept for Retry only.
    Failed { flow: FlowKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardEvent {
    Start(FlowKind),
    Advance,
    Retreat,
    /// Move straight to a step index of the running flow.
    Jump(usize),
    BeginOperation,
    EndOperation,
    Fail,
    Restart,
    /// The last step was reached; the flow is over.
    Finish,
    Close,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    #[error("a flow is already running ({0})")]
    FlowAlreadyRunning(FlowKind),

    #[error("busy: wait for the current operation to finish")]
    Busy,

    #[error("cannot apply {event:?} while {state}")]
    InvalidTransition {
        state: WizardState,
        event: WizardEvent,
    },

    #[error("{0} is not available right now")]
    Unavailable(String),

    #[error("this dialog cannot be closed right now")]
    NotCloseable,
}

impl WizardState {
    /// The flow and step shown to the user, if a flow is running.
    pub fn position(&self) -> Option<(FlowKind, usize)> {
        match *self {
            WizardState::Active { flow, step } | WizardState::Busy { flow, step } => {
                Some((flow, step))
            }
            WizardState::Idle | WizardState::Failed { .. } => None,
        }
    }

    pub fn current_flow(&self) -> Option<FlowKind> {
        self.position().map(|(flow, _)| flow)
    }

    pub fn current_step(&self) -> Option<StepKind> {
        self.position().and_then(|(flow, step)| flow.step(step))
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, WizardState::Busy { .. })
    }

    /// The transition table. Pure: no side effects, no clamping.
    pub fn transition(self, event: WizardEvent) -> Result<WizardState, WizardError> {
        use WizardEvent as E;
        use WizardState as S;

        let invalid = Err(WizardError::InvalidTransition { state: self, event });
        match (self, event) {
            (S::Idle, E::Start(flow)) | (S::Failed { .. }, E::Start(flow)) => {
                Ok(S::Active { flow, step: 0 })
            }
            (S::Idle, E::Advance | E::Retreat | E::Close) => Ok(S::Idle),
            (S::Idle, _) => invalid,

            (S::Active { flow, .. }, E::Start(_)) => Err(WizardError::FlowAlreadyRunning(flow)),
            (S::Active { flow, step }, E::Advance) => {
                // Check before moving: the last step stays put.
                if step + 1 < flow.step_count() {
                    Ok(S::Active { flow, step: step + 1 })
                } else {
                    Ok(self)
                }
            }
            (S::Active { flow, step }, E::Retreat) => {
                if step > 0 {
                    Ok(S::Active { flow, step: step - 1 })
                } else {
                    Ok(self)
                }
            }
            (S::Active { flow, .. }, E::Jump(target)) => {
                if target < flow.step_count() {
                    Ok(S::Active { flow, step: target })
                } else {
                    invalid
                }
            }
            (S::Active { flow, step }, E::BeginOperation) => Ok(S::Busy { flow, step }),
            (S::Active { flow, step }, E::Finish) => {
                if step + 1 == flow.step_count() {
                    Ok(S::Idle)
                } else {
                    invalid
                }
            }
            (S::Active { flow, .. }, E::Fail) => Ok(S::Failed { flow }),
            (S::Active { .. }, E::Close) => Ok(S::Idle),
            (S::Active { .. }, E::EndOperation | E::Restart) => invalid,

            (S::Busy { flow, step }, E::EndOperation) => Ok(S::Active { flow, step }),
            (S::Busy { flow, .. }, E::Fail) => Ok(S::Failed { flow }),
            (S::Busy { .. }, _) => Err(WizardError::Busy),

            (S::Failed { flow }, E::Restart) => Ok(S::Active { flow, step: 0 }),
            (S::Failed { .. }, E::Close) => Ok(S::Idle),
            (S::Failed { .. }, E::Advance | E::Retreat | E::Fail) => Ok(self),
            (
                S::Failed { .. },
                E::Jump(_) | E::BeginOperation | E::EndOperation | E::Finish,
            ) => invalid,
        }
    }
}

impl fmt::Display for WizardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardState::Idle => write!(f, "idle"),
            WizardState::Active { flow, step } => {
                write!(f, "{} step {}", flow, step)
            }
            WizardState::Busy { flow, step } => write!(f, "{} step {} (busy)", flow, step),
            WizardState::Failed { flow } => write!(f, "{} (failed)", flow),
        }
    }
}

/// Holder of the current [`WizardState`].
#[derive(Debug)]
pub struct WizardMachine {
    state: WizardState,
}

impl Default for WizardMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardMachine {
    pub fn new() -> Self {
        Self {
            state: WizardState::Idle,
        }
    }

    pub fn state(&self) -> WizardState {
        self.state
    }

    /// Apply `event`; on error the state is left untouched.
    pub fn apply(&mut self, event: WizardEvent) -> Result<WizardState, WizardError> {
        let next = self.state.transition(event)?;
        if next != self.state {
            log::debug!("wizard: {} -> {} on {:?}", self.state, next, event);
        }
        self.state = next;
        Ok(next)
    }
}
