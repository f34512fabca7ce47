//! Installer wizard: flows, dialogs and the engine that runs them.
//!
//! The engine is synchronous. A front end drives it through [`FlowEngine`]
//! and draws whatever the shared [`PresentationHandle`] holds.

pub mod console;
pub mod dialog;
pub mod engine;
pub mod flow;
pub mod presentation;
pub mod renderer;
pub mod state;
mod steps;

pub use dialog::{ButtonAction, DialogData, DialogId};
pub use engine::{BoardChoice, EngineConfig, FlowEngine};
pub use flow::{FlowKind, StepKind};
pub use presentation::{Presentation, PresentationHandle, Surface};
pub use state::{WizardError, WizardState};
