//! What the front end draws: the current dialog surface and the console.

use crate::dialog::{ButtonAction, DialogId, FieldView};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedButton {
    pub label: &'static str,
    pub element_id: String,
    pub action: ButtonAction,
    pub enabled: bool,
}

/// Backing presentation of one dialog. Built once per [`DialogId`]; only the
/// body, fields, percentage and button state change between renders.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub id: DialogId,
    pub title: &'static str,
    pub closeable: bool,
    pub buttons: Vec<RenderedButton>,
    pub body: Vec<String>,
    pub percentage: Option<u8>,
    pub fields: Vec<FieldView>,
    pub visible: bool,
}

impl Surface {
    pub fn button(&self, action: ButtonAction) -> Option<&RenderedButton> {
        self.buttons.iter().find(|b| b.action == action)
    }

    pub fn text(&self) -> String {
        self.body.join("\n")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Presentation {
    pub surface: Option<Surface>,
    pub console: Vec<String>,
    pub busy: bool,
    /// The wizard was closed; the front end can exit.
    pub closed: bool,
}

/// Shared view of the engine's presentation, read by the front end.
#[derive(Debug, Clone, Default)]
pub struct PresentationHandle {
    inner: Arc<Mutex<Presentation>>,
}

impl PresentationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Presentation> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Presentation {
        self.lock().clone()
    }

    pub(crate) fn set_surface(&self, surface: Option<Surface>) {
        let mut presentation = self.lock();
        if surface.is_some() {
            presentation.closed = false;
        }
        presentation.surface = surface;
    }

    pub(crate) fn set_console(&self, lines: Vec<String>) {
        self.lock().console = lines;
    }

    pub(crate) fn set_busy(&self, busy: bool) {
        self.lock().busy = busy;
    }

    pub(crate) fn set_closed(&self) {
        let mut presentation = self.lock();
        presentation.closed = true;
        presentation.surface = None;
    }
}
