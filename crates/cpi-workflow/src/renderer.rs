//! Dialog renderer: the only code that changes what is visible.

use crate::dialog::{definition, definitions, DialogData, DialogDefinition, DialogId, NavContext};
use crate::presentation::{PresentationHandle, RenderedButton, Surface};
use std::collections::HashMap;

pub struct DialogRenderer {
    surfaces: HashMap<DialogId, Surface>,
    current: Option<DialogId>,
    builds: usize,
    renders: usize,
    presentation: PresentationHandle,
}

impl DialogRenderer {
    /// Create the renderer and build every preloaded surface.
    pub fn new(presentation: PresentationHandle) -> Self {
        let mut renderer = Self {
            surfaces: HashMap::new(),
            current: None,
            builds: 0,
            renders: 0,
            presentation,
        };
        for def in definitions().filter(|def| def.preload) {
            renderer.build(def);
        }
        renderer
    }

    fn build(&mut self, def: &'static DialogDefinition) {
        self.builds += 1;
        log::debug!("building dialog surface {:?}", def.id);
        self.surfaces.insert(
            def.id,
            Surface {
                id: def.id,
                title: def.title,
                closeable: def.closeable,
                buttons: def
                    .buttons
                    .iter()
                    .map(|declared| RenderedButton {
                        label: declared.label,
                        element_id: declared.element_id(),
                        action: declared.action,
                        enabled: false,
                    })
                    .collect(),
                body: Vec::new(),
                percentage: None,
                fields: Vec::new(),
                visible: false,
            },
        );
    }

    /// Show `id`, closing whatever is open first.
    pub fn show_dialog(&mut self, id: DialogId, data: &DialogData, nav: &NavContext) {
        self.close_dialog();

        let def = definition(id);
        if !self.surfaces.contains_key(&id) {
            self.build(def);
        }
        let Some(surface) = self.surfaces.get_mut(&id) else {
            return;
        };

        surface.body = (def.template)(data);
        surface.fields = data.fields.clone();
        surface.percentage = data.percentage;
        surface.closeable = def.closeable;
        for (button, declared) in surface.buttons.iter_mut().zip(def.buttons) {
            button.enabled = declared.is_enabled(nav);
        }
        surface.visible = true;

        let snapshot = surface.clone();
        self.current = Some(id);
        self.renders += 1;
        self.presentation.set_surface(Some(snapshot));
    }

    /// Hide the current dialog. Does nothing when none is open.
    pub fn close_dialog(&mut self) {
        let Some(id) = self.current.take() else {
            return;
        };
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.visible = false;
        }
        self.presentation.set_surface(None);
    }

    pub fn current(&self) -> Option<&Surface> {
        self.current.and_then(|id| self.surfaces.get(&id))
    }

    pub fn current_id(&self) -> Option<DialogId> {
        self.current
    }

    pub fn visible_count(&self) -> usize {
        self.surfaces.values().filter(|s| s.visible).count()
    }

    pub fn is_built(&self, id: DialogId) -> bool {
        self.surfaces.contains_key(&id)
    }

    /// Surfaces constructed so far.
    pub fn builds(&self) -> usize {
        self.builds
    }

    /// Calls to [`show_dialog`](Self::show_dialog) so far.
    pub fn renders(&self) -> usize {
        self.renders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::ButtonAction;

    fn nav(step: usize, flow_len: usize) -> NavContext {
        NavContext {
            step,
            flow_len,
            step_ready: true,
            retry_allowed: false,
            busy: false,
        }
    }

    #[test]
    fn preloads_eagerly_and_builds_the_rest_lazily() {
        let mut renderer = DialogRenderer::new(PresentationHandle::new());
        assert!(renderer.is_built(DialogId::SerialConnect));
        assert!(!renderer.is_built(DialogId::Error));
        let preloaded = renderer.builds();

        renderer.show_dialog(DialogId::Error, &DialogData::default(), &nav(0, 0));
        assert!(renderer.is_built(DialogId::Error));
        assert_eq!(renderer.builds(), preloaded + 1);

        renderer.show_dialog(DialogId::Error, &DialogData::default(), &nav(0, 0));
        assert_eq!(renderer.builds(), preloaded + 1);
    }

    #[test]
    fn at_most_one_surface_is_visible() {
        let handle = PresentationHandle::new();
        let mut renderer = DialogRenderer::new(handle.clone());
        assert_eq!(renderer.visible_count(), 0);

        for id in DialogId::all() {
            renderer.show_dialog(*id, &DialogData::default(), &nav(1, 3));
            assert_eq!(renderer.visible_count(), 1);
            assert_eq!(renderer.current_id(), Some(*id));
            assert_eq!(handle.snapshot().surface.map(|s| s.id), Some(*id));
        }

        renderer.close_dialog();
        assert_eq!(renderer.visible_count(), 0);
        assert!(handle.snapshot().surface.is_none());
    }

    #[test]
    fn closing_with_nothing_open_is_harmless() {
        let mut renderer = DialogRenderer::new(PresentationHandle::new());
        renderer.close_dialog();
        renderer.close_dialog();
        assert_eq!(renderer.current_id(), None);
    }

    #[test]
    fn button_state_is_refreshed_per_render() {
        let mut renderer = DialogRenderer::new(PresentationHandle::new());
        let data = DialogData {
            board_name: "Feather".to_string(),
            ..DialogData::default()
        };

        renderer.show_dialog(DialogId::Credentials, &data, &nav(0, 3));
        let surface = renderer.current().unwrap();
        assert!(!surface.button(ButtonAction::Previous).unwrap().enabled);
        assert!(surface.button(ButtonAction::Next).unwrap().enabled);

        renderer.show_dialog(DialogId::Credentials, &data, &nav(2, 3));
        let surface = renderer.current().unwrap();
        assert!(surface.button(ButtonAction::Previous).unwrap().enabled);
        assert!(!surface.button(ButtonAction::Next).unwrap().enabled);
    }

    #[test]
    fn templates_render_the_payload() {
        let mut renderer = DialogRenderer::new(PresentationHandle::new());
        let data = DialogData {
            contents: "boot-8.0.0.bin (1/2)".to_string(),
            percentage: Some(42),
            ..DialogData::default()
        };
        renderer.show_dialog(DialogId::Flash, &data, &nav(3, 5));
        let surface = renderer.current().unwrap();
        assert!(!surface.closeable);
        assert!(surface.text().contains("Flashing boot-8.0.0.bin (1/2)..."));
        assert!(surface.text().contains("42%"));
    }
}
