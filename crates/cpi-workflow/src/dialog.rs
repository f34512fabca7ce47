//! Dialog registry: static presentation definitions keyed by [`DialogId`].

use crate::flow::FlowKind;
use cpi_core::secrets::CredentialField;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DialogId {
    Menu,
    SerialConnect,
    Confirm,
    Erase,
    Flash,
    CopyUf2,
    Credentials,
    GenerateSettings,
    BoardMismatch,
    Success,
    Error,
}

impl DialogId {
    pub fn all() -> &'static [DialogId] {
        &[
            DialogId::Menu,
            DialogId::SerialConnect,
            DialogId::Confirm,
            DialogId::Erase,
            DialogId::Flash,
            DialogId::CopyUf2,
            DialogId::Credentials,
            DialogId::GenerateSettings,
            DialogId::BoardMismatch,
            DialogId::Success,
            DialogId::Error,
        ]
    }
}

/// What a button does when pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Previous,
    Next,
    Close,
    Cancel,
    Continue,
    Connect,
    Retry,
    StartFlow(FlowKind),
}

/// Facts the enabled predicates are evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavContext {
    pub step: usize,
    /// Number of steps in the active flow, 0 when none is active.
    pub flow_len: usize,
    /// Whether the current step has done what it needs to let the user move on.
    pub step_ready: bool,
    pub retry_allowed: bool,
    /// A device operation is in flight.
    pub busy: bool,
}

pub type EnabledFn = fn(&NavContext) -> bool;

#[derive(Debug, Clone, Copy)]
pub struct ButtonSpec {
    pub label: &'static str,
    pub action: ButtonAction,
    /// `None` means always enabled.
    pub enabled: Option<EnabledFn>,
}

impl ButtonSpec {
    pub fn is_enabled(&self, nav: &NavContext) -> bool {
        self.enabled.map_or(true, |predicate| predicate(nav))
    }

    pub fn element_id(&self) -> String {
        element_id_from_label(self.label)
    }
}

/// A credentials form row as shown in the dialog.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldView {
    pub field: CredentialField,
    pub label: &'static str,
    pub value: String,
}

/// Payload rendered into a dialog body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogData {
    pub board_name: String,
    pub contents: String,
    pub percentage: Option<u8>,
    pub uf2_file: String,
    pub message: String,
    pub boards: Vec<String>,
    pub fields: Vec<FieldView>,
}

pub type TemplateFn = fn(&DialogData) -> Vec<String>;

pub struct DialogDefinition {
    pub id: DialogId,
    pub title: &'static str,
    pub template: TemplateFn,
    pub buttons: &'static [ButtonSpec],
    pub closeable: bool,
    /// Build the surface when the renderer starts rather than on first show.
    pub preload: bool,
}

fn idle(nav: &NavContext) -> bool {
    !nav.busy
}

fn can_go_back(nav: &NavContext) -> bool {
    !nav.busy && nav.step > 0
}

fn can_advance(nav: &NavContext) -> bool {
    !nav.busy && nav.step + 1 < nav.flow_len && nav.step_ready
}

fn can_retry(nav: &NavContext) -> bool {
    nav.retry_allowed
}

const PREVIOUS: ButtonSpec = ButtonSpec {
    label: "Previous",
    action: ButtonAction::Previous,
    enabled: Some(can_go_back),
};

const NEXT: ButtonSpec = ButtonSpec {
    label: "Next",
    action: ButtonAction::Next,
    enabled: Some(can_advance),
};

const CLOSE: ButtonSpec = ButtonSpec {
    label: "Close",
    action: ButtonAction::Close,
    enabled: None,
};

fn percent_line(data: &DialogData) -> String {
    format!("{}%", data.percentage.unwrap_or(0))
}

fn menu_body(_: &DialogData) -> Vec<String> {
    let mut lines = vec!["Choose what to install:".to_string(), String::new()];
    for (i, flow) in FlowKind::all().iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, flow.label()));
    }
    lines
}

fn serial_connect_body(data: &DialogData) -> Vec<String> {
    vec![
        format!("Make sure your {} is plugged into this computer via a", data.board_name),
        "Serial connection using a USB Cable.".to_string(),
        String::new(),
        "NOTE: A lot of people end up using charge-only USB cables and it is very frustrating!"
            .to_string(),
        "Make sure you have a USB cable you know is good for data sync.".to_string(),
        String::new(),
        "Choose Connect to open the serial port.".to_string(),
    ]
}

fn confirm_body(data: &DialogData) -> Vec<String> {
    vec![
        format!(
            "This will overwrite everything on the {}.",
            data.board_name
        ),
        "Your files and settings will be lost.".to_string(),
    ]
}

fn erase_body(data: &DialogData) -> Vec<String> {
    vec![
        "Erasing flash memory. Please do not unplug the board!".to_string(),
        percent_line(data),
    ]
}

fn flash_body(data: &DialogData) -> Vec<String> {
    vec![
        format!("Flashing {}...", data.contents),
        percent_line(data),
    ]
}

fn copy_uf2_body(data: &DialogData) -> Vec<String> {
    vec![
        format!("Copying {} to the board drive...", data.uf2_file),
        percent_line(data),
    ]
}

fn credentials_body(data: &DialogData) -> Vec<String> {
    vec![
        format!("Enter the network settings for your {}.", data.board_name),
        "The network name and web workflow password are required.".to_string(),
    ]
}

fn generate_settings_body(data: &DialogData) -> Vec<String> {
    vec![
        "Writing settings to the board...".to_string(),
        percent_line(data),
    ]
}

fn board_mismatch_body(data: &DialogData) -> Vec<String> {
    let mut lines: Vec<String> = data.message.lines().map(str::to_string).collect();
    lines.push(String::new());
    lines.push("Compatible boards:".to_string());
    for (i, board) in data.boards.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, board));
    }
    lines
}

fn success_body(_: &DialogData) -> Vec<String> {
    vec![
        "Successfully installed CircuitPython!".to_string(),
        "To run the new firmware, please reset your device.".to_string(),
    ]
}

fn error_body(data: &DialogData) -> Vec<String> {
    data.message.lines().map(str::to_string).collect()
}

static MENU: DialogDefinition = DialogDefinition {
    id: DialogId::Menu,
    title: "CircuitPython Installer",
    template: menu_body,
    buttons: &[
        ButtonSpec {
            label: "Install Bin File",
            action: ButtonAction::StartFlow(FlowKind::BinProgram),
            enabled: None,
        },
        ButtonSpec {
            label: "Install Bootloader and uf2",
            action: ButtonAction::StartFlow(FlowKind::Uf2Program),
            enabled: None,
        },
        ButtonSpec {
            label: "Install Bootloader Only",
            action: ButtonAction::StartFlow(FlowKind::BootloaderOnly),
            enabled: None,
        },
        ButtonSpec {
            label: "Update WiFi credentials",
            action: ButtonAction::StartFlow(FlowKind::SettingsOnly),
            enabled: None,
        },
        CLOSE,
    ],
    closeable: true,
    preload: true,
};

static SERIAL_CONNECT: DialogDefinition = DialogDefinition {
    id: DialogId::SerialConnect,
    title: "Connect your board",
    template: serial_connect_body,
    buttons: &[
        PREVIOUS,
        ButtonSpec {
            label: "Connect",
            action: ButtonAction::Connect,
            enabled: Some(idle),
        },
        NEXT,
    ],
    closeable: true,
    preload: true,
};

static CONFIRM: DialogDefinition = DialogDefinition {
    id: DialogId::Confirm,
    title: "Erase and install?",
    template: confirm_body,
    buttons: &[
        ButtonSpec {
            label: "Cancel",
            action: ButtonAction::Cancel,
            enabled: None,
        },
        ButtonSpec {
            label: "Continue",
            action: ButtonAction::Continue,
            enabled: None,
        },
    ],
    closeable: true,
    preload: true,
};

static ERASE: DialogDefinition = DialogDefinition {
    id: DialogId::Erase,
    title: "Erasing flash",
    template: erase_body,
    buttons: &[NEXT],
    closeable: false,
    preload: true,
};

static FLASH: DialogDefinition = DialogDefinition {
    id: DialogId::Flash,
    title: "Installing firmware",
    template: flash_body,
    buttons: &[NEXT],
    closeable: false,
    preload: true,
};

static COPY_UF2: DialogDefinition = DialogDefinition {
    id: DialogId::CopyUf2,
    title: "Copying firmware",
    template: copy_uf2_body,
    buttons: &[NEXT],
    closeable: false,
    preload: true,
};

static CREDENTIALS: DialogDefinition = DialogDefinition {
    id: DialogId::Credentials,
    title: "WiFi settings",
    template: credentials_body,
    buttons: &[PREVIOUS, NEXT],
    closeable: true,
    preload: true,
};

static GENERATE_SETTINGS: DialogDefinition = DialogDefinition {
    id: DialogId::GenerateSettings,
    title: "Saving settings",
    template: generate_settings_body,
    buttons: &[PREVIOUS, NEXT],
    closeable: false,
    preload: true,
};

static BOARD_MISMATCH: DialogDefinition = DialogDefinition {
    id: DialogId::BoardMismatch,
    title: "Wrong board",
    template: board_mismatch_body,
    buttons: &[CLOSE],
    closeable: true,
    preload: false,
};

static SUCCESS: DialogDefinition = DialogDefinition {
    id: DialogId::Success,
    title: "Installation complete",
    template: success_body,
    buttons: &[CLOSE],
    closeable: true,
    preload: true,
};

static ERROR: DialogDefinition = DialogDefinition {
    id: DialogId::Error,
    title: "Error",
    template: error_body,
    buttons: &[
        ButtonSpec {
            label: "Retry",
            action: ButtonAction::Retry,
            enabled: Some(can_retry),
        },
        CLOSE,
    ],
    closeable: true,
    preload: false,
};

pub fn definition(id: DialogId) -> &'static DialogDefinition {
    match id {
        DialogId::Menu => &MENU,
        DialogId::SerialConnect => &SERIAL_CONNECT,
        DialogId::Confirm => &CONFIRM,
        DialogId::Erase => &ERASE,
        DialogId::Flash => &FLASH,
        DialogId::CopyUf2 => &COPY_UF2,
        DialogId::Credentials => &CREDENTIALS,
        DialogId::GenerateSettings => &GENERATE_SETTINGS,
        DialogId::BoardMismatch => &BOARD_MISMATCH,
        DialogId::Success => &SUCCESS,
        DialogId::Error => &ERROR,
    }
}

/// Every registered definition, in [`DialogId::all`] order.
pub fn definitions() -> impl Iterator<Item = &'static DialogDefinition> {
    DialogId::all().iter().map(|id| definition(*id))
}

/// Turn a button label into an identifier safe for lookups and dumps.
///
/// Leading characters up to the first ASCII letter are dropped, then anything
/// outside `[A-Za-z0-9_:.-]` is removed.
pub fn element_id_from_label(label: &str) -> String {
    label
        .trim_start_matches(|c: char| !c.is_ascii_alphabetic())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.' | '-'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn definitions_are_keyed_by_their_own_id() {
        for id in DialogId::all() {
            assert_eq!(definition(*id).id, *id);
        }
        assert_eq!(definitions().count(), DialogId::all().len());
    }

    #[test]
    fn button_ids_are_unique_within_a_dialog() {
        for def in definitions() {
            let mut ids = HashSet::new();
            for button in def.buttons {
                let id = button.element_id();
                assert!(!id.is_empty(), "{:?} {}", def.id, button.label);
                assert!(ids.insert(id), "{:?} repeats {}", def.id, button.label);
            }
        }
    }

    #[test]
    fn menu_lists_every_flow() {
        let menu = definition(DialogId::Menu);
        for flow in FlowKind::all() {
            assert!(menu
                .buttons
                .iter()
                .any(|b| b.action == ButtonAction::StartFlow(*flow) && b.label == flow.label()));
        }
    }

    #[test]
    fn element_ids_strip_leading_symbols_and_unsafe_chars() {
        assert_eq!(element_id_from_label("Next"), "Next");
        assert_eq!(element_id_from_label("Install Bin File"), "InstallBinFile");
        assert_eq!(element_id_from_label("1. Retry!"), "Retry");
        assert_eq!(element_id_from_label("  <ok:go.v-1>"), "ok:go.v-1");
        assert_eq!(element_id_from_label("123"), "");
    }

    #[test]
    fn navigation_predicates_follow_the_step_index() {
        let first = NavContext {
            step: 0,
            flow_len: 3,
            step_ready: true,
            retry_allowed: false,
            busy: false,
        };
        assert!(!PREVIOUS.is_enabled(&first));
        assert!(NEXT.is_enabled(&first));

        let last = NavContext { step: 2, ..first };
        assert!(PREVIOUS.is_enabled(&last));
        assert!(!NEXT.is_enabled(&last));

        let waiting = NavContext {
            step_ready: false,
            ..first
        };
        assert!(!NEXT.is_enabled(&waiting));
        assert!(CLOSE.is_enabled(&waiting));

        let busy = NavContext { busy: true, ..last };
        assert!(!PREVIOUS.is_enabled(&busy));
        assert!(!idle(&busy));
    }
}
