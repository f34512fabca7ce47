//! Plain-text dumps of dialog surfaces, for support and debugging.

use cpi_core::secrets::CredentialField;
use cpi_core::InstallerError;
use cpi_workflow::dialog::{FieldView, NavContext};
use cpi_workflow::renderer::DialogRenderer;
use cpi_workflow::{DialogData, DialogId, PresentationHandle, Surface};

pub fn dump_surface(surface: &Surface) -> String {
    let body = if surface.body.is_empty() {
        "(no body content)".to_string()
    } else {
        surface.body.join("\n")
    };
    let progress = surface
        .percentage
        .map_or_else(|| "none".to_string(), |p| format!("{}%", p));
    let fields = if surface.fields.is_empty() {
        "none".to_string()
    } else {
        surface
            .fields
            .iter()
            .map(|view| format!("{} = {:?}", view.label, view.value))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let buttons = surface
        .buttons
        .iter()
        .map(|b| {
            if b.enabled {
                format!("[{}]", b.label)
            } else {
                format!("({})", b.label)
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "DIALOG: {}\n\n- Id: {:?}\n- Closeable: {}\n- Body contents:\n{}\n- Progress: {}\n- Fields: {}\n- Buttons: {}\n",
        surface.title, surface.id, surface.closeable, body, progress, fields, buttons
    )
}

fn sample_data(id: DialogId) -> DialogData {
    let board_name = "Adafruit Feather ESP32-S3".to_string();
    let mut data = DialogData {
        board_name: board_name.clone(),
        ..DialogData::default()
    };
    match id {
        DialogId::Erase | DialogId::GenerateSettings => data.percentage = Some(0),
        DialogId::Flash => {
            data.contents = "boot-8.0.0.bin (1/2)".to_string();
            data.percentage = Some(42);
        }
        DialogId::CopyUf2 => {
            data.uf2_file = "firmware-8.0.0.uf2".to_string();
            data.percentage = Some(42);
        }
        DialogId::Credentials => {
            data.fields = CredentialField::editable()
                .iter()
                .map(|field| FieldView {
                    field: *field,
                    label: field.label(),
                    value: String::new(),
                })
                .collect();
        }
        DialogId::BoardMismatch => {
            data.message = InstallerError::BoardMismatch {
                selected_board: board_name,
                chip_name: "ESP32-S2".to_string(),
            }
            .user_message();
            data.boards = vec![
                "Adafruit Feather ESP32-S2".to_string(),
                "Adafruit QT Py ESP32-S2".to_string(),
            ];
        }
        DialogId::Error => {
            data.message =
                InstallerError::Disconnected("serial port closed".to_string()).user_message();
        }
        DialogId::Menu | DialogId::SerialConnect | DialogId::Confirm | DialogId::Success => {}
    }
    data
}

/// Render every registered dialog with sample data.
pub fn dump_all_dialogs() -> Vec<String> {
    let mut renderer = DialogRenderer::new(PresentationHandle::new());
    let nav = NavContext {
        step: 1,
        flow_len: 5,
        step_ready: true,
        retry_allowed: true,
        busy: false,
    };
    DialogId::all()
        .iter()
        .filter_map(|id| {
            renderer.show_dialog(*id, &sample_data(*id), &nav);
            renderer.current().map(dump_surface)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_dialog_is_dumped() {
        let dumps = dump_all_dialogs();
        assert_eq!(dumps.len(), DialogId::all().len());
        assert!(dumps.iter().all(|d| d.starts_with("DIALOG: ")));
    }

    #[test]
    fn dumps_carry_sample_payloads() {
        let dumps = dump_all_dialogs().join("\n");
        assert!(dumps.contains("Flashing boot-8.0.0.bin (1/2)..."));
        assert!(dumps.contains("1. Adafruit Feather ESP32-S2"));
        assert!(dumps.contains("WiFi Network Name (SSID) = \"\""));
        assert!(dumps.contains("[Retry]"));
        assert!(dumps.contains("Progress: 42%"));
    }
}
