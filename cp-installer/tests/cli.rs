use std::process::{Command, Output};

fn cpinstaller(state_dir: &tempfile::TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cpinstaller"))
        .args(args)
        .env("CPI_STATE_DIR", state_dir.path())
        .env_remove("CPI_ESPTOOL")
        .output()
        .expect("failed to run cpinstaller binary")
}

#[test]
fn dump_dialogs_prints_every_dialog() {
    let state = tempfile::tempdir().unwrap();
    let output = cpinstaller(&state, &["--dump-dialogs"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("DIALOG: ").count(), 11);
    assert!(stdout.contains("Compatible boards:"));
    assert!(stdout.contains("To run the new firmware, please reset your device."));
}

#[test]
fn simulated_catalog_lists_boards_by_chip() {
    let state = tempfile::tempdir().unwrap();
    let output = cpinstaller(
        &state,
        &["boards", "--simulate", "esp32-s3", "--chip", "esp32s2"],
    );
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("CircuitPython 8.0.0"));
    assert!(stdout.contains("simulated_esp32s2"));
    assert!(!stdout.contains("simulated_esp32s3"));
}

#[test]
fn secrets_are_generated_offline() {
    let state = tempfile::tempdir().unwrap();
    let output = cpinstaller(
        &state,
        &[
            "secrets",
            "--ssid",
            "home",
            "--web-workflow-password",
            "pw",
            "--brightness",
            "bright",
        ],
    );
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"network_ssid\": \"home\""), "{}", stdout);
    assert!(stdout.contains("\"network_password\": \"\""), "{}", stdout);
    assert!(stdout.contains("\"status_pixel_brightness\": 0.2"), "{}", stdout);
}

#[test]
fn secrets_can_be_written_to_a_file() {
    let state = tempfile::tempdir().unwrap();
    let out = state.path().join("secrets.json");
    let template = state.path().join("template.json");
    std::fs::write(&template, r#"{"web_workflow_password": "", "extra": 1}"#).unwrap();

    let output = cpinstaller(
        &state,
        &[
            "secrets",
            "--template",
            template.to_str().unwrap(),
            "--ssid",
            "home",
            "--web-workflow-password",
            "pw",
            "--output",
            out.to_str().unwrap(),
        ],
    );
    assert!(output.status.success());

    let written = std::fs::read_to_string(&out).unwrap();
    assert!(written.contains("\"extra\": 1"));
    assert!(written.contains("\"web_workflow_password\": \"pw\""));
}

#[test]
fn secrets_without_a_network_name_fail() {
    let state = tempfile::tempdir().unwrap();
    let output = cpinstaller(
        &state,
        &["secrets", "--ssid", "", "--web-workflow-password", "pw"],
    );
    assert!(!output.status.success());
}

#[test]
fn unsupported_baud_is_rejected() {
    let state = tempfile::tempdir().unwrap();
    let output = cpinstaller(&state, &["--baud", "9600", "--dump-dialogs"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("baud rate must be one of"), "{}", stderr);
}

#[test]
fn insecure_firmware_origin_is_refused() {
    let state = tempfile::tempdir().unwrap();
    let output = cpinstaller(
        &state,
        &["boards", "--firmware", "http://firmware.example.com/"],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("HTTPS"), "{}", stderr);
}

#[test]
fn wizard_needs_a_terminal() {
    let state = tempfile::tempdir().unwrap();
    let output = cpinstaller(&state, &["--simulate", "esp32-s3"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No TTY detected"), "{}", stderr);
}
