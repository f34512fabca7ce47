use cpi_core::demo::{demo_board_id, demo_source};
use cpi_core::secrets::CredentialField;
use cpi_hal::{ChipFamily, FakeTransport};
use cpi_tui::app::{App, InputResult};
use cpi_tui::worker::{dispatch, EngineWorker, UiCommand};
use cpi_workflow::{
    ButtonAction, DialogId, EngineConfig, FlowEngine, FlowKind, Presentation, PresentationHandle,
    StepKind, WizardState,
};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers};
use std::time::{Duration, Instant};

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent {
        code,
        modifiers: KeyModifiers::NONE,
        kind: KeyEventKind::Press,
        state: KeyEventState::NONE,
    }
}

fn ctrl(c: char) -> KeyEvent {
    KeyEvent {
        modifiers: KeyModifiers::CONTROL,
        ..key(KeyCode::Char(c))
    }
}

fn demo_engine(device: &FakeTransport) -> FlowEngine {
    let board_id = demo_board_id(ChipFamily::Esp32S3);
    FlowEngine::new(
        EngineConfig::new("Feather ESP32-S3", Some(&board_id)),
        Box::new(device.clone()),
        Box::new(demo_source().unwrap()),
    )
}

/// Feed a key to the app and apply any resulting command to the engine.
fn press(app: &mut App, engine: &mut FlowEngine, event: KeyEvent) -> InputResult {
    let snapshot = engine.presentation().snapshot();
    let result = app.handle_input(event, &snapshot);
    if let InputResult::Command(command) = result.clone() {
        dispatch(engine, command).unwrap();
    }
    result
}

fn type_text(app: &mut App, engine: &mut FlowEngine, text: &str) {
    for c in text.chars() {
        press(app, engine, key(KeyCode::Char(c)));
    }
}

fn surface_id(engine: &FlowEngine) -> Option<DialogId> {
    engine.current_surface().map(|s| s.id)
}

#[test]
fn settings_flow_by_keyboard() {
    let device = FakeTransport::new(ChipFamily::Esp32S3);
    let mut engine = demo_engine(&device);
    let mut app = App::new(false);
    engine.run_flow(FlowKind::SettingsOnly).unwrap();

    let result = press(&mut app, &mut engine, key(KeyCode::Enter));
    assert_eq!(
        result,
        InputResult::Command(UiCommand::Press(ButtonAction::Connect))
    );
    assert_eq!(engine.current_step(), Some(StepKind::Credentials));

    type_text(&mut app, &mut engine, "cafe");
    assert!(!app.show_console);
    assert_eq!(
        engine.credentials().get(CredentialField::NetworkSsid),
        "cafe"
    );

    press(&mut app, &mut engine, key(KeyCode::Tab));
    press(&mut app, &mut engine, key(KeyCode::Tab));
    type_text(&mut app, &mut engine, "pw");
    assert_eq!(
        engine.credentials().get(CredentialField::WebWorkflowPassword),
        "pw"
    );
    assert_eq!(app.fields()[2].1.display(), "**");

    press(&mut app, &mut engine, key(KeyCode::Tab));
    assert!(app.buttons_focused());
    press(&mut app, &mut engine, key(KeyCode::Right));
    let result = press(&mut app, &mut engine, key(KeyCode::Enter));
    assert_eq!(result, InputResult::Command(UiCommand::Press(ButtonAction::Next)));
    assert_eq!(surface_id(&engine), Some(DialogId::Success));

    let secrets = String::from_utf8(device.written_at(0x2d0000).unwrap()).unwrap();
    assert!(secrets.contains("\"network_ssid\": \"cafe\""), "{}", secrets);

    press(&mut app, &mut engine, key(KeyCode::Enter));
    assert!(engine.presentation().snapshot().closed);
    assert_eq!(engine.state(), WizardState::Idle);
}

#[test]
fn menu_numbers_start_flows() {
    let device = FakeTransport::new(ChipFamily::Esp32S3);
    let mut engine = demo_engine(&device);
    let mut app = App::new(false);
    engine.show_menu().unwrap();

    let result = press(&mut app, &mut engine, key(KeyCode::Char('2')));
    assert_eq!(
        result,
        InputResult::Command(UiCommand::Press(ButtonAction::StartFlow(
            FlowKind::Uf2Program
        )))
    );
    assert_eq!(engine.state().current_flow(), Some(FlowKind::Uf2Program));
    assert_eq!(surface_id(&engine), Some(DialogId::SerialConnect));
}

#[test]
fn mismatch_numbers_pick_a_board() {
    let device = FakeTransport::new(ChipFamily::Esp32S2);
    let mut engine = demo_engine(&device);
    let mut app = App::new(false);
    engine.run_flow(FlowKind::BinProgram).unwrap();

    press(&mut app, &mut engine, key(KeyCode::Enter));
    assert_eq!(surface_id(&engine), Some(DialogId::BoardMismatch));

    let result = press(&mut app, &mut engine, key(KeyCode::Char('1')));
    assert_eq!(result, InputResult::Command(UiCommand::SelectBoard(0)));
    assert_eq!(engine.current_step(), Some(StepKind::Confirm));
    let expected = demo_board_id(ChipFamily::Esp32S2);
    assert_eq!(engine.board_id(), Some(expected.as_str()));
}

#[test]
fn selection_skips_disabled_buttons() {
    let device = FakeTransport::new(ChipFamily::Esp32S3);
    let mut engine = demo_engine(&device);
    let mut app = App::new(false);
    engine.run_flow(FlowKind::BinProgram).unwrap();

    press(&mut app, &mut engine, key(KeyCode::Right));
    let surface = engine.current_surface().unwrap();
    assert_eq!(surface.buttons[app.selected()].action, ButtonAction::Connect);
    press(&mut app, &mut engine, key(KeyCode::Left));
    let surface = engine.current_surface().unwrap();
    assert_eq!(surface.buttons[app.selected()].action, ButtonAction::Connect);
}

#[test]
fn busy_ignores_navigation() {
    let device = FakeTransport::new(ChipFamily::Esp32S3);
    let mut engine = demo_engine(&device);
    let mut app = App::new(false);
    engine.run_flow(FlowKind::BinProgram).unwrap();

    let busy = Presentation {
        surface: engine.current_surface().cloned(),
        busy: true,
        ..Presentation::default()
    };
    assert_eq!(app.handle_input(key(KeyCode::Enter), &busy), InputResult::Continue);
    assert_eq!(app.handle_input(key(KeyCode::Esc), &busy), InputResult::Continue);
    assert_eq!(app.handle_input(ctrl('c'), &busy), InputResult::Continue);
    assert_eq!(
        app.handle_input(key(KeyCode::Char('c')), &busy),
        InputResult::ToggleConsole
    );
    assert!(app.show_console);
}

#[test]
fn escape_dismisses_and_frees_the_port() {
    let device = FakeTransport::new(ChipFamily::Esp32S3);
    let mut engine = demo_engine(&device);
    let mut app = App::new(false);
    engine.run_flow(FlowKind::BinProgram).unwrap();
    press(&mut app, &mut engine, key(KeyCode::Enter));
    assert_eq!(engine.current_step(), Some(StepKind::Confirm));
    assert!(device.is_port_open());

    let result = press(&mut app, &mut engine, key(KeyCode::Esc));
    assert_eq!(result, InputResult::Command(UiCommand::Dismiss));
    assert_eq!(engine.state(), WizardState::Idle);
    assert!(!device.is_port_open());
}

#[test]
fn quit_without_a_dialog() {
    let mut app = App::new(false);
    let empty = Presentation::default();
    assert_eq!(app.handle_input(key(KeyCode::Char('q')), &empty), InputResult::Quit);
    assert_eq!(app.handle_input(ctrl('c'), &empty), InputResult::Quit);
}

fn wait_for(presentation: &PresentationHandle, id: DialogId) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if presentation.snapshot().surface.map(|s| s.id) == Some(id) {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("dialog {:?} never shown", id);
}

#[test]
fn worker_runs_commands_and_releases_on_shutdown() {
    let device = FakeTransport::new(ChipFamily::Esp32S3);
    let engine = demo_engine(&device);
    let presentation = engine.presentation();

    let worker = EngineWorker::spawn(engine, Some(FlowKind::BinProgram));
    wait_for(&presentation, DialogId::SerialConnect);
    assert!(worker.send(UiCommand::Press(ButtonAction::Connect)));
    wait_for(&presentation, DialogId::Confirm);
    assert!(device.is_port_open());

    worker.shutdown();
    assert!(!device.is_port_open());
    assert!(presentation.snapshot().closed);
}
