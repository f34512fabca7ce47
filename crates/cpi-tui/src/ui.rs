use crate::app::App;
use cpi_workflow::{DialogId, Presentation, Surface};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph, Wrap},
    Frame,
};

const CONSOLE_HEIGHT: u16 = 10;

pub fn draw(f: &mut Frame, app: &App, presentation: &Presentation) {
    // Title | Dialog | Console (optional) | Key legend
    let mut constraints = vec![Constraint::Length(3), Constraint::Min(8)];
    if app.show_console {
        constraints.push(Constraint::Length(CONSOLE_HEIGHT));
    }
    constraints.push(Constraint::Length(3));
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints(constraints)
        .split(f.area());

    let (status, status_color) = if presentation.busy {
        ("WORKING", Color::Yellow)
    } else {
        ("READY", Color::Green)
    };
    let title_line = Line::from(vec![
        Span::styled("CircuitPython Installer", Style::default().fg(Color::White)),
        Span::raw(" | "),
        Span::styled(status, Style::default().fg(status_color)),
    ]);
    f.render_widget(Block::default().borders(Borders::ALL).title(title_line), chunks[0]);

    match &presentation.surface {
        Some(surface) => draw_dialog(f, app, surface, chunks[1]),
        None => {
            let waiting = Paragraph::new("Starting...")
                .block(Block::default().borders(Borders::ALL));
            f.render_widget(waiting, chunks[1]);
        }
    }

    if app.show_console {
        draw_console(f, &presentation.console, chunks[2]);
    }

    let legend = Paragraph::new(key_help(app, presentation))
        .block(Block::default().borders(Borders::ALL).title("Keys"));
    f.render_widget(legend, chunks[chunks.len() - 1]);
}

fn draw_dialog(f: &mut Frame, app: &App, surface: &Surface, area: Rect) {
    let area = centered_rect(80, 90, area);
    f.render_widget(Clear, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(surface.title)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let editing = surface.id == DialogId::Credentials;
    let mut constraints = vec![Constraint::Min(2)];
    if surface.percentage.is_some() {
        constraints.push(Constraint::Length(1));
    }
    if editing {
        constraints.push(Constraint::Length(app.fields().len() as u16 * 2));
    }
    constraints.push(Constraint::Length(2));
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner);

    let body: Vec<Line> = surface.body.iter().map(|l| Line::from(l.as_str())).collect();
    f.render_widget(Paragraph::new(body).wrap(Wrap { trim: false }), rows[0]);

    let mut row = 1;
    if let Some(percent) = surface.percentage {
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(Color::Yellow))
            .percent(u16::from(percent.min(100)));
        f.render_widget(gauge, rows[row]);
        row += 1;
    }
    if editing {
        f.render_widget(Paragraph::new(field_lines(app)), rows[row]);
        row += 1;
    }
    f.render_widget(
        Paragraph::new(button_line(app, surface)).wrap(Wrap { trim: true }),
        rows[row],
    );
}

fn field_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for (i, (_, input)) in app.fields().iter().enumerate() {
        let focused = i == app.focus();
        let style = if focused {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let marker = if focused { "> " } else { "  " };
        lines.push(Line::from(Span::styled(format!("{}{}", marker, input.label), style)));
        let mut value = input.display();
        if focused {
            value.push('_');
        }
        lines.push(Line::from(format!("    {}", value)));
    }
    lines
}

fn button_line(app: &App, surface: &Surface) -> Line<'static> {
    let mut spans = Vec::new();
    for (i, button) in surface.buttons.iter().enumerate() {
        let style = if !button.enabled {
            Style::default().fg(Color::DarkGray)
        } else if i == app.selected() && app.buttons_focused() {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().fg(Color::White)
        };
        spans.push(Span::styled(format!("[ {} ]", button.label), style));
        spans.push(Span::raw(" "));
    }
    Line::from(spans)
}

fn draw_console(f: &mut Frame, console: &[String], area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let start = console.len().saturating_sub(visible);
    let lines: Vec<Line> = console[start..]
        .iter()
        .map(|line| {
            if line.starts_with("Error:") {
                Line::from(Span::styled(line.as_str(), Style::default().fg(Color::Red)))
            } else {
                Line::from(line.as_str())
            }
        })
        .collect();
    let panel =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Console"));
    f.render_widget(panel, area);
}

fn key_help(app: &App, presentation: &Presentation) -> String {
    if presentation.busy {
        return "Working, please wait... | c console".to_string();
    }
    let Some(surface) = &presentation.surface else {
        return "q quit".to_string();
    };
    match surface.id {
        DialogId::Credentials if !app.buttons_focused() => {
            "type to edit | Tab/Enter next field | Shift+Tab previous | Esc close".to_string()
        }
        DialogId::Menu => "1-4 choose a flow | Left/Right select | Enter press | c console | q quit"
            .to_string(),
        DialogId::BoardMismatch => {
            "1-9 pick a compatible board | Enter press | c console | q quit".to_string()
        }
        _ if !surface.closeable => "Left/Right select | Enter press | c console".to_string(),
        _ => "Left/Right select | Enter press | Esc close | c console | q quit".to_string(),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
