//! In-memory console shown under the dialog, mirrored to the log.

use crate::presentation::PresentationHandle;
use std::collections::VecDeque;

pub const MAX_CONSOLE_LINES: usize = 100;

pub struct ConsoleLog {
    lines: VecDeque<String>,
    sink: PresentationHandle,
}

impl ConsoleLog {
    pub fn new(sink: PresentationHandle) -> Self {
        Self {
            lines: VecDeque::new(),
            sink,
        }
    }

    pub fn info(&mut self, message: &str) {
        log::info!("{}", message);
        self.append(message.lines().map(str::to_string));
    }

    pub fn error(&mut self, message: &str) {
        log::error!("{}", message);
        self.append(message.lines().enumerate().map(|(i, line)| {
            if i == 0 {
                format!("Error: {}", line)
            } else {
                line.to_string()
            }
        }));
    }

    fn append(&mut self, lines: impl Iterator<Item = String>) {
        self.lines.extend(lines);
        while self.lines.len() > MAX_CONSOLE_LINES {
            self.lines.pop_front();
        }
        self.sink.set_console(self.lines.iter().cloned().collect());
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_newest_lines() {
        let handle = PresentationHandle::new();
        let mut console = ConsoleLog::new(handle.clone());
        for i in 0..150 {
            console.info(&format!("line {}", i));
        }
        let lines: Vec<&str> = console.lines().collect();
        assert_eq!(lines.len(), MAX_CONSOLE_LINES);
        assert_eq!(lines[0], "line 50");
        assert_eq!(lines[99], "line 149");
        assert_eq!(handle.snapshot().console.len(), MAX_CONSOLE_LINES);
    }

    #[test]
    fn errors_are_prefixed_once() {
        let mut console = ConsoleLog::new(PresentationHandle::new());
        console.error("Oops, wrong board!\n- you selected: Feather");
        let lines: Vec<&str> = console.lines().collect();
        assert_eq!(
            lines,
            vec!["Error: Oops, wrong board!", "- you selected: Feather"]
        );
    }
}
