//! Human-readable adapter trace, capped so long sessions stay bounded

use std::collections::VecDeque;

use crate::STATUS_LOG_MAX_LINES;

#[derive(Debug, Clone)]
pub struct StatusLog {
    lines: VecDeque<String>,
    max_lines: usize,
    /// Lines pushed so far, dropped ones included
    total: u64,
}

impl Default for StatusLog {
    fn default() -> Self {
        Self::new(STATUS_LOG_MAX_LINES)
    }
}

impl StatusLog {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines: max_lines.max(1),
            total: 0,
        }
    }

    /// Append text (multi-line text becomes several lines); oldest lines drop
    pub fn push(&mut self, text: impl AsRef<str>) {
        for line in text.as_ref().lines() {
            self.lines.push_back(line.to_string());
            self.total += 1;
            if self.lines.len() > self.max_lines {
                self.lines.pop_front();
            }
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn text(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}
