use ratatui::text::Text;

/// Lines from the bottom within which the transcript counts as "at the
/// bottom" for auto-scroll purposes.
pub const NEAR_BOTTOM_LINES: u16 = 2;

const WHEEL_STEP: u16 = 3;

/// Multi-line text buffer behind the compose and draft inputs.
#[derive(Debug, Clone)]
pub struct ComposeState {
    pub(crate) lines: Vec<String>,
    pub(crate) row: usize,
    pub(crate) col: usize,
    /// Column to aim for when moving vertically through shorter lines.
    pub(crate) sticky_col: usize,
}

impl Default for ComposeState {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposeState {
    pub fn new() -> Self {
        Self {
            lines: vec![String::new()],
            row: 0,
            col: 0,
            sticky_col: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }

    fn line_len(&self, row: usize) -> usize {
        self.lines[row].chars().count()
    }

    fn byte_at(&self, col: usize) -> usize {
        let line = &self.lines[self.row];
        line.char_indices()
            .nth(col)
            .map(|(i, _)| i)
            .unwrap_or(line.len())
    }

    pub fn insert_char(&mut self, ch: char) {
        let at = self.byte_at(self.col);
        self.lines[self.row].insert(at, ch);
        self.col += 1;
        self.sticky_col = self.col;
    }

    pub fn insert_newline(&mut self) {
        let at = self.byte_at(self.col);
        let tail = self.lines[self.row].split_off(at);
        self.row += 1;
        self.lines.insert(self.row, tail);
        self.col = 0;
        self.sticky_col = 0;
    }

    /// Insert pasted text; `\r\n` and bare `\r` both become newlines.
    pub fn insert_text(&mut self, text: &str) {
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        for ch in normalized.chars() {
            if ch == '\n' {
                self.insert_newline();
            } else {
                self.insert_char(ch);
            }
        }
    }

    pub fn backspace(&mut self) {
        if self.col > 0 {
            let start = self.byte_at(self.col - 1);
            let end = self.byte_at(self.col);
            self.lines[self.row].replace_range(start..end, "");
            self.col -= 1;
        } else if self.row > 0 {
            let current = self.lines.remove(self.row);
            self.row -= 1;
            self.col = self.line_len(self.row);
            self.lines[self.row].push_str(&current);
        }
        self.sticky_col = self.col;
    }

    pub fn delete_forward(&mut self) {
        if self.col < self.line_len(self.row) {
            let start = self.byte_at(self.col);
            let end = self.byte_at(self.col + 1);
            self.lines[self.row].replace_range(start..end, "");
        } else if self.row + 1 < self.lines.len() {
            let next = self.lines.remove(self.row + 1);
            self.lines[self.row].push_str(&next);
        }
        self.sticky_col = self.col;
    }

    pub fn move_left(&mut self) {
        if self.col > 0 {
            self.col -= 1;
        } else if self.row > 0 {
            self.row -= 1;
            self.col = self.line_len(self.row);
        }
        self.sticky_col = self.col;
    }

    pub fn move_right(&mut self) {
        if self.col < self.line_len(self.row) {
            self.col += 1;
        } else if self.row + 1 < self.lines.len() {
            self.row += 1;
            self.col = 0;
        }
        self.sticky_col = self.col;
    }

    pub fn move_up(&mut self) {
        if self.row > 0 {
            self.row -= 1;
            self.col = self.sticky_col.min(self.line_len(self.row));
        }
    }

    pub fn move_down(&mut self) {
        if self.row + 1 < self.lines.len() {
            self.row += 1;
            self.col = self.sticky_col.min(self.line_len(self.row));
        }
    }

    pub fn move_home(&mut self) {
        self.col = 0;
        self.sticky_col = 0;
    }

    pub fn move_end(&mut self) {
        self.col = self.line_len(self.row);
        self.sticky_col = self.col;
    }
}

/// Rendered transcript plus the user's scroll position, measured in lines
/// up from the bottom (0 = pinned to the latest entry).
#[derive(Debug, Default)]
pub struct TranscriptView {
    pub text: Text<'static>,
    pub line_count: u16,
    pub offset_from_bottom: u16,
}

impl TranscriptView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rendered text. When the user has scrolled away, the
    /// offset grows with the content so the visible lines stay put.
    pub fn set_text(&mut self, text: Text<'static>, following: bool) {
        let new_count = text.lines.len().min(u16::MAX as usize) as u16;
        if !following && self.offset_from_bottom > 0 {
            let grown = new_count.saturating_sub(self.line_count);
            self.offset_from_bottom = self.offset_from_bottom.saturating_add(grown);
        }
        self.line_count = new_count;
        self.text = text;
        self.clamp();
    }

    pub fn is_near_bottom(&self) -> bool {
        self.offset_from_bottom <= NEAR_BOTTOM_LINES
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.offset_from_bottom = self.offset_from_bottom.saturating_add(lines);
        self.clamp();
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.offset_from_bottom = self.offset_from_bottom.saturating_sub(lines);
    }

    pub fn wheel_up(&mut self) {
        self.scroll_up(WHEEL_STEP);
    }

    pub fn wheel_down(&mut self) {
        self.scroll_down(WHEEL_STEP);
    }

    pub fn snap_to_bottom(&mut self) {
        self.offset_from_bottom = 0;
    }

    /// First visible line for a viewport of `height` rows.
    pub fn scroll_y(&self, height: u16) -> u16 {
        let max_top = self.line_count.saturating_sub(height);
        max_top.saturating_sub(self.offset_from_bottom.min(max_top))
    }

    fn clamp(&mut self) {
        self.offset_from_bottom = self.offset_from_bottom.min(self.line_count);
    }
}
