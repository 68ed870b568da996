/// Tracks auto-scroll intent for the transcript view.
///
/// The view watches `scroll_signal()`: whenever it increases, the view jumps
/// to the latest entry. Content changes and context changes are reported
/// separately so that a poll tick which re-renders identical content never
/// causes a jump.
#[derive(Debug, Clone)]
pub struct ScrollController {
    auto_scroll: bool,
    scroll_signal: u64,
    last_context_key: Option<String>,
    last_message_key: Option<String>,
}

impl Default for ScrollController {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrollController {
    pub fn new() -> Self {
        Self {
            auto_scroll: true,
            scroll_signal: 0,
            last_context_key: None,
            last_message_key: None,
        }
    }

    pub fn auto_scroll_enabled(&self) -> bool {
        self.auto_scroll
    }

    pub fn scroll_signal(&self) -> u64 {
        self.scroll_signal
    }

    pub fn context_key(&self) -> Option<&str> {
        self.last_context_key.as_deref()
    }

    /// Switch to a different session or draft. A new key re-enables
    /// auto-scroll and always requests a jump to the bottom.
    pub fn set_context(&mut self, key: &str) {
        if self.last_context_key.as_deref() == Some(key) {
            return;
        }
        self.last_context_key = Some(key.to_string());
        self.last_message_key = None;
        self.auto_scroll = true;
        self.bump();
    }

    /// Report the key of the latest rendered entry.
    pub fn notify_latest_key(&mut self, key: Option<&str>) {
        let Some(key) = key else {
            self.last_message_key = None;
            return;
        };
        if self.last_message_key.as_deref() == Some(key) {
            return;
        }
        self.last_message_key = Some(key.to_string());
        if self.auto_scroll {
            self.bump();
        }
    }

    /// Called by the view when the scroll position crosses its near-bottom
    /// threshold.
    pub fn handle_auto_scroll_change(&mut self, enabled: bool) {
        self.auto_scroll = enabled;
    }

    /// Jump to the latest entry unless the user has scrolled away.
    pub fn request_scroll_if_auto(&mut self) {
        if self.auto_scroll {
            self.bump();
        }
    }

    fn bump(&mut self) {
        self.scroll_signal = self.scroll_signal.wrapping_add(1);
    }
}
