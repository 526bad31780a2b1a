use std::time::{Duration, Instant};

use crt_chat_core::{CompletionResult, Config, Conversation, Message, PendingReply, Role};
use ratatui::layout::Rect;
use tokio::sync::mpsc::UnboundedSender;

use crate::tui::AppEvent;

/// How long the copy marker stays on a reply
pub const COPIED_FLASH: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Input,
    Transcript,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub focus: Focus,
    pub model: String,

    // Boot sequence
    pub booted: bool,
    pub boot_started: Instant,
    pub boot_delay: Duration,
    pub greeting: String,

    // Conversation
    pub conversation: Conversation,
    pub events: UnboundedSender<AppEvent>,

    // Input state
    pub input: String,
    pub cursor: usize, // char index into `input`

    // Transcript state
    pub scroll: u16,
    pub follow_bottom: bool,
    pub chat_height: u16,
    pub total_lines: u16,
    pub selected_reply: Option<usize>, // index into conversation messages
    pub copied: Option<(String, Instant)>,

    // Animation state
    pub animation_frame: u8,

    // Panel area for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

impl App {
    pub fn new(conversation: Conversation, config: &Config, events: UnboundedSender<AppEvent>) -> Self {
        let mut app = Self {
            should_quit: false,
            focus: Focus::Input,
            model: config.model.clone(),

            booted: false,
            boot_started: Instant::now(),
            boot_delay: Duration::from_millis(config.boot_delay_ms),
            greeting: config.greeting.clone(),

            conversation,
            events,

            input: String::new(),
            cursor: 0,

            scroll: 0,
            follow_bottom: true,
            chat_height: 0,
            total_lines: 0,
            selected_reply: None,
            copied: None,

            animation_frame: 0,

            chat_area: None,
        };

        if app.boot_delay.is_zero() {
            app.finish_boot();
        }

        app
    }

    /// Tick animation frame, boot timer and copy marker (called by Tick event)
    pub fn tick(&mut self) {
        self.animation_frame = (self.animation_frame + 1) % 4;

        if !self.booted && self.boot_started.elapsed() >= self.boot_delay {
            self.finish_boot();
        }

        if let Some((_, at)) = &self.copied {
            if at.elapsed() >= COPIED_FLASH {
                self.copied = None;
            }
        }
    }

    pub fn finish_boot(&mut self) {
        self.booted = true;
        if !self.greeting.is_empty() {
            self.conversation.greet(&self.greeting);
        }
        tracing::info!("boot sequence complete");
    }

    // Input editing

    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.input.chars().count() {
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.input.chars().count();
    }

    /// Row and column of the cursor inside the (multi-line) input
    pub fn cursor_position(&self) -> (usize, usize) {
        let before: String = self.input.chars().take(self.cursor).collect();
        let row = before.matches('\n').count();
        let col = before.rsplit('\n').next().map(|l| l.chars().count()).unwrap_or(0);
        (row, col)
    }

    pub fn input_line_count(&self) -> usize {
        self.input.split('\n').count()
    }

    // Conversation actions

    /// Sends the input if the conversation accepts it. Returns whether
    /// anything was sent.
    pub fn submit_input(&mut self) -> bool {
        if !self.booted || !self.conversation.accepts_input() {
            return false;
        }

        let text = self.input.trim().to_string();
        if text.is_empty() {
            return false;
        }

        self.input.clear();
        self.cursor = 0;

        let pending = self.conversation.submit(&text);
        self.dispatch(pending);
        true
    }

    /// Replays the last user message. Only available while an error is shown.
    pub fn retry(&mut self) -> bool {
        if self.conversation.error().is_none() {
            return false;
        }

        match self.conversation.retry() {
            Some(pending) => {
                self.dispatch(pending);
                true
            }
            None => false,
        }
    }

    fn dispatch(&mut self, pending: PendingReply) {
        self.follow_bottom = true;

        // Run the request on a background task so the UI keeps drawing
        let client = self.conversation.client();
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = pending.run(client.as_ref()).await;
            if events.send(AppEvent::Reply(outcome)).is_err() {
                tracing::debug!("event loop gone before reply arrived");
            }
        });
    }

    pub fn apply_reply(&mut self, outcome: CompletionResult<String>) {
        self.conversation.resolve(outcome);
        self.follow_bottom = true;
    }

    // Transcript navigation

    fn reply_indices(&self) -> Vec<usize> {
        self.conversation
            .messages()
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == Role::Assistant)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn select_next_reply(&mut self) {
        let replies = self.reply_indices();
        self.selected_reply = match self.selected_reply {
            None => replies.first().copied(),
            Some(current) => replies
                .iter()
                .copied()
                .find(|&i| i > current)
                .or(Some(current)),
        };
    }

    pub fn select_prev_reply(&mut self) {
        let replies = self.reply_indices();
        self.selected_reply = match self.selected_reply {
            None => replies.last().copied(),
            Some(current) => replies
                .iter()
                .rev()
                .copied()
                .find(|&i| i < current)
                .or(Some(current)),
        };
    }

    pub fn selected_message(&self) -> Option<&Message> {
        self.selected_reply
            .and_then(|i| self.conversation.messages().get(i))
    }

    pub fn mark_copied(&mut self, id: &str) {
        self.copied = Some((id.to_string(), Instant::now()));
    }

    pub fn is_copied(&self, id: &str) -> bool {
        self.copied.as_ref().is_some_and(|(copied, _)| copied == id)
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_bottom = false;
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.max_scroll();
        self.scroll = self.scroll.saturating_add(lines).min(max);
        self.follow_bottom = self.scroll >= max;
    }

    pub fn scroll_to_top(&mut self) {
        self.follow_bottom = false;
        self.scroll = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.follow_bottom = true;
        self.scroll = self.max_scroll();
    }

    pub fn half_page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }

    fn max_scroll(&self) -> u16 {
        self.total_lines.saturating_sub(self.chat_height)
    }

    /// Called by the renderer once it knows how tall the transcript is
    pub fn set_transcript_size(&mut self, total_lines: u16, height: u16) {
        self.total_lines = total_lines;
        self.chat_height = height;
        if self.follow_bottom {
            self.scroll = self.max_scroll();
        } else {
            self.scroll = self.scroll.min(self.max_scroll());
        }
    }
}
