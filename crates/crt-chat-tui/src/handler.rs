use anyhow::{Result, anyhow};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::{App, Focus};
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(),
        AppEvent::Reply(outcome) => app.apply_reply(outcome),
        AppEvent::Copied(id) => app.mark_copied(&id),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global keys that work in any mode
    if ctrl {
        match key.code {
            KeyCode::Char('c') => {
                app.should_quit = true;
                return;
            }
            KeyCode::Char('r') => {
                app.retry();
                return;
            }
            KeyCode::Char('y') => {
                copy_last_reply(app);
                return;
            }
            _ => {}
        }
    }

    // Nothing to interact with until the boot screen is gone
    if !app.booted {
        return;
    }

    match app.focus {
        Focus::Input => handle_input_key(app, key),
        Focus::Transcript => handle_transcript_key(app, key),
    }
}

fn handle_input_key(app: &mut App, key: KeyEvent) {
    // Scrolling and focus work even while the input is inert
    match key.code {
        KeyCode::Tab | KeyCode::Esc => {
            app.focus = Focus::Transcript;
            return;
        }
        KeyCode::PageUp => {
            app.scroll_up(app.half_page());
            return;
        }
        KeyCode::PageDown => {
            app.scroll_down(app.half_page());
            return;
        }
        _ => {}
    }

    if !app.conversation.accepts_input() {
        return;
    }

    match key.code {
        KeyCode::Enter
            if key.modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) =>
        {
            app.insert_char('\n');
        }
        // Many terminals report Shift+Enter as Ctrl+J
        KeyCode::Char('j') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.insert_char('\n');
        }
        KeyCode::Enter => {
            app.submit_input();
        }
        KeyCode::Backspace => app.backspace(),
        KeyCode::Delete => app.delete(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.insert_char(c);
        }
        _ => {}
    }
}

fn handle_transcript_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Tab | KeyCode::Esc | KeyCode::Char('i') => app.focus = Focus::Input,

        // Reply selection
        KeyCode::Char('j') => app.select_next_reply(),
        KeyCode::Char('k') => app.select_prev_reply(),

        // Scrolling
        KeyCode::Down => app.scroll_down(1),
        KeyCode::Up => app.scroll_up(1),
        KeyCode::PageDown => app.scroll_down(app.half_page()),
        KeyCode::PageUp => app.scroll_up(app.half_page()),
        KeyCode::Char('g') => app.scroll_to_top(),
        KeyCode::Char('G') => app.scroll_to_bottom(),

        KeyCode::Char('c') => copy_selected_reply(app),
        KeyCode::Char('r') => {
            app.retry();
        }
        _ => {}
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let over_chat = app
        .chat_area
        .is_some_and(|area| point_in_rect(mouse.column, mouse.row, area));

    match mouse.kind {
        MouseEventKind::ScrollUp if over_chat => app.scroll_up(3),
        MouseEventKind::ScrollDown if over_chat => app.scroll_down(3),
        _ => {}
    }
}

fn copy_selected_reply(app: &App) {
    let Some(message) = app.selected_message() else {
        return;
    };
    copy_message(app, &message.id, &message.content);
}

fn copy_last_reply(app: &App) {
    let Some(message) = app.conversation.last_reply() else {
        return;
    };
    copy_message(app, &message.id, &message.content);
}

/// Copies on a blocking task; the marker is set when `Copied` comes back
fn copy_message(app: &App, id: &str, content: &str) {
    let events = app.events.clone();
    let (id, content) = (id.to_string(), content.to_string());

    tokio::task::spawn_blocking(move || match copy_to_clipboard(CLIPBOARD_COMMANDS, &content) {
        Ok(()) => {
            if events.send(AppEvent::Copied(id)).is_err() {
                tracing::debug!("event loop gone before copy finished");
            }
        }
        Err(e) => tracing::warn!(error = %e, "copy to clipboard failed"),
    });
}

/// Clipboard programs tried in order
const CLIPBOARD_COMMANDS: &[(&str, &[&str])] = &[
    ("pbcopy", &[]),
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("clip", &[]),
];

fn copy_to_clipboard(commands: &[(&str, &[&str])], text: &str) -> Result<()> {
    use std::process::{Command, Stdio};
    use std::io::Write;

    for (program, args) in commands {
        let Ok(mut child) = Command::new(program)
            .args(*args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        else {
            continue;
        };

        // Stdin is dropped before waiting so the program sees EOF
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(text.as_bytes()),
            None => Ok(()),
        };
        let status = child.wait()?;
        written?;

        if status.success() {
            tracing::debug!(program, "copied reply to clipboard");
            return Ok(());
        }
    }

    Err(anyhow!("no clipboard program available"))
}
