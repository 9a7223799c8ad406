//! Event handling for the TUI
//!
//! Vim-style keybindings per view, plus the compose and help overlays

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::app::{App, View};

/// Handle a key event, returns true if app should quit
pub fn handle_event(app: &mut App, key: KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    if app.show_help {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?')) {
            app.show_help = false;
        }
        return false;
    }

    if app.compose.is_some() {
        handle_compose(app, key);
        return false;
    }

    // Keys shared by every view
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('?') => {
            app.show_help = true;
            return false;
        }
        KeyCode::Tab => {
            app.toggle_view();
            return false;
        }
        KeyCode::Char('1') => {
            app.current_view = View::Board;
            return false;
        }
        KeyCode::Char('2') => {
            app.current_view = View::Dialogue;
            return false;
        }
        KeyCode::Char('3') => {
            app.current_view = View::Dag;
            return false;
        }
        KeyCode::Char('r') => {
            app.refresh();
            return false;
        }
        KeyCode::Char('p') => {
            app.cycle_project();
            return false;
        }
        KeyCode::Char('b') => {
            app.start_broadcast();
            return false;
        }
        _ => {}
    }

    match app.current_view {
        View::Board => handle_board_keys(app, key),
        View::Dialogue => handle_dialogue_keys(app, key),
        View::Dag => handle_dag_keys(app, key),
    }
    false
}

fn handle_compose(app: &mut App, key: KeyEvent) {
    let Some(compose) = app.compose.as_mut() else {
        return;
    };
    match key.code {
        KeyCode::Esc => app.compose = None,
        KeyCode::Enter => app.submit_compose(),
        KeyCode::Tab => compose.cycle_type(),
        KeyCode::Backspace => {
            compose.buffer.pop();
        }
        KeyCode::Char(c) => compose.buffer.push(c),
        _ => {}
    }
}

fn handle_board_keys(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.move_down(),
        KeyCode::Char('k') | KeyCode::Up => app.move_up(),
        KeyCode::Char('h') | KeyCode::Left => app.move_left(),
        KeyCode::Char('l') | KeyCode::Right => app.move_right(),
        KeyCode::Enter => app.toggle_detail(),
        KeyCode::Char('s') => app.cycle_selected_status(),
        KeyCode::Char('n') => app.start_note(),
        _ => {}
    }
}

fn handle_dialogue_keys(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.scroll_timeline(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_timeline(-1),
        KeyCode::PageDown => app.scroll_timeline(10),
        KeyCode::PageUp => app.scroll_timeline(-10),
        KeyCode::Char('t') => app.cycle_type_filter(),
        KeyCode::Char('a') => app.cycle_author_filter(),
        KeyCode::Char('m') => app.cycle_milestone_filter(),
        KeyCode::Char('c') | KeyCode::Esc => app.clear_filters(),
        _ => {}
    }
}

fn handle_dag_keys(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('h') | KeyCode::Left => app.dag_pan(-1.0, 0.0),
        KeyCode::Char('l') | KeyCode::Right => app.dag_pan(1.0, 0.0),
        KeyCode::Char('k') | KeyCode::Up => app.dag_pan(0.0, -1.0),
        KeyCode::Char('j') | KeyCode::Down => app.dag_pan(0.0, 1.0),
        KeyCode::Char('+') | KeyCode::Char('=') => app.dag_zoom_in(),
        KeyCode::Char('-') | KeyCode::Char('_') => app.dag_zoom_out(),
        KeyCode::Char('0') => app.dag_reset_zoom(),
        _ => {}
    }
}
