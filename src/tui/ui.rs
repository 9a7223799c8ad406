//! UI rendering for the TUI

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

use super::app::{App, ComposeTarget, View};
use super::views::{board, dag, dialogue};
use crate::models::{EntryType, MilestoneStatus};

/// Main draw function - orchestrates all rendering
pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let main_layout = Layout::vertical([
        Constraint::Length(1), // Header
        Constraint::Min(6),    // Content
        Constraint::Length(1), // Footer/status
    ])
    .split(area);

    draw_header(frame, app, main_layout[0]);

    match app.current_view {
        View::Board => {
            if app.detail_expanded {
                let content_layout =
                    Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)])
                        .split(main_layout[1]);
                board::draw(frame, app, content_layout[0]);
                board::draw_detail(frame, app, content_layout[1]);
            } else {
                board::draw(frame, app, main_layout[1]);
            }
        }
        View::Dialogue => dialogue::draw(frame, app, main_layout[1]),
        View::Dag => dag::draw(frame, app, main_layout[1]),
    }

    draw_footer(frame, app, main_layout[2]);

    if app.show_help {
        draw_help_overlay(frame, area);
    }

    if app.compose.is_some() {
        draw_compose(frame, app, area);
    }
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let refresh_indicator = if app.refresh_shown_at.is_some() {
        " [Updated]"
    } else {
        ""
    };

    let header_text = format!(
        " agentboard │ {} │ {} │ [{} milestones] [{} tasks] [watch: {}]{}",
        app.project_name(),
        app.current_view.title(),
        app.milestones().len(),
        app.tasks().len(),
        app.watch_backend(),
        refresh_indicator
    );

    let header =
        Paragraph::new(header_text).style(Style::default().bg(Color::Blue).fg(Color::White).bold());

    frame.render_widget(header, area);
}

fn draw_footer(frame: &mut Frame, app: &App, area: Rect) {
    let keybinds = match app.current_view {
        View::Board => "h/j/k/l:move  Enter:detail  s:status  n:note  b:broadcast  p:project  Tab:view  ?:help  q:quit",
        View::Dialogue => "j/k:scroll  t:type  a:author  m:milestone  c:clear  b:broadcast  Tab:view  q:quit",
        View::Dag => "h/j/k/l:pan  +/-:zoom  0:reset  Tab:view  ?:help  q:quit",
    };

    let footer_text = if let Some((ref msg, _)) = app.status_message {
        msg.clone()
    } else {
        keybinds.to_string()
    };

    let footer = Paragraph::new(format!(" {}", footer_text))
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));

    frame.render_widget(footer, area);
}

/// Rect of the given size centered in `area`, clipped to fit
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn draw_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 60, 30);
    frame.render_widget(Clear, popup_area);

    let help_text = r#"
  Board
  ─────────────────────────────────
  h/l, ←/→     Switch column
  j/k, ↑/↓     Move within column
  Enter        Toggle detail panel
  s            Advance milestone status
  n            Add note to milestone
  p            Next project

  Dialogue
  ─────────────────────────────────
  j/k          Scroll
  t / a / m    Filter by type / author / milestone
  c            Clear filters

  Dependencies
  ─────────────────────────────────
  h/j/k/l      Pan view
  +/-          Zoom in/out
  0            Reset zoom

  Anywhere: b broadcast, Tab switch view, r refresh, q quit

  Press ? or Esc to close
"#;

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false })
        .style(Style::default().fg(Color::White).bg(Color::Black));

    frame.render_widget(help, popup_area);
}

fn draw_compose(frame: &mut Frame, app: &App, area: Rect) {
    let Some(compose) = &app.compose else {
        return;
    };

    let target = match compose.target {
        ComposeTarget::Milestone(id) => app
            .milestones()
            .iter()
            .find(|m| m.id == id)
            .map(|m| format!("Note on {}", m.name))
            .unwrap_or_else(|| format!("Note on milestone {}", id)),
        ComposeTarget::Broadcast => format!(
            "Broadcast to {} milestones",
            app.milestones().len()
        ),
    };

    let popup_area = centered(area, 70, 8);
    frame.render_widget(Clear, popup_area);

    let lines = vec![
        Line::from(vec![
            Span::raw(" Type: "),
            Span::styled(
                format!(" {} ", compose.entry_type),
                entry_type_style(compose.entry_type),
            ),
            Span::styled("  (Tab to change)", Style::default().fg(Color::DarkGray)),
        ]),
        Line::from(vec![
            Span::raw(" As:   "),
            Span::styled(app.author.clone(), Style::default().fg(Color::Cyan)),
        ]),
        Line::from(""),
        Line::from(format!(" {}_", compose.buffer)),
    ];

    let dialog = Paragraph::new(lines)
        .block(
            Block::default()
                .title(format!(" {} ", target))
                .title_bottom(" Enter:send  Esc:cancel ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .wrap(Wrap { trim: false })
        .style(Style::default().fg(Color::White).bg(Color::Black));

    frame.render_widget(dialog, popup_area);
}

pub fn status_color(status: MilestoneStatus) -> Color {
    match status {
        MilestoneStatus::NotStarted => Color::Gray,
        MilestoneStatus::InProgress => Color::Yellow,
        MilestoneStatus::Done => Color::Green,
    }
}

pub fn entry_type_color(entry_type: EntryType) -> Color {
    match entry_type {
        EntryType::Decision => Color::Magenta,
        EntryType::Progress => Color::Green,
        EntryType::Blocker => Color::Red,
        EntryType::Note => Color::Blue,
    }
}

/// Badge style for an entry type
pub fn entry_type_style(entry_type: EntryType) -> Style {
    Style::default()
        .fg(Color::Black)
        .bg(entry_type_color(entry_type))
        .bold()
}
