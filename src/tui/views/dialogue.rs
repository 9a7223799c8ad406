//! Dialogue view - project timeline with type, author and milestone filters

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

use super::{format_timestamp, truncate};
use crate::models::EntryType;
use crate::tui::app::App;
use crate::tui::ui::entry_type_style;

pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let layout = Layout::vertical([Constraint::Length(1), Constraint::Min(3)]).split(area);
    draw_filter_bar(frame, app, layout[0]);

    let entries = app.timeline();
    let block = Block::default()
        .title(format!(" Dialogue ({}) ", entries.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    let inner_area = block.inner(layout[1]);
    frame.render_widget(block, layout[1]);

    if entries.is_empty() {
        let empty = Paragraph::new("No dialogue matches your filters")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center);
        frame.render_widget(empty, inner_area);
        return;
    }

    let width = inner_area.width as usize;
    let items: Vec<ListItem> = entries
        .iter()
        .skip(app.timeline_scroll)
        .map(|d| {
            let entry = &d.entry;
            let header = Line::from(vec![
                Span::styled(
                    format!(" {} ", entry.entry_type.as_str().to_uppercase()),
                    entry_type_style(entry.entry_type),
                ),
                Span::raw(" "),
                Span::styled(entry.author.clone(), Style::default().fg(Color::Cyan).bold()),
                Span::styled(
                    format!(" on {}", d.milestone_name),
                    Style::default().fg(Color::Yellow),
                ),
                Span::styled(
                    format!("  {}", format_timestamp(&entry.created_at)),
                    Style::default().fg(Color::DarkGray),
                ),
            ]);
            let body = Line::from(format!(
                "  {}",
                truncate(&entry.content, width.saturating_sub(4))
            ));
            ListItem::new(vec![header, body, Line::from("")])
        })
        .collect();

    frame.render_widget(List::new(items), inner_area);
}

fn draw_filter_bar(frame: &mut Frame, app: &App, area: Rect) {
    let active = Style::default().fg(Color::Black).bg(Color::Yellow);
    let inactive = Style::default().fg(Color::Gray);

    let mut spans = vec![Span::raw(" Type: ")];
    spans.push(Span::styled(
        "[all]",
        if app.type_filter.is_none() { active } else { inactive },
    ));
    for t in EntryType::ALL {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            format!("[{}]", t),
            if app.type_filter == Some(*t) { active } else { inactive },
        ));
    }

    spans.push(Span::raw(" │ Author: "));
    spans.push(Span::styled(
        app.author_filter.clone().unwrap_or_else(|| "all".to_string()),
        if app.author_filter.is_some() { active } else { inactive },
    ));

    let milestone = app.milestone_filter.map(|id| {
        app.milestones()
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| format!("#{}", id))
    });
    spans.push(Span::raw(" │ Milestone: "));
    spans.push(Span::styled(
        milestone.clone().unwrap_or_else(|| "all".to_string()),
        if milestone.is_some() { active } else { inactive },
    ));

    let bar = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(bar, area);
}
