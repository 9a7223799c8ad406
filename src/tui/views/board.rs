//! Board view - milestones in one column per status

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};

use super::{format_timestamp, truncate};
use crate::models::{Milestone, MilestoneStatus, TaskStatus};
use crate::tui::app::App;
use crate::tui::ui::{entry_type_style, status_color};

fn column_title(status: MilestoneStatus) -> &'static str {
    match status {
        MilestoneStatus::NotStarted => "Not Started",
        MilestoneStatus::InProgress => "In Progress",
        MilestoneStatus::Done => "Done",
    }
}

/// Text progress bar, e.g. `███░░░ 3/6`
fn progress_bar(done: usize, total: usize, width: usize) -> String {
    if total == 0 {
        return "no tasks".to_string();
    }
    let filled = (done * width) / total;
    format!(
        "{}{} {}/{}",
        "█".repeat(filled),
        "░".repeat(width - filled),
        done,
        total
    )
}

pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let columns = Layout::horizontal([
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
    ])
    .split(area);

    for (column, col_area) in columns.iter().enumerate() {
        draw_column(frame, app, column, *col_area);
    }
}

fn draw_column(frame: &mut Frame, app: &App, column: usize, area: Rect) {
    let status = App::column_status(column);
    let items = app.column_items(column);
    let focused = column == app.column;

    let block = Block::default()
        .title(format!(" {} ({}) ", column_title(status), items.len()))
        .borders(Borders::ALL)
        .border_style(if focused {
            Style::default().fg(status_color(status)).bold()
        } else {
            Style::default().fg(Color::DarkGray)
        });

    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    if items.is_empty() {
        let empty = Paragraph::new("Empty")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center);
        frame.render_widget(empty, inner_area);
        return;
    }

    let width = inner_area.width as usize;
    let list_items: Vec<ListItem> = items
        .iter()
        .enumerate()
        .map(|(idx, milestone)| {
            let is_selected = focused && idx == app.rows[column];
            card(app, milestone, width, is_selected)
        })
        .collect();

    let mut state = ListState::default();
    if focused {
        state.select(Some(app.rows[column]));
    }
    frame.render_stateful_widget(List::new(list_items), inner_area, &mut state);
}

fn card<'a>(app: &App, milestone: &Milestone, width: usize, is_selected: bool) -> ListItem<'a> {
    let tasks = app.tasks_for(milestone.id);
    let done = tasks.iter().filter(|t| t.status == TaskStatus::Done).count();

    let mut header = vec![Span::styled(
        truncate(&milestone.name, width.saturating_sub(12)),
        if is_selected {
            Style::default().fg(Color::White).bold()
        } else {
            Style::default().fg(Color::White)
        },
    )];
    if milestone.priority != 0 {
        header.push(Span::styled(
            format!(" p{}", milestone.priority),
            Style::default().fg(Color::Cyan),
        ));
    }
    if app.graph.is_blocked(milestone.id) {
        header.push(Span::styled(" blocked", Style::default().fg(Color::Red)));
    }

    let owner = milestone
        .owner
        .as_deref()
        .map(|o| format!("@{}", o))
        .unwrap_or_else(|| "unowned".to_string());

    let lines = vec![
        Line::from(header),
        Line::from(Span::styled(
            format!("  {}", progress_bar(done, tasks.len(), 10)),
            Style::default().fg(status_color(milestone.status)),
        )),
        Line::from(Span::styled(
            format!("  {}", owner),
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let style = if is_selected {
        Style::default().bg(Color::DarkGray)
    } else {
        Style::default()
    };
    ListItem::new(lines).style(style)
}

/// Side panel for the selected milestone: fields, tasks, recent dialogue
pub fn draw_detail(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Detail ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    let Some(milestone) = app.selected_milestone() else {
        let empty = Paragraph::new("No milestone selected")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center);
        frame.render_widget(empty, inner_area);
        return;
    };

    let label = Style::default().fg(Color::DarkGray);
    let mut lines = vec![
        Line::from(Span::styled(milestone.name.clone(), Style::default().bold())),
        Line::from(vec![
            Span::styled("Status:   ", label),
            Span::styled(
                milestone.status.to_string(),
                Style::default().fg(status_color(milestone.status)),
            ),
        ]),
        Line::from(vec![
            Span::styled("Owner:    ", label),
            Span::raw(milestone.owner.clone().unwrap_or_else(|| "-".to_string())),
        ]),
        Line::from(vec![
            Span::styled("Dates:    ", label),
            Span::raw(format!(
                "{} → {}",
                milestone.start_date.as_deref().unwrap_or("?"),
                milestone.end_date.as_deref().unwrap_or("?")
            )),
        ]),
    ];

    let prereqs = app.graph.prerequisites(milestone.id);
    if !prereqs.is_empty() {
        let names: Vec<String> = prereqs
            .iter()
            .filter_map(|id| app.graph.node(*id))
            .map(|n| n.name.clone())
            .collect();
        lines.push(Line::from(vec![
            Span::styled("Needs:    ", label),
            Span::raw(names.join(", ")),
        ]));
    }

    if let Some(description) = &milestone.description {
        lines.push(Line::from(""));
        lines.push(Line::from(description.clone()));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("Tasks", Style::default().bold())));
    let tasks = app.tasks_for(milestone.id);
    if tasks.is_empty() {
        lines.push(Line::from(Span::styled("  none", label)));
    }
    for task in tasks {
        let mark = match task.status {
            TaskStatus::Done => "[x]",
            TaskStatus::InProgress => "[~]",
            TaskStatus::Pending => "[ ]",
        };
        let assignee = task
            .assignee
            .as_deref()
            .map(|a| format!(" @{}", a))
            .unwrap_or_default();
        lines.push(Line::from(format!("  {} {}{}", mark, task.title, assignee)));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("Dialogue", Style::default().bold())));
    for entry in app.detail_dialogue().iter().take(10) {
        lines.push(Line::from(vec![
            Span::styled(format!(" {} ", entry.entry_type), entry_type_style(entry.entry_type)),
            Span::styled(
                format!(" {} · {}", entry.author, format_timestamp(&entry.created_at)),
                label,
            ),
        ]));
        lines.push(Line::from(format!("  {}", entry.content)));
    }

    let detail = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(detail, inner_area);
}
