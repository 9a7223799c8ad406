//! Dependencies view - the milestone layout drawn on a canvas
//!
//! Layout coordinates grow right and down; the canvas grows up, so y is negated.

use ratatui::{
    prelude::*,
    widgets::{
        canvas::{Canvas, Line as CanvasLine, Rectangle},
        Block, Borders, Paragraph,
    },
};

use super::truncate;
use crate::models::MilestoneStatus;
use crate::tui::app::App;
use crate::tui::ui::status_color;

/// Layout units covered by one terminal cell at zoom 1.0
const UNITS_PER_COL: f64 = 5.0;
const UNITS_PER_ROW: f64 = 12.0;

pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let broken = app.layout.broken_edges.len();
    let mut title = format!(
        " Dependencies │ zoom: {}% │ [+/-] zoom  [h/j/k/l] pan  [0] reset ",
        (app.dag_zoom * 100.0) as i32
    );
    if broken > 0 {
        title.push_str(&format!("│ {} cycle edge(s) ", broken));
    }

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    if app.graph.nodes.is_empty() {
        let empty = Paragraph::new("No milestones in project")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center);
        frame.render_widget(empty, inner_area);
        return;
    }

    let view_width = inner_area.width as f64 * UNITS_PER_COL / app.dag_zoom;
    let view_height = inner_area.height as f64 * UNITS_PER_ROW / app.dag_zoom;
    let left = app.dag_offset_x;
    let top = app.dag_offset_y;
    let node_width = app.layout.positions.first().map_or(0.0, |p| p.width);
    let label_cols = ((node_width * app.dag_zoom / UNITS_PER_COL) as usize).max(4);

    let canvas = Canvas::default()
        .x_bounds([left, left + view_width])
        .y_bounds([-(top + view_height), -top])
        .paint(|ctx| {
            // Edges behind nodes: right side of prerequisite to left side of dependent
            for edge in app.layout.edges.iter().chain(&app.layout.broken_edges) {
                let (Some(from), Some(to)) = (app.layout.position(edge.from), app.layout.position(edge.to))
                else {
                    continue;
                };
                let color = if app.layout.is_broken(edge) {
                    Color::Red
                } else if app.graph.node(edge.from).is_some_and(|n| n.status == MilestoneStatus::Done) {
                    Color::Green
                } else {
                    Color::DarkGray
                };
                ctx.draw(&CanvasLine {
                    x1: from.x + from.width,
                    y1: -(from.y + from.height / 2.0),
                    x2: to.x,
                    y2: -(to.y + to.height / 2.0),
                    color,
                });
            }

            for pos in &app.layout.positions {
                let Some(node) = app.graph.node(pos.id) else {
                    continue;
                };
                ctx.draw(&Rectangle {
                    x: pos.x,
                    y: -(pos.y + pos.height),
                    width: pos.width,
                    height: pos.height,
                    color: status_color(node.status),
                });

                let name = truncate(&node.name, label_cols.saturating_sub(2));
                ctx.print(
                    pos.x + UNITS_PER_COL,
                    -(pos.y + pos.height / 3.0),
                    Span::styled(name, Style::default().fg(Color::White).bold()),
                );
                if node.progress.total > 0 {
                    ctx.print(
                        pos.x + UNITS_PER_COL,
                        -(pos.y + pos.height * 2.0 / 3.0),
                        Span::styled(
                            format!("{}/{} {}%", node.progress.done, node.progress.total, node.progress.percent()),
                            Style::default().fg(Color::Gray),
                        ),
                    );
                }
            }
        });

    frame.render_widget(canvas, inner_area);

    let legend_area = Rect {
        x: inner_area.x + inner_area.width.saturating_sub(18),
        y: inner_area.y,
        width: 18.min(inner_area.width),
        height: 4.min(inner_area.height),
    };
    let legend_text: Vec<Line> = MilestoneStatus::ALL
        .iter()
        .map(|s| {
            Line::from(vec![
                Span::styled("■", Style::default().fg(status_color(*s))),
                Span::raw(format!(" {}", s)),
            ])
        })
        .chain(std::iter::once(Line::from(vec![
            Span::styled("─", Style::default().fg(Color::Red)),
            Span::raw(" cycle"),
        ])))
        .collect();

    let legend = Paragraph::new(legend_text).style(Style::default().bg(Color::Black));
    frame.render_widget(legend, legend_area);
}
