//! Content views, one per [`View`](super::app::View)

pub mod board;
pub mod dag;
pub mod dialogue;

pub(crate) use crate::export::truncate;

pub(crate) fn format_timestamp(ts: &str) -> String {
    // "2026-03-10T18:04:00.000Z" -> "Mar 10  6:04 PM", local time
    match chrono::DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => dt
            .with_timezone(&chrono::Local)
            .format("%b %d %l:%M %p")
            .to_string(),
        Err(_) => ts.to_string(),
    }
}
